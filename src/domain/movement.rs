use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{LedgerError, ProductId, Quantity};

pub type TransactionId = Uuid;

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementType {
    /// Goods received, stock increases
    Inbound,
    /// Goods shipped, stock decreases
    Outbound,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Inbound => "INBOUND",
            MovementType::Outbound => "OUTBOUND",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            MovementType::Inbound => MovementType::Outbound,
            MovementType::Outbound => MovementType::Inbound,
        }
    }

    /// Signed effect of moving `quantity` units in this direction.
    pub fn signed(&self, quantity: Quantity) -> Quantity {
        match self {
            MovementType::Inbound => quantity,
            MovementType::Outbound => -quantity,
        }
    }
}

impl FromStr for MovementType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INBOUND" => Ok(MovementType::Inbound),
            "OUTBOUND" => Ok(MovementType::Outbound),
            _ => Err(LedgerError::InvalidMovementType(s.to_string())),
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A movement as submitted by a caller, before any validation.
///
/// Field names follow the `POST /transactions` body so the boundary layer
/// can deserialize straight into this type. `quantity` keeps whatever JSON
/// value was sent (or nothing), so a missing or non-integer quantity is
/// reported by [`MovementRequest::validate`] like any other bad quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementRequest {
    pub product_id: ProductId,
    #[serde(rename = "type", default)]
    pub movement_type: String,
    #[serde(default)]
    pub quantity: Option<Value>,
    #[serde(default)]
    pub waybill_no: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl MovementRequest {
    pub fn new(product_id: ProductId, movement_type: MovementType, quantity: Quantity) -> Self {
        Self {
            product_id,
            movement_type: movement_type.as_str().to_string(),
            quantity: Some(Value::from(quantity)),
            waybill_no: None,
            notes: None,
        }
    }

    pub fn inbound(product_id: ProductId, quantity: Quantity) -> Self {
        Self::new(product_id, MovementType::Inbound, quantity)
    }

    pub fn outbound(product_id: ProductId, quantity: Quantity) -> Self {
        Self::new(product_id, MovementType::Outbound, quantity)
    }

    pub fn with_waybill(mut self, waybill_no: impl Into<String>) -> Self {
        self.waybill_no = Some(waybill_no.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Input checks that need no stored state, in order: quantity, then type.
    pub fn validate(&self) -> Result<(MovementType, Quantity), LedgerError> {
        let quantity = self
            .quantity
            .as_ref()
            .and_then(Value::as_i64)
            .filter(|quantity| *quantity >= 1)
            .ok_or_else(|| {
                LedgerError::InvalidQuantity(
                    self.quantity
                        .as_ref()
                        .map_or_else(|| "nothing".to_string(), Value::to_string),
                )
            })?;
        let movement_type = self.movement_type.parse()?;
        Ok((movement_type, quantity))
    }
}

/// An applied movement. Entries are immutable once written; corrections are
/// made by appending a compensating transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockTransaction {
    pub id: TransactionId,
    /// Monotonically increasing ledger position
    pub sequence: i64,
    pub product_id: ProductId,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    /// Always positive; direction comes from `movement_type`
    pub quantity: Quantity,
    pub waybill_no: Option<String>,
    pub notes: Option<String>,
    #[serde(rename = "appliedStockBefore")]
    pub stock_before: Quantity,
    #[serde(rename = "appliedStockAfter")]
    pub stock_after: Quantity,
    pub created_at: DateTime<Utc>,
}

impl StockTransaction {
    /// Build the ledger entry for a validated movement. The sequence number
    /// is assigned by the repository when the entry is appended.
    pub fn new(
        product_id: ProductId,
        movement_type: MovementType,
        quantity: Quantity,
        stock_before: Quantity,
        created_at: DateTime<Utc>,
    ) -> Self {
        assert!(quantity > 0, "Movement quantity must be positive");
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            product_id,
            movement_type,
            quantity,
            waybill_no: None,
            notes: None,
            stock_before,
            stock_after: stock_before + movement_type.signed(quantity),
            created_at,
        }
    }

    pub fn with_waybill(mut self, waybill_no: Option<String>) -> Self {
        self.waybill_no = waybill_no;
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn signed_quantity(&self) -> Quantity {
        self.movement_type.signed(self.quantity)
    }

    /// Request that cancels the effect of this entry.
    pub fn compensation(&self) -> MovementRequest {
        let mut request = MovementRequest::new(
            self.product_id,
            self.movement_type.opposite(),
            self.quantity,
        )
        .with_notes(format!("Reversal of {}", self.id));
        request.waybill_no = self.waybill_no.clone();
        request
    }
}
