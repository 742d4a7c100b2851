use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub type ProductId = Uuid;

/// Stock quantities are whole units.
pub type Quantity = i64;

pub const DEFAULT_MIN_STOCK: Quantity = 10;

/// A catalogued product. `current_stock` is only ever changed by applying a
/// stock transaction; the catalogue operations never write it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    /// Unique stock-keeping unit code, normalized to upper case
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub current_stock: Quantity,
    /// Low-stock threshold, informational only
    pub min_stock: Quantity,
    pub warehouse_id: Option<String>,
    pub department_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Create a new product with zero stock.
    pub fn new(sku: impl AsRef<str>, name: impl Into<String>) -> Self {
        let now = super::now();
        Self {
            id: Uuid::new_v4(),
            sku: normalize_sku(sku.as_ref()),
            name: name.into(),
            description: None,
            current_stock: 0,
            min_stock: DEFAULT_MIN_STOCK,
            warehouse_id: None,
            department_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_min_stock(mut self, min_stock: Quantity) -> Self {
        self.min_stock = min_stock;
        self
    }

    pub fn with_warehouse(mut self, warehouse_id: impl Into<String>) -> Self {
        self.warehouse_id = Some(warehouse_id.into());
        self
    }

    pub fn with_department(mut self, department_id: impl Into<String>) -> Self {
        self.department_id = Some(department_id.into());
        self
    }

    /// Apply a partial update. Identity, SKU and stock are left alone.
    pub fn apply_patch(&mut self, patch: ProductPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(min_stock) = patch.min_stock {
            self.min_stock = min_stock;
        }
        if let Some(warehouse_id) = patch.warehouse_id {
            self.warehouse_id = warehouse_id;
        }
        if let Some(department_id) = patch.department_id {
            self.department_id = department_id;
        }
        self.updated_at = super::now();
    }
}

/// SKUs compare case-insensitively; surrounding whitespace is dropped.
pub fn normalize_sku(sku: &str) -> String {
    sku.trim().to_uppercase()
}

/// Input for creating a product through the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub min_stock: Option<Quantity>,
    pub warehouse_id: Option<String>,
    pub department_id: Option<String>,
}

/// Partial update for a product. `None` leaves a field unchanged; for the
/// optional fields `Some(None)` clears the stored value.
///
/// In JSON an absent field leaves the value alone and an explicit `null`
/// clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_stock: Option<Quantity>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub warehouse_id: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub department_id: Option<Option<String>>,
}

/// Only called for fields present in the input, so `null` becomes `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
