use super::{MovementType, Quantity, StockTransaction};

/// Compute the stock level implied by a product's ledger.
/// Stock = sum of inbound quantities - sum of outbound quantities, from zero.
pub fn replay_stock(transactions: &[StockTransaction]) -> Quantity {
    transactions
        .iter()
        .fold(0, |stock, tx| stock + tx.signed_quantity())
}

/// Stock level after moving `quantity` units from `current`.
/// An outbound movement may never take stock below zero.
pub fn next_stock(
    current: Quantity,
    movement_type: MovementType,
    quantity: Quantity,
) -> Result<Quantity, LedgerError> {
    match movement_type {
        MovementType::Inbound => current
            .checked_add(quantity)
            .ok_or(LedgerError::StockOverflow { current, quantity }),
        MovementType::Outbound => {
            if current < quantity {
                return Err(LedgerError::InsufficientStock {
                    available: current,
                    requested: quantity,
                });
            }
            Ok(current - quantity)
        }
    }
}

/// Find the first place where a product's ordered ledger stops chaining:
/// each entry must start where the previous one ended and obey its own
/// arithmetic. Returns the offending entry's sequence number.
pub fn find_chain_break(transactions: &[StockTransaction]) -> Option<i64> {
    let mut expected_before = 0;
    for tx in transactions {
        if tx.stock_before != expected_before
            || tx.stock_after != tx.stock_before + tx.signed_quantity()
            || tx.stock_after < 0
        {
            return Some(tx.sequence);
        }
        expected_before = tx.stock_after;
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Carries the rejected input as it was received
    InvalidQuantity(String),
    InvalidMovementType(String),
    InsufficientStock {
        available: Quantity,
        requested: Quantity,
    },
    StockOverflow {
        current: Quantity,
        quantity: Quantity,
    },
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::InvalidQuantity(quantity) => {
                write!(f, "Quantity must be a whole number of at least 1, got {}", quantity)
            }
            LedgerError::InvalidMovementType(value) => {
                write!(f, "Movement type must be INBOUND or OUTBOUND, got '{}'", value)
            }
            LedgerError::InsufficientStock {
                available,
                requested,
            } => write!(
                f,
                "Cannot ship {} units, only {} in stock",
                requested, available
            ),
            LedgerError::StockOverflow { current, quantity } => write!(
                f,
                "Receiving {} units on top of {} exceeds the storable stock level",
                quantity, current
            ),
        }
    }
}

impl std::error::Error for LedgerError {}
