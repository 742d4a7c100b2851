use thiserror::Error;

use crate::domain::{LedgerError, Quantity};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid movement type: {0}")]
    InvalidMovementType(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Insufficient stock for {sku}: {available} available, {requested} requested")]
    InsufficientStock {
        sku: String,
        available: Quantity,
        requested: Quantity,
    },

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Product with SKU {0} already exists")]
    SkuAlreadyExists(String),

    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    #[error("Storage failure, nothing was changed; try again: {0}")]
    Storage(#[from] anyhow::Error),
}

impl AppError {
    /// Only storage failures are worth retrying; everything else will fail
    /// the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Storage(_))
    }

    /// Map a stock rule violation onto the product it concerns.
    pub(crate) fn from_ledger(err: LedgerError, sku: &str) -> Self {
        match err {
            LedgerError::InvalidQuantity(_) | LedgerError::StockOverflow { .. } => {
                AppError::InvalidQuantity(err.to_string())
            }
            LedgerError::InvalidMovementType(_) => AppError::InvalidMovementType(err.to_string()),
            LedgerError::InsufficientStock {
                available,
                requested,
            } => AppError::InsufficientStock {
                sku: sku.to_string(),
                available,
                requested,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_storage_is_retryable() {
        assert!(AppError::Storage(anyhow::anyhow!("disk I/O error")).is_retryable());
        assert!(!AppError::ProductNotFound("x".into()).is_retryable());
        assert!(
            !AppError::InsufficientStock {
                sku: "A".into(),
                available: 1,
                requested: 2
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_ledger_errors_keep_their_kind() {
        assert!(matches!(
            AppError::from_ledger(LedgerError::InvalidQuantity("0".into()), "A"),
            AppError::InvalidQuantity(_)
        ));
        assert!(matches!(
            AppError::from_ledger(LedgerError::InvalidMovementType("X".into()), "A"),
            AppError::InvalidMovementType(_)
        ));
        match AppError::from_ledger(
            LedgerError::InsufficientStock {
                available: 2,
                requested: 5,
            },
            "BOLT-8",
        ) {
            AppError::InsufficientStock {
                sku,
                available,
                requested,
            } => {
                assert_eq!(sku, "BOLT-8");
                assert_eq!((available, requested), (2, 5));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_messages_are_distinguishable() {
        let messages = [
            AppError::InvalidQuantity("0".into()).to_string(),
            AppError::InvalidMovementType("X".into()).to_string(),
            AppError::ProductNotFound("p".into()).to_string(),
            AppError::InsufficientStock {
                sku: "A".into(),
                available: 0,
                requested: 1,
            }
            .to_string(),
            AppError::Storage(anyhow::anyhow!("locked")).to_string(),
        ];
        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(messages[4].contains("try again"));
    }
}
