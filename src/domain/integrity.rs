use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{Product, ProductId, StockTransaction, find_chain_break, replay_stock};

/// Outcome of replaying the ledger against stored stock levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub product_count: i64,
    pub transaction_count: i64,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Raw counters gathered by the repository.
#[derive(Debug, Clone, Default)]
pub struct IntegrityStats {
    pub product_count: i64,
    pub transaction_count: i64,
    pub has_sequence_gaps: bool,
    pub orphaned_transactions: i64,
    pub invalid_quantities: i64,
}

/// Check every product's stored stock against its ledger.
/// `ledgers` holds each product's entries in ledger order.
pub fn build_integrity_report(
    products: &[Product],
    ledgers: &HashMap<ProductId, Vec<StockTransaction>>,
    stats: &IntegrityStats,
) -> IntegrityReport {
    let mut issues = Vec::new();

    for product in products {
        let ledger = ledgers
            .get(&product.id)
            .map(Vec::as_slice)
            .unwrap_or_default();

        if product.current_stock < 0 {
            issues.push(format!(
                "Product {} has negative stock {}",
                product.sku, product.current_stock
            ));
        }

        let replayed = replay_stock(ledger);
        if replayed != product.current_stock {
            issues.push(format!(
                "Product {} stock is {} but its ledger sums to {}",
                product.sku, product.current_stock, replayed
            ));
        }

        if let Some(sequence) = find_chain_break(ledger) {
            issues.push(format!(
                "Product {} audit trail breaks at ledger entry #{}",
                product.sku, sequence
            ));
        }
    }

    if stats.has_sequence_gaps {
        issues.push("Ledger sequence numbers have gaps".to_string());
    }
    if stats.orphaned_transactions > 0 {
        issues.push(format!(
            "{} ledger entries reference unknown products",
            stats.orphaned_transactions
        ));
    }
    if stats.invalid_quantities > 0 {
        issues.push(format!(
            "{} ledger entries have a non-positive quantity",
            stats.invalid_quantities
        ));
    }

    IntegrityReport {
        product_count: stats.product_count,
        transaction_count: stats.transaction_count,
        issues,
    }
}
