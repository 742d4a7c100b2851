use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::LedgerService;
use crate::domain::{Product, StockTransaction};

/// Database snapshot for full export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub products: Vec<Product>,
    pub transactions: Vec<StockTransaction>,
}

/// Exporter for converting catalogue and ledger data to CSV or JSON
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export the product catalogue with current stock to CSV
    pub async fn export_products_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let products = self.service.list_products().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "sku",
            "name",
            "current_stock",
            "min_stock",
            "warehouse_id",
            "department_id",
            "description",
        ])?;

        for product in &products {
            csv_writer.write_record([
                product.id.to_string(),
                product.sku.clone(),
                product.name.clone(),
                product.current_stock.to_string(),
                product.min_stock.to_string(),
                product.warehouse_id.clone().unwrap_or_default(),
                product.department_id.clone().unwrap_or_default(),
                product.description.clone().unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(products.len())
    }

    /// Export the ledger to CSV in sequence order
    pub async fn export_transactions_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let transactions = self.service.list_all_transactions().await?;
        let skus = self.service.get_product_skus().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "sequence",
            "created_at",
            "sku",
            "type",
            "quantity",
            "stock_before",
            "stock_after",
            "waybill_no",
            "notes",
        ])?;

        for tx in &transactions {
            csv_writer.write_record([
                tx.id.to_string(),
                tx.sequence.to_string(),
                tx.created_at.to_rfc3339(),
                skus.get(&tx.product_id)
                    .cloned()
                    .unwrap_or_else(|| tx.product_id.to_string()),
                tx.movement_type.as_str().to_string(),
                tx.quantity.to_string(),
                tx.stock_before.to_string(),
                tx.stock_after.to_string(),
                tx.waybill_no.clone().unwrap_or_default(),
                tx.notes.clone().unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(transactions.len())
    }

    /// Export everything as a JSON snapshot
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<DatabaseSnapshot> {
        let snapshot = DatabaseSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            products: self.service.list_products().await?,
            transactions: self.service.list_all_transactions().await?,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
