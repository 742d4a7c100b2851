// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use stockroom::application::LedgerService;
use stockroom::config::LedgerConfig;
use stockroom::domain::{MovementRequest, NewProduct, Product, Quantity};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let config = LedgerConfig::new(db_path.to_string_lossy()).with_max_connections(4);
    let service = LedgerService::init(&config).await?;
    Ok((service, temp_dir))
}

/// Input for a product with only the required fields set
pub fn new_product(sku: &str, name: &str) -> NewProduct {
    NewProduct {
        sku: sku.to_string(),
        name: name.to_string(),
        ..Default::default()
    }
}

/// Test fixture: Standard product setup
pub struct StandardProducts;

impl StandardProducts {
    /// Create a product and receive `stock` units into it
    pub async fn stocked(
        service: &LedgerService,
        sku: &str,
        stock: Quantity,
    ) -> Result<Product> {
        let product = service.create_product(new_product(sku, "Test product")).await?;
        if stock > 0 {
            service
                .apply_transaction(MovementRequest::inbound(product.id, stock))
                .await?;
        }
        Ok(service.get_product(product.id).await?)
    }

    /// Create basic product set: bolts (stock 10), nuts (stock 2), washers (empty)
    pub async fn create_basic(service: &LedgerService) -> Result<(Product, Product, Product)> {
        let bolts = Self::stocked(service, "BOLT-8", 10).await?;
        let nuts = Self::stocked(service, "NUT-8", 2).await?;
        let washers = Self::stocked(service, "WASHER-8", 0).await?;
        Ok((bolts, nuts, washers))
    }
}

/// Number of ledger entries for a product
pub async fn ledger_len(service: &LedgerService, product: &Product) -> Result<usize> {
    let history = service.list_transactions(product.id, None).await?;
    Ok(history.to_vec().await?.len())
}
