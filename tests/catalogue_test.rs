mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{StandardProducts, new_product, test_service};
use stockroom::application::{AppError, LedgerService};
use stockroom::config::LedgerConfig;
use stockroom::domain::{DEFAULT_MIN_STOCK, MovementRequest, NewProduct, ProductPatch};
use uuid::Uuid;

#[tokio::test]
async fn test_create_product() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let product = service
        .create_product(NewProduct {
            sku: " drill-18v ".to_string(),
            name: "Cordless drill".to_string(),
            description: Some("18V, two batteries".to_string()),
            min_stock: Some(3),
            warehouse_id: Some("WH-NORTH".to_string()),
            department_id: None,
        })
        .await?;

    assert_eq!(product.sku, "DRILL-18V");
    assert_eq!(product.current_stock, 0);
    assert_eq!(product.min_stock, 3);

    let stored = service.get_product(product.id).await?;
    assert_eq!(stored, product);

    let by_sku = service.get_product_by_sku("Drill-18v").await?;
    assert_eq!(by_sku.id, product.id);

    Ok(())
}

#[tokio::test]
async fn test_create_product_defaults() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let product = service.create_product(new_product("SAW-1", "Hand saw")).await?;
    assert_eq!(product.min_stock, DEFAULT_MIN_STOCK);
    assert!(product.description.is_none());
    assert!(product.warehouse_id.is_none());

    Ok(())
}

#[tokio::test]
async fn test_duplicate_sku_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service.create_product(new_product("SAW-1", "Hand saw")).await?;

    let result = service.create_product(new_product("saw-1", "Another saw")).await;
    assert!(matches!(result, Err(AppError::SkuAlreadyExists(sku)) if sku == "SAW-1"));
    assert_eq!(service.list_products().await?.len(), 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_of_one_sku() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);

    for round in 0..10 {
        let sku = format!("RACE-{round}");
        let mut handles = Vec::new();
        for _ in 0..4 {
            let service = Arc::clone(&service);
            let input = new_product(&sku, "Contended");
            handles.push(tokio::spawn(async move { service.create_product(input).await }));
        }

        let mut created = 0;
        for handle in handles {
            match handle.await? {
                Ok(_) => created += 1,
                Err(AppError::SkuAlreadyExists(taken)) => assert_eq!(taken, sku),
                Err(e) => panic!("unexpected error: {e} (retryable: {})", e.is_retryable()),
            }
        }
        assert_eq!(created, 1);
    }

    assert_eq!(service.list_products().await?.len(), 10);

    Ok(())
}

#[tokio::test]
async fn test_invalid_product_input() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let result = service.create_product(new_product("  ", "Nameless")).await;
    assert!(matches!(result, Err(AppError::InvalidProduct(_))));

    let result = service.create_product(new_product("X-1", " ")).await;
    assert!(matches!(result, Err(AppError::InvalidProduct(_))));

    let result = service
        .create_product(NewProduct {
            min_stock: Some(-1),
            ..new_product("X-1", "Thing")
        })
        .await;
    assert!(matches!(result, Err(AppError::InvalidProduct(_))));

    assert!(service.list_products().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_list_products_is_sorted_by_sku() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardProducts::create_basic(&service).await?;
    service.create_product(new_product("ANCHOR-6", "Anchor")).await?;

    let skus: Vec<_> = service
        .list_products()
        .await?
        .into_iter()
        .map(|p| p.sku)
        .collect();
    assert_eq!(skus, vec!["ANCHOR-6", "BOLT-8", "NUT-8", "WASHER-8"]);

    Ok(())
}

#[tokio::test]
async fn test_update_product_patch_semantics() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let product = service
        .create_product(NewProduct {
            description: Some("Old text".to_string()),
            warehouse_id: Some("WH-1".to_string()),
            ..new_product("HAMMER-1", "Hammer")
        })
        .await?;

    let updated = service
        .update_product(
            product.id,
            ProductPatch {
                name: Some("  Claw hammer ".to_string()),
                description: Some(None),
                min_stock: Some(4),
                ..Default::default()
            },
        )
        .await?;

    // Names are stored trimmed, as on create
    assert_eq!(updated.name, "Claw hammer");
    assert!(updated.description.is_none());
    assert_eq!(updated.min_stock, 4);
    // Absent fields are left alone
    assert_eq!(updated.warehouse_id.as_deref(), Some("WH-1"));
    assert_eq!(updated.sku, "HAMMER-1");

    let stored = service.get_product(product.id).await?;
    assert_eq!(stored, updated);

    Ok(())
}

#[tokio::test]
async fn test_update_product_never_touches_stock() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let product = StandardProducts::stocked(&service, "HAMMER-1", 6).await?;

    service
        .update_product(
            product.id,
            ProductPatch {
                department_id: Some(Some("TOOLS".to_string())),
                ..Default::default()
            },
        )
        .await?;

    let stored = service.get_product(product.id).await?;
    assert_eq!(stored.current_stock, 6);
    assert_eq!(stored.department_id.as_deref(), Some("TOOLS"));

    let result = service
        .update_product(
            product.id,
            ProductPatch {
                name: Some("   ".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::InvalidProduct(_))));

    let result = service
        .update_product(Uuid::new_v4(), ProductPatch::default())
        .await;
    assert!(matches!(result, Err(AppError::ProductNotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_product_info() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let product = StandardProducts::stocked(&service, "LEVEL-60", 4).await?;
    let shipped = service
        .apply_transaction(MovementRequest::outbound(product.id, 1))
        .await?;

    let info = service.get_product_info(product.id).await?;
    assert_eq!(info.product.current_stock, 3);
    assert_eq!(info.transaction_count, 2);
    assert_eq!(info.last_movement, Some(shipped.transaction));

    Ok(())
}

#[tokio::test]
async fn test_data_survives_reconnect() -> Result<()> {
    let (service, temp) = test_service().await?;
    let product = StandardProducts::stocked(&service, "CLAMP-2", 9).await?;
    service.close().await;

    let config = LedgerConfig::new(temp.path().join("test.db").to_string_lossy());
    let service = LedgerService::connect(&config).await?;
    assert_eq!(service.get_current_stock(product.id).await?, 9);
    assert!(service.check_integrity().await?.is_healthy());

    Ok(())
}

#[tokio::test]
async fn test_connect_requires_existing_database() -> Result<()> {
    let temp = tempfile::TempDir::new()?;
    let config = LedgerConfig::new(temp.path().join("missing.db").to_string_lossy());

    let result = LedgerService::connect(&config).await;
    assert!(matches!(result, Err(AppError::Storage(_))));

    Ok(())
}
