mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{StandardProducts, ledger_len, test_service};
use stockroom::application::AppError;
use stockroom::domain::{MovementRequest, replay_stock};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_outbound_never_oversells() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let product = StandardProducts::stocked(&service, "BOLT-8", 20).await?;
    let service = Arc::new(service);

    // 25 requests of 1 unit against 20 in stock
    let mut handles = Vec::new();
    for i in 0..25 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service
                .apply_transaction(
                    MovementRequest::outbound(product.id, 1).with_waybill(format!("WB-{i}")),
                )
                .await
        }));
    }

    let mut succeeded = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => succeeded += 1,
            Err(AppError::InsufficientStock { available, .. }) => {
                assert_eq!(available, 0);
                rejected += 1;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(succeeded, 20);
    assert_eq!(rejected, 5);
    assert_eq!(service.get_current_stock(product.id).await?, 0);
    assert_eq!(ledger_len(&service, &product).await?, 21);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mixed_movements_keep_audit_chain() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let product = StandardProducts::stocked(&service, "NUT-8", 50).await?;
    let service = Arc::new(service);

    let mut handles = Vec::new();
    for i in 0..40 {
        let service = Arc::clone(&service);
        let request = if i % 2 == 0 {
            MovementRequest::inbound(product.id, 3)
        } else {
            MovementRequest::outbound(product.id, 2)
        };
        handles.push(tokio::spawn(async move { service.apply_transaction(request).await }));
    }
    for handle in handles {
        handle.await??;
    }

    // 50 + 20 * 3 - 20 * 2
    assert_eq!(service.get_current_stock(product.id).await?, 70);

    let history = service.list_transactions(product.id, None).await?.to_vec().await?;
    assert_eq!(history.len(), 41);
    assert_eq!(replay_stock(&history), 70);

    // Each entry starts where the previous one ended
    for pair in history.windows(2) {
        assert_eq!(pair[1].stock_before, pair[0].stock_after);
    }
    assert!(service.check_integrity().await?.is_healthy());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_different_products_move_independently() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (bolts, nuts, _) = StandardProducts::create_basic(&service).await?;
    let service = Arc::new(service);

    let mut handles = Vec::new();
    for _ in 0..10 {
        for request in [
            MovementRequest::outbound(bolts.id, 1),
            MovementRequest::inbound(nuts.id, 1),
        ] {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move { service.apply_transaction(request).await }));
        }
    }
    for handle in handles {
        handle.await??;
    }

    assert_eq!(service.get_current_stock(bolts.id).await?, 0);
    assert_eq!(service.get_current_stock(nuts.id).await?, 12);

    Ok(())
}
