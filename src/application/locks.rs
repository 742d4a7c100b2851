use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::ProductId;

/// One async mutex per product, created on first use.
///
/// Holding a product's guard serializes the read-validate-write sequence of
/// stock movements for that product. Guards for different products never
/// contend.
#[derive(Default)]
pub struct ProductLocks {
    locks: Mutex<HashMap<ProductId, Arc<AsyncMutex<()>>>>,
}

impl ProductLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `product_id`.
    pub async fn acquire(&self, product_id: ProductId) -> OwnedMutexGuard<()> {
        let lock = {
            // The map only holds Arcs, a poisoned guard leaves it intact.
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(product_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of products that have been locked at least once.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
