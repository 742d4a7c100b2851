use std::collections::HashMap;

use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::LedgerConfig;
use crate::domain::{
    DateRange, IntegrityReport, LedgerError, MovementRequest, NewProduct, Product, ProductId,
    ProductPatch, Quantity, ReportPeriod, StockTransaction, TransactionId,
    build_integrity_report, next_stock, normalize_sku, now,
};
use crate::storage::Repository;

use super::{AppError, MovementReport, ProductLocks, build_movement_report};

/// Application service providing the stock ledger operations.
/// This is the primary interface for any client (CLI, HTTP handler, etc.).
pub struct LedgerService {
    repo: Repository,
    locks: ProductLocks,
}

/// Result of applying a movement
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedTransaction {
    pub transaction: StockTransaction,
    /// The product as it stands after the movement
    pub product: Product,
}

/// Detailed product information
pub struct ProductInfo {
    pub product: Product,
    pub transaction_count: i64,
    pub last_movement: Option<StockTransaction>,
}

/// A product's ledger, optionally narrowed to a time range.
///
/// Nothing is read until [`TransactionHistory::stream`] is polled, and each
/// call to `stream` starts over from the first matching entry.
pub struct TransactionHistory<'a> {
    repo: &'a Repository,
    product_id: ProductId,
    range: Option<DateRange>,
}

impl<'a> TransactionHistory<'a> {
    /// Entries ordered by creation time (ties broken by ledger sequence).
    pub fn stream(&self) -> BoxStream<'a, Result<StockTransaction, AppError>> {
        self.repo
            .stream_transactions(Some(self.product_id), self.range)
            .map_err(AppError::from)
            .boxed()
    }

    /// Drain a fresh stream into memory.
    pub async fn to_vec(&self) -> Result<Vec<StockTransaction>, AppError> {
        self.stream().try_collect().await
    }
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            locks: ProductLocks::new(),
        }
    }

    /// Create (if needed) and migrate the database, then open the service.
    pub async fn init(config: &LedgerConfig) -> Result<Self, AppError> {
        let repo = Repository::init(config).await?;
        info!(database = %config.database_path, "ledger database initialized");
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(config: &LedgerConfig) -> Result<Self, AppError> {
        let repo = Repository::connect(config, false).await?;
        debug!(database = %config.database_path, "connected to ledger database");
        Ok(Self::new(repo))
    }

    /// Release the database handle. In-flight operations finish first.
    pub async fn close(self) {
        self.repo.close().await;
        debug!("ledger database closed");
    }

    /// Storage handle used by this service.
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    // ========================
    // Product operations
    // ========================

    /// Register a new product with zero stock.
    pub async fn create_product(&self, input: NewProduct) -> Result<Product, AppError> {
        let sku = normalize_sku(&input.sku);
        if sku.is_empty() {
            return Err(AppError::InvalidProduct("SKU must not be empty".to_string()));
        }
        if input.name.trim().is_empty() {
            return Err(AppError::InvalidProduct("Name must not be empty".to_string()));
        }
        if input.min_stock.is_some_and(|min| min < 0) {
            return Err(AppError::InvalidProduct(
                "Minimum stock must not be negative".to_string(),
            ));
        }

        let mut product = Product::new(&sku, input.name.trim());
        if let Some(description) = input.description {
            product = product.with_description(description);
        }
        if let Some(min_stock) = input.min_stock {
            product = product.with_min_stock(min_stock);
        }
        if let Some(warehouse_id) = input.warehouse_id {
            product = product.with_warehouse(warehouse_id);
        }
        if let Some(department_id) = input.department_id {
            product = product.with_department(department_id);
        }

        // The UNIQUE constraint decides between concurrent creates
        if !self.repo.save_product(&product).await? {
            return Err(AppError::SkuAlreadyExists(product.sku));
        }
        info!(product_id = %product.id, sku = %product.sku, "product created");
        Ok(product)
    }

    /// Get a product by ID.
    pub async fn get_product(&self, id: ProductId) -> Result<Product, AppError> {
        self.repo
            .find_product(id)
            .await?
            .ok_or_else(|| AppError::ProductNotFound(id.to_string()))
    }

    /// Get a product by SKU (case-insensitive).
    pub async fn get_product_by_sku(&self, sku: &str) -> Result<Product, AppError> {
        let sku = normalize_sku(sku);
        self.repo
            .find_product_by_sku(&sku)
            .await?
            .ok_or(AppError::ProductNotFound(sku))
    }

    /// Get detailed product information.
    pub async fn get_product_info(&self, id: ProductId) -> Result<ProductInfo, AppError> {
        let product = self.get_product(id).await?;
        let transaction_count = self.repo.count_transactions_for_product(id).await?;
        let last_movement = self.repo.last_transaction_for_product(id).await?;

        Ok(ProductInfo {
            product,
            transaction_count,
            last_movement,
        })
    }

    /// List all products.
    pub async fn list_products(&self) -> Result<Vec<Product>, AppError> {
        Ok(self.repo.list_products().await?)
    }

    /// Apply a partial update to a product's descriptive fields.
    pub async fn update_product(
        &self,
        id: ProductId,
        mut patch: ProductPatch,
    ) -> Result<Product, AppError> {
        patch.name = patch.name.map(|name| name.trim().to_string());
        if patch.name.as_deref().is_some_and(str::is_empty) {
            return Err(AppError::InvalidProduct("Name must not be empty".to_string()));
        }
        if patch.min_stock.is_some_and(|min| min < 0) {
            return Err(AppError::InvalidProduct(
                "Minimum stock must not be negative".to_string(),
            ));
        }

        let _guard = self.locks.acquire(id).await;
        let mut product = self.get_product(id).await?;
        if patch.is_empty() {
            return Ok(product);
        }

        product.apply_patch(patch);
        self.repo.update_product_details(&product).await?;
        debug!(product_id = %product.id, "product details updated");
        Ok(product)
    }

    // ========================
    // Ledger operations
    // ========================

    /// Validate and apply one stock movement.
    ///
    /// Checks run in order and stop at the first failure: quantity, movement
    /// type, product existence, then available stock for outbound
    /// movements. Nothing is written unless every check passes, and the
    /// stock update and ledger entry are committed together.
    pub async fn apply_transaction(
        &self,
        request: MovementRequest,
    ) -> Result<AppliedTransaction, AppError> {
        let (movement_type, quantity) = request
            .validate()
            .map_err(|e| AppError::from_ledger(e, &request.product_id.to_string()))?;

        let _guard = self.locks.acquire(request.product_id).await;
        debug!(product_id = %request.product_id, "product lock acquired");

        let mut product = self.get_product(request.product_id).await?;
        let stock_before = product.current_stock;

        let stock_after = next_stock(stock_before, movement_type, quantity).map_err(|e| {
            if let LedgerError::InsufficientStock { .. } = e {
                warn!(
                    sku = %product.sku,
                    available = stock_before,
                    requested = quantity,
                    "outbound movement rejected"
                );
            }
            AppError::from_ledger(e, &product.sku)
        })?;

        let mut transaction =
            StockTransaction::new(product.id, movement_type, quantity, stock_before, now())
                .with_waybill(request.waybill_no)
                .with_notes(request.notes);

        if let Err(e) = self.repo.apply_movement(&mut transaction).await {
            error!(sku = %product.sku, error = %e, "stock movement rolled back");
            return Err(AppError::Storage(e));
        }

        info!(
            sku = %product.sku,
            transaction_id = %transaction.id,
            movement = %movement_type,
            quantity,
            stock_before,
            stock_after,
            "stock movement applied"
        );

        product.current_stock = stock_after;
        product.updated_at = transaction.created_at;

        Ok(AppliedTransaction {
            transaction,
            product,
        })
    }

    /// Cancel an earlier movement by appending its opposite. The original
    /// entry is left untouched; the compensation is subject to the same
    /// checks as any other movement.
    pub async fn reverse_transaction(
        &self,
        id: TransactionId,
    ) -> Result<AppliedTransaction, AppError> {
        let original = self.get_transaction(id).await?;
        self.apply_transaction(original.compensation()).await
    }

    /// Get a ledger entry by ID.
    pub async fn get_transaction(&self, id: TransactionId) -> Result<StockTransaction, AppError> {
        self.repo
            .get_transaction(id)
            .await?
            .ok_or_else(|| AppError::TransactionNotFound(id.to_string()))
    }

    /// Current stock level of a product.
    pub async fn get_current_stock(&self, product_id: ProductId) -> Result<Quantity, AppError> {
        Ok(self.get_product(product_id).await?.current_stock)
    }

    /// A product's ledger, optionally limited to `[range.start, range.end)`.
    pub async fn list_transactions(
        &self,
        product_id: ProductId,
        range: Option<DateRange>,
    ) -> Result<TransactionHistory<'_>, AppError> {
        self.get_product(product_id).await?;
        Ok(TransactionHistory {
            repo: &self.repo,
            product_id,
            range,
        })
    }

    /// The whole ledger in sequence order.
    pub async fn list_all_transactions(&self) -> Result<Vec<StockTransaction>, AppError> {
        Ok(self.repo.list_transactions().await?)
    }

    // ========================
    // Reporting
    // ========================

    /// Inbound/outbound volume per period, for one product or all of them.
    pub async fn movement_report(
        &self,
        product_id: Option<ProductId>,
        range: DateRange,
        period: ReportPeriod,
    ) -> Result<MovementReport, AppError> {
        if let Some(id) = product_id {
            self.get_product(id).await?;
        }
        let transactions = self
            .repo
            .list_transactions_filtered(product_id, Some(range))
            .await?;
        Ok(build_movement_report(product_id, range, period, &transactions))
    }

    /// Replay every product's ledger and compare against stored stock.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let stats = self.repo.get_integrity_stats().await?;
        let products = self.repo.list_products().await?;

        let mut ledgers: HashMap<ProductId, Vec<StockTransaction>> = HashMap::new();
        for tx in self.repo.list_transactions().await? {
            ledgers.entry(tx.product_id).or_default().push(tx);
        }

        let report = build_integrity_report(&products, &ledgers, &stats);
        if !report.is_healthy() {
            warn!(issues = report.issues.len(), "ledger integrity check found issues");
        }
        Ok(report)
    }

    /// Map of product IDs to SKUs (useful for display).
    pub async fn get_product_skus(&self) -> Result<HashMap<ProductId, String>, AppError> {
        let products = self.repo.list_products().await?;
        Ok(products.into_iter().map(|p| (p.id, p.sku)).collect())
    }
}
