use anyhow::{Context, Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::domain::{
    DateRange, IntegrityStats, MovementType, Product, ProductId, Quantity, StockTransaction,
    TransactionId,
};

use super::MIGRATION_001_INITIAL;

const PRODUCT_COLUMNS: &str = "id, sku, name, description, current_stock, min_stock, warehouse_id, department_id, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, sequence, product_id, movement_type, quantity, waybill_no, notes, stock_before, stock_after, created_at";

/// Repository for the product catalogue and the stock ledger.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the database described by `config`.
    /// With `create` set, a missing database file is created.
    pub async fn connect(config: &LedgerConfig, create: bool) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout())
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", config.database_path))?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(config: &LedgerConfig) -> Result<Self> {
        let repo = Self::connect(config, true).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Underlying pool, for callers that need raw SQL access.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for in-flight queries and close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ========================
    // Product operations
    // ========================

    /// Save a new product. Returns `false`, writing nothing, when the SKU
    /// is already taken.
    pub async fn save_product(&self, product: &Product) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO products (id, sku, name, description, current_stock, min_stock, warehouse_id, department_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(product.id.to_string())
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.current_stock)
        .bind(product.min_stock)
        .bind(&product.warehouse_id)
        .bind(&product.department_id)
        .bind(encode_ts(product.created_at))
        .bind(encode_ts(product.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e)
                if e
                    .as_database_error()
                    .is_some_and(|db| db.is_unique_violation()) =>
            {
                Ok(false)
            }
            Err(e) => Err(e).context("Failed to save product"),
        }
    }

    /// Find a product by ID.
    pub async fn find_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch product")?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    /// Find a product by its (normalized) SKU.
    pub async fn find_product_by_sku(&self, sku: &str) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?"
        ))
        .bind(sku)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch product by SKU")?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    /// List all products, ordered by SKU.
    pub async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY sku"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list products")?;

        rows.iter().map(Self::row_to_product).collect()
    }

    /// Persist descriptive fields of a product. Stock and SKU are never
    /// written here.
    pub async fn update_product_details(&self, product: &Product) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = ?, description = ?, min_stock = ?, warehouse_id = ?, department_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.min_stock)
        .bind(&product.warehouse_id)
        .bind(&product.department_id)
        .bind(encode_ts(product.updated_at))
        .bind(product.id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to update product")?;

        if result.rows_affected() != 1 {
            bail!("Product {} vanished during update", product.id);
        }
        Ok(())
    }

    // ========================
    // Ledger operations
    // ========================

    /// Write a validated movement: the product's new stock level and the
    /// ledger entry commit together or not at all.
    ///
    /// The stock write only succeeds if the stored level still equals
    /// `transaction.stock_before`. The sequence number is assigned here.
    pub async fn apply_movement(&self, transaction: &mut StockTransaction) -> Result<()> {
        let mut db_tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin stock transaction")?;

        // The stock write comes first so the database write lock is taken
        // before anything is read inside this transaction.
        Self::update_stock(
            &mut db_tx,
            transaction.product_id,
            transaction.stock_before,
            transaction.stock_after,
            transaction.created_at,
        )
        .await?;

        transaction.sequence = Self::next_sequence(&mut db_tx).await?;
        Self::append_transaction(&mut db_tx, transaction).await?;

        db_tx
            .commit()
            .await
            .context("Failed to commit stock transaction")?;
        Ok(())
    }

    async fn update_stock(
        conn: &mut SqliteConnection,
        product_id: ProductId,
        expected: Quantity,
        new_stock: Quantity,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET current_stock = ?, updated_at = ?
            WHERE id = ? AND current_stock = ?
            "#,
        )
        .bind(new_stock)
        .bind(encode_ts(updated_at))
        .bind(product_id.to_string())
        .bind(expected)
        .execute(&mut *conn)
        .await
        .context("Failed to update stock level")?;

        if result.rows_affected() != 1 {
            bail!(
                "Stock level of product {} changed concurrently (expected {})",
                product_id,
                expected
            );
        }
        Ok(())
    }

    async fn append_transaction(
        conn: &mut SqliteConnection,
        transaction: &StockTransaction,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_transactions (id, sequence, product_id, movement_type, quantity, waybill_no, notes, stock_before, stock_after, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.id.to_string())
        .bind(transaction.sequence)
        .bind(transaction.product_id.to_string())
        .bind(transaction.movement_type.as_str())
        .bind(transaction.quantity)
        .bind(&transaction.waybill_no)
        .bind(&transaction.notes)
        .bind(transaction.stock_before)
        .bind(transaction.stock_after)
        .bind(encode_ts(transaction.created_at))
        .execute(&mut *conn)
        .await
        .context("Failed to append ledger entry")?;
        Ok(())
    }

    /// Get the next sequence number and increment the counter.
    async fn next_sequence(conn: &mut SqliteConnection) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'transaction_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&mut *conn)
        .await
        .context("Failed to get next sequence number")?;

        Ok(row.get("value"))
    }

    /// Get a ledger entry by ID.
    pub async fn get_transaction(&self, id: TransactionId) -> Result<Option<StockTransaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM stock_transactions WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch ledger entry")?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    /// The whole ledger in sequence order.
    pub async fn list_transactions(&self) -> Result<Vec<StockTransaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM stock_transactions ORDER BY sequence"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list ledger entries")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// Most recent ledger entry for a product.
    pub async fn last_transaction_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Option<StockTransaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM stock_transactions WHERE product_id = ? ORDER BY sequence DESC LIMIT 1"
        ))
        .bind(product_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch last ledger entry")?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    /// Ledger entries ordered by creation time, optionally narrowed to one
    /// product and to a half-open time range.
    pub async fn list_transactions_filtered(
        &self,
        product_id: Option<ProductId>,
        range: Option<DateRange>,
    ) -> Result<Vec<StockTransaction>> {
        let rows = Self::filtered_query(product_id, range)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list filtered ledger entries")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// Same rows as [`Repository::list_transactions_filtered`], fetched
    /// lazily. Every call runs a fresh query.
    pub fn stream_transactions(
        &self,
        product_id: Option<ProductId>,
        range: Option<DateRange>,
    ) -> BoxStream<'_, Result<StockTransaction>> {
        Self::filtered_query(product_id, range)
            .fetch(&self.pool)
            .map(|row| {
                let row = row.context("Failed to stream ledger entries")?;
                Self::row_to_transaction(&row)
            })
            .boxed()
    }

    fn filtered_query(
        product_id: Option<ProductId>,
        range: Option<DateRange>,
    ) -> sqlx::query::Query<'static, sqlx::Sqlite, <sqlx::Sqlite as sqlx::Database>::Arguments<'static>>
    {
        const FILTERED: &str = r#"
            SELECT id, sequence, product_id, movement_type, quantity, waybill_no, notes, stock_before, stock_after, created_at
            FROM stock_transactions
            WHERE (? IS NULL OR product_id = ?)
              AND (? IS NULL OR created_at >= ?)
              AND (? IS NULL OR created_at < ?)
            ORDER BY created_at, sequence
        "#;

        let product_id_str = product_id.map(|id| id.to_string());
        let start_str = range.map(|r| encode_ts(r.start));
        let end_str = range.map(|r| encode_ts(r.end));

        sqlx::query(FILTERED)
            .bind(product_id_str.clone())
            .bind(product_id_str)
            .bind(start_str.clone())
            .bind(start_str)
            .bind(end_str.clone())
            .bind(end_str)
    }

    /// Count ledger entries for a product.
    pub async fn count_transactions_for_product(&self, product_id: ProductId) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) as count FROM stock_transactions WHERE product_id = ?",
        )
        .bind(product_id.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to count ledger entries")?;

        Ok(row.get("count"))
    }

    /// Get statistics for integrity checking.
    pub async fn get_integrity_stats(&self) -> Result<IntegrityStats> {
        let product_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM products")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let sequence_check = sqlx::query(
            r#"
            SELECT
                MIN(sequence) as min_seq,
                MAX(sequence) as max_seq,
                COUNT(*) as count
            FROM stock_transactions
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let min_seq: Option<i64> = sequence_check.get("min_seq");
        let max_seq: Option<i64> = sequence_check.get("max_seq");
        let transaction_count: i64 = sequence_check.get("count");

        let has_sequence_gaps = match (min_seq, max_seq) {
            (Some(min), Some(max)) => (max - min + 1) != transaction_count,
            _ => false,
        };

        let orphaned_transactions: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM stock_transactions t
            WHERE NOT EXISTS (SELECT 1 FROM products p WHERE p.id = t.product_id)
            "#,
        )
        .fetch_one(&self.pool)
        .await?
        .get("count");

        let invalid_quantities: i64 = sqlx::query(
            "SELECT COUNT(*) as count FROM stock_transactions WHERE quantity <= 0",
        )
        .fetch_one(&self.pool)
        .await?
        .get("count");

        Ok(IntegrityStats {
            product_count,
            transaction_count,
            has_sequence_gaps,
            orphaned_transactions,
            invalid_quantities,
        })
    }

    fn row_to_product(row: &sqlx::sqlite::SqliteRow) -> Result<Product> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(Product {
            id: Uuid::parse_str(&id_str).context("Invalid product ID")?,
            sku: row.get("sku"),
            name: row.get("name"),
            description: row.get("description"),
            current_stock: row.get("current_stock"),
            min_stock: row.get("min_stock"),
            warehouse_id: row.get("warehouse_id"),
            department_id: row.get("department_id"),
            created_at: decode_ts(&created_at_str).context("Invalid created_at timestamp")?,
            updated_at: decode_ts(&updated_at_str).context("Invalid updated_at timestamp")?,
        })
    }

    fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Result<StockTransaction> {
        let id_str: String = row.get("id");
        let product_id_str: String = row.get("product_id");
        let movement_type_str: String = row.get("movement_type");
        let created_at_str: String = row.get("created_at");

        Ok(StockTransaction {
            id: Uuid::parse_str(&id_str).context("Invalid ledger entry ID")?,
            sequence: row.get("sequence"),
            product_id: Uuid::parse_str(&product_id_str).context("Invalid product ID")?,
            movement_type: movement_type_str
                .parse::<MovementType>()
                .map_err(|e| anyhow::anyhow!("Invalid stored movement type: {}", e))?,
            quantity: row.get("quantity"),
            waybill_no: row.get("waybill_no"),
            notes: row.get("notes"),
            stock_before: row.get("stock_before"),
            stock_after: row.get("stock_after"),
            created_at: decode_ts(&created_at_str).context("Invalid created_at timestamp")?,
        })
    }
}

/// Fixed-width UTC timestamps, so that text order in SQL is time order.
fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}
