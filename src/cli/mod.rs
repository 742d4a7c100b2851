use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use futures_util::TryStreamExt;
use uuid::Uuid;

use crate::application::LedgerService;
use crate::config::LedgerConfig;
use crate::domain::{DateRange, MovementRequest, MovementType, NewProduct, ProductPatch, ReportPeriod};

/// Stockroom - Warehouse Stock Ledger
#[derive(Parser)]
#[command(name = "stockroom")]
#[command(about = "A local-first warehouse stock ledger built on an append-only movement log")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub config: LedgerConfig,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Product catalogue commands
    #[command(subcommand)]
    Product(ProductCommands),

    /// Receive goods into stock
    Inbound(MovementArgs),

    /// Ship goods out of stock
    Outbound(MovementArgs),

    /// Cancel a movement by recording its opposite
    Reverse {
        /// Transaction ID to reverse
        id: String,
    },

    /// Show stock for a product or all products
    Stock {
        /// Product SKU (omit for all products)
        sku: Option<String>,
    },

    /// Show a product's movement history
    History {
        /// Product SKU
        sku: String,

        /// Named range: today, week, month, year or last-N
        #[arg(long, conflicts_with_all = ["from", "to"])]
        preset: Option<String>,

        /// First day to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Last day to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Maximum number of movements to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Inbound/outbound volume per period
    Report {
        /// Restrict to one product
        #[arg(long)]
        sku: Option<String>,

        /// Named range: today, week, month, year or last-N
        #[arg(long, conflicts_with_all = ["from", "to"])]
        preset: Option<String>,

        /// First day to include (YYYY-MM-DD, defaults to start of current month)
        #[arg(long)]
        from: Option<String>,

        /// Last day to include (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        to: Option<String>,

        /// Period: daily, weekly, monthly, yearly
        #[arg(long, default_value = "daily")]
        period: String,

        /// Output format: table, json, csv
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Verify that stock levels match the ledger
    Check,

    /// Export data to CSV or JSON
    Export {
        /// What to export: products, transactions, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Args)]
pub struct MovementArgs {
    /// Product SKU
    pub sku: String,

    /// Number of units
    #[arg(allow_negative_numbers = true)]
    pub quantity: i64,

    /// Waybill / delivery note number
    #[arg(short, long)]
    pub waybill: Option<String>,

    /// Free-text notes
    #[arg(short, long)]
    pub notes: Option<String>,
}

#[derive(Subcommand)]
pub enum ProductCommands {
    /// Register a new product
    Create {
        /// Stock-keeping unit code (must be unique)
        sku: String,

        /// Product name
        name: String,

        /// Description
        #[arg(long)]
        description: Option<String>,

        /// Low-stock threshold (defaults to 10)
        #[arg(long)]
        min_stock: Option<i64>,

        /// Warehouse reference
        #[arg(long)]
        warehouse: Option<String>,

        /// Department reference
        #[arg(long)]
        department: Option<String>,
    },

    /// List all products
    List,

    /// Show detailed product information
    Show {
        /// Product SKU
        sku: String,
    },

    /// Update descriptive fields; omitted options are left unchanged
    Update {
        /// Product SKU
        sku: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,

        #[arg(long)]
        clear_description: bool,

        #[arg(long)]
        min_stock: Option<i64>,

        #[arg(long, conflicts_with = "clear_warehouse")]
        warehouse: Option<String>,

        #[arg(long)]
        clear_warehouse: bool,

        #[arg(long, conflicts_with = "clear_department")]
        department: Option<String>,

        #[arg(long)]
        clear_department: bool,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let service = match self.command {
            Commands::Init => LedgerService::init(&self.config).await?,
            _ => LedgerService::connect(&self.config).await?,
        };
        let result = run_command(&service, &self.config, self.command).await;
        service.close().await;
        result
    }
}

async fn run_command(
    service: &LedgerService,
    config: &LedgerConfig,
    command: Commands,
) -> Result<()> {
    match command {
        Commands::Init => {
            println!("Database initialized: {}", config.database_path);
        }

        Commands::Product(product_cmd) => run_product_command(service, product_cmd).await?,

        Commands::Inbound(args) => {
            run_movement_command(service, MovementType::Inbound, args).await?
        }

        Commands::Outbound(args) => {
            run_movement_command(service, MovementType::Outbound, args).await?
        }

        Commands::Reverse { id } => {
            let transaction_id =
                Uuid::parse_str(&id).context("Invalid transaction ID format (expected UUID)")?;
            let result = service.reverse_transaction(transaction_id).await?;
            println!(
                "Reversed {}: {} {} {} (stock {} -> {})",
                id,
                result.transaction.movement_type,
                result.transaction.quantity,
                result.product.sku,
                result.transaction.stock_before,
                result.transaction.stock_after
            );
            println!("Created compensation: {}", result.transaction.id);
        }

        Commands::Stock { sku } => run_stock_command(service, sku).await?,

        Commands::History {
            sku,
            preset,
            from,
            to,
            limit,
        } => {
            let range = parse_range(preset.as_deref(), from, to)?;
            run_history_command(service, &sku, range, limit).await?
        }

        Commands::Report {
            sku,
            preset,
            from,
            to,
            period,
            format,
        } => {
            let range = parse_range(preset.as_deref(), from, to)?;
            run_report_command(service, sku, range, &period, &format).await?
        }

        Commands::Check => run_check_command(service).await?,

        Commands::Export {
            export_type,
            output,
        } => run_export_command(service, &export_type, output.as_deref()).await?,
    }

    Ok(())
}

async fn run_product_command(service: &LedgerService, cmd: ProductCommands) -> Result<()> {
    match cmd {
        ProductCommands::Create {
            sku,
            name,
            description,
            min_stock,
            warehouse,
            department,
        } => {
            let product = service
                .create_product(NewProduct {
                    sku,
                    name,
                    description,
                    min_stock,
                    warehouse_id: warehouse,
                    department_id: department,
                })
                .await?;
            println!("Created product: {} {} ({})", product.sku, product.name, product.id);
        }

        ProductCommands::List => {
            let products = service.list_products().await?;
            if products.is_empty() {
                println!("No products found.");
            } else {
                println!("{:<14} {:<28} {:>8} {:>8}", "SKU", "NAME", "STOCK", "MIN");
                println!("{}", "-".repeat(61));
                for product in products {
                    println!(
                        "{:<14} {:<28} {:>8} {:>8}",
                        truncate(&product.sku, 14),
                        truncate(&product.name, 28),
                        product.current_stock,
                        product.min_stock
                    );
                }
            }
        }

        ProductCommands::Show { sku } => {
            let product = service.get_product_by_sku(&sku).await?;
            let info = service.get_product_info(product.id).await?;
            let product = &info.product;

            println!("Product: {}", product.sku);
            println!("  ID:          {}", product.id);
            println!("  Name:        {}", product.name);
            if let Some(desc) = &product.description {
                println!("  Description: {}", desc);
            }
            if let Some(warehouse) = &product.warehouse_id {
                println!("  Warehouse:   {}", warehouse);
            }
            if let Some(department) = &product.department_id {
                println!("  Department:  {}", department);
            }
            println!(
                "  Created:     {}",
                product.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!();
            println!("  Stock:       {}", product.current_stock);
            println!("  Min stock:   {}", product.min_stock);
            println!("  Movements:   {}", info.transaction_count);
            if let Some(last) = &info.last_movement {
                println!(
                    "  Last:        {} {} on {}",
                    last.movement_type,
                    last.quantity,
                    last.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }

        ProductCommands::Update {
            sku,
            name,
            description,
            clear_description,
            min_stock,
            warehouse,
            clear_warehouse,
            department,
            clear_department,
        } => {
            let product = service.get_product_by_sku(&sku).await?;
            let patch = ProductPatch {
                name,
                description: optional_update(description, clear_description),
                min_stock,
                warehouse_id: optional_update(warehouse, clear_warehouse),
                department_id: optional_update(department, clear_department),
            };
            let updated = service.update_product(product.id, patch).await?;
            println!("Updated product: {} {}", updated.sku, updated.name);
        }
    }
    Ok(())
}

/// `--x value` sets, `--clear-x` clears, neither leaves the field alone.
fn optional_update(value: Option<String>, clear: bool) -> Option<Option<String>> {
    if clear { Some(None) } else { value.map(Some) }
}

async fn run_movement_command(
    service: &LedgerService,
    movement_type: MovementType,
    args: MovementArgs,
) -> Result<()> {
    let product = service.get_product_by_sku(&args.sku).await?;

    let mut request = MovementRequest::new(product.id, movement_type, args.quantity);
    request.waybill_no = args.waybill;
    request.notes = args.notes;

    let result = service.apply_transaction(request).await?;
    println!(
        "Recorded {} of {} {}: stock {} -> {} ({})",
        result.transaction.movement_type,
        result.transaction.quantity,
        result.product.sku,
        result.transaction.stock_before,
        result.transaction.stock_after,
        result.transaction.id
    );
    Ok(())
}

async fn run_stock_command(service: &LedgerService, sku: Option<String>) -> Result<()> {
    match sku {
        Some(sku) => {
            let product = service.get_product_by_sku(&sku).await?;
            let stock = service.get_current_stock(product.id).await?;
            println!("{}: {}", product.sku, stock);
        }
        None => {
            let products = service.list_products().await?;
            if products.is_empty() {
                println!("No products found.");
            } else {
                println!("{:<14} {:>10}", "SKU", "STOCK");
                println!("{}", "-".repeat(25));
                for product in products {
                    println!("{:<14} {:>10}", truncate(&product.sku, 14), product.current_stock);
                }
            }
        }
    }
    Ok(())
}

async fn run_history_command(
    service: &LedgerService,
    sku: &str,
    range: Option<DateRange>,
    limit: Option<usize>,
) -> Result<()> {
    let product = service.get_product_by_sku(sku).await?;

    let history = service.list_transactions(product.id, range).await?;
    let mut stream = history.stream();
    let mut shown = 0;

    println!(
        "{:<20} {:<9} {:>8} {:>8} {:>8}  {:<12} NOTES",
        "DATE", "TYPE", "QTY", "BEFORE", "AFTER", "WAYBILL"
    );
    println!("{}", "-".repeat(85));

    while let Some(tx) = stream.try_next().await? {
        if limit.is_some_and(|limit| shown >= limit) {
            break;
        }
        println!(
            "{:<20} {:<9} {:>8} {:>8} {:>8}  {:<12} {}",
            tx.created_at.format("%Y-%m-%d %H:%M:%S"),
            tx.movement_type,
            tx.quantity,
            tx.stock_before,
            tx.stock_after,
            truncate(tx.waybill_no.as_deref().unwrap_or(""), 12),
            truncate(tx.notes.as_deref().unwrap_or(""), 30)
        );
        shown += 1;
    }

    if shown == 0 {
        println!("No movements found.");
    }
    Ok(())
}

async fn run_report_command(
    service: &LedgerService,
    sku: Option<String>,
    range: Option<DateRange>,
    period: &str,
    format: &str,
) -> Result<()> {
    let period = ReportPeriod::from_str(period).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid period '{}'. Valid: daily, weekly, monthly, yearly",
            period
        )
    })?;

    let range = match range {
        Some(range) => range,
        None => {
            let now = Utc::now();
            DateRange::days(
                DateRange::this_month(now).start.date_naive(),
                now.date_naive(),
            )
            .context("Invalid default report range")?
        }
    };

    let product_id = match sku {
        Some(sku) => Some(service.get_product_by_sku(&sku).await?.id),
        None => None,
    };

    let report = service.movement_report(product_id, range, period).await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "csv" => {
            println!("period_start,period_end,inbound,outbound,net,count");
            for bucket in &report.buckets {
                println!(
                    "{},{},{},{},{},{}",
                    bucket.period_start.format("%Y-%m-%d"),
                    bucket.period_end.format("%Y-%m-%d"),
                    bucket.inbound,
                    bucket.outbound,
                    bucket.net,
                    bucket.count
                );
            }
        }
        _ => {
            println!("Stock Movement Report ({})", report.period);
            println!(
                "Period: {} to {}",
                report.from_date.format("%Y-%m-%d"),
                report.to_date.format("%Y-%m-%d")
            );
            println!();
            println!(
                "{:<12} {:>10} {:>10} {:>10} {:>7}",
                "PERIOD", "INBOUND", "OUTBOUND", "NET", "COUNT"
            );
            println!("{}", "-".repeat(53));
            for bucket in &report.buckets {
                println!(
                    "{:<12} {:>10} {:>10} {:>10} {:>7}",
                    bucket.period_start.format("%Y-%m-%d"),
                    bucket.inbound,
                    bucket.outbound,
                    bucket.net,
                    bucket.count
                );
            }
            println!("{}", "-".repeat(53));
            println!(
                "{:<12} {:>10} {:>10} {:>10} {:>7}",
                "TOTAL", report.total_inbound, report.total_outbound, report.net, report.count
            );
        }
    }
    Ok(())
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity().await?;

    println!("Products:     {}", report.product_count);
    println!("Movements:    {}", report.transaction_count);
    println!();

    if report.is_healthy() {
        println!("Stock levels match the ledger.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    export_type: &str,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "products" => {
            let count = exporter.export_products_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} products", count);
            }
        }
        "transactions" => {
            let count = exporter.export_transactions_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} movements", count);
            }
        }
        "full" => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported full database: {} products, {} movements",
                    snapshot.products.len(),
                    snapshot.transactions.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: products, transactions, full",
                export_type
            );
        }
    }

    Ok(())
}

/// Range selected by `--preset` or `--from`/`--to`, `None` when neither is given.
fn parse_range(
    preset: Option<&str>,
    from: Option<String>,
    to: Option<String>,
) -> Result<Option<DateRange>> {
    match (preset, from, to) {
        (Some(name), _, _) => DateRange::preset(name, Utc::now())
            .map(Some)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid preset '{}'. Valid: today, week, month, year, last-N",
                    name
                )
            }),
        (None, None, None) => Ok(None),
        (None, from, to) => parse_day_range(from, to).map(Some),
    }
}

/// Inclusive day range from optional `YYYY-MM-DD` bounds. A missing start
/// means the beginning of the ledger, a missing end means today.
fn parse_day_range(from: Option<String>, to: Option<String>) -> Result<DateRange> {
    let first = match from {
        Some(date_str) => parse_date(&date_str)
            .with_context(|| format!("Invalid date format '{}'. Use YYYY-MM-DD", date_str))?,
        None => NaiveDate::from_ymd_opt(1970, 1, 1).context("Invalid epoch date")?,
    };
    let last = match to {
        Some(date_str) => parse_date(&date_str)
            .with_context(|| format!("Invalid date format '{}'. Use YYYY-MM-DD", date_str))?,
        None => Utc::now().date_naive(),
    };

    if first > last {
        anyhow::bail!("Start date {} is after end date {}", first, last);
    }
    DateRange::days(first, last)
        .ok_or_else(|| anyhow::anyhow!("End date {} is out of range", last))
}

fn parse_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").context("Date must be in YYYY-MM-DD format")
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
