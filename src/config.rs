use std::time::Duration;

use clap::Args;

pub const DEFAULT_DATABASE: &str = "stockroom.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Storage settings shared by the CLI and library callers.
#[derive(Args, Debug, Clone)]
pub struct LedgerConfig {
    /// Database file path
    #[arg(
        short,
        long = "database",
        env = "STOCKROOM_DATABASE",
        default_value = DEFAULT_DATABASE,
        global = true
    )]
    pub database_path: String,

    /// Maximum number of pooled database connections
    #[arg(
        long,
        env = "STOCKROOM_MAX_CONNECTIONS",
        default_value_t = DEFAULT_MAX_CONNECTIONS,
        global = true
    )]
    pub max_connections: u32,

    /// How long a writer waits for the database lock, in milliseconds
    #[arg(
        long = "busy-timeout-ms",
        env = "STOCKROOM_BUSY_TIMEOUT_MS",
        default_value_t = DEFAULT_BUSY_TIMEOUT_MS,
        global = true
    )]
    pub busy_timeout_ms: u64,
}

impl LedgerConfig {
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATABASE)
    }
}
