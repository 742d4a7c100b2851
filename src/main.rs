use anyhow::Result;
use clap::Parser;
use stockroom::cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    cli.run().await
}

/// Log to stderr so command output on stdout stays machine-readable.
/// `RUST_LOG` overrides the default filter.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "stockroom=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
