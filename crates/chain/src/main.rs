//! stock-dao: operator binary untuk state governance.
//!
//! Log level diatur lewat `RUST_LOG` (default `info`).

use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    if let Err(e) = stock_chain::cli::run_cli() {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
