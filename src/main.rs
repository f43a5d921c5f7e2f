//! Tablegate Server
//!
//! Serves every configured endpoint over HTTP.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use tablegate::api::{serve, AppState};
use tablegate::backend::ConnectionRegistry;
use tablegate::cache::FileCache;
use tablegate::config::Config;

#[derive(Parser)]
#[command(name = "tablegate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Serve SQL and CSV tables as JSON, CSV or HTML")]
struct Args {
    /// Config file (default: search the standard locations)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            let mut config = Config::load_cached(&FileCache::new(), path)?;
            config.apply_env_overrides();
            config
        }
        None => Config::load_default(),
    };

    tablegate::logging::init(&config.logging);
    tracing::info!("Starting Tablegate v{}", env!("CARGO_PKG_VERSION"));

    let registry = Arc::new(ConnectionRegistry::new());
    let handlers = config.build_handlers(Arc::clone(&registry))?;
    for (name, handler) in &handlers {
        let backend = &handler.source().backend;
        tracing::info!(
            endpoint = %name,
            driver = %backend.driver,
            table = %backend.table,
            "Configured endpoint"
        );
    }
    if handlers.is_empty() {
        tracing::warn!("No endpoints configured; run `tablegate-cli init` for a template");
    }

    serve(AppState::new(handlers, registry), &config.server.addr()).await?;
    Ok(())
}
