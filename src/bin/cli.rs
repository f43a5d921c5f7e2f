//! Tablegate CLI
//!
//! Command-line interface for Tablegate operations:
//! - Run one endpoint query locally
//! - List configured endpoints
//! - Print the default config

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use tablegate::backend::ConnectionRegistry;
use tablegate::config::{generate_default_config, Config};
use tablegate::query::RequestParams;

#[derive(Parser)]
#[command(name = "tablegate-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query Tablegate endpoints without running the server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run an endpoint and print the response body
    Query {
        /// Endpoint name
        endpoint: String,
        /// URL query string, e.g. "groupby=country&agg=total:sum(count)"
        #[arg(default_value = "")]
        query: String,
        /// Also print response headers
        #[arg(short = 'H', long)]
        headers: bool,
    },

    /// List configured endpoints
    Endpoints,

    /// Print a default config file
    Init {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Query {
            endpoint,
            query,
            headers,
        } => {
            let config = load_config(cli.config.as_ref())?;
            tablegate::logging::init(&config.logging);

            let registry = Arc::new(ConnectionRegistry::new());
            let handlers = config.build_handlers(registry)?;
            let handler = handlers
                .get(&endpoint)
                .ok_or_else(|| format!("Unknown endpoint: {endpoint}"))?;

            let response = handler.handle(&RequestParams::parse(&query))?;
            if headers {
                for (name, value) in &response.headers {
                    println!("{name}: {value}");
                }
                println!();
            }
            println!("{}", response.body_text());
        }

        Commands::Endpoints => {
            let config = load_config(cli.config.as_ref())?;
            if config.endpoints.is_empty() {
                println!("No endpoints configured.");
            }
            for (name, endpoint) in &config.endpoints {
                println!(
                    "{:<20} {:<12} {} {}",
                    name, endpoint.driver, endpoint.url, endpoint.table
                );
            }
        }

        Commands::Init { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)?;
                    println!("Wrote default config to {}", path.display());
                }
                None => print!("{content}"),
            }
        }
    }

    Ok(())
}
