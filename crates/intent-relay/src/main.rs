// intent-relay/crates/intent-relay/src/main.rs

#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use dotenvy::dotenv;
#[cfg(feature = "cli")]
use intent_relay::{config::Config, run_server, StoreBackend};

/// Deferred deep-link attribution server.
#[cfg(feature = "cli")]
#[derive(Debug, Parser)]
#[command(name = "intent-relay", version, about)]
struct Cli {
    /// Overrides API_HOST.
    #[arg(long)]
    host: Option<String>,

    /// Overrides API_PORT.
    #[arg(long)]
    port: Option<u16>,

    /// Overrides STORE_BACKEND (memory or sqlite).
    #[arg(long)]
    store: Option<String>,

    /// Overrides STORE_PATH for the sqlite backend.
    #[arg(long)]
    store_path: Option<String>,
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let mut cfg = Config::from_env()?;
    if let Some(host) = cli.host {
        cfg.api_host = host;
    }
    if let Some(port) = cli.port {
        cfg.api_port = port;
    }
    if cli.store.is_some() || cli.store_path.is_some() {
        let kind = cli.store.unwrap_or_else(|| match cfg.store_backend {
            StoreBackend::Memory => "memory".to_string(),
            StoreBackend::Sqlite { .. } => "sqlite".to_string(),
        });
        let path = cli.store_path.unwrap_or_else(|| match &cfg.store_backend {
            StoreBackend::Sqlite { path } => path.display().to_string(),
            StoreBackend::Memory => "./data/intent-relay.db".to_string(),
        });
        cfg.store_backend = StoreBackend::parse(&kind, &path)?;
    }

    run_server(cfg).await
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
