//! HTTP daemon for the folio-index pipeline.
//!
//! A thin shim over the library crate: parse flags, open the store, build
//! the gateway client, serve the router.

use anyhow::{Context, Result};
use clap::Parser;
use folio_index::server::{create_router, AppState};
use folio_index::{GatewayClient, IndexStore, IndexerConfig, PageAnalyzer, SqliteStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "folio-indexd",
    version,
    about = "OCR indexing and page-detection service for scanned books"
)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8787")]
    bind: String,

    /// Path to the SQLite database file.
    #[arg(long, default_value = "folio.db")]
    db: PathBuf,

    /// Override the vision model (otherwise FOLIO_MODEL or the default).
    #[arg(long)]
    model: Option<String>,

    /// Override the gateway base URL (otherwise AI_GATEWAY_URL or the
    /// default).
    #[arg(long)]
    gateway_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("folio_index=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = IndexerConfig::from_env().context("loading gateway configuration")?;
    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(url) = args.gateway_url {
        config.gateway_url = url.trim_end_matches('/').to_string();
    }
    info!("gateway: {} model: {}", config.gateway_url, config.model);

    let store = SqliteStore::open(&args.db)
        .with_context(|| format!("opening database at {}", args.db.display()))?;
    let store: Arc<dyn IndexStore> = Arc::new(store);

    let analyzer: Arc<dyn PageAnalyzer> =
        Arc::new(GatewayClient::new(config.clone()).context("building gateway client")?);

    let app = create_router(AppState::new(store, analyzer, config));

    let listener = TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    info!("listening on {}", args.bind);
    axum::serve(listener, app).await?;
    Ok(())
}
