use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod handlers;
mod ledger;
mod models;
mod services;
mod state;


use config::{Config, LedgerBackendKind};
use db::sales_store::SalesStore;
use ledger::{GoogleSheetsBackend, Ledger, MemoryBackend, SheetBackend};
use services::{CsvImporter, ProductMap};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Starting cider ledger server...");

    let pool = db::init_db_pool(&config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;
    tracing::info!("Database ready at {}", config.database_url);

    let backend: Arc<dyn SheetBackend> = match config.ledger_backend {
        LedgerBackendKind::Sheets => {
            let spreadsheet_id = config.spreadsheet_id.clone().unwrap_or_default();
            tracing::info!("Using Google Sheets ledger {}", spreadsheet_id);
            Arc::new(GoogleSheetsBackend::from_credentials_file(
                &config.credentials_file,
                spreadsheet_id,
            )?)
        }
        LedgerBackendKind::Memory => {
            tracing::warn!("Using the in-memory ledger, shipments are lost on restart");
            Arc::new(MemoryBackend::new())
        }
    };
    let ledger = Ledger::new(backend, &config.header_sheet, &config.line_item_sheet);

    let products = ProductMap::load(&config.product_map_file)?;
    let sales = SalesStore::new(pool);
    let importer = CsvImporter::new(
        sales.clone(),
        ledger.clone(),
        products,
        config.import.clone(),
    );

    let app = handlers::router(AppState {
        sales,
        ledger,
        importer: Arc::new(importer),
        upload_dir: config.upload_dir.clone(),
        max_upload_bytes: config.max_upload_bytes,
    });

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
