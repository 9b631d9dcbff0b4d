use std::path::PathBuf;
use std::sync::Arc;

use crate::{db::sales_store::SalesStore, ledger::Ledger, services::CsvImporter};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub sales: SalesStore,
    pub ledger: Ledger,
    pub importer: Arc<CsvImporter>,
    /// Uploaded POS exports are kept here for reprocessing
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}
