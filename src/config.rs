use std::env;
use std::path::PathBuf;

use crate::services::product_map::UnmappedPolicy;

/// Which ledger backend the server talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackendKind {
    Sheets,
    Memory,
}

/// CSV layout and synthesized-shipment defaults used by the importer
#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub target_category: String,
    pub category_column: String,
    pub product_column: String,
    pub quantity_column: String,
    pub walk_in_destination: String,
    pub default_staff: String,
    pub unmapped_policy: UnmappedPolicy,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            target_category: "お酒類".to_string(),
            category_column: "カテゴリー".to_string(),
            product_column: "商品名".to_string(),
            quantity_column: "数量".to_string(),
            walk_in_destination: "店頭販売".to_string(),
            default_staff: "自動登録".to_string(),
            unmapped_policy: UnmappedPolicy::Drop,
        }
    }
}

/// Request body cap for `/upload`, well above a day of POS exports
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub ledger_backend: LedgerBackendKind,
    pub credentials_file: PathBuf,
    pub spreadsheet_id: Option<String>,
    pub header_sheet: String,
    pub line_item_sheet: String,
    pub product_map_file: PathBuf,
    pub import: ImportSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let defaults = ImportSettings::default();

        let ledger_backend = match var_or("LEDGER_BACKEND", "sheets").as_str() {
            "sheets" => LedgerBackendKind::Sheets,
            "memory" => LedgerBackendKind::Memory,
            other => return Err(ConfigError::InvalidLedgerBackend(other.to_string())),
        };

        let spreadsheet_id = env::var("SPREADSHEET_ID").ok().filter(|s| !s.is_empty());
        if ledger_backend == LedgerBackendKind::Sheets && spreadsheet_id.is_none() {
            return Err(ConfigError::MissingSpreadsheetId);
        }

        let unmapped_policy = var_or("UNMAPPED_POLICY", "drop")
            .parse()
            .map_err(ConfigError::InvalidUnmappedPolicy)?;

        Ok(Self {
            server_host: var_or("SERVER_HOST", "0.0.0.0"),
            server_port: var_or("SERVER_PORT", "8080")
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            database_url: var_or("DATABASE_URL", "sqlite://data/sales.db"),
            upload_dir: PathBuf::from(var_or("UPLOAD_DIR", "uploads")),
            max_upload_bytes: match env::var("MAX_UPLOAD_BYTES") {
                Ok(raw) => raw
                    .parse()
                    .map_err(|_| ConfigError::InvalidUploadLimit(raw))?,
                Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
            },
            ledger_backend,
            credentials_file: PathBuf::from(var_or("GOOGLE_CREDENTIALS_FILE", "credentials.json")),
            spreadsheet_id,
            header_sheet: var_or("HEADER_SHEET", "出庫情報"),
            line_item_sheet: var_or("LINE_ITEM_SHEET", "出庫詳細"),
            product_map_file: PathBuf::from(var_or("PRODUCT_MAP_FILE", "config/product_map.json")),
            import: ImportSettings {
                target_category: var_or("TARGET_CATEGORY", &defaults.target_category),
                category_column: var_or("CATEGORY_COLUMN", &defaults.category_column),
                product_column: var_or("PRODUCT_COLUMN", &defaults.product_column),
                quantity_column: var_or("QUANTITY_COLUMN", &defaults.quantity_column),
                walk_in_destination: var_or("WALK_IN_DESTINATION", &defaults.walk_in_destination),
                default_staff: var_or("DEFAULT_STAFF", &defaults.default_staff),
                unmapped_policy,
            },
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("Unknown ledger backend: {0} (expected \"sheets\" or \"memory\")")]
    InvalidLedgerBackend(String),

    #[error("SPREADSHEET_ID must be set when LEDGER_BACKEND is \"sheets\"")]
    MissingSpreadsheetId,

    #[error("Invalid MAX_UPLOAD_BYTES: {0}")]
    InvalidUploadLimit(String),

    #[error("Invalid unmapped policy: {0}")]
    InvalidUnmappedPolicy(String),
}
