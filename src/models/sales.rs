use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Aggregated daily sales of one canonical product, from one POS export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SalesRecord {
    pub id: i64,
    pub date: NaiveDate,
    pub product_name: String,
    pub sales_count: i64,
    pub source_filename: String,
}

/// A sales row that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSalesRecord {
    pub date: NaiveDate,
    pub product_name: String,
    pub sales_count: i64,
    pub source_filename: String,
}

/// Duplicate-upload detection entry, one per distinct file content
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UploadLog {
    pub id: i64,
    pub filename: String,
    pub file_hash: String,
    pub uploaded_at: DateTime<Utc>,
}
