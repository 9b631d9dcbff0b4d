use axum::{
    Json,
    extract::State,
    response::IntoResponse,
};
use serde::Serialize;

use crate::{
    error::Result,
    handlers::extract::AppPath,
    models::sales::{SalesRecord, UploadLog},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct SalesDataView {
    pub records: Vec<SalesRecord>,
    pub uploads: Vec<UploadLog>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: String,
}

/// Imported sales rows and the upload log
pub async fn data(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let records = state.sales.list_sales_records().await?;
    let uploads = state.sales.list_uploads().await?;
    Ok(Json(SalesDataView { records, uploads }))
}

pub async fn delete(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<impl IntoResponse> {
    state.sales.delete_sales_record(id).await?;
    tracing::info!("Deleted sales record {}", id);

    Ok(Json(DeleteResponse {
        success: format!("データ {} を削除しました", id),
    }))
}

/// Wipe all sales rows and the upload log
pub async fn delete_all(State(state): State<AppState>) -> Result<impl IntoResponse> {
    state.sales.delete_all_sales_records().await?;
    tracing::info!("Deleted all sales records and upload history");

    Ok(Json(DeleteResponse {
        success: "全データを削除しました".to_string(),
    }))
}
