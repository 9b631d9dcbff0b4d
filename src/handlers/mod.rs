pub mod extract;
pub mod sales;
pub mod shipment;
pub mod upload;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// All routes of the server
pub fn router(state: AppState) -> Router {
    let max_upload_bytes = state.max_upload_bytes;

    Router::new()
        // POS upload
        .route("/", get(upload::index))
        .route("/upload", post(upload::upload))
        .route("/confirm_upload", post(upload::confirm_upload))
        // Shipment ledger
        .route("/register", get(shipment::register_form).post(shipment::register))
        .route("/list", get(shipment::list))
        .route("/detail/{id}", get(shipment::detail))
        .route("/edit/{id}", get(shipment::edit_form).post(shipment::edit))
        .route(
            "/edit-detail/{id}",
            get(shipment::edit_detail_form).post(shipment::edit_detail),
        )
        // Local sales data
        .route("/data", get(sales::data))
        .route("/delete/{id}", post(sales::delete))
        .route("/delete_all", post(sales::delete_all))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
