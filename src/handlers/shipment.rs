use std::collections::HashMap;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::{
    error::{AppError, Result},
    handlers::extract::{AppForm, AppPath},
    models::shipment::{HeaderUpdate, LineItemInput, ShipmentDetail, ShipmentHeader},
    services::id_generator,
    state::AppState,
};

/// Number of product/quantity slots on the register and edit-detail forms
pub const ITEM_SLOTS: usize = 5;

type FormFields = HashMap<String, String>;

#[derive(Debug, Serialize)]
pub struct RegisterFormView {
    pub date: NaiveDate,
    pub item_slots: usize,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: String,
    pub id: String,
    pub redirect: String,
}

#[derive(Debug, Serialize)]
pub struct EditResponse<T> {
    pub success: String,
    pub redirect: String,
    pub data: T,
}

/// Empty registration form, dated today
pub async fn register_form() -> impl IntoResponse {
    Json(RegisterFormView {
        date: Local::now().date_naive(),
        item_slots: ITEM_SLOTS,
    })
}

/// Register a shipment with up to five line items
pub async fn register(
    State(state): State<AppState>,
    AppForm(form): AppForm<FormFields>,
) -> Result<impl IntoResponse> {
    let fields = header_fields(&form)?;
    let items = item_slots(&form)?;

    // Concurrent registrations for the same day can compute the same id
    let existing = state.ledger.header_ids().await?;
    let id = id_generator::next_id(existing, fields.date);

    let header = ShipmentHeader {
        id: id.clone(),
        date: fields.date,
        destination: fields.destination,
        client: fields.client,
        staff: fields.staff,
    };
    state.ledger.append_header(&header).await?;
    state.ledger.append_line_items(&id, &items).await?;

    tracing::info!("Registered shipment {} with {} items", id, items.len());

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: format!("出庫 {} を登録しました", id),
            id,
            redirect: "/register".to_string(),
        }),
    ))
}

/// All shipment headers
pub async fn list(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let headers = state.ledger.list_headers().await?;
    Ok(Json(headers))
}

/// One shipment with its line items
pub async fn detail(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> Result<impl IntoResponse> {
    Ok(Json(load_detail(&state, &id).await?))
}

pub async fn edit_form(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> Result<impl IntoResponse> {
    Ok(Json(require_header(&state, &id).await?))
}

/// Update the header fields of a shipment
pub async fn edit(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    AppForm(form): AppForm<FormFields>,
) -> Result<impl IntoResponse> {
    let fields = header_fields(&form)?;

    let updated = state
        .ledger
        .update_header(&id, &fields)
        .await?
        .ok_or_else(|| AppError::ShipmentNotFound(id.clone()))?;

    Ok(Json(EditResponse {
        success: format!("出庫 {} を更新しました", id),
        redirect: format!("/detail/{}", id),
        data: updated,
    }))
}

pub async fn edit_detail_form(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> Result<impl IntoResponse> {
    Ok(Json(load_detail(&state, &id).await?))
}

/// Replace all line items of a shipment
pub async fn edit_detail(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    AppForm(form): AppForm<FormFields>,
) -> Result<impl IntoResponse> {
    let items = item_slots(&form)?;
    require_header(&state, &id).await?;

    state.ledger.replace_line_items(&id, &items).await?;
    let detail = load_detail(&state, &id).await?;

    Ok(Json(EditResponse {
        success: format!("出庫 {} の明細を更新しました", id),
        redirect: format!("/detail/{}", id),
        data: detail,
    }))
}

async fn require_header(state: &AppState, id: &str) -> Result<ShipmentHeader> {
    state
        .ledger
        .get_header(id)
        .await?
        .ok_or_else(|| AppError::ShipmentNotFound(id.to_string()))
}

async fn load_detail(state: &AppState, id: &str) -> Result<ShipmentDetail> {
    let header = require_header(state, id).await?;
    let items = state.ledger.get_line_items(id).await?;
    Ok(ShipmentDetail { header, items })
}

fn field<'a>(form: &'a FormFields, key: &str) -> &'a str {
    form.get(key).map(|v| v.trim()).unwrap_or("")
}

fn required(form: &FormFields, key: &str) -> Result<String> {
    let value = field(form, key);
    if value.is_empty() {
        return Err(AppError::Validation(format!("{} is required", key)));
    }
    Ok(value.to_string())
}

fn header_fields(form: &FormFields) -> Result<HeaderUpdate> {
    let raw_date = required(form, "date")?;
    let date = NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("Invalid date: {}", raw_date)))?;

    Ok(HeaderUpdate {
        date,
        destination: required(form, "destination")?,
        client: field(form, "client").to_string(),
        staff: required(form, "staff")?,
    })
}

/// Slots `item1..item5` / `qty1..qty5`; a slot counts only when both are filled
fn item_slots(form: &FormFields) -> Result<Vec<LineItemInput>> {
    let mut items = Vec::new();

    for slot in 1..=ITEM_SLOTS {
        let name = field(form, &format!("item{}", slot));
        let qty = field(form, &format!("qty{}", slot));
        if name.is_empty() || qty.is_empty() {
            continue;
        }

        let quantity = qty.parse::<u32>().map_err(|_| {
            AppError::Validation(format!("Invalid quantity for item {}: {}", slot, qty))
        })?;
        items.push(LineItemInput::new(name, quantity));
    }

    Ok(items)
}
