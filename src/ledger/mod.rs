//! Shipment ledger kept in two sheets: headers and line items.
//!
//! Column order in both sheets is shared with the people who read the
//! spreadsheet directly, so the row codecs below must not reorder cells.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::shipment::{HeaderUpdate, LineItemInput, ShipmentHeader, ShipmentLineItem};

pub mod google_sheets;
pub mod memory;

pub use google_sheets::GoogleSheetsBackend;
pub use memory::MemoryBackend;

/// A data row as a list of cell strings
pub type Row = Vec<String>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Sheets API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error("Invalid Sheets API url: {0}")]
    InvalidUrl(String),

    #[error("Token signing error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Sheet {0} not found")]
    SheetNotFound(String),

    #[error("Row {index} out of range in sheet {sheet}")]
    RowOutOfRange { sheet: String, index: usize },
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Row-level access to a tabular store.
///
/// Indexes are zero-based positions among the data rows; the label row at
/// the top of each sheet is never exposed.
#[async_trait]
pub trait SheetBackend: Send + Sync {
    async fn read_rows(&self, sheet: &str) -> LedgerResult<Vec<Row>>;

    async fn append_rows(&self, sheet: &str, rows: Vec<Row>) -> LedgerResult<()>;

    async fn update_row(&self, sheet: &str, index: usize, row: Row) -> LedgerResult<()>;

    /// Delete the given rows. Implementations delete from the highest index down.
    async fn delete_rows(&self, sheet: &str, indexes: &[usize]) -> LedgerResult<()>;
}

/// Shipment ledger on top of a [`SheetBackend`]
#[derive(Clone)]
pub struct Ledger {
    backend: Arc<dyn SheetBackend>,
    header_sheet: String,
    line_item_sheet: String,
}

impl Ledger {
    pub fn new(
        backend: Arc<dyn SheetBackend>,
        header_sheet: impl Into<String>,
        line_item_sheet: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            header_sheet: header_sheet.into(),
            line_item_sheet: line_item_sheet.into(),
        }
    }

    pub async fn list_headers(&self) -> LedgerResult<Vec<ShipmentHeader>> {
        let rows = self.backend.read_rows(&self.header_sheet).await?;
        Ok(rows.iter().filter_map(|row| header_from_row(row)).collect())
    }

    pub async fn header_ids(&self) -> LedgerResult<Vec<String>> {
        let rows = self.backend.read_rows(&self.header_sheet).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter(|id| !id.is_empty())
            .collect())
    }

    pub async fn get_header(&self, id: &str) -> LedgerResult<Option<ShipmentHeader>> {
        Ok(self.list_headers().await?.into_iter().find(|h| h.id == id))
    }

    /// Append a header row. The id is not checked for duplicates.
    pub async fn append_header(&self, header: &ShipmentHeader) -> LedgerResult<()> {
        self.backend
            .append_rows(&self.header_sheet, vec![header_to_row(header)])
            .await
    }

    /// Rewrite the header row with this id, returning the updated header
    pub async fn update_header(
        &self,
        id: &str,
        fields: &HeaderUpdate,
    ) -> LedgerResult<Option<ShipmentHeader>> {
        let rows = self.backend.read_rows(&self.header_sheet).await?;

        let Some((index, mut header)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.first().map(String::as_str) == Some(id))
            .and_then(|(index, row)| header_from_row(row).map(|h| (index, h)))
        else {
            return Ok(None);
        };

        fields.apply(&mut header);
        self.backend
            .update_row(&self.header_sheet, index, header_to_row(&header))
            .await?;

        Ok(Some(header))
    }

    pub async fn list_line_items(&self) -> LedgerResult<Vec<ShipmentLineItem>> {
        let rows = self.backend.read_rows(&self.line_item_sheet).await?;
        Ok(rows.iter().filter_map(|row| line_item_from_row(row)).collect())
    }

    pub async fn get_line_items(&self, id: &str) -> LedgerResult<Vec<ShipmentLineItem>> {
        Ok(self
            .list_line_items()
            .await?
            .into_iter()
            .filter(|item| item.shipment_id == id)
            .collect())
    }

    pub async fn append_line_items(&self, id: &str, items: &[LineItemInput]) -> LedgerResult<()> {
        if items.is_empty() {
            return Ok(());
        }

        let rows = items
            .iter()
            .map(|item| line_item_to_row(&item.for_shipment(id)))
            .collect();
        self.backend.append_rows(&self.line_item_sheet, rows).await
    }

    /// Delete every line item of the shipment, then append the new ones.
    ///
    /// Not atomic: if the append fails the shipment is left without items.
    pub async fn replace_line_items(&self, id: &str, items: &[LineItemInput]) -> LedgerResult<()> {
        let rows = self.backend.read_rows(&self.line_item_sheet).await?;

        let mut stale: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.first().map(String::as_str) == Some(id))
            .map(|(index, _)| index)
            .collect();
        stale.sort_unstable_by(|a, b| b.cmp(a));

        if !stale.is_empty() {
            self.backend
                .delete_rows(&self.line_item_sheet, &stale)
                .await?;
        }

        self.append_line_items(id, items).await
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";

fn parse_sheet_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y/%m/%d"))
        .ok()
}

fn cell(row: &[String], index: usize) -> String {
    row.get(index).cloned().unwrap_or_default()
}

/// id, date, destination, client, staff
pub fn header_to_row(header: &ShipmentHeader) -> Row {
    vec![
        header.id.clone(),
        header.date.format(DATE_FORMAT).to_string(),
        header.destination.clone(),
        header.client.clone(),
        header.staff.clone(),
    ]
}

pub fn header_from_row(row: &[String]) -> Option<ShipmentHeader> {
    let id = cell(row, 0);
    if id.is_empty() {
        return None;
    }

    let Some(date) = parse_sheet_date(&cell(row, 1)) else {
        tracing::warn!("Skipping header {} with unreadable date {:?}", id, cell(row, 1));
        return None;
    };

    // Rows written before the client column existed carry row-counter ids and
    // have staff in the fourth cell. A current row can also come back with four
    // cells when its staff cell is blank, since the Sheets API trims trailing
    // empty cells.
    let (client, staff) = if row.len() == 4 && !is_dated_id(&id) {
        (String::new(), cell(row, 3))
    } else {
        (cell(row, 3), cell(row, 4))
    };

    Some(ShipmentHeader {
        id,
        date,
        destination: cell(row, 2),
        client,
        staff,
    })
}

/// `YYMMDD-NNN`, the shape of every id this server hands out
fn is_dated_id(id: &str) -> bool {
    match id.split_once('-') {
        Some((day, suffix)) => {
            day.len() == 6
                && day.chars().all(|c| c.is_ascii_digit())
                && !suffix.is_empty()
                && suffix.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// shipment_id, product_name, quantity
pub fn line_item_to_row(item: &ShipmentLineItem) -> Row {
    vec![
        item.shipment_id.clone(),
        item.product_name.clone(),
        item.quantity.to_string(),
    ]
}

pub fn line_item_from_row(row: &[String]) -> Option<ShipmentLineItem> {
    let shipment_id = cell(row, 0);
    if shipment_id.is_empty() {
        return None;
    }

    let raw_quantity = cell(row, 2);
    let quantity = raw_quantity.trim().parse::<u32>().unwrap_or_else(|_| {
        tracing::warn!(
            "Unreadable quantity {:?} for shipment {}, reading as 0",
            raw_quantity,
            shipment_id
        );
        0
    });

    Some(ShipmentLineItem {
        shipment_id,
        product_name: cell(row, 1),
        quantity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> (Arc<MemoryBackend>, Ledger) {
        let backend = Arc::new(MemoryBackend::new());
        let ledger = Ledger::new(backend.clone(), "出庫情報", "出庫詳細");
        (backend, ledger)
    }

    fn header(id: &str) -> ShipmentHeader {
        ShipmentHeader {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            destination: "酒販店".to_string(),
            client: String::new(),
            staff: "佐藤".to_string(),
        }
    }

    #[test]
    fn test_header_row_column_order() {
        let mut h = header("240101-001");
        h.client = "取引先A".to_string();

        assert_eq!(
            header_to_row(&h),
            vec!["240101-001", "2024-01-01", "酒販店", "取引先A", "佐藤"]
        );
        assert_eq!(header_from_row(&header_to_row(&h)), Some(h));
    }

    #[test]
    fn test_legacy_four_column_header_row() {
        let row: Row = vec!["0002", "2023/05/10", "道の駅", "田中"]
            .into_iter()
            .map(String::from)
            .collect();

        let h = header_from_row(&row).unwrap();
        assert_eq!(h.id, "0002");
        assert_eq!(h.date, NaiveDate::from_ymd_opt(2023, 5, 10).unwrap());
        assert_eq!(h.client, "");
        assert_eq!(h.staff, "田中");
    }

    #[test]
    fn test_trimmed_row_with_blank_staff_keeps_client() {
        // Five columns written, trailing empty staff cell dropped on read
        let row: Row = vec!["240101-002", "2024-01-01", "酒販店", "取引先A"]
            .into_iter()
            .map(String::from)
            .collect();

        let h = header_from_row(&row).unwrap();
        assert_eq!(h.client, "取引先A");
        assert_eq!(h.staff, "");
    }

    #[test]
    fn test_dated_id_shape() {
        assert!(is_dated_id("240101-001"));
        assert!(is_dated_id("240101-1000"));
        assert!(!is_dated_id("0002"));
        assert!(!is_dated_id("2401-001"));
        assert!(!is_dated_id("240101-"));
    }

    #[test]
    fn test_unreadable_quantity_reads_as_zero() {
        let row: Row = vec!["240101-001".into(), "Cidre".into(), "abc".into()];
        assert_eq!(line_item_from_row(&row).unwrap().quantity, 0);
    }

    #[tokio::test]
    async fn test_replace_line_items_leaves_only_new_items() {
        let (_backend, ledger) = ledger();
        ledger.append_header(&header("240101-001")).await.unwrap();
        ledger
            .append_line_items(
                "240101-001",
                &[LineItemInput::new("Cidre", 1), LineItemInput::new("Poiré", 2)],
            )
            .await
            .unwrap();

        ledger.replace_line_items("240101-001", &[]).await.unwrap();
        assert!(ledger.get_line_items("240101-001").await.unwrap().is_empty());

        ledger
            .replace_line_items("240101-001", &[LineItemInput::new("Cidre", 3)])
            .await
            .unwrap();

        let items = ledger.get_line_items("240101-001").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_name, "Cidre");
        assert_eq!(items[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_replace_line_items_keeps_other_shipments() {
        let (_backend, ledger) = ledger();
        ledger
            .append_line_items("240101-001", &[LineItemInput::new("A", 1)])
            .await
            .unwrap();
        ledger
            .append_line_items("240101-002", &[LineItemInput::new("B", 2)])
            .await
            .unwrap();
        ledger
            .append_line_items("240101-001", &[LineItemInput::new("C", 3)])
            .await
            .unwrap();

        ledger
            .replace_line_items("240101-001", &[LineItemInput::new("D", 4)])
            .await
            .unwrap();

        let all = ledger.list_line_items().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].shipment_id, "240101-002");
        assert_eq!(all[1].product_name, "D");
    }

    #[tokio::test]
    async fn test_update_header_rewrites_fields_but_not_id() {
        let (_backend, ledger) = ledger();
        ledger.append_header(&header("240101-001")).await.unwrap();
        ledger.append_header(&header("240101-002")).await.unwrap();

        let update = HeaderUpdate {
            date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            destination: "レストラン".to_string(),
            client: "取引先B".to_string(),
            staff: "鈴木".to_string(),
        };
        let updated = ledger.update_header("240101-002", &update).await.unwrap().unwrap();

        assert_eq!(updated.id, "240101-002");
        assert_eq!(updated.destination, "レストラン");

        let stored = ledger.get_header("240101-002").await.unwrap().unwrap();
        assert_eq!(stored, updated);
        let untouched = ledger.get_header("240101-001").await.unwrap().unwrap();
        assert_eq!(untouched.destination, "酒販店");
    }

    #[tokio::test]
    async fn test_update_unknown_header_returns_none() {
        let (_backend, ledger) = ledger();
        let update = HeaderUpdate {
            date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            destination: "x".to_string(),
            client: String::new(),
            staff: "y".to_string(),
        };

        assert!(ledger.update_header("missing", &update).await.unwrap().is_none());
    }
}
