use std::collections::HashMap;

use chrono::NaiveDate;
use encoding_rs::SHIFT_JIS;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{
    config::ImportSettings,
    db::sales_store::SalesStore,
    error::{AppError, Result},
    ledger::{Ledger, LedgerResult},
    models::{
        sales::NewSalesRecord,
        shipment::{LineItemInput, ShipmentHeader},
    },
    services::{
        id_generator::ShipmentIdGenerator,
        product_map::{ProductMap, UnmappedPolicy},
    },
};

/// Result of mirroring imported sales into the shipment ledger
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LedgerMirror {
    Synced { ids: Vec<String> },
    /// The local rows are kept; `ids` lists the headers written before the failure
    Failed { ids: Vec<String>, error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    /// No row of the target category, nothing was stored
    NoData,
    Imported {
        records: Vec<NewSalesRecord>,
        mirror: LedgerMirror,
    },
}

/// POS export ingestion: filter, map, aggregate, store locally, mirror to the ledger
pub struct CsvImporter {
    sales: SalesStore,
    ledger: Ledger,
    products: ProductMap,
    settings: ImportSettings,
}

impl CsvImporter {
    pub fn new(
        sales: SalesStore,
        ledger: Ledger,
        products: ProductMap,
        settings: ImportSettings,
    ) -> Self {
        Self {
            sales,
            ledger,
            products,
            settings,
        }
    }

    /// Whether this exact file content was imported before
    pub async fn is_duplicate(&self, file_hash: &str) -> Result<bool> {
        self.sales.is_uploaded(file_hash).await
    }

    /// Run the full pipeline on one file
    pub async fn import(&self, filename: &str, bytes: &[u8]) -> Result<ImportOutcome> {
        let date = sale_date_from_filename(filename)?;
        let text = decode_csv(bytes)?;

        let totals = extract_sales(&text, &self.settings, &self.products)?;
        if totals.is_empty() {
            tracing::info!("{}: no {} rows, nothing imported", filename, self.settings.target_category);
            return Ok(ImportOutcome::NoData);
        }

        let records: Vec<NewSalesRecord> = totals
            .into_iter()
            .map(|(product_name, sales_count)| NewSalesRecord {
                date,
                product_name,
                sales_count,
                source_filename: filename.to_string(),
            })
            .collect();

        let hash = file_hash(bytes);
        self.sales.save_import(&records, filename, &hash).await?;
        tracing::info!("{}: stored {} sales rows for {}", filename, records.len(), date);

        // The local rows stay even if the ledger cannot be reached
        let mut ids = Vec::with_capacity(records.len());
        let mirror = match self.mirror_to_ledger(date, &records, &mut ids).await {
            Ok(()) => LedgerMirror::Synced { ids },
            Err(e) => {
                tracing::warn!(
                    "{}: ledger mirror failed after {} shipments, local rows kept: {}",
                    filename,
                    ids.len(),
                    e
                );
                LedgerMirror::Failed {
                    ids,
                    error: e.to_string(),
                }
            }
        };

        Ok(ImportOutcome::Imported { records, mirror })
    }

    /// Purge the rows of an earlier import of this filename, then import again
    pub async fn reprocess(&self, filename: &str, bytes: &[u8]) -> Result<ImportOutcome> {
        let removed = self.sales.delete_by_source_filename(filename).await?;
        tracing::info!("{}: removed {} rows before reprocessing", filename, removed);

        self.import(filename, bytes).await
    }

    /// One walk-in shipment per sales row. Every header id is pushed to
    /// `created` as soon as it is in the ledger, even if its line item fails.
    async fn mirror_to_ledger(
        &self,
        date: NaiveDate,
        records: &[NewSalesRecord],
        created: &mut Vec<String>,
    ) -> LedgerResult<()> {
        let existing = self.ledger.header_ids().await?;
        let mut ids = ShipmentIdGenerator::new(existing, date);

        for record in records {
            let header = ShipmentHeader {
                id: ids.next_id(),
                date,
                destination: self.settings.walk_in_destination.clone(),
                client: String::new(),
                staff: self.settings.default_staff.clone(),
            };
            let quantity = u32::try_from(record.sales_count).unwrap_or(u32::MAX);

            self.ledger.append_header(&header).await?;
            created.push(header.id.clone());

            self.ledger
                .append_line_items(
                    &header.id,
                    &[LineItemInput::new(record.product_name.clone(), quantity)],
                )
                .await?;
        }

        Ok(())
    }
}

/// Hex SHA-256 of the file content, used for duplicate detection
pub fn file_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// The sale date is the leading `YYYYMMDD` of the file name
pub fn sale_date_from_filename(filename: &str) -> Result<NaiveDate> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let token: String = base.chars().take(8).collect();
    if token.len() != 8 || !token.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(format!(
            "File name {} does not start with a YYYYMMDD date",
            filename
        )));
    }

    NaiveDate::parse_from_str(&token, "%Y%m%d").map_err(|_| {
        AppError::Validation(format!(
            "File name {} starts with an invalid date {}",
            filename, token
        ))
    })
}

/// UTF-8 first, Shift_JIS when the bytes are not valid UTF-8
pub fn decode_csv(bytes: &[u8]) -> Result<String> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.trim_start_matches('\u{feff}').to_string());
    }

    SHIFT_JIS
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
        .ok_or_else(|| {
            AppError::Validation("CSV is neither UTF-8 nor Shift_JIS encoded".to_string())
        })
}

/// Non-negative integer quantity; anything unreadable counts as 0
fn parse_quantity(raw: &str) -> i64 {
    let cleaned = raw.trim().replace(',', "");

    let value = cleaned.parse::<i64>().ok().or_else(|| {
        cleaned
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v.trunc() as i64)
    });

    value.unwrap_or(0).max(0)
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == name)
}

/// Per-product totals of the target category, in first-seen order.
///
/// An empty result means either no row of the category or no mapped product.
pub fn extract_sales(
    text: &str,
    settings: &ImportSettings,
    products: &ProductMap,
) -> Result<Vec<(String, i64)>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();

    let category_col = column_index(&headers, &settings.category_column)
        .ok_or_else(|| AppError::MissingColumn(settings.category_column.clone()))?;

    let mut matching = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.get(category_col).map(str::trim) == Some(settings.target_category.as_str()) {
            matching.push(record);
        }
    }

    if matching.is_empty() {
        return Ok(Vec::new());
    }

    let product_col = column_index(&headers, &settings.product_column)
        .ok_or_else(|| AppError::MissingColumn(settings.product_column.clone()))?;
    let quantity_col = column_index(&headers, &settings.quantity_column)
        .ok_or_else(|| AppError::MissingColumn(settings.quantity_column.clone()))?;

    let mut totals: Vec<(String, i64)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unmapped: Vec<String> = Vec::new();

    for record in &matching {
        let raw_name = record.get(product_col).unwrap_or("").trim();
        let quantity = parse_quantity(record.get(quantity_col).unwrap_or(""));

        let Some(canonical) = products.canonical(raw_name) else {
            tracing::debug!("Dropping unmapped product {:?}", raw_name);
            if !unmapped.iter().any(|n| n == raw_name) {
                unmapped.push(raw_name.to_string());
            }
            continue;
        };

        match positions.get(canonical) {
            Some(&pos) => totals[pos].1 += quantity,
            None => {
                positions.insert(canonical.to_string(), totals.len());
                totals.push((canonical.to_string(), quantity));
            }
        }
    }

    if !unmapped.is_empty() {
        match settings.unmapped_policy {
            UnmappedPolicy::Drop => {
                tracing::info!("Dropped {} unmapped products: {}", unmapped.len(), unmapped.join(", "));
            }
            UnmappedPolicy::Reject => {
                return Err(AppError::Validation(format!(
                    "Products missing from the product map: {}",
                    unmapped.join(", ")
                )));
            }
        }
    }

    Ok(totals)
}
