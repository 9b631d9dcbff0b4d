use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{LedgerError, LedgerResult, Row, SheetBackend};

/// In-process sheet store, used by tests and by `LEDGER_BACKEND=memory`
#[derive(Default)]
pub struct MemoryBackend {
    sheets: RwLock<HashMap<String, Vec<Row>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of data rows currently in a sheet
    pub async fn row_count(&self, sheet: &str) -> usize {
        self.sheets.read().await.get(sheet).map_or(0, Vec::len)
    }
}

#[async_trait]
impl SheetBackend for MemoryBackend {
    async fn read_rows(&self, sheet: &str) -> LedgerResult<Vec<Row>> {
        Ok(self.sheets.read().await.get(sheet).cloned().unwrap_or_default())
    }

    async fn append_rows(&self, sheet: &str, rows: Vec<Row>) -> LedgerResult<()> {
        let mut sheets = self.sheets.write().await;
        sheets.entry(sheet.to_string()).or_default().extend(rows);
        Ok(())
    }

    async fn update_row(&self, sheet: &str, index: usize, row: Row) -> LedgerResult<()> {
        let mut sheets = self.sheets.write().await;
        let slot = sheets
            .get_mut(sheet)
            .and_then(|rows| rows.get_mut(index))
            .ok_or_else(|| LedgerError::RowOutOfRange {
                sheet: sheet.to_string(),
                index,
            })?;
        *slot = row;
        Ok(())
    }

    async fn delete_rows(&self, sheet: &str, indexes: &[usize]) -> LedgerResult<()> {
        let mut sheets = self.sheets.write().await;
        let rows = sheets
            .get_mut(sheet)
            .ok_or_else(|| LedgerError::SheetNotFound(sheet.to_string()))?;

        let mut ordered = indexes.to_vec();
        ordered.sort_unstable_by(|a, b| b.cmp(a));
        ordered.dedup();

        for index in ordered {
            if index >= rows.len() {
                return Err(LedgerError::RowOutOfRange {
                    sheet: sheet.to_string(),
                    index,
                });
            }
            rows.remove(index);
        }

        Ok(())
    }
}
