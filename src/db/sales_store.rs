use chrono::Utc;
use sqlx::{Sqlite, Transaction};

use crate::{
    db::DbPool,
    error::{AppError, Result},
    models::sales::{NewSalesRecord, SalesRecord, UploadLog},
};

/// Local aggregate store: ingested POS sales and the upload dedup log
#[derive(Clone)]
pub struct SalesStore {
    pool: DbPool,
}

impl SalesStore {
    /// Create a new SalesStore with the provided database pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Bulk append sales rows
    pub async fn insert_sales_records(&self, rows: &[NewSalesRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        insert_rows(&mut tx, rows).await?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    /// Whether a file with this content hash has been ingested before
    pub async fn is_uploaded(&self, file_hash: &str) -> Result<bool> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM upload_log WHERE file_hash = ?")
            .bind(file_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(count.0 > 0)
    }

    /// Log an upload; a hash that is already present is left untouched
    pub async fn record_upload(&self, filename: &str, file_hash: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO upload_log (filename, file_hash, uploaded_at) VALUES (?, ?, ?)",
        )
        .bind(filename)
        .bind(file_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Store the rows of one import together with its upload log entry
    pub async fn save_import(
        &self,
        rows: &[NewSalesRecord],
        filename: &str,
        file_hash: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        insert_rows(&mut tx, rows).await?;
        sqlx::query(
            "INSERT OR IGNORE INTO upload_log (filename, file_hash, uploaded_at) VALUES (?, ?, ?)",
        )
        .bind(filename)
        .bind(file_hash)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    /// All sales rows, newest date first
    pub async fn list_sales_records(&self) -> Result<Vec<SalesRecord>> {
        let records = sqlx::query_as::<_, SalesRecord>(
            r#"
            SELECT id, date, product_name, sales_count, source_filename
            FROM alcohol_sales
            ORDER BY date DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(records)
    }

    pub async fn list_uploads(&self) -> Result<Vec<UploadLog>> {
        let uploads = sqlx::query_as::<_, UploadLog>(
            "SELECT id, filename, file_hash, uploaded_at FROM upload_log ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(uploads)
    }

    /// Delete one sales row by id
    pub async fn delete_sales_record(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM alcohol_sales WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(AppError::SalesRecordNotFound(id));
        }

        Ok(())
    }

    /// Delete every sales row that came from the given file
    pub async fn delete_by_source_filename(&self, filename: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM alcohol_sales WHERE source_filename = ?")
            .bind(filename)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    /// Empty both the sales table and the upload log
    pub async fn delete_all_sales_records(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        sqlx::query("DELETE FROM alcohol_sales")
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;
        sqlx::query("DELETE FROM upload_log")
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }
}

async fn insert_rows(tx: &mut Transaction<'_, Sqlite>, rows: &[NewSalesRecord]) -> Result<()> {
    for row in rows {
        sqlx::query(
            r#"
            INSERT INTO alcohol_sales (date, product_name, sales_count, source_filename)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(row.date)
        .bind(&row.product_name)
        .bind(row.sales_count)
        .bind(&row.source_filename)
        .execute(&mut **tx)
        .await
        .map_err(AppError::Database)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db_pool;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    async fn setup_store() -> (TempDir, SalesStore) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let url = format!("sqlite://{}", dir.path().join("sales.db").display());
        let pool = init_db_pool(&url).await.expect("Failed to create pool");
        (dir, SalesStore::new(pool))
    }

    fn row(day: u32, product: &str, count: i64, file: &str) -> NewSalesRecord {
        NewSalesRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            product_name: product.to_string(),
            sales_count: count,
            source_filename: file.to_string(),
        }
    }

    #[tokio::test]
    async fn test_list_orders_by_date_then_id_descending() {
        let (_dir, store) = setup_store().await;
        store
            .insert_sales_records(&[
                row(1, "シードル ドライ", 2, "20240101.csv"),
                row(2, "シードル スイート", 5, "20240102.csv"),
                row(1, "ポワレ", 1, "20240101.csv"),
            ])
            .await
            .unwrap();

        let records = store.list_sales_records().await.unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.product_name.as_str()).collect();

        assert_eq!(names, vec!["シードル スイート", "ポワレ", "シードル ドライ"]);
    }

    #[tokio::test]
    async fn test_delete_sales_record_removes_only_that_row() {
        let (_dir, store) = setup_store().await;
        store
            .insert_sales_records(&[
                row(1, "A", 1, "20240101.csv"),
                row(1, "B", 2, "20240101.csv"),
                row(1, "C", 3, "20240101.csv"),
            ])
            .await
            .unwrap();

        let before = store.list_sales_records().await.unwrap();
        let target = before.iter().find(|r| r.product_name == "B").unwrap().id;

        store.delete_sales_record(target).await.unwrap();

        let after = store.list_sales_records().await.unwrap();
        assert_eq!(after.len(), 2);
        assert!(after.iter().all(|r| r.id != target));
    }

    #[tokio::test]
    async fn test_delete_unknown_sales_record_is_not_found() {
        let (_dir, store) = setup_store().await;

        let err = store.delete_sales_record(42).await.unwrap_err();
        assert!(matches!(err, AppError::SalesRecordNotFound(42)));
    }

    #[tokio::test]
    async fn test_record_upload_is_idempotent() {
        let (_dir, store) = setup_store().await;

        assert!(!store.is_uploaded("abc").await.unwrap());
        store.record_upload("20240101.csv", "abc").await.unwrap();
        store.record_upload("20240101.csv", "abc").await.unwrap();

        assert!(store.is_uploaded("abc").await.unwrap());
        assert_eq!(store.list_uploads().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_all_clears_sales_and_upload_log() {
        let (_dir, store) = setup_store().await;
        store
            .save_import(&[row(1, "A", 1, "20240101.csv")], "20240101.csv", "abc")
            .await
            .unwrap();

        store.delete_all_sales_records().await.unwrap();

        assert!(store.list_sales_records().await.unwrap().is_empty());
        assert!(!store.is_uploaded("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_by_source_filename() {
        let (_dir, store) = setup_store().await;
        store
            .insert_sales_records(&[
                row(1, "A", 1, "20240101.csv"),
                row(2, "A", 1, "20240102.csv"),
            ])
            .await
            .unwrap();

        let removed = store.delete_by_source_filename("20240101.csv").await.unwrap();

        assert_eq!(removed, 1);
        let left = store.list_sales_records().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].source_filename, "20240102.csv");
    }
}
