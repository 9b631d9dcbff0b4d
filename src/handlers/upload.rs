use std::path::{Path, PathBuf};

use axum::{
    Json,
    extract::{
        State,
        multipart::{Multipart, MultipartRejection},
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    handlers::extract::AppForm,
    services::{
        ImportOutcome, LedgerMirror,
        csv_import::file_hash,
    },
    state::AppState,
};

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="ja">
<head><meta charset="utf-8"><title>POS CSV アップロード</title></head>
<body>
<h1>POS CSV アップロード</h1>
<input type="file" id="file-input" accept=".csv" multiple>
<div id="message"></div>
<p><a href="/register">出庫登録</a> | <a href="/list">出庫一覧</a> | <a href="/data">売上データ</a></p>
<script>
const message = document.getElementById('message');
function show(text) { const p = document.createElement('p'); p.textContent = text; message.appendChild(p); }
async function post(url, body) { const r = await fetch(url, { method: 'POST', body }); return r.json(); }
async function upload(file) {
  const form = new FormData();
  form.append('file', file);
  let data = await post('/upload', form);
  if (data.status === 'confirm') {
    if (!confirm(data.message)) { show(`${file.name}: キャンセルしました`); return; }
    const again = new URLSearchParams({ filename: data.filename, file_hash: data.file_hash });
    data = await post('/confirm_upload', again);
  }
  show(`${file.name}: ${data.success || data.error}`);
}
document.getElementById('file-input').addEventListener('change', (e) => {
  message.textContent = '';
  Array.from(e.target.files).forEach(upload);
});
</script>
</body>
</html>
"#;

/// Duplicate upload: the client has to confirm before the file is reprocessed
#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub status: &'static str,
    pub filename: String,
    pub file_hash: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub success: String,
    /// `ok`, `no_data`, or `degraded` when only the local store was updated
    pub status: &'static str,
    pub rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger: Option<LedgerMirror>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmUploadForm {
    pub filename: String,
    pub file_hash: String,
}

/// Upload landing page
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Receive a POS export and import it, unless the same content was imported before
pub async fn upload(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let mut multipart = multipart?;
    let (filename, bytes) = read_file_field(&mut multipart).await?;

    // Kept even for duplicates so a confirmed reprocess can read it back
    save_upload(&state.upload_dir, &filename, &bytes).await?;

    let hash = file_hash(&bytes);
    if state.importer.is_duplicate(&hash).await? {
        tracing::info!("{}: content already imported, asking for confirmation", filename);
        let message = format!(
            "{} は既にアップロード済みです。既存のデータを削除して再処理しますか？",
            filename
        );
        return Ok(Json(ConfirmResponse {
            status: "confirm",
            filename,
            file_hash: hash,
            message,
        })
        .into_response());
    }

    let outcome = state.importer.import(&filename, &bytes).await?;
    Ok(import_response(&filename, outcome).into_response())
}

/// Reprocess a file the client confirmed after a duplicate warning
pub async fn confirm_upload(
    State(state): State<AppState>,
    AppForm(form): AppForm<ConfirmUploadForm>,
) -> Result<Response> {
    let filename = sanitize_filename(&form.filename)?;
    let path = state.upload_dir.join(&filename);

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::UploadNotFound(filename));
        }
        Err(e) => return Err(AppError::Io(e)),
    };

    if file_hash(&bytes) != form.file_hash {
        return Err(AppError::Validation(format!(
            "{} has changed since it was uploaded, upload it again",
            filename
        )));
    }

    let outcome = state.importer.reprocess(&filename, &bytes).await?;
    Ok(import_response(&filename, outcome).into_response())
}

fn import_response(filename: &str, outcome: ImportOutcome) -> (StatusCode, Json<ImportResponse>) {
    let response = match outcome {
        ImportOutcome::NoData => ImportResponse {
            success: format!("{}: 対象カテゴリーのデータがありませんでした", filename),
            status: "no_data",
            rows: 0,
            ledger: None,
        },
        ImportOutcome::Imported { records, mirror } => {
            let (success, status) = match &mirror {
                LedgerMirror::Synced { .. } => (
                    format!("{}: {} 件のデータを登録しました", filename, records.len()),
                    "ok",
                ),
                LedgerMirror::Failed { .. } => (
                    format!(
                        "{}: {} 件のデータを登録しました（出庫台帳への反映に失敗しました）",
                        filename,
                        records.len()
                    ),
                    "degraded",
                ),
            };
            ImportResponse {
                success,
                status,
                rows: records.len(),
                ledger: Some(mirror),
            }
        }
    };

    (StatusCode::OK, Json(response))
}

async fn read_file_field(multipart: &mut Multipart) -> Result<(String, Vec<u8>)> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = sanitize_filename(field.file_name().unwrap_or(""))?;
        let bytes = field.bytes().await?;

        return Ok((filename, bytes.to_vec()));
    }

    Err(AppError::Validation("No file was uploaded".to_string()))
}

/// Keep only the base name so uploads cannot escape the upload directory
fn sanitize_filename(raw: &str) -> Result<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or("").trim();

    if base.is_empty() || base == "." || base == ".." {
        return Err(AppError::Validation("No file selected".to_string()));
    }

    Ok(base.to_string())
}

async fn save_upload(dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(filename);
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/20240101.csv").unwrap(), "20240101.csv");
        assert_eq!(sanitize_filename("C:\\exports\\20240101.csv").unwrap(), "20240101.csv");
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("dir/..").is_err());
    }
}
