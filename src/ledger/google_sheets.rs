use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use super::{LedgerError, LedgerResult, Row, SheetBackend};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const TOKEN_LIFETIME_SECS: i64 = 3600;
/// Refresh the access token this long before it expires
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// The fields of a Google service-account key file that are needed here
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

/// Sheets v4 REST backend authenticated with a service account
pub struct GoogleSheetsBackend {
    client: Client,
    key: ServiceAccountKey,
    spreadsheet_id: String,
    token: Mutex<Option<AccessToken>>,
}

impl GoogleSheetsBackend {
    pub fn new(key: ServiceAccountKey, spreadsheet_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            key,
            spreadsheet_id: spreadsheet_id.into(),
            token: Mutex::new(None),
        }
    }

    /// Load the service-account key from a JSON key file
    pub fn from_credentials_file(
        path: &Path,
        spreadsheet_id: impl Into<String>,
    ) -> LedgerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LedgerError::Credentials(format!("cannot read {}: {}", path.display(), e))
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&content).map_err(|e| {
            LedgerError::Credentials(format!("invalid key file {}: {}", path.display(), e))
        })?;

        Ok(Self::new(key, spreadsheet_id))
    }

    async fn access_token(&self) -> LedgerResult<String> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(token.value.clone());
            }
        }

        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &signing_key)?;

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;
        let token: TokenResponse = check(response).await?.json().await?;

        tracing::debug!("Obtained Sheets access token for {}", self.key.client_email);

        let value = token.access_token.clone();
        *cached = Some(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });

        Ok(value)
    }

    /// `spreadsheets/{id}` followed by the given path segments
    fn url(&self, segments: &[&str]) -> LedgerResult<Url> {
        spreadsheet_url(SHEETS_API, &self.spreadsheet_id, segments)
    }

    async fn sheet_id(&self, sheet: &str, token: &str) -> LedgerResult<i64> {
        let url = self.url(&[])?;
        let response = self
            .client
            .get(url)
            .query(&[("fields", "sheets.properties(sheetId,title)")])
            .bearer_auth(token)
            .send()
            .await?;
        let meta: SpreadsheetMeta = check(response).await?.json().await?;

        meta.sheets
            .into_iter()
            .find(|s| s.properties.title == sheet)
            .map(|s| s.properties.sheet_id)
            .ok_or_else(|| LedgerError::SheetNotFound(sheet.to_string()))
    }
}

#[async_trait]
impl SheetBackend for GoogleSheetsBackend {
    async fn read_rows(&self, sheet: &str) -> LedgerResult<Vec<Row>> {
        let token = self.access_token().await?;
        let url = self.url(&["values", quoted(sheet).as_str()])?;

        let response = self.client.get(url).bearer_auth(&token).send().await?;
        let range: ValueRange = check(response).await?.json().await?;

        Ok(data_rows(range.values))
    }

    async fn append_rows(&self, sheet: &str, rows: Vec<Row>) -> LedgerResult<()> {
        let token = self.access_token().await?;
        let url = self.url(&["values", format!("{}!A1:append", quoted(sheet)).as_str()])?;

        let response = self
            .client
            .post(url)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .bearer_auth(&token)
            .json(&json!({ "values": rows }))
            .send()
            .await?;
        check(response).await?;

        Ok(())
    }

    async fn update_row(&self, sheet: &str, index: usize, row: Row) -> LedgerResult<()> {
        let token = self.access_token().await?;
        let url = self.url(&["values", a1_row_range(sheet, index).as_str()])?;

        let response = self
            .client
            .put(url)
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(&token)
            .json(&json!({ "values": [row] }))
            .send()
            .await?;
        check(response).await?;

        Ok(())
    }

    async fn delete_rows(&self, sheet: &str, indexes: &[usize]) -> LedgerResult<()> {
        if indexes.is_empty() {
            return Ok(());
        }

        let token = self.access_token().await?;
        let sheet_id = self.sheet_id(sheet, &token).await?;
        let url = self.url(&[])?;
        // `{id}:batchUpdate` is a single path segment
        let url = Url::parse(&format!("{}:batchUpdate", url))
            .map_err(|e| LedgerError::InvalidUrl(format!("{}:batchUpdate: {}", url, e)))?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&token)
            .json(&delete_requests(sheet_id, indexes))
            .send()
            .await?;
        check(response).await?;

        Ok(())
    }
}

async fn check(response: Response) -> LedgerResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(LedgerError::Api {
        status: status.as_u16(),
        message,
    })
}

fn quoted(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

/// A1 range of one data row; sheet row 1 holds the column labels
fn a1_row_range(sheet: &str, index: usize) -> String {
    format!("{}!A{}", quoted(sheet), index + 2)
}

/// Drop the label row
fn data_rows(values: Vec<Vec<String>>) -> Vec<Row> {
    values.into_iter().skip(1).collect()
}

/// One deleteDimension request per row, highest row first
fn delete_requests(sheet_id: i64, indexes: &[usize]) -> Value {
    let mut ordered = indexes.to_vec();
    ordered.sort_unstable_by(|a, b| b.cmp(a));
    ordered.dedup();

    let requests: Vec<Value> = ordered
        .into_iter()
        .map(|index| {
            json!({
                "deleteDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "ROWS",
                        "startIndex": index + 1,
                        "endIndex": index + 2,
                    }
                }
            })
        })
        .collect();

    json!({ "requests": requests })
}

fn spreadsheet_url(base: &str, spreadsheet_id: &str, segments: &[&str]) -> LedgerResult<Url> {
    let mut url =
        Url::parse(base).map_err(|e| LedgerError::InvalidUrl(format!("{}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| LedgerError::InvalidUrl(format!("{} cannot be a base", base)))?
        .push(spreadsheet_id)
        .extend(segments);
    Ok(url)
}
