use crate::config::StoreSettings;
use crate::error::SinkError;
use crate::models::SuspensionRecord;
use crate::retry::{with_retry, RetryConfig};
use crate::traits::RecordSink;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

const CONFLICT_TARGET: &str = "symbol,suspension_date";
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Debug, Serialize)]
struct SuspensionRow<'a> {
    symbol: &'a str,
    suspension_date: NaiveDate,
    reason: Option<&'a str>,
    pdf_url: &'a str,
}

/// PostgREST error payload; only `code` and `message` are used.
#[derive(Debug, Default, Deserialize)]
struct StoreErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Upserts complete records into the `idx_suspension` table over the
/// PostgREST interface. An existing row with the same symbol and date is
/// left untouched.
pub struct PostgrestSink {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    retry: RetryConfig,
}

impl PostgrestSink {
    pub fn new(client: Client, store: StoreSettings, retry: RetryConfig) -> Self {
        Self {
            client,
            endpoint: format!("{}/rest/v1/{}", store.url.trim_end_matches('/'), store.table),
            api_key: store.api_key,
            retry,
        }
    }

    async fn post_once(&self, row: &SuspensionRow<'_>) -> Result<(), SinkError> {
        let key = self.api_key.expose_secret();
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("on_conflict", CONFLICT_TARGET)])
            .header("apikey", key)
            .bearer_auth(key)
            .header("Prefer", "resolution=ignore-duplicates,return=minimal")
            .json(&[row])
            .send()
            .await
            .map_err(|error| SinkError::Connection(error.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SinkError::Unauthorized {
                    status: status.as_u16(),
                })
            }
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
                return Err(SinkError::Connection(status.to_string()))
            }
            status if status.is_server_error() => return Err(SinkError::Connection(status.to_string())),
            _ => {}
        }

        let text = response.text().await.unwrap_or_default();
        let body: StoreErrorBody = serde_json::from_str(&text).unwrap_or_default();
        if body.code.as_deref() == Some(FOREIGN_KEY_VIOLATION) {
            return Err(SinkError::ForeignKeyViolation {
                symbol: row.symbol.to_string(),
            });
        }

        Err(SinkError::Rejected {
            status: status.as_u16(),
            details: body.message.unwrap_or(text),
        })
    }
}

#[async_trait]
impl RecordSink for PostgrestSink {
    async fn write(&mut self, record: &SuspensionRecord) -> Result<(), SinkError> {
        let Some((symbol, suspension_date)) = record.natural_key() else {
            return Err(SinkError::IncompleteRecord {
                pdf_url: record.pdf_url.clone(),
            });
        };

        let row = SuspensionRow {
            symbol,
            suspension_date,
            reason: record.reason.as_deref(),
            pdf_url: &record.pdf_url,
        };

        with_retry(&self.retry, || self.post_once(&row)).await?;
        debug!(symbol, %suspension_date, "upserted suspension");
        Ok(())
    }
}
