//! Companies suspended for more than six months. The exchange publishes them
//! as a spreadsheet linked from a listing page; a record for one of these
//! companies carries the list's suspension date and a fixed reason.

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{Data, DataType, Range, Reader, Xlsx};
use chrono::NaiveDate;
use regex::Regex;
use reqwest::{Client, Response};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::SourceSettings;
use crate::error::EnrichError;
use crate::models::SuspensionRecord;
use crate::parser::DateScanner;
use crate::retry::{with_retry, RetryConfig};

pub const LONG_SUSPENSION_REASON: &str = "Suspend more than 6 month";

const CODE_COLUMN: &str = "Kode";
const DATE_COLUMN: &str = "Tanggal Suspensi";

/// Suspension start per ticker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LongSuspensions {
    since: HashMap<String, NaiveDate>,
}

impl LongSuspensions {
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, NaiveDate)>,
    {
        Self {
            since: entries.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.since.len()
    }

    pub fn is_empty(&self) -> bool {
        self.since.is_empty()
    }

    /// Rekeys the list so it matches tickers carrying `suffix`.
    pub fn with_suffix(self, suffix: &str) -> Self {
        if suffix.is_empty() {
            return self;
        }
        Self::from_entries(self.since.into_iter().map(|(code, date)| {
            if code.ends_with(suffix) {
                (code, date)
            } else {
                (format!("{code}{suffix}"), date)
            }
        }))
    }

    /// Overwrites date and reason when the record's ticker is listed.
    pub fn apply(&self, record: &mut SuspensionRecord) -> bool {
        let Some(since) = record.symbol.as_deref().and_then(|symbol| self.since.get(symbol)) else {
            return false;
        };
        record.suspension_date = Some(*since);
        record.reason = Some(LONG_SUSPENSION_REASON.to_string());
        true
    }
}

pub struct LongSuspensionLoader {
    client: Client,
    page_url: Url,
    retry: RetryConfig,
    link: Regex,
    dates: DateScanner,
}

impl LongSuspensionLoader {
    pub fn new(client: Client, settings: &SourceSettings, retry: RetryConfig) -> Result<Self, EnrichError> {
        Ok(Self {
            client,
            page_url: Url::parse(&settings.base_url)?.join(&settings.long_suspension_path)?,
            retry,
            link: Regex::new(r#"(?i)href\s*=\s*["']([^"']+\.xlsx)["']"#)?,
            dates: DateScanner::new()?,
        })
    }

    pub async fn load(&self) -> Result<LongSuspensions, EnrichError> {
        let page = with_retry(&self.retry, || self.get_text(&self.page_url)).await?;
        let workbook_url = self.workbook_link(&page)?;
        debug!(url = %workbook_url, "downloading long-suspension workbook");

        let bytes = with_retry(&self.retry, || self.get_bytes(&workbook_url)).await?;
        let suspensions = self.read_workbook(bytes)?;
        info!(url = %workbook_url, companies = suspensions.len(), "loaded long-suspension list");
        Ok(suspensions)
    }

    /// Like [`load`](Self::load), but an unavailable list only means no
    /// record is enriched.
    pub async fn load_or_empty(&self) -> LongSuspensions {
        match self.load().await {
            Ok(suspensions) => suspensions,
            Err(error) => {
                warn!(error = %error, page = %self.page_url, "long-suspension list unavailable, continuing without it");
                LongSuspensions::default()
            }
        }
    }

    async fn get(&self, url: &Url) -> Result<Response, EnrichError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|error| EnrichError::Connection(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn get_text(&self, url: &Url) -> Result<String, EnrichError> {
        self.get(url)
            .await?
            .text()
            .await
            .map_err(|error| EnrichError::Connection(error.to_string()))
    }

    async fn get_bytes(&self, url: &Url) -> Result<Vec<u8>, EnrichError> {
        let bytes = self
            .get(url)
            .await?
            .bytes()
            .await
            .map_err(|error| EnrichError::Connection(error.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn workbook_link(&self, page: &str) -> Result<Url, EnrichError> {
        let href = self
            .link
            .captures(page)
            .and_then(|captures| captures.get(1))
            .ok_or_else(|| EnrichError::MissingLink(self.page_url.to_string()))?;
        Ok(self.page_url.join(href.as_str().trim())?)
    }

    fn read_workbook(&self, bytes: Vec<u8>) -> Result<LongSuspensions, EnrichError> {
        let mut workbook =
            Xlsx::new(Cursor::new(bytes)).map_err(|error| EnrichError::Workbook(error.to_string()))?;
        let sheet = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| EnrichError::Workbook("no worksheet".to_string()))?
            .map_err(|error| EnrichError::Workbook(error.to_string()))?;
        self.read_rows(&sheet)
    }

    /// The header row is the first one naming both columns; rows above it
    /// are titles.
    fn read_rows(&self, sheet: &Range<Data>) -> Result<LongSuspensions, EnrichError> {
        let mut rows = sheet.rows();
        let (code_column, date_column) = rows
            .by_ref()
            .find_map(|row| {
                let column = |name: &str| {
                    row.iter()
                        .position(|cell| cell.to_string().trim().eq_ignore_ascii_case(name))
                };
                Some((column(CODE_COLUMN)?, column(DATE_COLUMN)?))
            })
            .ok_or(EnrichError::MissingColumns)?;

        let mut since = HashMap::new();
        for row in rows {
            let Some(code) = row
                .get(code_column)
                .map(|cell| cell.to_string().trim().to_uppercase())
                .filter(|code| !code.is_empty())
            else {
                continue;
            };
            match row.get(date_column).and_then(|cell| self.cell_date(cell)) {
                Some(date) => {
                    since.insert(code, date);
                }
                None => debug!(%code, "long-suspension row without a readable date, skipped"),
            }
        }

        Ok(LongSuspensions { since })
    }

    /// Spreadsheet dates first, then text such as `1 Juni 2023`.
    fn cell_date(&self, cell: &Data) -> Option<NaiveDate> {
        cell.as_date()
            .or_else(|| self.dates.first(&cell.to_string()).map(|(date, _)| date))
    }
}
