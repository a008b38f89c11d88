use crate::config::SourceSettings;
use crate::error::{ListError, PipelineError};
use crate::models::AnnouncementDescriptor;
use crate::retry::{with_retry, RetryConfig};
use crate::traits::AnnouncementSource;
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use serde_with::{serde_as, DefaultOnNull, NoneAsEmptyString};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, warn};
use url::Url;

const LISTING_PATH: &str = "/primary/NewsAnnouncement/GetSuspension";
/// Upper bound on pages per window in case upstream ignores paging.
const MAX_PAGES_PER_WINDOW: u32 = 200;

/// One listing row, with the document path already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub document_url: Option<String>,
    pub published_on: Option<NaiveDate>,
    pub code: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub entries: Vec<ListingEntry>,
    /// No further page exists for this window.
    pub is_last: bool,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct ListingResponse {
    #[serde(rename = "Results", default)]
    #[serde_as(as = "DefaultOnNull")]
    results: Vec<ListingRow>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct ListingRow {
    #[serde(rename = "Kode", default)]
    #[serde_as(as = "DefaultOnNull<NoneAsEmptyString>")]
    code: Option<String>,
    #[serde(rename = "Judul", default)]
    #[serde_as(as = "DefaultOnNull<NoneAsEmptyString>")]
    title: Option<String>,
    #[serde(rename = "Data_Download", default)]
    #[serde_as(as = "DefaultOnNull<NoneAsEmptyString>")]
    download_path: Option<String>,
    #[serde(rename = "Tanggal", default)]
    #[serde_as(as = "DefaultOnNull<NoneAsEmptyString>")]
    published: Option<String>,
}

/// Client for the exchange's suspension announcement index.
pub struct IdxAnnouncementClient {
    client: Client,
    base_url: Url,
    page_size: u32,
}

impl IdxAnnouncementClient {
    pub fn new(client: Client, settings: &SourceSettings) -> Result<Self, ListError> {
        Ok(Self {
            client,
            base_url: Url::parse(&settings.base_url)?,
            page_size: settings.page_size.max(1),
        })
    }

    fn listing_url(&self, from: NaiveDate, to: NaiveDate, page_index: u32) -> Result<Url, ListError> {
        let mut url = self.base_url.join(LISTING_PATH)?;
        url.query_pairs_mut()
            .append_pair("indexFrom", &(page_index + 1).to_string())
            .append_pair("pageSize", &self.page_size.to_string())
            .append_pair("dateFrom", &from.format("%Y%m%d").to_string())
            .append_pair("dateTo", &to.format("%Y%m%d").to_string())
            .append_pair("lang", "en")
            .append_pair("type", "spt");
        Ok(url)
    }

    /// Document paths come back relative to the site root.
    pub fn resolve_document_url(&self, path: &str) -> Option<String> {
        self.base_url.join(path.trim()).ok().map(String::from)
    }
}

#[async_trait]
impl AnnouncementSource for IdxAnnouncementClient {
    async fn list_window(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        page_index: u32,
    ) -> Result<ListingPage, ListError> {
        let url = self.listing_url(from, to, page_index)?;
        debug!(url = %url, "querying announcement index");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| ListError::Connection(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ListError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|error| ListError::Connection(error.to_string()))?;
        let parsed: ListingResponse =
            serde_json::from_str(&body).map_err(|error| ListError::Decode(error.to_string()))?;

        let is_last = parsed.results.len() < self.page_size as usize;
        let entries = parsed
            .results
            .into_iter()
            .map(|row| ListingEntry {
                document_url: row
                    .download_path
                    .as_deref()
                    .and_then(|path| self.resolve_document_url(path)),
                published_on: row.published.as_deref().and_then(parse_published_date),
                code: row.code.map(|code| code.trim().to_uppercase()),
                title: row.title,
            })
            .collect();

        Ok(ListingPage { entries, is_last })
    }
}

/// Accepts `YYYY-MM-DD` with an optional time suffix.
fn parse_published_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

pub fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<(), PipelineError> {
    if start > end {
        return Err(PipelineError::InvalidRange { start, end });
    }
    Ok(())
}

/// Lazy, ordered walk over every announcement in an inclusive date range.
///
/// The range is split into windows that are only queried once the previous
/// window has been drained, so a run that aborts early never asks upstream
/// for dates it will not process.
pub struct AnnouncementLister<S> {
    source: S,
    retry: RetryConfig,
    window_days: u32,
    start: NaiveDate,
    end: NaiveDate,
    next_window_start: Option<NaiveDate>,
    buffered: VecDeque<AnnouncementDescriptor>,
}

impl<S> AnnouncementLister<S>
where
    S: AnnouncementSource + Send + Sync,
{
    pub fn new(
        source: S,
        settings: &SourceSettings,
        retry: RetryConfig,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, PipelineError> {
        validate_range(start, end)?;
        Ok(Self {
            source,
            retry,
            window_days: settings.window_days.max(1),
            start,
            end,
            next_window_start: Some(start),
            buffered: VecDeque::new(),
        })
    }

    pub fn range(&self) -> (NaiveDate, NaiveDate) {
        (self.start, self.end)
    }

    /// Next descriptor, or `None` once the range is exhausted. After an error
    /// the sequence is finished.
    pub async fn next(&mut self) -> Option<Result<AnnouncementDescriptor, ListError>> {
        loop {
            if let Some(descriptor) = self.buffered.pop_front() {
                return Some(Ok(descriptor));
            }

            let (from, to) = self.advance_window()?;
            match self.load_window(from, to).await {
                Ok(descriptors) => self.buffered.extend(descriptors),
                Err(error) => {
                    self.next_window_start = None;
                    return Some(Err(error));
                }
            }
        }
    }

    fn advance_window(&mut self) -> Option<(NaiveDate, NaiveDate)> {
        let from = self.next_window_start?;
        let to = from
            .checked_add_days(Days::new(u64::from(self.window_days - 1)))
            .map_or(self.end, |candidate| candidate.min(self.end));

        self.next_window_start = if to < self.end { to.succ_opt() } else { None };
        Some((from, to))
    }

    async fn load_window(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AnnouncementDescriptor>, ListError> {
        let mut descriptors = Vec::new();
        let mut seen_urls = HashSet::new();

        for page_index in 0..MAX_PAGES_PER_WINDOW {
            let page = with_retry(&self.retry, || self.source.list_window(from, to, page_index)).await?;
            if page.entries.is_empty() {
                break;
            }
            // Any row not met before on this window, kept or filtered, means
            // the upstream is still paging.
            let mut progressed = false;

            for entry in page.entries {
                let Some(document_url) = entry.document_url else {
                    progressed = true;
                    warn!(%from, %to, code = ?entry.code, "listing row without document link, skipped");
                    continue;
                };
                if !seen_urls.insert(document_url.clone()) {
                    continue;
                }
                progressed = true;

                let announced_on = entry.published_on.unwrap_or(from);
                if announced_on < from || announced_on > to {
                    debug!(url = %document_url, %announced_on, "row outside its window, skipped");
                    continue;
                }

                descriptors.push(AnnouncementDescriptor {
                    document_url,
                    announced_on,
                    listed_code: entry.code.filter(|code| !code.is_empty()),
                    title: entry.title,
                });
            }

            if page.is_last || !progressed {
                debug!(%from, %to, page_index, "listing window exhausted");
                break;
            }
        }

        // Stable: equal dates keep upstream publication order.
        descriptors.sort_by_key(|descriptor| descriptor.announced_on);

        info!(%from, %to, count = descriptors.len(), "listed announcement window");
        Ok(descriptors)
    }
}
