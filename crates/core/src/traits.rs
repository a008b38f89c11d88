use crate::error::{ExtractError, FetchError, ListError, SinkError};
use crate::fetcher::FetchedDocument;
use crate::lister::ListingPage;
use crate::models::{AnnouncementDescriptor, SuspensionRecord};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Upstream index of announcements, queried one date window page at a time.
#[async_trait]
pub trait AnnouncementSource {
    async fn list_window(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        page_index: u32,
    ) -> Result<ListingPage, ListError>;
}

#[async_trait]
pub trait DocumentSource {
    async fn fetch(&self, descriptor: &AnnouncementDescriptor) -> Result<FetchedDocument, FetchError>;
}

pub trait DocumentExtractor {
    /// Plain text with line breaks preserved.
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError>;
}

#[async_trait]
pub trait RecordSink {
    async fn write(&mut self, record: &SuspensionRecord) -> Result<(), SinkError>;

    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
