pub mod config;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod lister;
pub mod long_suspension;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod retry;
pub mod sinks;
pub mod traits;

pub use config::{ParserSettings, Settings, SourceSettings, StoreSettings};
pub use error::{
    ConfigError, EnrichError, ExtractError, FetchError, ListError, PipelineError, SinkError,
};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText};
pub use fetcher::{build_http_client, FetchedDocument, HttpDocumentFetcher};
pub use lister::{validate_range, AnnouncementLister, IdxAnnouncementClient, ListingEntry, ListingPage};
pub use long_suspension::{LongSuspensionLoader, LongSuspensions, LONG_SUSPENSION_REASON};
pub use models::{
    AnnouncementDescriptor, Classified, DateSource, FailedDescriptor, ParsedAnnouncement,
    RunReport, Stage, SuspensionRecord, Verdict,
};
pub use orchestrator::{RunAborted, SuspensionPipeline};
pub use parser::{FieldParser, FieldRule, ParseInput};
pub use retry::{with_retry, RetryConfig, Retryable};
pub use sinks::{CsvFallbackSink, PostgrestSink};
pub use traits::{AnnouncementSource, DocumentExtractor, DocumentSource, RecordSink};
