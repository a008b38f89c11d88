use chrono::NaiveDate;
use thiserror::Error;

use crate::retry::Retryable;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {details}")]
    Invalid { key: &'static str, details: String },
}

#[derive(Debug, Error)]
pub enum ListError {
    #[error("listing request failed: {0}")]
    Connection(String),

    #[error("listing endpoint answered {status}")]
    Status { status: u16 },

    #[error("could not decode listing response: {0}")]
    Decode(String),

    #[error("listing url error: {0}")]
    Url(#[from] url::ParseError),
}

impl Retryable for ListError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Status { status } => *status >= 500 || *status == 429,
            Self::Decode(_) | Self::Url(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport misconfigured: {0}")]
    TransportConfig(String),

    #[error("document not found: {url}")]
    NotFound { url: String },

    #[error("connection to {url} failed: {details}")]
    Connection { url: String, details: String },

    #[error("{url} answered {status}")]
    Rejected { url: String, status: u16 },
}

impl FetchError {
    /// Every later fetch would fail the same way.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::TransportConfig(_))
    }
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("long-suspension request failed: {0}")]
    Connection(String),

    #[error("{url} answered {status}")]
    Status { url: String, status: u16 },

    #[error("no .xlsx link on {0}")]
    MissingLink(String),

    #[error("unreadable workbook: {0}")]
    Workbook(String),

    #[error("workbook has no Kode and Tanggal Suspensi columns")]
    MissingColumns,

    #[error("long-suspension url error: {0}")]
    Url(#[from] url::ParseError),

    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl Retryable for EnrichError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unreadable document: {0}")]
    Unreadable(String),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("symbol {symbol} has no company profile row")]
    ForeignKeyViolation { symbol: String },

    #[error("store connection failed: {0}")]
    Connection(String),

    #[error("store refused credentials ({status})")]
    Unauthorized { status: u16 },

    #[error("incomplete record for {pdf_url} cannot be upserted")]
    IncompleteRecord { pdf_url: String },

    #[error("store rejected record ({status}): {details}")]
    Rejected { status: u16, details: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SinkError {
    /// Errors after which no further record can be written to this sink.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Unauthorized { .. } | Self::Io(_) | Self::Csv(_)
        )
    }
}

impl Retryable for SinkError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport misconfigured: {0}")]
    TransportConfig(String),

    #[error("announcement listing failed: {0}")]
    Listing(#[from] ListError),

    #[error("relational sink unavailable: {0}")]
    RelationalSink(SinkError),

    #[error("fallback sink failed: {0}")]
    FallbackSink(SinkError),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
