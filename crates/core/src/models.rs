use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Reference to one announcement found by the lister, prior to download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementDescriptor {
    pub document_url: String,
    pub announced_on: NaiveDate,
    /// Ticker the listing attached to the announcement, if any.
    pub listed_code: Option<String>,
    pub title: Option<String>,
}

impl AnnouncementDescriptor {
    pub fn new(document_url: impl Into<String>, announced_on: NaiveDate) -> Self {
        Self {
            document_url: document_url.into(),
            announced_on,
            listed_code: None,
            title: None,
        }
    }

    /// The listing marks announcements naming several companies with
    /// `>1 kode` in place of a single ticker.
    pub fn covers_several_codes(&self) -> bool {
        [self.title.as_deref(), self.listed_code.as_deref()]
            .into_iter()
            .flatten()
            .any(|text| text.to_lowercase().contains(">1 kode"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspensionRecord {
    pub symbol: Option<String>,
    pub suspension_date: Option<NaiveDate>,
    pub reason: Option<String>,
    pub pdf_url: String,
}

impl SuspensionRecord {
    /// `(symbol, suspension_date)`, present only when both halves are.
    pub fn natural_key(&self) -> Option<(&str, NaiveDate)> {
        match (self.symbol.as_deref(), self.suspension_date) {
            (Some(symbol), Some(date)) if !symbol.is_empty() => Some((symbol, date)),
            _ => None,
        }
    }

    pub fn has_required_fields(&self) -> bool {
        self.natural_key().is_some() && !self.pdf_url.trim().is_empty()
    }

    pub fn has_reason(&self) -> bool {
        self.reason
            .as_deref()
            .is_some_and(|reason| !reason.trim().is_empty())
    }
}

/// Which rule filled `suspension_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateSource {
    Text,
    Announcement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAnnouncement {
    pub record: SuspensionRecord,
    pub date_source: Option<DateSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Complete,
    Incomplete,
}

/// A record tagged with its routing verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Complete(SuspensionRecord),
    Incomplete(SuspensionRecord),
}

impl Classified {
    pub fn verdict(&self) -> Verdict {
        match self {
            Self::Complete(_) => Verdict::Complete,
            Self::Incomplete(_) => Verdict::Incomplete,
        }
    }

    pub fn record(&self) -> &SuspensionRecord {
        match self {
            Self::Complete(record) | Self::Incomplete(record) => record,
        }
    }
}

/// Pipeline stage at which a descriptor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Fetch,
    Extract,
    Write,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Fetch => "fetch",
            Self::Extract => "extract",
            Self::Write => "write",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedDescriptor {
    pub document_url: String,
    pub announced_on: NaiveDate,
    pub stage: Stage,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub seen: usize,
    pub written_complete: usize,
    pub written_incomplete: usize,
    pub failed: usize,
    pub failures: Vec<FailedDescriptor>,
    /// Rows written by the announcements counted as written; above their
    /// count when an announcement names several companies.
    pub records_written: usize,
}

impl RunReport {
    pub fn record_written(&mut self, verdict: Verdict, records: usize) {
        self.records_written += records;
        match verdict {
            Verdict::Complete => self.written_complete += 1,
            Verdict::Incomplete => self.written_incomplete += 1,
        }
    }

    pub fn record_failure(&mut self, descriptor: &AnnouncementDescriptor, stage: Stage, reason: String) {
        self.failed += 1;
        self.failures.push(FailedDescriptor {
            document_url: descriptor.document_url.clone(),
            announced_on: descriptor.announced_on,
            stage,
            reason,
        });
    }

    /// Every seen descriptor ended in exactly one sink or one failure.
    pub fn is_balanced(&self) -> bool {
        self.seen == self.written_complete + self.written_incomplete + self.failed
    }
}
