use crate::error::{PipelineError, SinkError};
use crate::lister::AnnouncementLister;
use crate::long_suspension::LongSuspensions;
use crate::models::{AnnouncementDescriptor, Classified, DateSource, RunReport, Stage, Verdict};
use crate::parser::FieldParser;
use crate::traits::{AnnouncementSource, DocumentExtractor, DocumentSource, RecordSink};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// A run that stopped early, with everything counted up to that point.
#[derive(Debug, Error)]
#[error("run aborted after {seen} announcements: {error}", seen = .report.seen)]
pub struct RunAborted {
    pub report: RunReport,
    #[source]
    pub error: PipelineError,
}

enum Outcome {
    /// Every record landed; `Incomplete` when any went to the fallback.
    Written(Verdict, usize),
    Failed(Stage, String),
    Fatal(Stage, PipelineError),
}

/// Drives each listed announcement through fetch, extract, parse and write,
/// one at a time in listing order.
pub struct SuspensionPipeline<F, X, R, B> {
    fetcher: F,
    extractor: X,
    parser: FieldParser,
    relational: R,
    fallback: B,
    long_suspensions: LongSuspensions,
}

impl<F, X, R, B> SuspensionPipeline<F, X, R, B>
where
    F: DocumentSource + Send + Sync,
    X: DocumentExtractor + Send + Sync,
    R: RecordSink + Send,
    B: RecordSink + Send,
{
    pub fn new(fetcher: F, extractor: X, parser: FieldParser, relational: R, fallback: B) -> Self {
        Self {
            fetcher,
            extractor,
            parser,
            relational,
            fallback,
            long_suspensions: LongSuspensions::default(),
        }
    }

    /// Records for companies on this list take its date and reason.
    pub fn with_long_suspensions(mut self, long_suspensions: LongSuspensions) -> Self {
        self.long_suspensions = long_suspensions;
        self
    }

    /// Processes every descriptor the lister yields. The fallback sink is
    /// flushed on every exit path, including an abort.
    pub async fn run<S>(&mut self, lister: &mut AnnouncementLister<S>) -> Result<RunReport, RunAborted>
    where
        S: AnnouncementSource + Send + Sync,
    {
        let (start, end) = lister.range();
        let span = info_span!("suspension_run", run_id = %Uuid::new_v4(), %start, %end);
        self.drive(lister).instrument(span).await
    }

    async fn drive<S>(&mut self, lister: &mut AnnouncementLister<S>) -> Result<RunReport, RunAborted>
    where
        S: AnnouncementSource + Send + Sync,
    {
        info!("run started");
        let mut report = RunReport::default();

        let aborted = loop {
            let descriptor = match lister.next().await {
                None => break None,
                Some(Ok(descriptor)) => descriptor,
                Some(Err(error)) => {
                    error!(error = %error, "listing failed");
                    break Some(PipelineError::Listing(error));
                }
            };
            report.seen += 1;

            match self.process(&descriptor).await {
                Outcome::Written(verdict, records) => report.record_written(verdict, records),
                Outcome::Failed(stage, reason) => {
                    warn!(
                        url = %descriptor.document_url,
                        announced_on = %descriptor.announced_on,
                        code = ?descriptor.listed_code,
                        %stage,
                        reason = %reason,
                        "announcement skipped"
                    );
                    report.record_failure(&descriptor, stage, reason);
                }
                Outcome::Fatal(stage, fatal) => {
                    error!(
                        url = %descriptor.document_url,
                        announced_on = %descriptor.announced_on,
                        %stage,
                        error = %fatal,
                        "fatal error, aborting run"
                    );
                    report.record_failure(&descriptor, stage, fatal.to_string());
                    break Some(fatal);
                }
            }
        };

        let flushed = self.fallback.flush().await;
        if let Err(error) = self.relational.flush().await {
            warn!(error = %error, "relational sink flush failed");
        }

        info!(
            seen = report.seen,
            written_complete = report.written_complete,
            written_incomplete = report.written_incomplete,
            failed = report.failed,
            records = report.records_written,
            aborted = aborted.is_some(),
            "run finished"
        );

        match (aborted, flushed) {
            (Some(error), flushed) => {
                if let Err(flush_error) = flushed {
                    error!(error = %flush_error, "fallback flush failed during abort");
                }
                Err(RunAborted { report, error })
            }
            (None, Err(flush_error)) => Err(RunAborted {
                report,
                error: PipelineError::FallbackSink(flush_error),
            }),
            (None, Ok(())) => Ok(report),
        }
    }

    async fn process(&mut self, descriptor: &AnnouncementDescriptor) -> Outcome {
        let document = match self.fetcher.fetch(descriptor).await {
            Ok(document) => document,
            Err(error) if error.is_fatal() => {
                return Outcome::Fatal(Stage::Fetch, PipelineError::TransportConfig(error.to_string()))
            }
            Err(error) => return Outcome::Failed(Stage::Fetch, error.to_string()),
        };

        let text = match self.extractor.extract(&document.bytes) {
            Ok(text) => text,
            Err(error) => {
                debug!(url = %descriptor.document_url, sha256 = %document.checksum, "extraction failed");
                return Outcome::Failed(Stage::Extract, error.to_string());
            }
        };

        let parsed = self.parser.parse_all(&text, descriptor);
        let mut verdict = Verdict::Complete;
        let mut failures: Vec<String> = Vec::new();

        for announcement in &parsed {
            if announcement.date_source == Some(DateSource::Announcement) {
                debug!(url = %descriptor.document_url, "suspension date taken from announcement date");
            }
            let mut record = announcement.record.clone();
            if self.long_suspensions.apply(&mut record) {
                debug!(url = %descriptor.document_url, symbol = ?record.symbol, "suspended for over six months");
            }
            let classified = self.parser.classify(record);
            match self.write(classified).await {
                Ok(Verdict::Complete) => {}
                Ok(Verdict::Incomplete) => verdict = Verdict::Incomplete,
                Err(Outcome::Failed(_, reason)) => failures.push(reason),
                Err(fatal) => return fatal,
            }
        }

        if failures.is_empty() {
            Outcome::Written(verdict, parsed.len())
        } else {
            Outcome::Failed(Stage::Write, failures.join("; "))
        }
    }

    /// Routes one record by its verdict. `Err` carries a failed or fatal
    /// outcome for the whole announcement.
    async fn write(&mut self, classified: Classified) -> Result<Verdict, Outcome> {
        match classified {
            Classified::Complete(record) => match self.relational.write(&record).await {
                Ok(()) => {
                    debug!(url = %record.pdf_url, symbol = ?record.symbol, "written to relational sink");
                    Ok(Verdict::Complete)
                }
                Err(error) if error.is_fatal() => Err(Outcome::Fatal(
                    Stage::Write,
                    PipelineError::RelationalSink(error),
                )),
                Err(error @ SinkError::ForeignKeyViolation { .. }) => Err(Outcome::Failed(
                    Stage::Write,
                    format!("{error}; add the company profile and rerun"),
                )),
                Err(error) => Err(Outcome::Failed(Stage::Write, error.to_string())),
            },
            Classified::Incomplete(record) => match self.fallback.write(&record).await {
                Ok(()) => {
                    info!(
                        url = %record.pdf_url,
                        symbol = ?record.symbol,
                        date = ?record.suspension_date,
                        has_reason = record.has_reason(),
                        "incomplete record written to fallback"
                    );
                    Ok(Verdict::Incomplete)
                }
                Err(error) => Err(Outcome::Fatal(Stage::Write, PipelineError::FallbackSink(error))),
            },
        }
    }
}
