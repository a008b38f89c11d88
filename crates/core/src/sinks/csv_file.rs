use crate::error::SinkError;
use crate::models::SuspensionRecord;
use crate::traits::RecordSink;
use async_trait::async_trait;
use csv::{Writer, WriterBuilder};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const FALLBACK_HEADER: [&str; 4] = ["symbol", "suspension_date", "reason", "pdf_url"];

/// Appends records to a CSV file for manual review. The header is written
/// only when the file is new or empty, so reruns keep adding rows under the
/// same header.
pub struct CsvFallbackSink {
    path: PathBuf,
    writer: Writer<File>,
    rows_written: usize,
}

impl CsvFallbackSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            writer.write_record(FALLBACK_HEADER)?;
            writer.flush()?;
        }

        debug!(path = %path.display(), new_file = needs_header, "opened fallback file");
        Ok(Self {
            path,
            writer,
            rows_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }
}

#[async_trait]
impl RecordSink for CsvFallbackSink {
    async fn write(&mut self, record: &SuspensionRecord) -> Result<(), SinkError> {
        let date = record
            .suspension_date
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        self.writer.write_record([
            record.symbol.as_deref().unwrap_or_default(),
            date.as_str(),
            record.reason.as_deref().unwrap_or_default(),
            record.pdf_url.as_str(),
        ])?;
        self.writer.flush()?;
        self.rows_written += 1;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        info!(path = %self.path.display(), rows = self.rows_written, "fallback file flushed");
        Ok(())
    }
}
