use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use idx_suspension_core::{
    build_http_client, validate_range, AnnouncementLister, CsvFallbackSink, FieldParser,
    HttpDocumentFetcher, IdxAnnouncementClient, LongSuspensionLoader, LongSuspensions,
    LopdfExtractor, PostgrestSink, RunReport, Settings, SuspensionPipeline,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Collects stock-suspension announcements published between two dates and
/// stores the extracted records.
#[derive(Parser)]
#[command(name = "idx-suspension", version)]
struct Cli {
    /// First publication date to include, e.g. 2024-01-01
    start: NaiveDate,

    /// Last publication date to include
    end: NaiveDate,
}

fn print_report(report: &RunReport) {
    println!("announcements seen: {}", report.seen);
    println!("written to store:   {}", report.written_complete);
    println!("written to review:  {}", report.written_incomplete);
    println!("failed:             {}", report.failed);
    println!("rows written:       {}", report.records_written);
    for failure in &report.failures {
        println!(
            "  [{}] {} ({}): {}",
            failure.stage, failure.document_url, failure.announced_on, failure.reason
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    validate_range(cli.start, cli.end)?;

    let settings = Settings::from_env().context("loading settings")?;
    info!(
        start = %cli.start,
        end = %cli.end,
        proxied = settings.proxy.is_some(),
        fallback = %settings.fallback_path.display(),
        "starting"
    );

    let exchange_client = build_http_client(settings.proxy.as_deref(), settings.http_timeout)?;
    let store_client = build_http_client(None, settings.http_timeout)?;

    let long_suspensions = if settings.skip_long_suspensions {
        LongSuspensions::default()
    } else {
        LongSuspensionLoader::new(exchange_client.clone(), &settings.source, settings.retry.clone())?
            .load_or_empty()
            .await
    }
    .with_suffix(&settings.parser.symbol_suffix);

    let source = IdxAnnouncementClient::new(exchange_client.clone(), &settings.source)?;
    let mut lister = AnnouncementLister::new(
        source,
        &settings.source,
        settings.retry.clone(),
        cli.start,
        cli.end,
    )?;

    let fallback = CsvFallbackSink::open(&settings.fallback_path)
        .with_context(|| format!("opening {}", settings.fallback_path.display()))?;
    let parser = FieldParser::new(settings.parser.clone())?;
    let fetcher = HttpDocumentFetcher::new(exchange_client, settings.retry.clone());
    let store = PostgrestSink::new(store_client, settings.store, settings.retry);

    let mut pipeline = SuspensionPipeline::new(fetcher, LopdfExtractor, parser, store, fallback)
        .with_long_suspensions(long_suspensions);
    match pipeline.run(&mut lister).await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(aborted) => {
            print_report(&aborted.report);
            error!(error = %aborted.error, "run aborted");
            Err(aborted.into())
        }
    }
}
