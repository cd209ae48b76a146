// src/main.rs

use clap::Parser;
use course_crawler::config::{Command, CommandLineInput, CrawlArgs, CrawlConfig};
use course_crawler::crawl::{Outcome, ProgressEvent};
use course_crawler::error::AppError;
use course_crawler::pipeline::{self, RunSummary};
use course_crawler::store::SqliteCatalogStore;
use log::LevelFilter;
use log4rs::{
    append::console::ConsoleAppender,
    append::file::FileAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
    Config,
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Sets up logging configuration.
fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    let log_file_path = std::env::temp_dir().join("course_crawler.log");
    if let Some(parent) = log_file_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let pattern = if verbose {
        "{d(%Y-%m-%d %H:%M:%S)} [{l}] - {m}{n}"
    } else {
        "{m}{n}"
    };

    let stdout_appender = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build();

    let file_appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] {T} - {m}{n}",
        )))
        .build(&log_file_path)?;

    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout_appender)))
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(LevelFilter::Debug)))
                .build("file", Box::new(file_appender)),
        )
        .build(
            Root::builder()
                .appender("stdout")
                .appender("file")
                .build(log_level),
        )?;

    log4rs::init_config(config)?;
    log::info!("Logging initialized. Log file: {}", log_file_path.display());
    Ok(())
}

/// Crawls the catalog into the store until it drains or Ctrl-C arrives.
async fn execute_crawl(args: CrawlArgs, store_path: PathBuf) -> Result<RunSummary, AppError> {
    let config = CrawlConfig::resolve(args, store_path)?;

    // The crawl itself expects an existing schema.
    SqliteCatalogStore::open_or_create(&config.store_path)?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupt received, finishing in-flight tasks...");
            signal_token.cancel();
        }
    });

    let (sender, mut receiver) = mpsc::unbounded_channel::<ProgressEvent>();
    let reporter = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            log_progress(&event);
        }
    });

    let result = pipeline::run(&config, cancel, Some(sender)).await;
    let _ = reporter.await;
    result
}

fn log_progress(event: &ProgressEvent) {
    match &event.outcome {
        Outcome::Started => {
            log::debug!("{} {} started", event.task_kind, event.resource_id)
        }
        Outcome::Completed { persisted } => log::info!(
            "{} {} done, {} record(s)",
            event.task_kind,
            event.resource_id,
            persisted
        ),
        Outcome::Failed { reason } => {
            log::warn!("{} {} failed: {}", event.task_kind, event.resource_id, reason)
        }
        Outcome::Skipped => log::debug!("{} {} skipped", event.task_kind, event.resource_id),
    }
}

fn report_summary(summary: &RunSummary) {
    println!("{}", summary);
    for failure in &summary.failures {
        println!(
            "  ✗ {} {} ({}): {}",
            failure.task_kind, failure.resource_id, failure.endpoint, failure.error
        );
    }
}

async fn execute_stats(store_path: &Path) -> Result<(), AppError> {
    let store = SqliteCatalogStore::open(store_path)?;
    println!("{}", store.stats().await?);
    Ok(())
}

async fn execute_export(store_path: &Path, output: Option<PathBuf>) -> Result<(), AppError> {
    let store = SqliteCatalogStore::open(store_path)?;
    let export = store.export().await?;

    match output {
        Some(path) => {
            let file = fs::File::create(&path)?;
            serde_json::to_writer_pretty(std::io::BufWriter::new(file), &export)?;
            println!("✓ Catalog exported to {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer_pretty(&mut handle, &export)?;
            writeln!(handle)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CommandLineInput::parse();

    if let Err(err) = setup_logging(cli.verbose) {
        eprintln!("Failed to initialize logging: {}", err);
        return ExitCode::from(2);
    }

    let outcome = match cli.command {
        Command::Crawl(args) => match execute_crawl(args, cli.store).await {
            Ok(summary) => {
                report_summary(&summary);
                return if summary.is_success() {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::from(1)
                };
            }
            Err(AppError::RunAborted { reason, summary }) => {
                report_summary(&summary);
                eprintln!("Crawl aborted: {}", reason);
                return ExitCode::from(2);
            }
            Err(err) => Err(err),
        },
        Command::Stats => execute_stats(&cli.store).await,
        Command::Export { output } => execute_export(&cli.store, output).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            eprintln!("Error: {}", err);
            ExitCode::from(2)
        }
    }
}
