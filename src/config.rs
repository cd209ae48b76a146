// src/config.rs
use crate::api::client::ClientSettings;
use crate::constants::{
    DEFAULT_API_BASE_URL, DEFAULT_BASE_DELAY, DEFAULT_CANCEL_GRACE, DEFAULT_COURSE_PAGE_SIZE,
    DEFAULT_MAX_DELAY, DEFAULT_REQUESTS_PER_SECOND, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRY_LIMIT,
    MAX_CONCURRENCY,
};
use crate::error::AppError;
use crate::error_recovery::RetryPolicy;
use crate::pipeline::PipelineSettings;
use crate::types::{ApiBaseUrl, ApiToken, ValidationError};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the API token.
pub const API_TOKEN_ENV: &str = "GRADIENT_API_TOKEN";

/// Parsed command-line input.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineInput {
    #[command(subcommand)]
    pub command: Command,

    /// SQLite database holding the catalog
    #[arg(long, global = true, env = "CATALOG_DB", default_value = "catalog.db")]
    pub store: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Crawl the whole catalog into the store
    Crawl(CrawlArgs),
    /// Print row counts of the store
    Stats,
    /// Dump the store as JSON
    Export {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CrawlArgs {
    /// Base URL of the catalog API
    #[arg(long, env = "API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    pub api_base_url: String,

    /// Number of concurrent workers (default: auto, max 32)
    #[arg(long, env = "MAX_WORKERS")]
    pub concurrency: Option<usize>,

    /// Attempts per request, the first one included
    #[arg(long, default_value_t = DEFAULT_RETRY_LIMIT)]
    pub retry_limit: u32,

    /// Backoff before the first retry, in milliseconds
    #[arg(long, default_value_t = DEFAULT_BASE_DELAY.as_millis() as u64)]
    pub base_delay_ms: u64,

    /// Upper bound of a single backoff, in milliseconds
    #[arg(long, default_value_t = DEFAULT_MAX_DELAY.as_millis() as u64)]
    pub max_delay_ms: u64,

    /// Requests per second across all workers (0 = unpaced)
    #[arg(long, env = "RATE_LIMIT", default_value_t = DEFAULT_REQUESTS_PER_SECOND)]
    pub rate_limit: u32,

    /// Courses requested from the listing endpoint
    #[arg(long, default_value_t = DEFAULT_COURSE_PAGE_SIZE)]
    pub page_size: u32,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs())]
    pub timeout_secs: u64,

    /// Seconds in-flight tasks may run after Ctrl-C
    #[arg(long, default_value_t = DEFAULT_CANCEL_GRACE.as_secs())]
    pub grace_secs: u64,
}

/// Resolved crawl configuration, validated and ready to build a run.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub api_token: ApiToken,
    pub api_base_url: ApiBaseUrl,
    pub store_path: PathBuf,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub requests_per_second: u32,
    pub course_page_size: u32,
    pub request_timeout: Duration,
    pub cancel_grace: Duration,
}

impl CrawlConfig {
    /// Resolves the crawl configuration from CLI input and environment.
    pub fn resolve(args: CrawlArgs, store_path: PathBuf) -> Result<Self, AppError> {
        let token = std::env::var(API_TOKEN_ENV).map_err(|_| {
            AppError::MissingConfiguration(format!("{} environment variable not set", API_TOKEN_ENV))
        })?;
        Self::from_args(args, store_path, token)
    }

    pub fn from_args(
        args: CrawlArgs,
        store_path: PathBuf,
        token: impl Into<String>,
    ) -> Result<Self, AppError> {
        let api_token = ApiToken::new(token)?;
        let api_base_url = ApiBaseUrl::parse(&args.api_base_url)?;

        let concurrency = match args.concurrency {
            Some(0) => {
                return Err(out_of_bounds("concurrency", 0, 1, MAX_CONCURRENCY as u64));
            }
            Some(n) if n > MAX_CONCURRENCY => {
                log::warn!(
                    "Concurrency {} exceeds the maximum, using {}",
                    n,
                    MAX_CONCURRENCY
                );
                MAX_CONCURRENCY
            }
            Some(n) => n,
            None => num_cpus::get().clamp(2, 8),
        };

        if args.retry_limit == 0 {
            return Err(out_of_bounds("retry_limit", 0, 1, 100));
        }
        if args.page_size == 0 {
            return Err(out_of_bounds("page_size", 0, 1, 1000));
        }
        if args.timeout_secs == 0 {
            return Err(out_of_bounds("timeout_secs", 0, 1, 3600));
        }
        if args.base_delay_ms > args.max_delay_ms {
            return Err(ValidationError::InconsistentDelays {
                base_ms: args.base_delay_ms,
                max_ms: args.max_delay_ms,
            }
            .into());
        }

        Ok(Self {
            api_token,
            api_base_url,
            store_path,
            concurrency,
            retry: RetryPolicy {
                max_attempts: args.retry_limit,
                base_delay: Duration::from_millis(args.base_delay_ms),
                max_delay: Duration::from_millis(args.max_delay_ms),
            },
            requests_per_second: args.rate_limit,
            course_page_size: args.page_size,
            request_timeout: Duration::from_secs(args.timeout_secs),
            cancel_grace: Duration::from_secs(args.grace_secs),
        })
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            base_url: self.api_base_url.clone(),
            retry: self.retry,
            requests_per_second: self.requests_per_second,
            timeout: self.request_timeout,
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            concurrency: self.concurrency,
            course_page_size: self.course_page_size,
            cancel_grace: self.cancel_grace,
        }
    }
}

fn out_of_bounds(field: &'static str, value: u64, min: u64, max: u64) -> AppError {
    ValidationError::OutOfBounds {
        field,
        value,
        min,
        max,
    }
    .into()
}
