// src/pipeline.rs
//! Crawl orchestration: seed the root listing, drive the workers to a
//! terminal state, summarize.

use crate::api::{CatalogApi, HttpCatalogClient};
use crate::config::CrawlConfig;
use crate::constants::{DEFAULT_CANCEL_GRACE, DEFAULT_COURSE_PAGE_SIZE, MAX_CONCURRENCY};
use crate::crawl::worker::run_worker;
use crate::crawl::{
    ClaimTracker, CrawlContext, Outcome, ProgressEvent, ProgressReporter, Task, TaskFailure,
    Tally, WorkQueue,
};
use crate::error::AppError;
use crate::store::{CatalogStore, SqliteCatalogStore};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The queue drained.
    Completed,
    /// Stopped by the caller's cancellation token.
    Cancelled,
    /// Stopped by a store-level failure.
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
            RunStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// Outcome counts of one run.
///
/// Every task ever enqueued ends up in exactly one of `fetched`, `failed`
/// or `skipped`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Tasks that completed successfully.
    pub fetched: usize,
    /// Records committed to the store.
    pub persisted: usize,
    pub failed: usize,
    /// Tasks that never ran or were aborted mid-flight.
    pub skipped: usize,
    /// Records dropped because another parent had already claimed them.
    pub duplicates: usize,
    pub failures: Vec<TaskFailure>,
    pub status: RunStatus,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn enqueued(&self) -> usize {
        self.fetched + self.failed + self.skipped
    }

    /// Completed with no failed task.
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed && self.failed == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Run {} {} in {:.1}s: {} fetched, {} persisted, {} failed, {} skipped, {} duplicate(s)",
            self.run_id,
            self.status,
            self.elapsed.as_secs_f64(),
            self.fetched,
            self.persisted,
            self.failed,
            self.skipped,
            self.duplicates
        )
    }
}

/// Knobs of the orchestrator itself.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Worker count; clamped to `1..=MAX_CONCURRENCY`.
    pub concurrency: usize,
    pub course_page_size: u32,
    /// How long in-flight tasks may finish after cancellation.
    pub cancel_grace: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            course_page_size: DEFAULT_COURSE_PAGE_SIZE,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }
}

/// Walks the whole catalog once and persists what it finds.
pub struct CatalogPipeline {
    api: Arc<dyn CatalogApi>,
    store: Arc<dyn CatalogStore>,
    settings: PipelineSettings,
    progress: ProgressReporter,
}

impl CatalogPipeline {
    pub fn new(
        api: Arc<dyn CatalogApi>,
        store: Arc<dyn CatalogStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            api,
            store,
            settings,
            progress: ProgressReporter::default(),
        }
    }

    /// Streams task events to `sender` while running.
    pub fn with_progress(mut self, sender: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = ProgressReporter::new(Some(sender));
        self
    }

    pub async fn run(&self) -> Result<RunSummary, AppError> {
        self.run_with_cancel(CancellationToken::new()).await
    }

    /// Runs until the queue drains or `cancel` fires.
    ///
    /// After cancellation, workers get `cancel_grace` to finish their current
    /// task before they are aborted; a partial summary is returned either
    /// way. A store-level failure ends the run with `AppError::RunAborted`.
    pub async fn run_with_cancel(
        &self,
        cancel: CancellationToken,
    ) -> Result<RunSummary, AppError> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let workers = self.settings.concurrency.clamp(1, MAX_CONCURRENCY);

        // A child token, so a store failure stops this run without touching
        // the caller's token.
        let ctx = Arc::new(CrawlContext {
            api: Arc::clone(&self.api),
            store: Arc::clone(&self.store),
            queue: WorkQueue::new(),
            claims: ClaimTracker::new(),
            progress: self.progress.clone(),
            tally: Mutex::new(Tally::default()),
            cancel: cancel.child_token(),
        });

        log::info!("Starting crawl run {} with {} worker(s)", run_id, workers);
        ctx.queue
            .enqueue(Task::list_courses(self.settings.course_page_size));

        let mut join_set = JoinSet::new();
        for worker_id in 0..workers {
            join_set.spawn(run_worker(Arc::clone(&ctx), worker_id));
        }

        self.drive(&ctx, &mut join_set).await;

        for task in ctx.queue.drain() {
            ctx.progress
                .emit(task.kind, &task.resource_id, Outcome::Skipped);
        }

        let enqueued = ctx.queue.enqueued_total();
        let tally = std::mem::take(&mut *ctx.tally.lock());
        let failed = tally.failures.len();
        let status = if tally.fatal.is_some() {
            RunStatus::Aborted
        } else if cancel.is_cancelled() {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };

        let summary = RunSummary {
            run_id,
            fetched: tally.fetched,
            persisted: tally.persisted,
            failed,
            skipped: enqueued.saturating_sub(tally.fetched + failed),
            duplicates: tally.duplicates,
            failures: tally.failures,
            status,
            elapsed: started.elapsed(),
        };
        log::info!("{}", summary);

        match tally.fatal {
            Some(reason) => Err(AppError::RunAborted {
                reason,
                summary: Box::new(summary),
            }),
            None => Ok(summary),
        }
    }

    /// Waits for the workers; once the run is cancelled, waits at most the
    /// grace period and aborts whatever is left.
    async fn drive(&self, ctx: &CrawlContext, join_set: &mut JoinSet<()>) {
        loop {
            tokio::select! {
                joined = join_set.join_next() => match joined {
                    None => return,
                    Some(Err(err)) if err.is_panic() => {
                        // Its in-flight task will never complete.
                        log::error!("Crawl worker panicked: {}", err);
                        ctx.tally
                            .lock()
                            .fatal
                            .get_or_insert_with(|| format!("crawl worker panicked: {}", err));
                        ctx.cancel.cancel();
                    }
                    Some(_) => {}
                },
                _ = ctx.cancel.cancelled() => break,
            }
        }

        if join_set.is_empty() {
            return;
        }

        log::warn!(
            "Crawl cancelled, giving {} worker(s) {:?} to finish",
            join_set.len(),
            self.settings.cancel_grace
        );
        let deadline = tokio::time::sleep(self.settings.cancel_grace);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = join_set.join_next() => {
                    if joined.is_none() {
                        return;
                    }
                }
                _ = &mut deadline => {
                    log::warn!("Grace period over, aborting {} worker(s)", join_set.len());
                    join_set.abort_all();
                    while join_set.join_next().await.is_some() {}
                    return;
                }
            }
        }
    }
}

/// Builds the HTTP client and the store from `config` and runs one crawl.
pub async fn run(
    config: &CrawlConfig,
    cancel: CancellationToken,
    progress: Option<UnboundedSender<ProgressEvent>>,
) -> Result<RunSummary, AppError> {
    let client = HttpCatalogClient::new(&config.api_token, config.client_settings())?;
    let store = SqliteCatalogStore::open(&config.store_path)?;

    let mut pipeline = CatalogPipeline::new(
        Arc::new(client),
        Arc::new(store),
        config.pipeline_settings(),
    );
    if let Some(sender) = progress {
        pipeline = pipeline.with_progress(sender);
    }
    pipeline.run_with_cancel(cancel).await
}
