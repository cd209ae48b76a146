// src/crawl/worker.rs
//! Crawl workers: fetch, decode, claim, persist, expand.

use super::dedup::ClaimTracker;
use super::progress::{Outcome, ProgressReporter};
use super::queue::WorkQueue;
use super::task::{Task, TaskKind};
use crate::api::{decode_response, CatalogApi};
use crate::constants::IDLE_POLL_INTERVAL;
use crate::error::TaskError;
use crate::model::Entity;
use crate::store::CatalogStore;
use crate::types::{EntityKind, ResourceId};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A task that ended in an error, as reported in the run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub task_kind: TaskKind,
    pub resource_id: ResourceId,
    pub endpoint: String,
    pub error: String,
}

/// Running totals shared by every worker of a run.
#[derive(Debug, Default)]
pub struct Tally {
    pub fetched: usize,
    pub persisted: usize,
    pub duplicates: usize,
    pub failures: Vec<TaskFailure>,
    /// Set by the first store-level failure; the run is aborted.
    pub fatal: Option<String>,
}

/// State shared by the workers of one run.
pub struct CrawlContext {
    pub api: Arc<dyn CatalogApi>,
    pub store: Arc<dyn CatalogStore>,
    pub queue: WorkQueue,
    pub claims: ClaimTracker,
    pub progress: ProgressReporter,
    pub tally: Mutex<Tally>,
    pub cancel: CancellationToken,
}

/// What a successful task produced.
#[derive(Debug, Default)]
struct TaskOutput {
    persisted: usize,
    duplicates: usize,
    children: Vec<Task>,
}

/// Pulls tasks until the queue drains or the run is cancelled.
///
/// Cancellation is observed between tasks only; a task that has started
/// runs to completion unless the orchestrator aborts the worker.
pub async fn run_worker(ctx: Arc<CrawlContext>, worker_id: usize) {
    log::debug!("Worker {} started", worker_id);

    loop {
        if ctx.cancel.is_cancelled() {
            log::debug!("Worker {} observed cancellation", worker_id);
            break;
        }

        let task = match ctx.queue.dequeue() {
            Some(task) => task,
            None => {
                if !ctx.queue.has_pending_work() {
                    log::debug!("No pending work, worker {} exiting", worker_id);
                    break;
                }
                tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => continue,
                }
            }
        };

        log::debug!("Worker {} processing {}", worker_id, task);
        ctx.progress
            .emit(task.kind, &task.resource_id, Outcome::Started);

        match process_task(&ctx, &task).await {
            Ok(output) => {
                // Children go in before this task counts as completed.
                if !output.children.is_empty() {
                    log::debug!("Queueing {} child task(s) of {}", output.children.len(), task);
                    ctx.queue.enqueue_multiple(output.children);
                }
                {
                    let mut tally = ctx.tally.lock();
                    tally.fetched += 1;
                    tally.persisted += output.persisted;
                    tally.duplicates += output.duplicates;
                }
                ctx.progress.emit(
                    task.kind,
                    &task.resource_id,
                    Outcome::Completed {
                        persisted: output.persisted,
                    },
                );
            }
            Err(err) => {
                log::warn!("Task {} ({}) failed: {}", task, task.endpoint, err);
                let fatal = err.is_fatal();
                {
                    let mut tally = ctx.tally.lock();
                    tally.failures.push(TaskFailure {
                        task_kind: task.kind,
                        resource_id: task.resource_id.clone(),
                        endpoint: task.endpoint.to_string(),
                        error: err.to_string(),
                    });
                    if fatal && tally.fatal.is_none() {
                        tally.fatal = Some(err.to_string());
                    }
                }
                ctx.progress.emit(
                    task.kind,
                    &task.resource_id,
                    Outcome::Failed {
                        reason: err.to_string(),
                    },
                );
                if fatal {
                    log::error!("Store failure is not recoverable, stopping the run: {}", err);
                    ctx.cancel.cancel();
                }
            }
        }

        ctx.queue.mark_completed();
    }
}

async fn process_task(ctx: &CrawlContext, task: &Task) -> Result<TaskOutput, TaskError> {
    let payload = ctx.api.fetch(&task.endpoint).await?;
    let decoded = decode_response(task, &payload)?;

    let mut output = TaskOutput::default();
    let mut claimed = Vec::with_capacity(decoded.len());
    for entity in decoded.entities {
        let (kind, id) = (entity.kind(), entity.id());
        if task.is_subject(kind, id) || ctx.claims.try_claim(kind, id) {
            claimed.push(entity);
        } else {
            log::debug!("Skipping already claimed {} {}", kind, id);
            output.duplicates += 1;
        }
    }

    let mut children = child_tasks(task, &claimed);
    output.persisted = ctx.store.upsert_batch(claimed).await?;

    // Videos are not part of the subchapter payload; claim them only once
    // their subchapter is committed.
    children.retain(|child| {
        if child.kind != TaskKind::VideoDetail {
            return true;
        }
        let fresh = ctx.claims.try_claim(EntityKind::Video, &child.resource_id);
        if !fresh {
            log::debug!("Video {} already claimed", child.resource_id);
            output.duplicates += 1;
        }
        fresh
    });
    output.children = children;

    Ok(output)
}

/// Follow-up fetches for freshly claimed records.
fn child_tasks(task: &Task, claimed: &[Entity]) -> Vec<Task> {
    claimed
        .iter()
        .flat_map(|entity| -> Vec<Task> {
            match entity {
                Entity::Course(course) => vec![Task::course_content(&course.id, &course.slug)],
                Entity::Chapter(chapter) => match &task.course_slug {
                    Some(slug) => vec![Task::chapter_subchapters(
                        &chapter.id,
                        &chapter.course_id,
                        slug,
                    )],
                    None => Vec::new(),
                },
                Entity::Subchapter(subchapter) => match &task.course_slug {
                    Some(slug) => subchapter
                        .video_ids
                        .iter()
                        .map(|video_id| {
                            Task::video_detail(video_id, &subchapter.id, slug, &subchapter.slug)
                        })
                        .collect(),
                    None => Vec::new(),
                },
                Entity::Video(_) | Entity::RelatedResource(_) => Vec::new(),
            }
        })
        .collect()
}
