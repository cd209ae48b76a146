// src/crawl/queue.rs
//! Shared work queue for crawl workers.

use super::task::Task;
use crossbeam::deque::{Injector, Steal};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Tracks work queue completion state
#[derive(Debug, Default)]
struct WorkTracker {
    /// Number of tasks ever queued
    pending_work: AtomicUsize,
    /// Number of tasks finished, whatever their outcome
    completed_work: AtomicUsize,
}

impl WorkTracker {
    fn add_pending(&self, count: usize) {
        self.pending_work.fetch_add(count, Ordering::SeqCst);
    }

    fn mark_completed(&self) {
        self.completed_work.fetch_add(1, Ordering::SeqCst);
    }

    fn has_pending_work(&self) -> bool {
        let pending = self.pending_work.load(Ordering::SeqCst);
        let completed = self.completed_work.load(Ordering::SeqCst);
        pending > completed
    }
}

/// Multi-producer, multi-consumer task queue.
///
/// Workers enqueue a task's children before marking the task completed, so
/// once `has_pending_work` turns false it stays false.
#[derive(Debug, Default)]
pub struct WorkQueue {
    injector: Injector<Task>,
    tracker: WorkTracker,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, task: Task) {
        self.tracker.add_pending(1);
        self.injector.push(task);
    }

    pub fn enqueue_multiple(&self, tasks: Vec<Task>) {
        self.tracker.add_pending(tasks.len());
        for task in tasks {
            self.injector.push(task);
        }
    }

    pub fn dequeue(&self) -> Option<Task> {
        loop {
            match self.injector.steal() {
                Steal::Success(task) => return Some(task),
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }

    /// Queued or in flight.
    pub fn has_pending_work(&self) -> bool {
        self.tracker.has_pending_work()
    }

    pub fn mark_completed(&self) {
        self.tracker.mark_completed();
    }

    /// Total tasks ever enqueued.
    pub fn enqueued_total(&self) -> usize {
        self.tracker.pending_work.load(Ordering::SeqCst)
    }

    /// Removes everything still queued, for a cancelled run.
    pub fn drain(&self) -> Vec<Task> {
        std::iter::from_fn(|| self.dequeue()).collect()
    }
}
