// src/crawl/progress.rs
//! Progress events for whoever renders the crawl.

use super::task::TaskKind;
use crate::types::ResourceId;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Started,
    /// `persisted` records were newly committed by the task.
    Completed { persisted: usize },
    Failed { reason: String },
    /// Never ran: the run was cancelled first.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub task_kind: TaskKind,
    pub resource_id: ResourceId,
    pub outcome: Outcome,
}

/// Optional event sink. Sending never blocks, and a dropped receiver is not
/// an error.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    sender: Option<UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    pub fn new(sender: Option<UnboundedSender<ProgressEvent>>) -> Self {
        Self { sender }
    }

    pub fn emit(&self, task_kind: TaskKind, resource_id: &ResourceId, outcome: Outcome) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(ProgressEvent {
                task_kind,
                resource_id: resource_id.clone(),
                outcome,
            });
        }
    }
}
