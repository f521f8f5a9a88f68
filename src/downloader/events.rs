use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;

use super::JobId;

/// Normalized progress signal produced by a translator.
///
/// A job's event sequence contains exactly one `Finished` or `Failed`,
/// always last. `Progress` and `Stage` may occur any number of times;
/// fractions should be non-decreasing but the tools give no guarantee.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum ProgressEvent {
    Progress { fraction: f32 },
    /// Coarse milestone for output the translator cannot turn into a
    /// fraction.
    Stage { label: String },
    Finished {
        artist: String,
        title: String,
        /// Reserved; neither translator populates it today.
        cover: Option<PathBuf>,
    },
    Failed { message: String },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Finished { .. } | ProgressEvent::Failed { .. })
    }
}

/// Envelope crossing the worker/consumer boundary.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub job: JobId,
    pub event: ProgressEvent,
}

/// The worker-to-consumer delivery bridge.
///
/// An unbounded channel: sending never blocks a worker, and every emitted
/// event reaches the consumer as long as the receiver lives. Each worker
/// sends through its own cloned [`EventSender`], so events from one job
/// arrive in emission order; no ordering holds across jobs.
pub struct EventBus;

impl EventBus {
    pub fn channel() -> (EventSender, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSender { tx }, rx)
    }
}

#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<JobEvent>,
}

impl EventSender {
    /// Deliver one event. If the consumer has gone away (shutdown) the
    /// event is dropped silently apart from a debug log.
    pub fn send(&self, job: JobId, event: ProgressEvent) {
        if self.tx.send(JobEvent { job, event }).is_err() {
            log::debug!("Event consumer gone; dropping event for job {}", job);
        }
    }
}
