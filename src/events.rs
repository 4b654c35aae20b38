//! Status and log sinks for job workers
//!
//! A worker never touches the registry directly. It reports through an
//! [`EventSink`] and reads its externally controlled status through a
//! [`StatusSource`], both of which [`RegistrySink`] implements on top of the
//! shared registry.

use crate::job::JobStatus;
use crate::registry::JobRegistry;
use crate::store::JobStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Something a job reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// Status transition with its message
    Status { status: JobStatus, message: String },
    /// Operator log line
    Log(String),
}

/// Receiver of a job's status transitions and log lines
pub trait EventSink: Send + Sync {
    /// Returns `false` when the job had already finished and the transition was dropped
    fn on_status(&self, status: JobStatus, message: &str) -> bool;
    fn on_log(&self, line: &str);
}

/// Read accessor for the externally set status of a job
pub trait StatusSource: Send + Sync {
    /// `None` once the job is gone from the registry
    fn current_status(&self) -> Option<JobStatus>;
}

/// Callback receiving every event of every job, with the job id
pub type Observer = Arc<dyn Fn(&str, &JobEvent) + Send + Sync>;

/// Registry-backed sink for one job
///
/// Status transitions are persisted to the job store (when one is
/// configured) and every event is mirrored to `tracing` and to the optional
/// observer.
#[derive(Clone)]
pub struct RegistrySink {
    job_id: String,
    registry: JobRegistry,
    store: Option<Arc<JobStore>>,
    observer: Option<Observer>,
}

impl RegistrySink {
    pub fn new(
        job_id: impl Into<String>,
        registry: JobRegistry,
        store: Option<Arc<JobStore>>,
        observer: Option<Observer>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            registry,
            store,
            observer,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    fn notify(&self, event: JobEvent) {
        if let Some(observer) = &self.observer {
            observer(&self.job_id, &event);
        }
    }
}

impl EventSink for RegistrySink {
    fn on_status(&self, status: JobStatus, message: &str) -> bool {
        if !self.registry.transition(&self.job_id, status, message) {
            warn!(job_id = %self.job_id, %status, "Ignoring transition of finished job");
            return false;
        }
        info!(job_id = %self.job_id, %status, "{}", message);

        if let Some(store) = &self.store {
            persist_active_jobs(&self.registry, store);
        }

        self.notify(JobEvent::Status {
            status,
            message: message.to_string(),
        });
        true
    }

    fn on_log(&self, line: &str) {
        self.registry.append_log(&self.job_id, line);
        info!(job_id = %self.job_id, "{}", line);
        self.notify(JobEvent::Log(line.to_string()));
    }
}

impl StatusSource for RegistrySink {
    fn current_status(&self) -> Option<JobStatus> {
        self.registry.status(&self.job_id)
    }
}

/// Writes the registry's active jobs to the store, logging failures
///
/// Runs inline on the calling thread so saves land in transition order. Only
/// the requests and statuses of active jobs are written, never their logs,
/// so the file stays a few hundred bytes per job.
pub fn persist_active_jobs(registry: &JobRegistry, store: &JobStore) {
    if let Err(e) = store.save(&registry.active_snapshots()) {
        warn!(error = %e, "Failed to persist active jobs");
    }
}
