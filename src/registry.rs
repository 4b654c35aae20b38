//! Process-wide job registry
//!
//! All job state lives behind one mutex. The lock is only held for short,
//! synchronous updates and never across an `.await`, so the worker always
//! reads the latest status written by pause/resume/cancel callers.

use crate::job::{JobSnapshot, JobState, JobStatus, LogSlice, SearchRequest};
use chrono::Local;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::debug;

/// Errors returned by job control operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No job with this id is registered
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    /// The requested action does not apply in the current status
    #[error("Cannot {action} job {id} while it is {status}")]
    InvalidTransition {
        id: String,
        action: &'static str,
        status: JobStatus,
    },
}

/// Result of registering a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// A new job entry was created and needs a worker
    Created { id: String, generation: u64 },
    /// A job with the same id is still running
    Existing(String),
}

impl Submission {
    pub fn id(&self) -> &str {
        match self {
            Submission::Created { id, .. } => id,
            Submission::Existing(id) => id,
        }
    }
}

/// Shared registry of job id to job state
#[derive(Debug, Clone)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<String, JobState>>>,
    log_capacity: usize,
}

impl JobRegistry {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            log_capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, JobState>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a request, unless a job with the same id is still active
    pub fn submit(&self, request: SearchRequest) -> Submission {
        self.insert(request, JobStatus::Searching, None)
    }

    /// Re-registers a persisted job, keeping it paused if it was paused
    pub fn restore(&self, snapshot: JobSnapshot) -> Submission {
        let status = match snapshot.status {
            JobStatus::Paused => JobStatus::Paused,
            _ => JobStatus::Searching,
        };
        self.insert(snapshot.request, status, Some("Restored after restart"))
    }

    fn insert(&self, request: SearchRequest, status: JobStatus, note: Option<&str>) -> Submission {
        let mut jobs = self.lock();
        let id = request.job_id();

        let generation = match jobs.get(&id) {
            Some(existing) if !existing.status.is_terminal() => {
                return Submission::Existing(id);
            }
            Some(existing) => existing.generation + 1,
            None => 0,
        };

        let mut state = JobState::new(request, self.log_capacity);
        state.status = status;
        state.generation = generation;
        if let Some(note) = note {
            state.log.push(timestamped(note));
        }
        state
            .log
            .push(timestamped(&format!("[STATUS] {}: {}", state.status, state.message)));
        jobs.insert(id.clone(), state);

        Submission::Created { id, generation }
    }

    /// Current status, read fresh on every call
    pub fn status(&self, id: &str) -> Option<JobStatus> {
        self.lock().get(id).map(|job| job.status)
    }

    pub fn generation(&self, id: &str) -> Option<u64> {
        self.lock().get(id).map(|job| job.generation)
    }

    /// Sets status and message, appending a `[STATUS]` log line
    ///
    /// Terminal jobs are frozen: returns `false` and changes nothing when the
    /// job is unknown or already Completed, Cancelled or Error.
    pub fn transition(&self, id: &str, status: JobStatus, message: &str) -> bool {
        let mut jobs = self.lock();
        let Some(job) = jobs.get_mut(id) else {
            return false;
        };
        if job.status.is_terminal() {
            return false;
        }
        job.status = status;
        job.message = message.to_string();
        job.log
            .push(timestamped(&format!("[STATUS] {}: {}", status, message)));
        true
    }

    /// Appends a timestamped line to the job's log
    pub fn append_log(&self, id: &str, line: &str) {
        if let Some(job) = self.lock().get_mut(id) {
            job.log.push(timestamped(line));
        }
    }

    pub fn set_found_path(&self, id: &str, path: PathBuf) {
        if let Some(job) = self.lock().get_mut(id) {
            job.found_path = Some(path);
        }
    }

    pub fn set_destination(&self, id: &str, path: PathBuf) {
        if let Some(job) = self.lock().get_mut(id) {
            job.destination = Some(path);
        }
    }

    /// Searching → Paused
    pub fn pause(&self, id: &str) -> Result<(), RegistryError> {
        self.control(id, "pause", &[JobStatus::Searching], JobStatus::Paused, "Paused by user")
    }

    /// Paused → Searching
    pub fn resume(&self, id: &str) -> Result<(), RegistryError> {
        self.control(id, "resume", &[JobStatus::Paused], JobStatus::Searching, "Resumed by user")
    }

    /// Any non-terminal status → Cancelled
    pub fn cancel(&self, id: &str) -> Result<(), RegistryError> {
        self.control(
            id,
            "cancel",
            &[
                JobStatus::Searching,
                JobStatus::Paused,
                JobStatus::Found,
                JobStatus::Linking,
            ],
            JobStatus::Cancelled,
            "Cancelled by user",
        )
    }

    fn control(
        &self,
        id: &str,
        action: &'static str,
        allowed: &[JobStatus],
        target: JobStatus,
        message: &str,
    ) -> Result<(), RegistryError> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownJob(id.to_string()))?;

        if !allowed.contains(&job.status) {
            return Err(RegistryError::InvalidTransition {
                id: id.to_string(),
                action,
                status: job.status,
            });
        }

        job.status = target;
        job.message = message.to_string();
        job.log
            .push(timestamped(&format!("[STATUS] {}: {}", target, message)));
        Ok(())
    }

    /// Log lines from `cursor` on, plus the running total
    pub fn logs_since(&self, id: &str, cursor: usize) -> Option<LogSlice> {
        self.lock().get(id).map(|job| job.log.since(cursor))
    }

    pub fn snapshot(&self, id: &str) -> Option<JobSnapshot> {
        self.lock().get(id).map(JobState::snapshot)
    }

    /// All jobs, ordered by id
    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        let mut snapshots: Vec<JobSnapshot> =
            self.lock().values().map(JobState::snapshot).collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    /// Jobs that have not reached a terminal status, ordered by id
    pub fn active_snapshots(&self) -> Vec<JobSnapshot> {
        self.snapshots()
            .into_iter()
            .filter(|job| !job.status.is_terminal())
            .collect()
    }

    /// Removes a terminal job if the id still belongs to `generation`
    pub fn evict(&self, id: &str, generation: u64) -> bool {
        let mut jobs = self.lock();
        match jobs.get(id) {
            Some(job) if job.generation == generation && job.status.is_terminal() => {
                jobs.remove(id);
                debug!(job_id = %id, "Job evicted");
                true
            }
            _ => false,
        }
    }

    /// Evicts the job once `delay` has passed
    ///
    /// Observers get the delay to read the final state. A resubmission under
    /// the same id bumps the generation and survives the pending eviction.
    pub fn evict_after(&self, id: &str, generation: u64, delay: Duration) -> JoinHandle<bool> {
        let registry = self.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            registry.evict(&id, generation)
        })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// `[HH:MM:SS] line`
fn timestamped(line: &str) -> String {
    format!("[{}] {}", Local::now().format("%H:%M:%S"), line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{episode_request, movie_request};

    #[test]
    fn test_submit_deduplicates_active_jobs() {
        let registry = JobRegistry::new(10);
        let first = registry.submit(episode_request(1399, 1, 2));
        assert_eq!(
            first,
            Submission::Created {
                id: "1399_1_2".to_string(),
                generation: 0
            }
        );

        let second = registry.submit(episode_request(1399, 1, 2));
        assert_eq!(second, Submission::Existing("1399_1_2".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resubmit_after_terminal_bumps_generation() {
        let registry = JobRegistry::new(10);
        registry.submit(movie_request(7));
        assert!(registry.transition("7_0_0", JobStatus::Error, "Timeout"));

        let again = registry.submit(movie_request(7));
        assert_eq!(
            again,
            Submission::Created {
                id: "7_0_0".to_string(),
                generation: 1
            }
        );
        assert_eq!(registry.status("7_0_0"), Some(JobStatus::Searching));
    }

    #[test]
    fn test_terminal_status_is_frozen() {
        let registry = JobRegistry::new(10);
        registry.submit(movie_request(1));
        registry.cancel("1_0_0").unwrap();

        assert!(!registry.transition("1_0_0", JobStatus::Completed, "Linked"));
        assert_eq!(registry.status("1_0_0"), Some(JobStatus::Cancelled));
        assert!(!registry.transition("unknown", JobStatus::Found, ""));
    }

    #[test]
    fn test_pause_resume_cancel() {
        let registry = JobRegistry::new(10);
        registry.submit(movie_request(1));

        registry.pause("1_0_0").unwrap();
        assert_eq!(registry.status("1_0_0"), Some(JobStatus::Paused));
        assert!(matches!(
            registry.pause("1_0_0"),
            Err(RegistryError::InvalidTransition { action: "pause", .. })
        ));

        registry.resume("1_0_0").unwrap();
        assert_eq!(registry.status("1_0_0"), Some(JobStatus::Searching));
        assert!(registry.resume("1_0_0").is_err());

        registry.cancel("1_0_0").unwrap();
        assert!(registry.cancel("1_0_0").is_err());
        assert_eq!(
            registry.pause("nope"),
            Err(RegistryError::UnknownJob("nope".to_string()))
        );
    }

    #[test]
    fn test_restore_keeps_paused() {
        let registry = JobRegistry::new(10);
        registry.submit(movie_request(1));
        registry.pause("1_0_0").unwrap();
        let snapshot = registry.snapshot("1_0_0").unwrap();

        let restored = JobRegistry::new(10);
        restored.restore(snapshot.clone());
        assert_eq!(restored.status("1_0_0"), Some(JobStatus::Paused));

        let mut linking = snapshot;
        linking.status = JobStatus::Linking;
        let restored = JobRegistry::new(10);
        restored.restore(linking);
        assert_eq!(restored.status("1_0_0"), Some(JobStatus::Searching));
    }

    #[test]
    fn test_logs_since_cursor() {
        let registry = JobRegistry::new(100);
        registry.submit(movie_request(1));
        let initial = registry.logs_since("1_0_0", 0).unwrap();
        assert_eq!(initial.total, 1);

        registry.append_log("1_0_0", "scanning");
        registry.transition("1_0_0", JobStatus::Found, "Movie.2001.mkv");

        let update = registry.logs_since("1_0_0", initial.total).unwrap();
        assert_eq!(update.total, 3);
        assert_eq!(update.lines.len(), 2);
        assert!(update.lines[0].ends_with("] scanning"));
        assert!(update.lines[1].ends_with("[STATUS] Found: Movie.2001.mkv"));
        assert!(update.lines[0].starts_with('['));
    }

    #[test]
    fn test_active_snapshots_skip_terminal() {
        let registry = JobRegistry::new(10);
        registry.submit(movie_request(1));
        registry.submit(movie_request(2));
        registry.transition("2_0_0", JobStatus::Completed, "Linked");

        let active = registry.active_snapshots();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "1_0_0");
        assert_eq!(registry.snapshots().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_after_delay() {
        let registry = JobRegistry::new(10);
        registry.submit(movie_request(1));
        registry.transition("1_0_0", JobStatus::Completed, "Linked");

        let handle = registry.evict_after("1_0_0", 0, Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(registry.snapshot("1_0_0").is_some());

        assert!(handle.await.unwrap());
        assert!(registry.snapshot("1_0_0").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_spares_resubmitted_job() {
        let registry = JobRegistry::new(10);
        registry.submit(movie_request(1));
        registry.transition("1_0_0", JobStatus::Cancelled, "Cancelled by user");
        let handle = registry.evict_after("1_0_0", 0, Duration::from_secs(2));

        registry.submit(movie_request(1));
        registry.transition("1_0_0", JobStatus::Error, "Timeout");

        assert!(!handle.await.unwrap());
        assert_eq!(registry.generation("1_0_0"), Some(1));
    }
}
