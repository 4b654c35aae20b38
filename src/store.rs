//! Persistence of active jobs
//!
//! Non-terminal jobs are written as pretty JSON to `active_jobs.json` in the
//! state directory after every status transition, so a restart can pick them
//! up again.

use crate::job::JobSnapshot;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Name of the state file inside the state directory
pub const STATE_FILE: &str = "active_jobs.json";

/// Errors that can occur while persisting jobs
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to determine the platform data directory
    #[error("Failed to determine state directory location")]
    StateDirectoryNotFound,

    /// Failed to create the state directory
    #[error("Failed to create state directory at {path}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read the state file
    #[error("Failed to read state file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write the state file
    #[error("Failed to write state file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// State file exists but is not valid
    #[error("Failed to deserialize state file {path}: {source}")]
    DeserializationFailed {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Failed to serialize jobs
    #[error("Failed to serialize jobs: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// JSON file holding the active jobs
#[derive(Debug)]
pub struct JobStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JobStore {
    /// Opens the store in `state_dir`, creating the directory if needed
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let store = JobStore::open(&JobStore::default_state_dir()?)?;
    /// for job in store.load()? {
    ///     println!("{} is {}", job.id, job.status);
    /// }
    /// ```
    pub fn open(state_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(state_dir).map_err(|e| StoreError::DirectoryCreationFailed {
            path: state_dir.to_path_buf(),
            source: e,
        })?;

        Ok(Self {
            path: state_dir.join(STATE_FILE),
            write_lock: Mutex::new(()),
        })
    }

    /// Platform data directory of the application
    pub fn default_state_dir() -> Result<PathBuf, StoreError> {
        let proj_dirs = directories::ProjectDirs::from("org", "mountlinker", "mount-linker")
            .ok_or(StoreError::StateDirectoryNotFound)?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the stored job list
    ///
    /// The file is written next to its final location and renamed into
    /// place, so readers never see a half-written file.
    pub fn save(&self, jobs: &[JobSnapshot]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(jobs)?;
        let tmp_path = self.path.with_extension("json.tmp");

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        fs::write(&tmp_path, json).map_err(|e| StoreError::WriteFailed {
            path: tmp_path.clone(),
            source: e,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::WriteFailed {
            path: self.path.clone(),
            source: e,
        })?;

        Ok(())
    }

    /// Reads the stored job list; a missing file means no jobs
    pub fn load(&self) -> Result<Vec<JobSnapshot>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| StoreError::ReadFailed {
            path: self.path.clone(),
            source: e,
        })?;

        serde_json::from_str(&content).map_err(|e| StoreError::DeserializationFailed {
            path: self.path.clone(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobState, JobStatus, episode_request, movie_request};
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::open(&dir.path().join("nested/state")).unwrap();
        assert!(store.load().unwrap().is_empty());
        assert!(dir.path().join("nested/state").is_dir());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::open(dir.path()).unwrap();

        let mut paused = JobState::new(episode_request(1399, 1, 2), 10);
        paused.status = JobStatus::Paused;
        let jobs = vec![paused.snapshot(), JobState::new(movie_request(5), 10).snapshot()];

        store.save(&jobs).unwrap();
        assert_eq!(store.load().unwrap(), jobs);
        assert!(store.path().ends_with(STATE_FILE));
        assert!(!dir.path().join("active_jobs.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::open(dir.path()).unwrap();
        fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(
            store.load(),
            Err(StoreError::DeserializationFailed { .. })
        ));
    }
}
