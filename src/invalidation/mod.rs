//! Cache invalidation for the remote mount
//!
//! The mount layer caches directory listings, so a freshly arrived file may
//! stay invisible until the cache is dropped. Before every scan the watcher asks
//! an invalidator to refresh the listing. Invalidation is best-effort: failures
//! are reported to the caller, which logs them and scans anyway.

mod command;

pub use command::CommandInvalidator;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while invalidating the mount cache
#[derive(Debug, Error)]
pub enum InvalidationError {
    /// The invalidation command could not be started
    #[error("Failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        source: std::io::Error,
    },

    /// The invalidation command exited unsuccessfully
    #[error("{program} failed with exit code {code:?}: {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The invalidation command did not finish in time
    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
}

/// Asks the remote-mount layer to drop stale directory caches
///
/// Implementations must return within a bounded time; the poll loop awaits
/// this call once per cycle.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self) -> Result<(), InvalidationError>;
}

/// Invalidator for mounts without a cache layer
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInvalidator;

#[async_trait]
impl CacheInvalidator for NoopInvalidator {
    async fn invalidate(&self) -> Result<(), InvalidationError> {
        Ok(())
    }
}
