//! External-command cache invalidator
//!
//! Runs a configured command (by default `rclone rc vfs/forget`) with a hard
//! timeout. The child is killed when the timeout elapses.

use super::{CacheInvalidator, InvalidationError};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Invalidator that shells out to an external program
#[derive(Debug, Clone)]
pub struct CommandInvalidator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandInvalidator {
    /// Creates an invalidator from a command line such as
    /// `["rclone", "rc", "vfs/forget"]`
    ///
    /// Returns `None` for an empty command line, which disables invalidation.
    pub fn from_command_line(command: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl CacheInvalidator for CommandInvalidator {
    async fn invalidate(&self) -> Result<(), InvalidationError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| InvalidationError::SpawnFailed {
                program: self.program.clone(),
                source,
            })?;

        // Dropping the future on timeout drops the child, which kills it
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| InvalidationError::TimedOut {
                program: self.program.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| InvalidationError::SpawnFailed {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(InvalidationError::CommandFailed {
                program: self.program.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!(program = %self.program, "Mount cache invalidated");
        Ok(())
    }
}
