//! Poll loop watching the mount for a requested file
//!
//! One iteration: honour cancel/pause, invalidate the mount cache, scan, then
//! either report the hit or log a heartbeat and sleep. Pause and cancel are
//! cooperative; they take effect at the top of the next iteration. The
//! timeout applies regardless of pause state and cuts a scan still in flight.

use crate::events::{EventSink, StatusSource};
use crate::invalidation::CacheInvalidator;
use crate::job::{JobStatus, SearchRequest};
use crate::matcher::{MatchThresholds, Matcher};
use crate::scanner::{MatchHit, MountScanner, ScanError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout, timeout_at};
use tracing::{debug, warn};

/// Finds the requested file on the mount
#[async_trait]
pub trait Locator: Send + Sync {
    /// Runs every scan strategy
    async fn locate(&self, request: &SearchRequest) -> Result<Option<MatchHit>, ScanError>;

    /// Exact filename lookup only, used once before the loop starts
    async fn locate_exact(&self, _request: &SearchRequest) -> Result<Option<MatchHit>, ScanError> {
        Ok(None)
    }
}

/// [`Locator`] scanning a real mount on the blocking thread pool
#[derive(Debug, Clone)]
pub struct MountLocator {
    scanner: MountScanner,
    thresholds: MatchThresholds,
}

impl MountLocator {
    pub fn new(scanner: MountScanner, thresholds: MatchThresholds) -> Self {
        Self {
            scanner,
            thresholds,
        }
    }

    async fn run<F>(&self, request: &SearchRequest, scan: F) -> Result<Option<MatchHit>, ScanError>
    where
        F: FnOnce(&MountScanner, &Matcher<'_>) -> Result<Option<MatchHit>, ScanError>
            + Send
            + 'static,
    {
        let scanner = self.scanner.clone();
        let thresholds = self.thresholds;
        let request = request.clone();
        tokio::task::spawn_blocking(move || {
            let matcher = Matcher::new(request.query(), thresholds);
            scan(&scanner, &matcher)
        })
        .await?
    }
}

#[async_trait]
impl Locator for MountLocator {
    async fn locate(&self, request: &SearchRequest) -> Result<Option<MatchHit>, ScanError> {
        self.run(request, |scanner, matcher| scanner.scan(matcher)).await
    }

    async fn locate_exact(&self, request: &SearchRequest) -> Result<Option<MatchHit>, ScanError> {
        self.run(request, |scanner, matcher| scanner.find_exact(matcher))
            .await
    }
}

/// Timing of the poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    /// Sleep between two scans
    pub poll_interval: Duration,
    /// Sleep between two status checks while paused
    pub pause_interval: Duration,
    /// Maximum total search duration
    pub timeout: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            pause_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(3600),
        }
    }
}

/// How a watch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    Found(MatchHit),
    Cancelled,
    TimedOut { elapsed: Duration },
}

/// Poll loop runner shared by all jobs
#[derive(Clone)]
pub struct Watcher {
    locator: Arc<dyn Locator>,
    invalidator: Arc<dyn CacheInvalidator>,
    settings: WatchSettings,
}

impl Watcher {
    pub fn new(
        locator: Arc<dyn Locator>,
        invalidator: Arc<dyn CacheInvalidator>,
        settings: WatchSettings,
    ) -> Self {
        Self {
            locator,
            invalidator,
            settings,
        }
    }

    pub fn settings(&self) -> &WatchSettings {
        &self.settings
    }

    /// Exact lookup without cache invalidation or retries, bounded by one
    /// poll interval
    pub async fn try_immediate(&self, request: &SearchRequest) -> Option<MatchHit> {
        let lookup = self.locator.locate_exact(request);
        match timeout(self.settings.poll_interval, lookup).await {
            Ok(Ok(hit)) => hit,
            Ok(Err(e)) => {
                debug!(error = %e, "Immediate lookup failed");
                None
            }
            Err(_) => {
                debug!("Immediate lookup did not return in time");
                None
            }
        }
    }

    /// Watches until the file is found, the job is cancelled or time runs out
    ///
    /// Emits `Found` through the sink on success. Timeout and cancellation
    /// are returned to the caller, which owns the terminal transition.
    pub async fn watch(
        &self,
        request: &SearchRequest,
        status: &dyn StatusSource,
        sink: &dyn EventSink,
    ) -> WatchOutcome {
        let started = Instant::now();
        let deadline = started + self.settings.timeout;

        sink.on_log(&format!(
            "Watching for '{}' (timeout {}s)",
            request.expected_filename,
            self.settings.timeout.as_secs()
        ));

        loop {
            let now = Instant::now();
            if now >= deadline {
                let elapsed = now - started;
                sink.on_log(&format!("Gave up after {}s", elapsed.as_secs()));
                return WatchOutcome::TimedOut { elapsed };
            }

            match status.current_status() {
                Some(JobStatus::Cancelled) => {
                    sink.on_log("Cancellation received, stopping search");
                    return WatchOutcome::Cancelled;
                }
                None | Some(JobStatus::Completed | JobStatus::Error) => {
                    sink.on_log("Job finished elsewhere, stopping search");
                    return WatchOutcome::Cancelled;
                }
                Some(JobStatus::Paused) => {
                    sleep(self.settings.pause_interval.min(deadline - now)).await;
                    continue;
                }
                Some(_) => {}
            }

            if let Err(e) = self.invalidator.invalidate().await {
                warn!(error = %e, "Cache invalidation failed");
                sink.on_log(&format!("Cache invalidation failed: {}", e));
            }

            let Ok(located) = timeout_at(deadline, self.locator.locate(request)).await else {
                let elapsed = started.elapsed();
                warn!(elapsed_secs = elapsed.as_secs(), "Scan still running at the deadline");
                sink.on_log(&format!(
                    "Gave up after {}s, scan did not return",
                    elapsed.as_secs()
                ));
                return WatchOutcome::TimedOut { elapsed };
            };

            match located {
                Ok(Some(hit)) => {
                    let path = hit.path.display().to_string();
                    sink.on_log(&format!("Match via {}: {}", hit.strategy, path));
                    sink.on_status(JobStatus::Found, &path);
                    return WatchOutcome::Found(hit);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Scan failed");
                    sink.on_log(&format!("Scan failed: {}", e));
                }
            }

            let now = Instant::now();
            sink.on_log(&format!(
                "Not found yet ({}s elapsed)",
                (now - started).as_secs()
            ));
            sleep(self.settings.poll_interval.min(deadline.saturating_duration_since(now)))
                .await;
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use crate::events::EventSink;
    use crate::invalidation::InvalidationError;
    use crate::scanner::ScanStrategy;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Locator that finds nothing until `found_after` calls have been made
    #[derive(Default)]
    pub struct ScriptedLocator {
        pub calls: AtomicUsize,
        pub found_after: Option<usize>,
        pub exact: Option<PathBuf>,
        pub path: PathBuf,
    }

    impl ScriptedLocator {
        pub fn never() -> Self {
            Self::default()
        }

        pub fn finds_on_call(call: usize, path: impl Into<PathBuf>) -> Self {
            Self {
                found_after: Some(call),
                path: path.into(),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Locator for ScriptedLocator {
        async fn locate(&self, _request: &SearchRequest) -> Result<Option<MatchHit>, ScanError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.found_after {
                Some(n) if call >= n => Ok(Some(MatchHit {
                    path: self.path.clone(),
                    strategy: ScanStrategy::NestedExact,
                    score: None,
                })),
                _ => Ok(None),
            }
        }

        async fn locate_exact(
            &self,
            _request: &SearchRequest,
        ) -> Result<Option<MatchHit>, ScanError> {
            Ok(self.exact.clone().map(|path| MatchHit {
                path,
                strategy: ScanStrategy::RootExact,
                score: None,
            }))
        }
    }

    /// Locator whose scans never return, like a stuck remote mount
    pub struct HangingLocator;

    #[async_trait]
    impl Locator for HangingLocator {
        async fn locate(&self, _request: &SearchRequest) -> Result<Option<MatchHit>, ScanError> {
            std::future::pending().await
        }
    }

    /// Locator whose exact lookup finds `path` after `delay`
    pub struct SlowExactLocator {
        pub delay: Duration,
        pub path: PathBuf,
    }

    #[async_trait]
    impl Locator for SlowExactLocator {
        async fn locate(&self, _request: &SearchRequest) -> Result<Option<MatchHit>, ScanError> {
            Ok(None)
        }

        async fn locate_exact(
            &self,
            _request: &SearchRequest,
        ) -> Result<Option<MatchHit>, ScanError> {
            sleep(self.delay).await;
            Ok(Some(MatchHit {
                path: self.path.clone(),
                strategy: ScanStrategy::RootExact,
                score: None,
            }))
        }
    }

    /// Invalidator counting its calls, optionally failing every time
    #[derive(Default)]
    pub struct CountingInvalidator {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    impl CountingInvalidator {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CacheInvalidator for CountingInvalidator {
        async fn invalidate(&self) -> Result<(), InvalidationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(InvalidationError::TimedOut {
                    program: "rclone".to_string(),
                    timeout: Duration::from_secs(3),
                });
            }
            Ok(())
        }
    }

    /// Status source set directly by the test
    pub struct FixedStatus(pub Mutex<JobStatus>);

    impl FixedStatus {
        pub fn new(status: JobStatus) -> Self {
            Self(Mutex::new(status))
        }

        pub fn set(&self, status: JobStatus) {
            *self.0.lock().unwrap() = status;
        }
    }

    impl StatusSource for FixedStatus {
        fn current_status(&self) -> Option<JobStatus> {
            Some(*self.0.lock().unwrap())
        }
    }

    /// Sink recording every event
    #[derive(Default)]
    pub struct RecordingSink {
        pub statuses: Mutex<Vec<(JobStatus, String)>>,
        pub lines: Mutex<Vec<String>>,
    }

    impl EventSink for RecordingSink {
        fn on_status(&self, status: JobStatus, message: &str) -> bool {
            self.statuses.lock().unwrap().push((status, message.to_string()));
            true
        }

        fn on_log(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }
    }
}
