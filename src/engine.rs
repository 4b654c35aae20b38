//! Job orchestration
//!
//! Ties the pieces together for one request: register the job, try an
//! immediate lookup, run the watch loop, link the hit into the library and
//! evict the job some time after it finished. Every job runs in its own
//! tokio task; jobs share nothing but the registry.

use crate::config::Config;
use crate::events::{EventSink, Observer, RegistrySink, persist_active_jobs};
use crate::invalidation::{CacheInvalidator, CommandInvalidator, NoopInvalidator};
use crate::job::{JobSnapshot, JobStatus, LogSlice, RequestError, SearchRequest};
use crate::library::{LibraryError, LibraryLayout, LinkTarget};
use crate::registry::{JobRegistry, RegistryError, Submission};
use crate::scanner::MountScanner;
use crate::store::{JobStore, StoreError};
use crate::watcher::{MountLocator, WatchOutcome, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Errors returned by engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Delays and naming options applied to every job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// How long a Completed or Error job stays readable
    pub completed_eviction: Duration,
    /// How long a Cancelled job stays readable
    pub cancelled_eviction: Duration,
    pub use_original_title: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            completed_eviction: Duration::from_secs(60),
            cancelled_eviction: Duration::from_secs(2),
            use_original_title: false,
        }
    }
}

/// Handle to a submitted job
#[derive(Debug)]
pub struct JobHandle {
    id: String,
    task: Option<JoinHandle<Option<JobSnapshot>>>,
}

impl JobHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// `false` when the request joined an already running job
    pub fn is_new(&self) -> bool {
        self.task.is_some()
    }

    /// Waits for the worker and returns the job's final state
    ///
    /// Returns `None` for a handle that joined an existing job.
    pub async fn finished(self) -> Option<JobSnapshot> {
        let task = self.task?;
        match task.await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(job_id = %self.id, error = %e, "Job worker failed");
                None
            }
        }
    }
}

/// Runs jobs against a mount and a library
#[derive(Clone)]
pub struct Engine {
    registry: JobRegistry,
    watcher: Watcher,
    layout: Arc<LibraryLayout>,
    store: Option<Arc<JobStore>>,
    observer: Option<Observer>,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        registry: JobRegistry,
        watcher: Watcher,
        layout: LibraryLayout,
        settings: EngineSettings,
    ) -> Self {
        Self {
            registry,
            watcher,
            layout: Arc::new(layout),
            store: None,
            observer: None,
            settings,
        }
    }

    /// Persists active jobs to `store` after every status change
    pub fn with_store(mut self, store: Arc<JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Forwards every job event to `observer`
    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Builds an engine scanning the configured mount with the configured
    /// cache invalidation command
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let scanner = MountScanner::new(&config.paths.mount_root, config.watch.scan_options());
        let locator = MountLocator::new(scanner, config.matching.thresholds());

        let invalidator: Arc<dyn CacheInvalidator> = match CommandInvalidator::from_command_line(
            &config.invalidation.command,
            config.invalidation.timeout(),
        ) {
            Some(command) => Arc::new(command),
            None => {
                info!("No cache invalidation command configured");
                Arc::new(NoopInvalidator)
            }
        };

        let watcher = Watcher::new(Arc::new(locator), invalidator, config.watch.settings());
        let layout =
            LibraryLayout::new(&config.paths.library_root, &config.library.catalog_marker)?;

        let state_dir = match &config.paths.state_dir {
            Some(dir) => dir.clone(),
            None => JobStore::default_state_dir()?,
        };
        let store = JobStore::open(&state_dir)?;

        let settings = EngineSettings {
            completed_eviction: config.watch.completed_eviction(),
            cancelled_eviction: config.watch.cancelled_eviction(),
            use_original_title: config.library.use_original_title,
        };

        Ok(Self::new(
            JobRegistry::new(config.watch.log_capacity),
            watcher,
            layout,
            settings,
        )
        .with_store(Arc::new(store)))
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn layout(&self) -> &LibraryLayout {
        &self.layout
    }

    /// Registers a request and starts its worker
    ///
    /// Submitting a request whose job is still active returns a handle to
    /// that job without starting a second worker.
    pub fn submit(&self, request: SearchRequest) -> Result<JobHandle, EngineError> {
        request.validate()?;
        let submission = self.registry.submit(request.clone());
        Ok(self.start(submission, request))
    }

    /// Re-submits the jobs persisted by a previous run
    ///
    /// An unreadable state file is logged and treated as empty.
    pub fn restore(&self) -> Vec<JobHandle> {
        let Some(store) = &self.store else {
            return Vec::new();
        };

        let snapshots = match store.load() {
            Ok(snapshots) => snapshots,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable job state");
                return Vec::new();
            }
        };

        let mut handles = Vec::new();
        for snapshot in snapshots {
            if snapshot.status.is_terminal() {
                continue;
            }
            if let Err(e) = snapshot.request.validate() {
                warn!(job_id = %snapshot.id, error = %e, "Skipping invalid persisted job");
                continue;
            }
            info!(job_id = %snapshot.id, status = %snapshot.status, "Restoring job");
            let request = snapshot.request.clone();
            let submission = self.registry.restore(snapshot);
            handles.push(self.start(submission, request));
        }
        handles
    }

    fn start(&self, submission: Submission, request: SearchRequest) -> JobHandle {
        match submission {
            Submission::Existing(id) => {
                info!(job_id = %id, "Job already running");
                JobHandle { id, task: None }
            }
            Submission::Created { id, generation } => {
                self.persist();
                let engine = self.clone();
                let job_id = id.clone();
                let task =
                    tokio::spawn(async move { engine.run(job_id, generation, request).await });
                JobHandle {
                    id,
                    task: Some(task),
                }
            }
        }
    }

    fn sink(&self, id: &str) -> RegistrySink {
        RegistrySink::new(
            id,
            self.registry.clone(),
            self.store.clone(),
            self.observer.clone(),
        )
    }

    async fn run(
        &self,
        id: String,
        generation: u64,
        request: SearchRequest,
    ) -> Option<JobSnapshot> {
        let sink = self.sink(&id);
        let target = LinkTarget::for_request(&request, self.settings.use_original_title);

        if self.layout.link_exists(&target, request.episode) {
            sink.on_status(JobStatus::Completed, "Already in the library");
            return self.finish(&id, generation);
        }

        let immediate = match self.registry.status(&id) {
            Some(JobStatus::Searching) => self.watcher.try_immediate(&request).await,
            _ => None,
        };

        let hit = match immediate {
            Some(hit) => {
                sink.on_log(&format!("Already on the mount: {}", hit.path.display()));
                Some(hit)
            }
            None => match self.watcher.watch(&request, &sink, &sink).await {
                WatchOutcome::Found(hit) => Some(hit),
                WatchOutcome::Cancelled => None,
                WatchOutcome::TimedOut { elapsed } => {
                    sink.on_status(
                        JobStatus::Error,
                        &format!("Timeout: file not found after {}s", elapsed.as_secs()),
                    );
                    None
                }
            },
        };

        if let Some(hit) = hit {
            self.link(&id, &sink, &target, &hit.path);
        }

        self.finish(&id, generation)
    }

    /// Places the link unless the job finished in the meantime
    ///
    /// A cancel that lands while the link is being written removes it again.
    fn link(&self, id: &str, sink: &RegistrySink, target: &LinkTarget<'_>, source: &Path) {
        self.registry.set_found_path(id, source.to_path_buf());
        if !sink.on_status(JobStatus::Linking, &format!("Linking {}", source.display())) {
            sink.on_log("Job finished before linking, library left untouched");
            return;
        }

        match self.layout.place(source, target) {
            Ok(destination) => {
                self.registry.set_destination(id, destination.clone());
                let completed = sink.on_status(
                    JobStatus::Completed,
                    &format!("Linked to {}", destination.display()),
                );
                if !completed {
                    self.discard_link(id, sink, &destination);
                }
            }
            Err(e) => {
                error!(job_id = %id, error = %e, "Linking failed");
                sink.on_status(JobStatus::Error, &e.to_string());
            }
        }
    }

    fn discard_link(&self, id: &str, sink: &RegistrySink, destination: &Path) {
        match self.layout.remove_link(destination) {
            Ok(_) => sink.on_log(&format!(
                "Removed link of finished job: {}",
                destination.display()
            )),
            Err(e) => {
                warn!(job_id = %id, error = %e, "Could not remove link of finished job");
                sink.on_log(&format!("Could not remove {}: {}", destination.display(), e));
            }
        }
    }

    /// Final snapshot, then eviction once the observer delay has passed
    fn finish(&self, id: &str, generation: u64) -> Option<JobSnapshot> {
        let snapshot = self.registry.snapshot(id)?;
        if snapshot.status.is_terminal() {
            let delay = match snapshot.status {
                JobStatus::Cancelled => self.settings.cancelled_eviction,
                _ => self.settings.completed_eviction,
            };
            self.registry.evict_after(id, generation, delay);
        }
        Some(snapshot)
    }

    pub fn pause(&self, id: &str) -> Result<(), EngineError> {
        self.registry.pause(id)?;
        self.persist();
        Ok(())
    }

    pub fn resume(&self, id: &str) -> Result<(), EngineError> {
        self.registry.resume(id)?;
        self.persist();
        Ok(())
    }

    /// Requests cancellation; the worker stops at its next iteration
    pub fn cancel(&self, id: &str) -> Result<(), EngineError> {
        self.registry.cancel(id)?;
        self.persist();
        Ok(())
    }

    /// Links an operator-chosen mount file for `request`
    ///
    /// A running job for the same request is completed with the new link.
    pub fn link_manually(
        &self,
        request: &SearchRequest,
        relative_source: &str,
        mount_root: &Path,
    ) -> Result<PathBuf, EngineError> {
        request.validate()?;
        let target = LinkTarget::for_request(request, self.settings.use_original_title);
        let destination = self.layout.manual_link(mount_root, relative_source, &target)?;

        let id = request.job_id();
        if self.registry.status(&id).is_some_and(|status| !status.is_terminal()) {
            self.registry.set_destination(&id, destination.clone());
            self.sink(&id).on_status(
                JobStatus::Completed,
                &format!("Linked manually to {}", destination.display()),
            );
        }
        Ok(destination)
    }

    pub fn logs_since(&self, id: &str, cursor: usize) -> Option<LogSlice> {
        self.registry.logs_since(id, cursor)
    }

    pub fn snapshot(&self, id: &str) -> Option<JobSnapshot> {
        self.registry.snapshot(id)
    }

    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        self.registry.snapshots()
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            persist_active_jobs(&self.registry, store);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{episode_request, movie_request};
    use crate::watcher::WatchSettings;
    use crate::watcher::fakes::{CountingInvalidator, ScriptedLocator, SlowExactLocator};
    use std::fs::{self, File};
    use tempfile::TempDir;

    struct Fixture {
        mount: TempDir,
        library: TempDir,
        locator: Arc<ScriptedLocator>,
        invalidator: Arc<CountingInvalidator>,
    }

    impl Fixture {
        fn new(locator: ScriptedLocator) -> Self {
            Self {
                mount: TempDir::new().unwrap(),
                library: TempDir::new().unwrap(),
                locator: Arc::new(locator),
                invalidator: Arc::new(CountingInvalidator::default()),
            }
        }

        fn engine(&self, timeout: Duration) -> Engine {
            let settings = WatchSettings {
                timeout,
                ..WatchSettings::default()
            };
            let watcher = Watcher::new(self.locator.clone(), self.invalidator.clone(), settings);
            let layout = LibraryLayout::new(self.library.path(), "tmdb").unwrap();
            Engine::new(JobRegistry::new(100), watcher, layout, EngineSettings::default())
        }

        fn mount_file(&self, name: &str) -> PathBuf {
            let path = self.mount.path().join(name);
            File::create(&path).unwrap();
            path
        }
    }

    fn locator_finding(call: usize, path: &Path) -> ScriptedLocator {
        ScriptedLocator::finds_on_call(call, path)
    }

    #[tokio::test(start_paused = true)]
    async fn test_found_file_is_linked() {
        let mount = TempDir::new().unwrap();
        let source = mount.path().join("Show S01E02.mkv");
        File::create(&source).unwrap();

        let fixture = Fixture::new(locator_finding(2, &source));
        let engine = fixture.engine(Duration::from_secs(3600));

        let handle = engine.submit(episode_request(7, 1, 2)).unwrap();
        assert_eq!(handle.id(), "7_1_2");
        let snapshot = handle.finished().await.unwrap();

        let expected = fixture
            .library
            .path()
            .join("Shows/Show (2020) {tmdb-7}/Season 01/S01E02.mkv");
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.found_path, Some(source.clone()));
        assert_eq!(snapshot.destination, Some(expected.clone()));
        assert_eq!(fs::read_link(&expected).unwrap(), source);
        assert_eq!(fixture.locator.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_immediate_lookup_leaves_library_untouched() {
        let mount = TempDir::new().unwrap();
        let library = TempDir::new().unwrap();
        let source = mount.path().join("Movie.2001.mkv");
        File::create(&source).unwrap();

        let locator = Arc::new(SlowExactLocator {
            delay: Duration::from_secs(5),
            path: source,
        });
        let watcher = Watcher::new(
            locator,
            Arc::new(CountingInvalidator::default()),
            WatchSettings::default(),
        );
        let layout = LibraryLayout::new(library.path(), "tmdb").unwrap();
        let engine = Engine::new(JobRegistry::new(100), watcher, layout, EngineSettings::default());

        let handle = engine.submit(movie_request(1)).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        engine.cancel("1_0_0").unwrap();

        let snapshot = handle.finished().await.unwrap();
        let target = LinkTarget::for_request(&snapshot.request, false);
        assert_eq!(snapshot.status, JobStatus::Cancelled);
        assert_eq!(snapshot.destination, None);
        assert!(!engine.layout().link_exists(&target, None));
        assert!(!library.path().join("Movies").exists());
    }

    #[tokio::test]
    async fn test_link_skipped_for_job_cancelled_after_found() {
        let fixture = Fixture::new(ScriptedLocator::never());
        let engine = fixture.engine(Duration::from_secs(3600));
        let source = fixture.mount_file("Movie.2001.mkv");
        let request = movie_request(1);

        engine.registry().submit(request.clone());
        engine.registry().transition("1_0_0", JobStatus::Found, "Movie.2001.mkv");
        engine.cancel("1_0_0").unwrap();

        let sink = engine.sink("1_0_0");
        let target = LinkTarget::for_request(&request, false);
        engine.link("1_0_0", &sink, &target, &source);

        let snapshot = engine.snapshot("1_0_0").unwrap();
        assert_eq!(snapshot.status, JobStatus::Cancelled);
        assert_eq!(snapshot.destination, None);
        assert!(!engine.layout().link_exists(&target, None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_ends_in_error() {
        let fixture = Fixture::new(ScriptedLocator::never());
        let engine = fixture.engine(Duration::from_secs(60));

        let snapshot = engine
            .submit(movie_request(1))
            .unwrap()
            .finished()
            .await
            .unwrap();

        assert_eq!(snapshot.status, JobStatus::Error);
        assert!(snapshot.message.starts_with("Timeout"));
        assert_eq!(fixture.locator.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_submission_joins_running_job() {
        let fixture = Fixture::new(ScriptedLocator::never());
        let engine = fixture.engine(Duration::from_secs(3600));

        let first = engine.submit(movie_request(1)).unwrap();
        let second = engine.submit(movie_request(1)).unwrap();
        assert!(first.is_new());
        assert!(!second.is_new());
        assert_eq!(first.id(), second.id());
        assert_eq!(engine.snapshots().len(), 1);

        engine.cancel("1_0_0").unwrap();
        assert_eq!(second.finished().await, None);
        assert_eq!(first.finished().await.unwrap().status, JobStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_job_is_evicted() {
        let fixture = Fixture::new(ScriptedLocator::never());
        let engine = fixture.engine(Duration::from_secs(3600));

        let handle = engine.submit(movie_request(1)).unwrap();
        tokio::time::sleep(Duration::from_secs(15)).await;
        engine.cancel("1_0_0").unwrap();

        let snapshot = handle.finished().await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Cancelled);
        assert!(engine.snapshot("1_0_0").is_some());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(engine.snapshot("1_0_0").is_none());
        assert!(engine.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_job_stays_readable_for_a_while() {
        let mount = TempDir::new().unwrap();
        let source = mount.path().join("Movie.2001.mkv");
        File::create(&source).unwrap();

        let fixture = Fixture::new(locator_finding(1, &source));
        let engine = fixture.engine(Duration::from_secs(3600));
        engine.submit(movie_request(1)).unwrap().finished().await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(
            engine.snapshot("1_0_0").map(|job| job.status),
            Some(JobStatus::Completed)
        );
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(engine.snapshot("1_0_0").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_hit_skips_the_loop() {
        let fixture = Fixture::new(ScriptedLocator::never());
        let source = fixture.mount_file("Movie.2001.mkv");
        let fixture = Fixture {
            locator: Arc::new(ScriptedLocator {
                exact: Some(source.clone()),
                ..ScriptedLocator::default()
            }),
            ..fixture
        };
        let engine = fixture.engine(Duration::from_secs(3600));

        let snapshot = engine
            .submit(movie_request(1))
            .unwrap()
            .finished()
            .await
            .unwrap();

        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(fixture.locator.calls(), 0);
        assert_eq!(fixture.invalidator.calls(), 0);
        assert!(fixture
            .library
            .path()
            .join("Movies/Movie (2001) {tmdb-1}/Movie (2001).mkv")
            .symlink_metadata()
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_link_completes_without_scanning() {
        let fixture = Fixture::new(ScriptedLocator::never());
        let season_dir = fixture
            .library
            .path()
            .join("Shows/Show (2020) {tmdb-7}/Season 01");
        fs::create_dir_all(&season_dir).unwrap();
        File::create(season_dir.join("S01E02.mkv")).unwrap();

        let engine = fixture.engine(Duration::from_secs(3600));
        let snapshot = engine
            .submit(episode_request(7, 1, 2))
            .unwrap()
            .finished()
            .await
            .unwrap();

        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(fixture.locator.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_failure_ends_in_error() {
        let mount = TempDir::new().unwrap();
        let source = mount.path().join("Movie.2001.mkv");
        File::create(&source).unwrap();

        let fixture = Fixture::new(locator_finding(1, &source));
        let blocked_root = fixture.library.path().join("not-a-dir");
        File::create(&blocked_root).unwrap();

        let settings = WatchSettings::default();
        let watcher = Watcher::new(fixture.locator.clone(), fixture.invalidator.clone(), settings);
        let layout = LibraryLayout::new(&blocked_root, "tmdb").unwrap();
        let engine = Engine::new(JobRegistry::new(100), watcher, layout, EngineSettings::default());

        let snapshot = engine
            .submit(movie_request(1))
            .unwrap()
            .finished()
            .await
            .unwrap();
        assert_eq!(snapshot.status, JobStatus::Error);
        assert_eq!(snapshot.found_path, Some(source));
        assert_eq!(snapshot.destination, None);
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected() {
        let fixture = Fixture::new(ScriptedLocator::never());
        let engine = fixture.engine(Duration::from_secs(3600));

        let mut request = movie_request(1);
        request.season = Some(1);
        assert!(matches!(
            engine.submit(request),
            Err(EngineError::Request(RequestError::SeasonForMovie(1)))
        ));
        assert!(engine.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume() {
        let fixture = Fixture::new(ScriptedLocator::never());
        let engine = fixture.engine(Duration::from_secs(3600));

        let handle = engine.submit(movie_request(1)).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        engine.pause("1_0_0").unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        let calls = fixture.locator.calls();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fixture.locator.calls(), calls);
        assert!(matches!(
            engine.pause("1_0_0"),
            Err(EngineError::Registry(RegistryError::InvalidTransition { .. }))
        ));

        engine.resume("1_0_0").unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(fixture.locator.calls() > calls);

        engine.cancel("1_0_0").unwrap();
        assert_eq!(handle.finished().await.unwrap().status, JobStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_resubmits_persisted_jobs() {
        let state = TempDir::new().unwrap();
        let store = Arc::new(JobStore::open(state.path()).unwrap());

        let fixture = Fixture::new(ScriptedLocator::never());
        let engine = fixture.engine(Duration::from_secs(3600)).with_store(store.clone());
        engine.submit(movie_request(1)).unwrap();
        engine.submit(episode_request(7, 1, 2)).unwrap();
        engine.pause("7_1_2").unwrap();
        assert_eq!(store.load().unwrap().len(), 2);

        let restarted = fixture.engine(Duration::from_secs(3600)).with_store(store);
        let handles = restarted.restore();
        assert_eq!(handles.len(), 2);
        assert!(handles.iter().all(JobHandle::is_new));
        assert_eq!(
            restarted.snapshot("7_1_2").map(|job| job.status),
            Some(JobStatus::Paused)
        );
        assert_eq!(
            restarted.snapshot("1_0_0").map(|job| job.status),
            Some(JobStatus::Searching)
        );
    }

    #[tokio::test]
    async fn test_restore_ignores_corrupt_state() {
        let state = TempDir::new().unwrap();
        let store = Arc::new(JobStore::open(state.path()).unwrap());
        fs::write(store.path(), "{ not json").unwrap();

        let fixture = Fixture::new(ScriptedLocator::never());
        let engine = fixture.engine(Duration::from_secs(3600)).with_store(store);
        assert!(engine.restore().is_empty());
        assert!(engine.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_link_completes_running_job() {
        let fixture = Fixture::new(ScriptedLocator::never());
        let source = fixture.mount_file("Show.S01E02.Other.Name.mkv");
        let engine = fixture.engine(Duration::from_secs(3600));

        let request = episode_request(7, 1, 2);
        let handle = engine.submit(request.clone()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let destination = engine
            .link_manually(&request, "/Show.S01E02.Other.Name.mkv", fixture.mount.path())
            .unwrap();
        assert_eq!(fs::read_link(&destination).unwrap(), source);

        let snapshot = handle.finished().await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.destination, Some(destination));

        assert!(matches!(
            engine.link_manually(&request, "missing.mkv", fixture.mount.path()),
            Err(EngineError::Library(LibraryError::NotFound(_)))
        ));
    }
}
