//! mount_linker - Watch a remote media mount and link arrivals into a library
//!
//! A request names a media item (title, year, season/episode) plus the
//! filename an upstream resolver expects. The engine polls the mount until a
//! matching file shows up, then links it into a `Movies/` + `Shows/` library
//! tree whose folder names embed the catalog id.
//!
//! # Examples
//!
//! ```no_run
//! use mount_linker::{Config, Engine, MediaType, SearchRequest};
//!
//! # async fn run() -> Result<(), mount_linker::MountLinkerError> {
//! let config = Config::load(None)?;
//! let engine = Engine::from_config(&config)?;
//!
//! let handle = engine.submit(SearchRequest {
//!     expected_filename: "Dune.Part.Two.2024.2160p.mkv".to_string(),
//!     title: "Dune: Part Two".to_string(),
//!     original_title: None,
//!     year: Some("2024".to_string()),
//!     media_type: MediaType::Movie,
//!     season: None,
//!     episode: None,
//!     catalog_id: 693134,
//! })?;
//!
//! if let Some(job) = handle.finished().await {
//!     println!("{}: {}", job.status, job.message);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod events;
pub mod health;
pub mod invalidation;
pub mod job;
pub mod library;
pub mod matcher;
pub mod normalize;
pub mod registry;
pub mod scanner;
pub mod season_episode;
pub mod store;
pub mod watcher;

// Re-export error types
pub use config::ConfigError;
pub use engine::EngineError;
pub use invalidation::InvalidationError;
pub use job::RequestError;
pub use library::LibraryError;
pub use registry::RegistryError;
pub use scanner::ScanError;
pub use store::StoreError;

pub use config::Config;
pub use engine::{Engine, EngineSettings, JobHandle};
pub use events::{EventSink, JobEvent, Observer, StatusSource};
pub use health::{HealthReport, check_links};
pub use job::{JobSnapshot, JobStatus, MediaType, SearchRequest};
pub use library::{LibraryLayout, LinkTarget};
pub use matcher::{MatchThresholds, Matcher, is_valid_match, score};
pub use scanner::{MatchHit, MountScanner};
pub use season_episode::{
    SeasonEpisode, SeasonRange, extract_season_episode, extract_season_range, extract_years,
};

use thiserror::Error;

/// Top-level error type for mount_linker operations
#[derive(Debug, Error)]
pub enum MountLinkerError {
    /// Error while loading the configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error while running jobs
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Malformed search request
    #[error("Invalid request: {0}")]
    Request(#[from] RequestError),

    /// Job control error
    #[error("Job error: {0}")]
    Registry(#[from] RegistryError),

    /// Error while scanning the mount
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// Error from the cache invalidation command
    #[error("Cache invalidation error: {0}")]
    Invalidation(#[from] InvalidationError),

    /// Error while building or managing the library
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    /// Error while persisting jobs
    #[error("Job store error: {0}")]
    Store(#[from] StoreError),
}
