//! Mount scanner for locating the expected file on the remote mount
//!
//! The mount is an eventually consistent view of a remote store, so every scan
//! is a best-effort snapshot. Strategies run in a fixed order and the first one
//! that produces a hit wins:
//!
//! 1. exact filename at the mount root
//! 2. exact filename inside top-level folders (bounded depth, folders sharing a
//!    keyword with the request first)
//! 3. video file under a related folder naming the requested `SxxEyy`
//! 4. match scorer over top-level entries, descending into accepted folders

use crate::matcher::Matcher;
use crate::normalize::{keywords, tokenize};
use crate::season_episode::{SeasonEpisode, extract_season_episode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// File extensions considered playable media
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "ts", "webm", "m4v", "mov", "wmv", "m2ts",
];

/// Errors that can occur while scanning the mount
#[derive(Debug, Error)]
pub enum ScanError {
    /// Mount root missing or not a directory
    #[error("Mount is not available: {0}")]
    MountUnavailable(PathBuf),

    /// Failed to list the mount root
    #[error("Failed to read directory {path}: {source}")]
    ReadDirectoryFailed { path: PathBuf, source: io::Error },

    /// The blocking scan task panicked or was aborted
    #[error("Scan task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

/// When the match scorer runs over the mount
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Only when the expected filename is not a real filename
    Auto,
    /// Whenever the exact strategies come back empty
    #[default]
    AlwaysScore,
}

/// Depth limits and fallback policy of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Folder depth searched by the exact and episode-token strategies
    pub root_exact_depth: usize,
    /// Folder depth searched inside folders accepted by the scorer
    pub fallback_depth: usize,
    pub fallback: FallbackPolicy,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            root_exact_depth: 3,
            fallback_depth: 2,
            fallback: FallbackPolicy::default(),
        }
    }
}

/// Strategy that produced a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanStrategy {
    RootExact,
    NestedExact,
    EpisodeToken,
    Scored,
}

impl fmt::Display for ScanStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ScanStrategy::RootExact => "exact filename at mount root",
            ScanStrategy::NestedExact => "exact filename in folder",
            ScanStrategy::EpisodeToken => "episode token",
            ScanStrategy::Scored => "match score",
        };
        f.write_str(text)
    }
}

/// A located video file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchHit {
    pub path: PathBuf,
    pub strategy: ScanStrategy,
    /// Score of the accepted entry, for scored hits
    pub score: Option<u8>,
}

impl MatchHit {
    fn new(path: PathBuf, strategy: ScanStrategy) -> Self {
        Self {
            path,
            strategy,
            score: None,
        }
    }
}

/// One entry directly under the mount root
#[derive(Debug, Clone)]
struct RootEntry {
    name: String,
    path: PathBuf,
    is_dir: bool,
}

/// Scanner bound to one mount root
#[derive(Debug, Clone)]
pub struct MountScanner {
    root: PathBuf,
    options: ScanOptions,
}

impl MountScanner {
    pub fn new(root: impl Into<PathBuf>, options: ScanOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Exact filename lookup only (root, then nested folders)
    pub fn find_exact(&self, matcher: &Matcher<'_>) -> Result<Option<MatchHit>, ScanError> {
        let entries = self.read_root()?;
        Ok(self.exact_match(&entries, matcher))
    }

    /// Runs every strategy in order and returns the first hit
    ///
    /// # Errors
    ///
    /// Fails only when the mount root itself cannot be listed. Unreadable
    /// folders below the root are skipped.
    pub fn scan(&self, matcher: &Matcher<'_>) -> Result<Option<MatchHit>, ScanError> {
        let entries = self.read_root()?;

        if let Some(hit) = self.exact_match(&entries, matcher) {
            return Ok(Some(hit));
        }

        if let Some(hit) = self.episode_token_match(&entries, matcher) {
            return Ok(Some(hit));
        }

        let run_scorer = match self.options.fallback {
            FallbackPolicy::AlwaysScore => true,
            FallbackPolicy::Auto => !matcher.trusts_expected_filename(),
        };
        if run_scorer {
            return Ok(self.scored_match(&entries, matcher));
        }

        Ok(None)
    }

    fn read_root(&self) -> Result<Vec<RootEntry>, ScanError> {
        if !self.root.is_dir() {
            return Err(ScanError::MountUnavailable(self.root.clone()));
        }

        let read_failed = |source| ScanError::ReadDirectoryFailed {
            path: self.root.clone(),
            source,
        };

        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(read_failed)? {
            let entry = entry.map_err(read_failed)?;
            let path = entry.path();
            entries.push(RootEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: path.is_dir(),
                path,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn exact_match(&self, entries: &[RootEntry], matcher: &Matcher<'_>) -> Option<MatchHit> {
        let expected = matcher.query().expected_filename.trim();
        if expected.is_empty() {
            return None;
        }
        let expected_lower = expected.to_lowercase();
        let expected_stem = strip_video_extension(&expected_lower).to_string();

        if let Some(entry) = entries
            .iter()
            .find(|e| !e.is_dir && e.path.is_file() && e.name.to_lowercase() == expected_lower)
        {
            debug!(path = %entry.path.display(), "Exact match at mount root");
            return Some(MatchHit::new(entry.path.clone(), ScanStrategy::RootExact));
        }

        let related = matcher.search_keywords();
        let mut folders: Vec<&RootEntry> = entries.iter().filter(|e| e.is_dir).collect();
        folders.sort_by_key(|e| !shares_keyword(&e.name, &related));

        for folder in folders {
            let found = video_files(&folder.path, self.options.root_exact_depth).find(|path| {
                let name = file_name_lower(path);
                name == expected_lower || strip_video_extension(&name) == expected_stem
            });
            if let Some(path) = found {
                debug!(path = %path.display(), "Exact match in folder");
                return Some(MatchHit::new(path, ScanStrategy::NestedExact));
            }
        }

        None
    }

    fn episode_token_match(
        &self,
        entries: &[RootEntry],
        matcher: &Matcher<'_>,
    ) -> Option<MatchHit> {
        let query = matcher.query();
        let (Some(season), Some(episode)) = (query.season, query.episode) else {
            return None;
        };
        let related = matcher.search_keywords();
        for entry in entries.iter().filter(|e| shares_keyword(&e.name, &related)) {
            if entry.is_dir {
                let found = video_files(&entry.path, self.options.root_exact_depth)
                    .find(|path| is_episode_file(&file_name_lower(path), season, episode));
                if let Some(path) = found {
                    debug!(path = %path.display(), "Episode token match in folder");
                    return Some(MatchHit::new(path, ScanStrategy::EpisodeToken));
                }
            } else if is_video_file(&entry.path) && is_episode_file(&entry.name, season, episode) {
                debug!(path = %entry.path.display(), "Episode token match at mount root");
                return Some(MatchHit::new(entry.path.clone(), ScanStrategy::EpisodeToken));
            }
        }

        None
    }

    fn scored_match(&self, entries: &[RootEntry], matcher: &Matcher<'_>) -> Option<MatchHit> {
        let accept = matcher.thresholds().accept;
        let sub_file = matcher.thresholds().sub_file;

        for entry in entries {
            let score = matcher.score(&entry.name);
            if score < accept {
                continue;
            }
            debug!(name = %entry.name, score, "Candidate accepted by scorer");

            if entry.is_dir {
                let best = video_files(&entry.path, self.options.fallback_depth)
                    .map(|path| {
                        let score = matcher.score(&file_name_lower(&path));
                        (path, score)
                    })
                    .max_by_key(|(_, score)| *score);

                match best {
                    Some((path, score)) if score >= sub_file => {
                        debug!(path = %path.display(), score, "Best file in accepted folder");
                        return Some(MatchHit {
                            path,
                            strategy: ScanStrategy::Scored,
                            score: Some(score),
                        });
                    }
                    best => {
                        debug!(
                            name = %entry.name,
                            best_score = ?best.map(|(_, s)| s),
                            "No reliable file in accepted folder"
                        );
                    }
                }
            } else if is_video_file(&entry.path) {
                return Some(MatchHit {
                    path: entry.path.clone(),
                    strategy: ScanStrategy::Scored,
                    score: Some(score),
                });
            }
        }

        None
    }
}

/// Whether the path carries an allow-listed video extension
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(ext)))
}

/// Removes an allow-listed video extension, leaving other dotted names intact
///
/// ```ignore
/// assert_eq!(strip_video_extension("Movie.2001.mkv"), "Movie.2001");
/// assert_eq!(strip_video_extension("Show.S01.1080p.WEB-DL"), "Show.S01.1080p.WEB-DL");
/// ```
pub fn strip_video_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && VIDEO_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(ext)) =>
        {
            stem
        }
        _ => name,
    }
}

/// Video files below `dir`, in folders at most `max_depth` levels deep
///
/// Depth counts path separators between `dir` and the containing folder, so
/// `max_depth == 0` only yields files directly inside `dir`. Unreadable
/// entries are skipped.
fn video_files(dir: &Path, max_depth: usize) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(max_depth + 1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!(error = %err, "Skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() || entry.path().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_video_file(path))
}

fn file_name_lower(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn shares_keyword(name: &str, related: &HashSet<String>) -> bool {
    keywords(tokenize(name)).iter().any(|word| related.contains(word))
}

/// Whether the file name states exactly the requested season and episode
fn is_episode_file(name: &str, season: u32, episode: u32) -> bool {
    extract_season_episode(name)
        == SeasonEpisode {
            season: Some(season),
            episode: Some(episode),
        }
}
