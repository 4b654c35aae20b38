//! Job data model
//!
//! A job is one request to find a media item on the mount and link it into
//! the library. The registry keeps a [`JobState`] per job; the owning watch
//! loop drives its status, while pause/resume/cancel requests may flip it from
//! outside.

use crate::matcher::MatchQuery;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised for malformed search requests
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    /// Title is empty
    #[error("Request has no title")]
    MissingTitle,

    /// Episode given without a season
    #[error("Episode {0} requested without a season")]
    EpisodeWithoutSeason(u32),

    /// Season given for a movie
    #[error("Season {0} requested for a movie")]
    SeasonForMovie(u32),
}

/// Kind of media, deciding the library root (`Movies/` or `Shows/`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Movie => f.write_str("movie"),
            MediaType::Tv => f.write_str("tv"),
        }
    }
}

/// What to look for and where to put it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Filename announced by the upstream resolver
    pub expected_filename: String,
    pub title: String,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    pub media_type: MediaType,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub episode: Option<u32>,
    /// Numeric catalog id embedded into the library folder name
    pub catalog_id: u64,
}

impl SearchRequest {
    /// Checks the request invariants
    ///
    /// An episode requires a season, and movies carry no season.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.title.trim().is_empty() {
            return Err(RequestError::MissingTitle);
        }
        if let (Some(episode), None) = (self.episode, self.season) {
            return Err(RequestError::EpisodeWithoutSeason(episode));
        }
        if let (MediaType::Movie, Some(season)) = (self.media_type, self.season) {
            return Err(RequestError::SeasonForMovie(season));
        }
        Ok(())
    }

    /// Deterministic job id: `{catalog_id}_{season or 0}_{episode or 0}`
    pub fn job_id(&self) -> String {
        format!(
            "{}_{}_{}",
            self.catalog_id,
            self.season.unwrap_or(0),
            self.episode.unwrap_or(0)
        )
    }

    /// Borrowed view used by the match scorer
    pub fn query(&self) -> MatchQuery<'_> {
        MatchQuery {
            expected_filename: &self.expected_filename,
            title: &self.title,
            original_title: self.original_title.as_deref().filter(|t| !t.trim().is_empty()),
            year: self.year.as_deref().filter(|y| !y.trim().is_empty()),
            season: self.season,
            episode: self.episode,
        }
    }

    /// Title used for library folder names
    pub fn display_title(&self, prefer_original: bool) -> &str {
        match self.original_title.as_deref() {
            Some(original) if prefer_original && !original.trim().is_empty() => original,
            _ => &self.title,
        }
    }
}

/// Lifecycle status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Searching,
    Paused,
    Cancelled,
    Found,
    Linking,
    Completed,
    Error,
}

impl JobStatus {
    /// Completed, Cancelled and Error never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            JobStatus::Searching => "Searching",
            JobStatus::Paused => "Paused",
            JobStatus::Cancelled => "Cancelled",
            JobStatus::Found => "Found",
            JobStatus::Linking => "Linking",
            JobStatus::Completed => "Completed",
            JobStatus::Error => "Error",
        };
        f.write_str(text)
    }
}

/// Lines returned by a log read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogSlice {
    pub lines: Vec<String>,
    /// Number of lines ever appended; the cursor for the next read
    pub total: usize,
}

/// Append-only log capped at a fixed number of lines
///
/// Cursors are absolute: line `n` is the `n`-th line ever appended, so a
/// reader polling with the previous `total` never sees a line twice even
/// after the oldest lines were evicted.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
    appended: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            appended: 0,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
        self.appended += 1;
    }

    /// Lines at or after `cursor` that are still held
    pub fn since(&self, cursor: usize) -> LogSlice {
        let first_held = self.appended - self.lines.len();
        let skip = cursor.saturating_sub(first_held);
        LogSlice {
            lines: self.lines.iter().skip(skip).cloned().collect(),
            total: self.appended,
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Registry entry of one job
#[derive(Debug, Clone)]
pub struct JobState {
    pub id: String,
    pub request: SearchRequest,
    pub status: JobStatus,
    pub message: String,
    pub log: LogBuffer,
    /// Source file on the mount, once found
    pub found_path: Option<PathBuf>,
    /// Library link, once created
    pub destination: Option<PathBuf>,
    /// Bumped whenever the id is reused for a new submission
    pub generation: u64,
}

impl JobState {
    pub fn new(request: SearchRequest, log_capacity: usize) -> Self {
        Self {
            id: request.job_id(),
            request,
            status: JobStatus::Searching,
            message: "Waiting for the file to appear on the mount".to_string(),
            log: LogBuffer::new(log_capacity),
            found_path: None,
            destination: None,
            generation: 0,
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            request: self.request.clone(),
            status: self.status,
            message: self.message.clone(),
            found_path: self.found_path.clone(),
            destination: self.destination.clone(),
        }
    }
}

/// Serializable view of a job, used for persistence and reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: String,
    pub request: SearchRequest,
    pub status: JobStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
}

#[cfg(test)]
pub(crate) fn episode_request(catalog_id: u64, season: u32, episode: u32) -> SearchRequest {
    SearchRequest {
        expected_filename: format!("Show S{:02}E{:02}.mkv", season, episode),
        title: "Show".to_string(),
        original_title: None,
        year: Some("2020".to_string()),
        media_type: MediaType::Tv,
        season: Some(season),
        episode: Some(episode),
        catalog_id,
    }
}

#[cfg(test)]
pub(crate) fn movie_request(catalog_id: u64) -> SearchRequest {
    SearchRequest {
        expected_filename: "Movie.2001.mkv".to_string(),
        title: "Movie".to_string(),
        original_title: None,
        year: Some("2001".to_string()),
        media_type: MediaType::Movie,
        season: None,
        episode: None,
        catalog_id,
    }
}
