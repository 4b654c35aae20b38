//! Library path builder and library management
//!
//! The library is a two-way split of `Movies/` and `Shows/` under a root.
//! Every title gets one folder whose name embeds the catalog id in a fixed
//! bracket token (`Dune (2021) {tmdb-438631}`), so the tree can be re-associated
//! with catalog entries without any external index.

use crate::job::{MediaType, SearchRequest};
use crate::scanner::is_video_file;
use crate::season_episode::{SeasonEpisode, extract_season_episode};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const MOVIES_DIR: &str = "Movies";
pub const SHOWS_DIR: &str = "Shows";

/// Fallback when a title sanitizes to nothing
const UNKNOWN_TITLE: &str = "Unknown";

/// Levels of empty parent folders removed after unlinking
const CLEANUP_LEVELS: usize = 2;

/// Errors that can occur while building or managing the library
#[derive(Debug, Error)]
pub enum LibraryError {
    /// Catalog marker cannot be embedded in a pattern
    #[error("Invalid catalog marker: {0}")]
    InvalidMarker(#[from] regex::Error),

    /// Source path has no file name
    #[error("Source has no file name: {0}")]
    InvalidSource(PathBuf),

    /// Folder name reduces to nothing usable
    #[error("Invalid folder name: {0}")]
    InvalidFolderName(String),

    /// Path does not exist
    #[error("Not found: {0}")]
    NotFound(PathBuf),

    /// Failed to create a library directory
    #[error("Failed to create directory {path}: {source}")]
    CreateDirectoryFailed { path: PathBuf, source: io::Error },

    /// Failed to create the link
    #[error("Failed to link {link} -> {target}: {source}")]
    LinkFailed {
        link: PathBuf,
        target: PathBuf,
        source: io::Error,
    },

    /// Failed to remove a file, link or directory
    #[error("Failed to remove {path}: {source}")]
    RemoveFailed { path: PathBuf, source: io::Error },

    /// Failed to read a directory or link
    #[error("Failed to read {path}: {source}")]
    ReadFailed { path: PathBuf, source: io::Error },
}

/// Metadata deciding where a file lands in the library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTarget<'a> {
    pub media_type: MediaType,
    /// Display title, before sanitizing
    pub title: &'a str,
    pub year: Option<&'a str>,
    pub catalog_id: u64,
    /// Requested season; the matched filename may override it
    pub season: Option<u32>,
}

impl<'a> LinkTarget<'a> {
    pub fn for_request(request: &'a SearchRequest, use_original_title: bool) -> Self {
        Self {
            media_type: request.media_type,
            title: request.display_title(use_original_title),
            year: request.year.as_deref(),
            catalog_id: request.catalog_id,
            season: request.season,
        }
    }
}

/// A title folder, optionally with the season folder inside it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryEntry {
    pub folder_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season_dir: Option<String>,
    pub catalog_id: Option<u64>,
}

/// Computed destination of a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPlan {
    pub source: PathBuf,
    pub entry: LibraryEntry,
    /// Directory holding the link
    pub directory: PathBuf,
    pub link_path: PathBuf,
}

/// Titles present in the library
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Library {
    pub movies: Vec<LibraryEntry>,
    pub shows: Vec<LibraryEntry>,
}

/// State of a library file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkInfo {
    pub path: PathBuf,
    pub is_symlink: bool,
    /// Link target, or the path itself for regular files
    pub target: PathBuf,
    /// Whether the target still resolves
    pub alive: bool,
}

/// Library root plus the naming rules for folders and files
#[derive(Debug, Clone)]
pub struct LibraryLayout {
    root: PathBuf,
    catalog_marker: String,
    catalog_id_re: Regex,
}

impl LibraryLayout {
    /// Creates a layout for `root` using `{<catalog_marker>-<id>}` tokens
    pub fn new(root: impl Into<PathBuf>, catalog_marker: &str) -> Result<Self, LibraryError> {
        let catalog_id_re = Regex::new(&format!(r"\{{{}-(\d+)\}}", regex::escape(catalog_marker)))?;
        Ok(Self {
            root: root.into(),
            catalog_marker: catalog_marker.to_string(),
            catalog_id_re,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `Movies/` or `Shows/` under the root
    pub fn media_dir(&self, media_type: MediaType) -> PathBuf {
        match media_type {
            MediaType::Movie => self.root.join(MOVIES_DIR),
            MediaType::Tv => self.root.join(SHOWS_DIR),
        }
    }

    /// `"{title} ({year}) {marker-id}"`, or without the year segment
    pub fn folder_name(&self, title: &str, year: Option<&str>, catalog_id: u64) -> String {
        let clean = clean_display_title(title);
        match year.map(str::trim).filter(|y| !y.is_empty()) {
            Some(year) => format!(
                "{} ({}) {{{}-{}}}",
                clean, year, self.catalog_marker, catalog_id
            ),
            None => format!("{} {{{}-{}}}", clean, self.catalog_marker, catalog_id),
        }
    }

    /// Extracts the catalog id from a folder name
    ///
    /// The token closest to the end wins, so a title that itself contains a
    /// bracket token cannot shadow the id appended by [`folder_name`](Self::folder_name).
    pub fn parse_catalog_id(&self, folder_name: &str) -> Option<u64> {
        self.catalog_id_re
            .captures_iter(folder_name)
            .last()
            .and_then(|caps| caps[1].parse().ok())
    }

    /// Computes where `source` will be linked, without touching the disk
    pub fn plan(&self, source: &Path, target: &LinkTarget<'_>) -> Result<LinkPlan, LibraryError> {
        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| LibraryError::InvalidSource(source.to_path_buf()))?;
        let extension = source
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let clean = clean_display_title(target.title);
        let year = target.year.map(str::trim).filter(|y| !y.is_empty());
        if year.is_none() {
            warn!(title = %target.title, "No year available, catalog matching may suffer");
        }

        let folder_name = self.folder_name(target.title, year, target.catalog_id);
        let mut directory = self.media_dir(target.media_type).join(&folder_name);

        let (season_dir, link_name) = match target.media_type {
            MediaType::Movie => {
                let link_name = match year {
                    Some(year) => format!("{} ({}){}", clean, year, extension),
                    None => format!("{}{}", clean, extension),
                };
                (None, link_name)
            }
            MediaType::Tv => {
                let parsed = extract_season_episode(&file_name);
                if let (Some(found), Some(requested)) = (parsed.season, target.season) {
                    if found != requested {
                        warn!(
                            file = %file_name,
                            requested,
                            found,
                            "Matched file belongs to a different season, using the file's season"
                        );
                    }
                }
                let season = parsed.season.or(target.season);
                let season_dir = season.map(|s| format!("Season {:02}", s));
                (season_dir, episode_link_name(&file_name, &extension, parsed, season))
            }
        };

        if let Some(season_dir) = &season_dir {
            directory.push(season_dir);
        }
        let link_path = directory.join(&link_name);

        Ok(LinkPlan {
            source: source.to_path_buf(),
            entry: LibraryEntry {
                catalog_id: Some(target.catalog_id),
                folder_name,
                season_dir,
            },
            directory,
            link_path,
        })
    }

    /// Links `source` into the library and returns the link path
    ///
    /// Directories are created as needed. An existing file or link at the
    /// destination is replaced.
    pub fn place(&self, source: &Path, target: &LinkTarget<'_>) -> Result<PathBuf, LibraryError> {
        let plan = self.plan(source, target)?;

        fs::create_dir_all(&plan.directory).map_err(|e| LibraryError::CreateDirectoryFailed {
            path: plan.directory.clone(),
            source: e,
        })?;

        if fs::symlink_metadata(&plan.link_path).is_ok() {
            debug!(path = %plan.link_path.display(), "Replacing existing link");
            fs::remove_file(&plan.link_path).map_err(|e| LibraryError::RemoveFailed {
                path: plan.link_path.clone(),
                source: e,
            })?;
        }

        symlink(&plan.source, &plan.link_path).map_err(|e| LibraryError::LinkFailed {
            link: plan.link_path.clone(),
            target: plan.source.clone(),
            source: e,
        })?;

        info!(
            link = %plan.link_path.display(),
            target = %plan.source.display(),
            "Library link created"
        );
        Ok(plan.link_path)
    }

    /// Links an operator-chosen file from the mount, bypassing the watcher
    ///
    /// `relative_source` is resolved below `mount_root`; a leading `/` is
    /// ignored.
    pub fn manual_link(
        &self,
        mount_root: &Path,
        relative_source: &str,
        target: &LinkTarget<'_>,
    ) -> Result<PathBuf, LibraryError> {
        let source = mount_root.join(relative_source.trim_start_matches('/'));
        if !source.exists() {
            return Err(LibraryError::NotFound(source));
        }
        self.place(&source, target)
    }

    /// Fast check whether the requested item is already in the library
    ///
    /// For an episode, the season folder must hold a file naming that exact
    /// season and episode. Otherwise any video file in the folder counts.
    pub fn link_exists(&self, target: &LinkTarget<'_>, episode: Option<u32>) -> bool {
        let mut directory = self
            .media_dir(target.media_type)
            .join(self.folder_name(target.title, target.year, target.catalog_id));
        if let (MediaType::Tv, Some(season)) = (target.media_type, target.season) {
            directory.push(format!("Season {:02}", season));
        }

        let Ok(entries) = fs::read_dir(&directory) else {
            return false;
        };
        let mut names = entries.filter_map(Result::ok).map(|entry| entry.path());

        match (target.media_type, target.season, episode) {
            (MediaType::Tv, Some(season), Some(episode)) => names.any(|path| {
                let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
                name.is_some_and(|name| {
                    extract_season_episode(&name)
                        == SeasonEpisode {
                            season: Some(season),
                            episode: Some(episode),
                        }
                })
            }),
            _ => names.any(|path| is_video_file(&path)),
        }
    }

    /// Title folders under `Movies/` and `Shows/`, sorted by name
    pub fn list(&self) -> Result<Library, LibraryError> {
        Ok(Library {
            movies: self.list_media_dir(MediaType::Movie)?,
            shows: self.list_media_dir(MediaType::Tv)?,
        })
    }

    fn list_media_dir(&self, media_type: MediaType) -> Result<Vec<LibraryEntry>, LibraryError> {
        let dir = self.media_dir(media_type);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let read_failed = |e| LibraryError::ReadFailed {
            path: dir.clone(),
            source: e,
        };

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir).map_err(read_failed)? {
            let entry = entry.map_err(read_failed)?;
            if !entry.path().is_dir() {
                continue;
            }
            let folder_name = entry.file_name().to_string_lossy().into_owned();
            entries.push(LibraryEntry {
                catalog_id: self.parse_catalog_id(&folder_name),
                folder_name,
                season_dir: None,
            });
        }
        entries.sort_by(|a, b| a.folder_name.cmp(&b.folder_name));
        Ok(entries)
    }

    /// Removes a library link, then up to two levels of emptied folders
    ///
    /// Never removes the library root or its `Movies/` and `Shows/` folders.
    /// Returns the folders that were removed.
    pub fn remove_link(&self, path: &Path) -> Result<Vec<PathBuf>, LibraryError> {
        if fs::symlink_metadata(path).is_err() {
            return Err(LibraryError::NotFound(path.to_path_buf()));
        }
        fs::remove_file(path).map_err(|e| LibraryError::RemoveFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        let protected = [
            self.root.clone(),
            self.media_dir(MediaType::Movie),
            self.media_dir(MediaType::Tv),
        ];

        let mut removed = Vec::new();
        let mut current = path.parent();
        for _ in 0..CLEANUP_LEVELS {
            let Some(dir) = current else { break };
            if protected.iter().any(|p| p == dir) {
                break;
            }
            let is_empty = fs::read_dir(dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !is_empty || fs::remove_dir(dir).is_err() {
                break;
            }
            removed.push(dir.to_path_buf());
            current = dir.parent();
        }

        info!(path = %path.display(), removed_dirs = removed.len(), "Library link removed");
        Ok(removed)
    }

    /// Deletes one season folder of a show
    pub fn delete_season(&self, folder_name: &str, season: u32) -> Result<PathBuf, LibraryError> {
        let folder = safe_folder_name(folder_name)?;
        let dir = self
            .media_dir(MediaType::Tv)
            .join(folder)
            .join(format!("Season {:02}", season));
        remove_tree(&dir)?;
        info!(folder = %folder, season, "Season deleted");
        Ok(dir)
    }

    /// Deletes a whole movie or show folder
    pub fn delete_title(
        &self,
        media_type: MediaType,
        folder_name: &str,
    ) -> Result<PathBuf, LibraryError> {
        let folder = safe_folder_name(folder_name)?;
        let dir = self.media_dir(media_type).join(folder);
        remove_tree(&dir)?;
        info!(folder = %folder, %media_type, "Title deleted");
        Ok(dir)
    }
}

/// Makes a display title safe for use as a folder or file name
///
/// Drops filesystem-hostile characters and smart double quotes, turns smart
/// single quotes into `'`, collapses whitespace and strips trailing dots.
///
/// ```ignore
/// assert_eq!(sanitize_title("Mission: Impossible"), "Mission Impossible");
/// ```
pub fn sanitize_title(title: &str) -> String {
    let replaced: String = title
        .chars()
        .filter(|c| {
            !matches!(
                c,
                '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|' | '\u{201C}' | '\u{201D}'
            )
        })
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();

    replaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches('.')
        .to_string()
}

fn clean_display_title(title: &str) -> String {
    let clean = sanitize_title(title);
    if clean.is_empty() {
        warn!(title, "Title is empty after sanitizing");
        UNKNOWN_TITLE.to_string()
    } else {
        clean
    }
}

/// Link name of a series file
fn episode_link_name(
    file_name: &str,
    extension: &str,
    parsed: SeasonEpisode,
    season: Option<u32>,
) -> String {
    let name = match parsed {
        SeasonEpisode {
            season: Some(s),
            episode: Some(e),
        } => format!("S{:02}E{:02}{}", s, e, extension),
        SeasonEpisode {
            season: Some(_),
            episode: None,
        } => {
            let clean = sanitize_title(file_name);
            if clean.ends_with(extension) {
                clean
            } else {
                format!("{}{}", clean, extension)
            }
        }
        _ => {
            warn!(file = %file_name, "Could not parse season or episode, keeping file name");
            let stem = file_name.strip_suffix(extension).unwrap_or(file_name);
            format!("{}{}", sanitize_title(stem), extension)
        }
    };

    if name.trim().is_empty() || name == extension {
        format!(
            "episode_{}_{}{}",
            season.unwrap_or(0),
            parsed.episode.unwrap_or(0),
            extension
        )
    } else {
        name
    }
}

/// Reduces a folder name to its final component
fn safe_folder_name(folder_name: &str) -> Result<&str, LibraryError> {
    match Path::new(folder_name).components().next_back() {
        Some(Component::Normal(name)) => name
            .to_str()
            .ok_or_else(|| LibraryError::InvalidFolderName(folder_name.to_string())),
        _ => Err(LibraryError::InvalidFolderName(folder_name.to_string())),
    }
}

fn remove_tree(dir: &Path) -> Result<(), LibraryError> {
    if !dir.is_dir() {
        return Err(LibraryError::NotFound(dir.to_path_buf()));
    }
    fs::remove_dir_all(dir).map_err(|e| LibraryError::RemoveFailed {
        path: dir.to_path_buf(),
        source: e,
    })
}

/// Inspects a library file: link target and whether it still resolves
pub fn inspect_link(path: &Path) -> Result<LinkInfo, LibraryError> {
    let metadata =
        fs::symlink_metadata(path).map_err(|_| LibraryError::NotFound(path.to_path_buf()))?;

    if metadata.file_type().is_symlink() {
        let target = fs::read_link(path).map_err(|e| LibraryError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(LinkInfo {
            path: path.to_path_buf(),
            is_symlink: true,
            alive: path.exists(),
            target,
        })
    } else {
        Ok(LinkInfo {
            path: path.to_path_buf(),
            is_symlink: false,
            target: path.to_path_buf(),
            alive: true,
        })
    }
}

#[cfg(unix)]
fn symlink(source: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, link)
}

#[cfg(windows)]
fn symlink(source: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(source, link)
}
