//! Broken link detection in the library
//!
//! Files on the remote mount can disappear (expired cache, deleted torrent),
//! leaving dangling links behind. The check only reports; it never deletes.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// A link whose target no longer resolves
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenLink {
    pub path: PathBuf,
    pub target: PathBuf,
}

/// Outcome of a library health check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Number of links inspected
    pub total: usize,
    pub broken: Vec<BrokenLink>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.broken.is_empty()
    }
}

/// Walks the library and reports every link whose target is gone
///
/// A missing library root yields an empty report.
pub fn check_links(library_root: &Path) -> HealthReport {
    let mut report = HealthReport::default();

    if !library_root.exists() {
        info!(root = %library_root.display(), "Library root does not exist yet");
        return report;
    }

    for entry in WalkDir::new(library_root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable library entry");
                continue;
            }
        };
        if !entry.path_is_symlink() {
            continue;
        }

        report.total += 1;
        if entry.path().exists() {
            continue;
        }

        let target = fs::read_link(entry.path()).unwrap_or_default();
        warn!(
            link = %entry.path().display(),
            target = %target.display(),
            "Broken link"
        );
        report.broken.push(BrokenLink {
            path: entry.into_path(),
            target,
        });
    }

    info!(
        total = report.total,
        broken = report.broken.len(),
        "Health check finished"
    );
    report
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs::File;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    #[test]
    fn test_missing_root_is_healthy() {
        let report = check_links(Path::new("/nonexistent/library/root"));
        assert_eq!(report, HealthReport::default());
        assert!(report.is_healthy());
    }

    #[test]
    fn test_reports_broken_links() {
        let mount = TempDir::new().unwrap();
        let library = TempDir::new().unwrap();

        let alive = mount.path().join("alive.mkv");
        File::create(&alive).unwrap();
        let gone = mount.path().join("gone.mkv");

        let show_dir = library.path().join("Shows/Show {tmdb-1}/Season 01");
        fs::create_dir_all(&show_dir).unwrap();
        symlink(&alive, show_dir.join("S01E01.mkv")).unwrap();
        symlink(&gone, show_dir.join("S01E02.mkv")).unwrap();
        File::create(show_dir.join("notes.txt")).unwrap();

        let report = check_links(library.path());
        assert_eq!(report.total, 2);
        assert_eq!(
            report.broken,
            vec![BrokenLink {
                path: show_dir.join("S01E02.mkv"),
                target: gone,
            }]
        );
        assert!(!report.is_healthy());
        assert!(show_dir.join("S01E02.mkv").symlink_metadata().is_ok());
    }
}
