//! Filesystem completion checks, the basis for idempotent resume.
//!
//! Absence is a normal answer here: every check returns `false` instead of
//! an error when files are missing or unreadable.

use std::path::Path;

use crate::layout::{PackageLayout, INDEX_FILE};
use crate::manifest;

/// Decides whether renditions and packages already exist on disk.
///
/// The scheduler only sees this trait, so a persisted index could replace
/// the filesystem walk without touching the pipeline.
pub trait CompletionProber: Send + Sync {
    /// Index exists, lists at least one segment, and every listed segment
    /// exists next to it.
    fn rendition_complete(&self, package_dir: &Path, rendition: &str) -> bool;

    /// A valid manifest exists and every rendition it references is
    /// complete.
    fn package_complete(&self, package_dir: &Path) -> bool;
}

/// [`CompletionProber`] that inspects the package directory directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsCompletionProber;

impl CompletionProber for FsCompletionProber {
    fn rendition_complete(&self, package_dir: &Path, rendition: &str) -> bool {
        rendition_dir_complete(&PackageLayout::new(package_dir).rendition_dir(rendition))
    }

    fn package_complete(&self, package_dir: &Path) -> bool {
        let loaded = match manifest::load(package_dir) {
            Ok(Some(loaded)) => loaded,
            Ok(None) => return false,
            Err(e) => {
                tracing::debug!("Manifest in {} unreadable: {e}", package_dir.display());
                return false;
            }
        };

        !loaded.entries.is_empty()
            && loaded.entries.iter().all(|entry| {
                package_dir
                    .join(&entry.uri)
                    .parent()
                    .is_some_and(rendition_dir_complete)
            })
    }
}

/// Completion check for a rendition directory holding `playlist.m3u8`.
pub fn rendition_dir_complete(dir: &Path) -> bool {
    let Ok(index) = std::fs::read_to_string(dir.join(INDEX_FILE)) else {
        return false;
    };
    let segments = parse_segment_uris(&index);
    !segments.is_empty() && segments.iter().all(|uri| dir.join(uri).is_file())
}

/// Segment URIs listed in a media playlist: every non-blank line that is not
/// a tag or comment.
pub fn parse_segment_uris(index: &str) -> Vec<&str> {
    index
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}
