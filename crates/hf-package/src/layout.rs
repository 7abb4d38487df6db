//! On-disk package layout.
//!
//! ```text
//! <output_root>/[<category>/...]/<source stem>/
//!     master.m3u8
//!     master.m3u8.backup
//!     thumbnail.jpg
//!     <rendition>/
//!         playlist.m3u8
//!         segment_000.ts ...
//! ```

use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "master.m3u8";
pub const MANIFEST_BACKUP_FILE: &str = "master.m3u8.backup";
pub const INDEX_FILE: &str = "playlist.m3u8";
pub const SEGMENT_PATTERN: &str = "segment_%03d.ts";
pub const THUMBNAIL_FILE: &str = "thumbnail.jpg";

/// Paths inside one package directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLayout {
    dir: PathBuf,
}

impl PackageLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Layout for `source`, placed under `output_root` by its category.
    pub fn for_source(output_root: &Path, watch_roots: &[PathBuf], source: &Path) -> Self {
        let stem = source
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| "untitled".into());
        let mut dir = output_root.to_path_buf();
        if let Some(category) = category_of(watch_roots, source) {
            dir.push(category);
        }
        dir.push(stem);
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_BACKUP_FILE)
    }

    pub fn thumbnail_path(&self) -> PathBuf {
        self.dir.join(THUMBNAIL_FILE)
    }

    pub fn rendition_dir(&self, rendition: &str) -> PathBuf {
        self.dir.join(rendition)
    }

    pub fn index_path(&self, rendition: &str) -> PathBuf {
        self.rendition_dir(rendition).join(INDEX_FILE)
    }

    /// Hidden sibling an encode writes into before it is renamed into place.
    pub fn staging_dir(&self, rendition: &str) -> PathBuf {
        self.dir.join(format!(".{rendition}.partial"))
    }

    /// Manifest URI of a rendition's index, relative to the package.
    pub fn index_uri(rendition: &str) -> String {
        format!("{rendition}/{INDEX_FILE}")
    }
}

/// The source's parent directory relative to the first watch root that
/// contains it. `None` when the source sits directly in a root or outside
/// every root.
pub fn category_of(watch_roots: &[PathBuf], source: &Path) -> Option<PathBuf> {
    let parent = source.parent()?;
    watch_roots
        .iter()
        .find_map(|root| parent.strip_prefix(root).ok())
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(Path::to_path_buf)
}
