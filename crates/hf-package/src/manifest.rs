//! Master manifest loading, synthesis and persistence.
//!
//! The manifest is rebuilt in memory for every run and rewritten in full
//! after each rendition, so a crash leaves a file that references exactly
//! the renditions finished so far. Writes go through a temporary file in the
//! package directory and an atomic rename; the previous valid manifest is
//! kept as `master.m3u8.backup`.

use std::io::Write;
use std::path::Path;

use hf_core::{Error, Result};

use crate::layout::PackageLayout;
use crate::ladder::RenditionSpec;

pub const HEADER_TAG: &str = "#EXTM3U";
pub const VERSION_TAG: &str = "#EXT-X-VERSION:3";
const STREAM_INF: &str = "#EXT-X-STREAM-INF:";

/// One variant stream: the selector attributes and the index URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub bandwidth: u64,
    pub width: u32,
    pub height: u32,
    /// Index path relative to the package, e.g. `720p/playlist.m3u8`.
    pub uri: String,
}

impl ManifestEntry {
    pub fn new(spec: &RenditionSpec, width: u32) -> Self {
        Self {
            bandwidth: spec.bandwidth(),
            width,
            height: spec.height,
            uri: PackageLayout::index_uri(&spec.name),
        }
    }

    /// Rendition name, taken from the first URI component.
    pub fn rendition(&self) -> &str {
        self.uri.split('/').next().unwrap_or(&self.uri)
    }

    fn selector(&self) -> String {
        format!(
            "{STREAM_INF}BANDWIDTH={},RESOLUTION={}x{}",
            self.bandwidth, self.width, self.height
        )
    }
}

/// A parsed, validated manifest read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedManifest {
    /// Header and metadata lines; selectors are regenerated, not kept.
    pub header: Vec<String>,
    pub entries: Vec<ManifestEntry>,
}

impl LoadedManifest {
    pub fn rendition_names(&self) -> Vec<&str> {
        self.entries.iter().map(ManifestEntry::rendition).collect()
    }

    pub fn contains(&self, rendition: &str) -> bool {
        self.entries.iter().any(|e| e.rendition() == rendition)
    }
}

/// Parse manifest text. Returns `None` when the mandatory `#EXTM3U` header
/// is missing.
pub fn parse(text: &str) -> Option<LoadedManifest> {
    let mut header = Vec::new();
    let mut entries = Vec::new();
    let mut has_header = false;
    let mut pending: Option<(u64, u32, u32)> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(attrs) = line.strip_prefix(STREAM_INF) {
            pending = Some(parse_stream_inf(attrs));
        } else if line.starts_with('#') {
            if line == HEADER_TAG {
                has_header = true;
            }
            header.push(line.to_string());
        } else if let Some((bandwidth, width, height)) = pending.take() {
            entries.push(ManifestEntry {
                bandwidth,
                width,
                height,
                uri: line.to_string(),
            });
        }
    }

    has_header.then_some(LoadedManifest { header, entries })
}

/// `(bandwidth, width, height)` from a `#EXT-X-STREAM-INF` attribute list.
fn parse_stream_inf(attrs: &str) -> (u64, u32, u32) {
    let mut bandwidth = 0;
    let (mut width, mut height) = (0, 0);

    for attr in split_attributes(attrs) {
        let Some((key, value)) = attr.split_once('=') else {
            continue;
        };
        match key.trim() {
            "BANDWIDTH" => bandwidth = value.trim().parse().unwrap_or(0),
            "RESOLUTION" => {
                if let Some((w, h)) = value.trim().split_once('x') {
                    width = w.parse().unwrap_or(0);
                    height = h.parse().unwrap_or(0);
                }
            }
            _ => {}
        }
    }

    (bandwidth, width, height)
}

/// Split on commas outside double quotes (`CODECS="avc1,mp4a"`).
fn split_attributes(attrs: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in attrs.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                parts.push(&attrs[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&attrs[start..]);
    parts
}

/// Load the package manifest.
///
/// `Ok(None)` means there is no usable manifest: the file is absent, lacks
/// the header, or references an index that does not exist. Such a manifest
/// is rebuilt, never trusted.
pub fn load(package_dir: &Path) -> Result<Option<LoadedManifest>> {
    let path = PackageLayout::new(package_dir).manifest_path();
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::Manifest(format!("reading {}: {e}", path.display())));
        }
    };

    let Some(loaded) = parse(&text) else {
        tracing::warn!("Manifest {} has no {HEADER_TAG} header; rebuilding", path.display());
        return Ok(None);
    };

    if let Some(dangling) = loaded
        .entries
        .iter()
        .find(|e| !package_dir.join(&e.uri).is_file())
    {
        tracing::warn!(
            "Manifest {} references missing {}; rebuilding",
            path.display(),
            dangling.uri
        );
        return Ok(None);
    }

    Ok(Some(loaded))
}

/// The manifest being assembled for the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingManifest {
    header: Vec<String>,
    entries: Vec<ManifestEntry>,
}

impl Default for WorkingManifest {
    fn default() -> Self {
        Self {
            header: vec![HEADER_TAG.to_string(), VERSION_TAG.to_string()],
            entries: Vec::new(),
        }
    }
}

impl WorkingManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a previous manifest's header with no entries; renditions
    /// are re-added only once the filesystem confirms them.
    pub fn from_loaded(loaded: &LoadedManifest) -> Self {
        let mut header = loaded.header.clone();
        if !header.iter().any(|l| l.starts_with("#EXT-X-VERSION:")) {
            header.push(VERSION_TAG.to_string());
        }
        Self {
            header,
            entries: Vec::new(),
        }
    }

    /// Add (or replace) the entry for `spec`.
    #[must_use]
    pub fn append(mut self, spec: &RenditionSpec, width: u32) -> Self {
        let entry = ManifestEntry::new(spec, width);
        match self.entries.iter_mut().find(|e| e.uri == entry.uri) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        self
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn rendition_names(&self) -> Vec<&str> {
        self.entries.iter().map(ManifestEntry::rendition).collect()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.header {
            out.push_str(line);
            out.push('\n');
        }
        for entry in &self.entries {
            out.push_str(&entry.selector());
            out.push('\n');
            out.push_str(&entry.uri);
            out.push('\n');
        }
        out
    }
}

/// Write `manifest` as the package's master manifest.
///
/// An existing valid manifest is copied to the backup path first. Both
/// writes are atomic.
pub fn persist(package_dir: &Path, manifest: &WorkingManifest) -> Result<()> {
    let layout = PackageLayout::new(package_dir);
    std::fs::create_dir_all(package_dir)?;

    if load(package_dir)?.is_some() {
        let previous = std::fs::read(layout.manifest_path())?;
        write_atomic(package_dir, &layout.backup_path(), &previous)?;
    }

    write_atomic(package_dir, &layout.manifest_path(), manifest.render().as_bytes())?;
    tracing::debug!(
        renditions = ?manifest.rendition_names(),
        "Wrote {}",
        layout.manifest_path().display()
    );
    Ok(())
}

fn write_atomic(dir: &Path, path: &Path, contents: &[u8]) -> Result<()> {
    let manifest_err = |e: std::io::Error| Error::Manifest(format!("writing {}: {e}", path.display()));

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(manifest_err)?;
    tmp.write_all(contents).map_err(manifest_err)?;
    tmp.as_file().sync_all().map_err(manifest_err)?;
    tmp.persist(path).map_err(|e| manifest_err(e.error))?;
    Ok(())
}
