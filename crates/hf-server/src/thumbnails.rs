//! Package thumbnails.
//!
//! The encoder asks for a thumbnail every time a rendition lands; the first
//! request for a package without `thumbnail.jpg` grabs a frame from one of
//! that rendition's segments. Requests never block the caller and failures
//! are only logged.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use hf_av::{extract_thumbnail, ToolRegistry};
use hf_core::config::ThumbnailConfig;
use hf_core::{Result, ThumbnailRequester};
use hf_package::completion::parse_segment_uris;
use hf_package::layout::{PackageLayout, INDEX_FILE, MANIFEST_FILE};
use hf_package::manifest;

/// Background thumbnail generator, de-duplicated per package.
#[derive(Clone)]
pub struct ThumbnailService {
    tools: Arc<ToolRegistry>,
    config: ThumbnailConfig,
    /// Package dirs with a generation in flight.
    in_flight: Arc<DashMap<PathBuf, ()>>,
}

impl ThumbnailService {
    pub fn new(tools: Arc<ToolRegistry>, config: ThumbnailConfig) -> Self {
        Self {
            tools,
            config,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Write `<package>/thumbnail.jpg` from a segment of `rendition_dir`.
    ///
    /// Returns `false` without doing anything when the thumbnail already
    /// exists or the rendition lists no segments.
    pub async fn generate(&self, rendition_dir: &Path) -> Result<bool> {
        let Some(package_dir) = rendition_dir.parent() else {
            return Ok(false);
        };
        let output = PackageLayout::new(package_dir).thumbnail_path();
        if output.exists() {
            return Ok(false);
        }

        let index = tokio::fs::read_to_string(rendition_dir.join(INDEX_FILE)).await?;
        let Some(segment) = pick_segment(&index, self.config.segment_index) else {
            tracing::debug!("No segments listed in {}", rendition_dir.display());
            return Ok(false);
        };

        extract_thumbnail(
            &self.tools,
            &rendition_dir.join(segment),
            &output,
            self.config.width,
            self.config.height,
        )
        .await?;
        tracing::info!(package = %package_dir.display(), "Thumbnail written");
        Ok(true)
    }

    /// Fill in missing thumbnails for every package under `output_root`.
    ///
    /// Returns how many thumbnails were written.
    pub async fn scan_missing(&self, output_root: &Path) -> usize {
        if !self.config.enabled {
            return 0;
        }

        let root = output_root.to_path_buf();
        let packages = tokio::task::spawn_blocking(move || find_package_dirs(&root))
            .await
            .unwrap_or_default();

        let mut written = 0;
        for package_dir in packages {
            let layout = PackageLayout::new(&package_dir);
            if layout.thumbnail_path().exists() {
                continue;
            }
            let Ok(Some(loaded)) = manifest::load(&package_dir) else {
                continue;
            };
            let Some(entry) = loaded.entries.first() else {
                continue;
            };
            match self.generate(&layout.rendition_dir(entry.rendition())).await {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(package = %package_dir.display(), "Thumbnail failed: {e}")
                }
            }
        }

        if written > 0 {
            tracing::info!("Generated {written} missing thumbnails");
        }
        written
    }
}

impl ThumbnailRequester for ThumbnailService {
    fn request_thumbnail(&self, rendition_dir: &Path) {
        if !self.config.enabled {
            return;
        }
        let Some(package_dir) = rendition_dir.parent().map(Path::to_path_buf) else {
            return;
        };
        if PackageLayout::new(&package_dir).thumbnail_path().exists() {
            return;
        }
        if self.in_flight.insert(package_dir.clone(), ()).is_some() {
            return;
        }

        let service = self.clone();
        let rendition_dir = rendition_dir.to_path_buf();
        tokio::spawn(async move {
            if let Err(e) = service.generate(&rendition_dir).await {
                tracing::warn!(package = %package_dir.display(), "Thumbnail failed: {e}");
            }
            service.in_flight.remove(&package_dir);
        });
    }
}

/// The segment at `index`, or the first one when the rendition is shorter.
pub fn pick_segment(playlist: &str, index: usize) -> Option<&str> {
    let segments = parse_segment_uris(playlist);
    segments
        .get(index)
        .or_else(|| segments.first())
        .copied()
}

/// Every directory under `root` holding a master manifest, skipping hidden
/// entries.
pub fn find_package_dirs(root: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == MANIFEST_FILE)
        .filter_map(|e| e.path().parent().map(Path::to_path_buf))
        .collect()
}
