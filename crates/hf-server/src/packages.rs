//! Discovery of finished and in-progress packages under the output root.
//!
//! A package is any directory holding a `master.m3u8`. Its id is its path
//! relative to the output root with `/` separators, so categories show up
//! as id prefixes (`movies/Clip`).

use std::path::{Component, Path, PathBuf};

use hf_core::{Error, Result};
use hf_package::layout::{PackageLayout, MANIFEST_FILE};
use hf_package::{manifest, CompletionProber};
use serde::Serialize;

use crate::thumbnails::find_package_dirs;

/// Listing entry for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageSummary {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    /// Thumbnail URL, present once the thumbnail exists.
    pub thumbnail: Option<String>,
    /// Master manifest URL.
    pub url: String,
}

/// One rendition referenced by a package manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenditionEntry {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub bandwidth: u64,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageDetail {
    #[serde(flatten)]
    pub summary: PackageSummary,
    pub renditions: Vec<RenditionEntry>,
    /// Every rendition in the manifest is fully on disk.
    pub complete: bool,
}

/// URL prefix the output root is served under.
pub const VIDEOS_PREFIX: &str = "/videos";

/// All packages under `output_root`, sorted by id.
pub fn list_packages(output_root: &Path) -> Vec<PackageSummary> {
    let mut packages: Vec<PackageSummary> = find_package_dirs(output_root)
        .iter()
        .filter_map(|dir| summarize(output_root, dir))
        .collect();
    packages.sort_by(|a, b| a.id.cmp(&b.id));
    packages
}

/// Detail view for the package with `id`.
pub fn package_detail(
    output_root: &Path,
    id: &str,
    prober: &dyn CompletionProber,
) -> Result<PackageDetail> {
    let dir = resolve_id(output_root, id)?;
    if !dir.join(MANIFEST_FILE).is_file() {
        return Err(Error::not_found("package", id));
    }
    let summary = summarize(output_root, &dir).ok_or_else(|| Error::not_found("package", id))?;

    let renditions = match manifest::load(&dir)? {
        Some(loaded) => loaded
            .entries
            .iter()
            .map(|entry| RenditionEntry {
                name: entry.rendition().to_string(),
                width: entry.width,
                height: entry.height,
                bandwidth: entry.bandwidth,
                url: format!("{VIDEOS_PREFIX}/{}/{}", summary.id, entry.uri),
            })
            .collect(),
        None => Vec::new(),
    };

    Ok(PackageDetail {
        complete: prober.package_complete(&dir),
        summary,
        renditions,
    })
}

/// Map an id back to a directory, refusing anything that could escape the
/// output root.
fn resolve_id(output_root: &Path, id: &str) -> Result<PathBuf> {
    let rel = Path::new(id.trim_matches('/'));
    let safe = !rel.as_os_str().is_empty()
        && rel.components().all(|c| match c {
            Component::Normal(part) => !part.to_string_lossy().starts_with('.'),
            _ => false,
        });
    if !safe {
        return Err(Error::Validation(format!("invalid package id: {id}")));
    }
    Ok(output_root.join(rel))
}

fn summarize(output_root: &Path, dir: &Path) -> Option<PackageSummary> {
    let rel = dir.strip_prefix(output_root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    let (name, category) = parts.split_last()?;
    let id = parts.join("/");

    let thumbnail = PackageLayout::new(dir)
        .thumbnail_path()
        .is_file()
        .then(|| format!("{VIDEOS_PREFIX}/{id}/thumbnail.jpg"));

    Some(PackageSummary {
        name: name.clone(),
        category: (!category.is_empty()).then(|| category.join("/")),
        thumbnail,
        url: format!("{VIDEOS_PREFIX}/{id}/{MANIFEST_FILE}"),
        id,
    })
}
