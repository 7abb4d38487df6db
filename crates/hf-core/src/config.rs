//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for the server, watcher, packager, tools and thumbnails.
//! Every section defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

/// Quality profile names the ladder planner understands.
pub const QUALITY_PROFILES: &[&str] = &["low", "medium", "high"];

/// Hardware acceleration methods the ffmpeg engine understands.
pub const HW_ACCEL_METHODS: &[&str] = &["nvenc", "qsv", "vaapi", "videotoolbox"];

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub watch: WatchConfig,
    pub packaging: PackagingConfig,
    pub tools: ToolsConfig,
    pub thumbnails: ThumbnailConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None`, the file does not exist, or it fails to parse.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.watch.enabled && self.watch.paths.is_empty() {
            warnings.push("watch is enabled but no watch.paths are configured".into());
        }

        let packaging = &self.packaging;
        if packaging.max_concurrent_jobs == Some(0) {
            warnings.push("packaging.max_concurrent_jobs is 0; using 1".into());
        }
        if packaging.segment_duration_secs == 0 {
            warnings.push("packaging.segment_duration_secs is 0; using 10".into());
        }
        if !QUALITY_PROFILES.contains(&packaging.quality_profile.as_str()) {
            warnings.push(format!(
                "packaging.quality_profile '{}' is not recognized (valid: {}); using medium",
                packaging.quality_profile,
                QUALITY_PROFILES.join(", ")
            ));
        }
        if packaging.hw_accel && !HW_ACCEL_METHODS.contains(&packaging.hw_accel_method.as_str()) {
            warnings.push(format!(
                "packaging.hw_accel_method '{}' is not a recognized method (valid: {})",
                packaging.hw_accel_method,
                HW_ACCEL_METHODS.join(", ")
            ));
        }

        for root in &self.watch.paths {
            if root.starts_with(&packaging.output_root) {
                warnings.push(format!(
                    "watch path {} is inside packaging.output_root; segments would be re-submitted",
                    root.display()
                ));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allow cross-origin requests from any origin.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3001,
            cors: true,
        }
    }
}

/// Source directory watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub enabled: bool,
    /// Source-watch roots. A source's category is its parent directory
    /// relative to the root it was found under.
    pub paths: Vec<PathBuf>,
    pub settle_time_secs: u64,
    pub extensions: Vec<String>,
    /// Submit every existing source under the watch roots at startup.
    pub scan_existing: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            paths: Vec::new(),
            settle_time_secs: 2,
            extensions: ["mp4", "mkv", "avi", "mov", "wmv"]
                .into_iter()
                .map(String::from)
                .collect(),
            scan_existing: false,
        }
    }
}

/// What to do with the rest of a package once one rendition has failed
/// with every strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep encoding the remaining renditions.
    #[default]
    Continue,
    /// Stop the package at the first failed rendition.
    Abort,
}

/// Packager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagingConfig {
    /// Transcoded-output root; one package directory per source below it.
    pub output_root: PathBuf,
    /// Packages encoded concurrently. `None` means half the available CPUs.
    pub max_concurrent_jobs: Option<usize>,
    pub segment_duration_secs: u32,
    /// Try the hardware encoder before falling back to software.
    pub hw_accel: bool,
    /// Hardware method used by the accelerated strategy.
    pub hw_accel_method: String,
    /// `low`, `medium` or `high`. Unknown names behave like `medium`.
    pub quality_profile: String,
    pub failure_policy: FailurePolicy,
    /// Upper bound for a single rendition encode.
    pub encode_timeout_secs: u64,
    pub audio_bitrate: String,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("./transcoded"),
            max_concurrent_jobs: None,
            segment_duration_secs: 10,
            hw_accel: false,
            hw_accel_method: "nvenc".into(),
            quality_profile: "medium".into(),
            failure_policy: FailurePolicy::Continue,
            encode_timeout_secs: 6 * 60 * 60,
            audio_bitrate: "128k".into(),
        }
    }
}

impl PackagingConfig {
    /// Effective concurrency limit: the configured value (at least 1), or
    /// half the available processing units.
    pub fn effective_max_concurrent_jobs(&self) -> usize {
        match self.max_concurrent_jobs {
            Some(n) => n.max(1),
            None => (num_cpus::get() / 2).max(1),
        }
    }

    /// Effective segment duration (a zero duration falls back to 10s).
    pub fn effective_segment_duration(&self) -> u32 {
        if self.segment_duration_secs == 0 {
            10
        } else {
            self.segment_duration_secs
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Thumbnail extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub enabled: bool,
    pub width: u32,
    pub height: u32,
    /// Which listed segment to grab the frame from; falls back to the first.
    pub segment_index: usize,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            width: 640,
            height: 360,
            segment_index: 3,
        }
    }
}
