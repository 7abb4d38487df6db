//! Media-domain types shared by the engines and the packager.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// What the metadata inspector learned about a source file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
    /// Container bitrate in bits per second, when the container reports one.
    pub bitrate: Option<u64>,
}

/// Which codec implementation an encode attempt uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodeStrategy {
    /// Hardware-assisted encoder (nvenc, qsv, vaapi, videotoolbox).
    Accelerated,
    /// CPU-only libx264.
    Software,
}

impl fmt::Display for EncodeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeStrategy::Accelerated => f.write_str("accelerated"),
            EncodeStrategy::Software => f.write_str("software"),
        }
    }
}

/// Everything an encode engine needs to produce one segmented rendition.
///
/// Both strategies receive the same request; only `strategy` differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeRequest {
    pub input: PathBuf,
    /// Rendition name, e.g. `720p`.
    pub rendition: String,
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
    /// Encoder speed/quality preset (`veryfast`, `medium`, `slow`).
    pub preset: String,
    /// CRF-equivalent quality value.
    pub quality: u32,
    pub segment_duration_secs: u32,
    /// Segment filename pattern, e.g. `<dir>/segment_%03d.ts`.
    pub segment_pattern: PathBuf,
    /// Where the rendition index (`playlist.m3u8`) is written.
    pub index_path: PathBuf,
    pub strategy: EncodeStrategy,
    /// Source duration, used to turn engine timestamps into a fraction.
    pub duration_secs: Option<f64>,
}

/// A progress sample emitted while an encode is running.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncodeProgress {
    /// 0.0..=1.0
    pub fraction: f64,
    pub frame: Option<u64>,
    /// Instantaneous encode rate in frames per second.
    pub fps: Option<f64>,
    /// Encode speed relative to realtime, as reported by the engine (`2.1x`).
    pub speed: Option<String>,
}
