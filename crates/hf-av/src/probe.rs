//! FFprobe-based [`MetadataInspector`] implementation.
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_format -show_streams`
//! and maps the JSON output into [`SourceInfo`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use hf_core::{Error, MetadataInspector, Result, SourceInfo};
use serde::Deserialize;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// A metadata inspector backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeInspector {
    ffprobe_path: PathBuf,
}

impl FfprobeInspector {
    /// Create a new inspector using the given ffprobe path.
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self { ffprobe_path }
    }

    /// Create an inspector from a discovered tool registry.
    pub fn from_registry(tools: &ToolRegistry) -> Result<Self> {
        Ok(Self::new(tools.require("ffprobe")?.to_path_buf()))
    }
}

#[async_trait]
impl MetadataInspector for FfprobeInspector {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    async fn inspect(&self, path: &Path) -> Result<SourceInfo> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.timeout(PROBE_TIMEOUT);
        cmd.args([
            "-v", "quiet",
            "-print_format", "json",
            "-show_format",
            "-show_streams",
        ]);
        cmd.arg(path.to_string_lossy().as_ref());

        let output = cmd.execute().await.map_err(|e| {
            Error::Probe(format!("{} is not a readable media file: {e}", path.display()))
        })?;

        parse_ffprobe_json(&output.stdout)
            .map_err(|e| Error::Probe(format!("{}: {e}", path.display())))
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    #[serde(default)]
    disposition: FfprobeDisposition,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

/// Parse ffprobe's JSON output into a [`SourceInfo`].
///
/// The first video stream with non-zero dimensions wins; cover art
/// (`attached_pic`) is not a video track.
pub fn parse_ffprobe_json(json: &str) -> std::result::Result<SourceInfo, String> {
    let output: FfprobeOutput =
        serde_json::from_str(json).map_err(|e| format!("ffprobe JSON parse error: {e}"))?;

    let video = output
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("video"))
        .filter(|s| s.disposition.attached_pic == 0)
        .find(|s| s.width.unwrap_or(0) > 0 && s.height.unwrap_or(0) > 0)
        .ok_or_else(|| "no decodable video track".to_string())?;

    let duration_secs = output
        .format
        .duration
        .as_deref()
        .or(video.duration.as_deref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    let bitrate = output
        .format
        .bit_rate
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok());

    Ok(SourceInfo {
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        duration_secs,
        bitrate,
    })
}
