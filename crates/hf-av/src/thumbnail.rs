//! Single-frame thumbnail extraction using ffmpeg.

use std::path::Path;
use std::time::Duration;

use hf_core::{Error, Result};

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

const THUMBNAIL_TIMEOUT: Duration = Duration::from_secs(60);

/// Grab the first frame of `segment`, scaled to `width`x`height`, and write
/// it as a JPEG to `output`.
///
/// ffmpeg writes into a temporary file next to `output`, which is renamed
/// into place only after ffmpeg succeeds; readers never see a partial image.
pub async fn extract_thumbnail(
    tools: &ToolRegistry,
    segment: &Path,
    output: &Path,
    width: u32,
    height: u32,
) -> Result<()> {
    let ffmpeg = tools.require("ffmpeg")?;
    let dir = output
        .parent()
        .ok_or_else(|| Error::Validation(format!("{} has no parent", output.display())))?;

    let staging = tempfile::Builder::new()
        .prefix(".thumbnail")
        .suffix(".jpg")
        .tempfile_in(dir)?;

    tracing::debug!(
        "Thumbnail: {} -> {} ({width}x{height})",
        segment.display(),
        output.display()
    );

    let mut cmd = ToolCommand::new(ffmpeg.to_path_buf());
    cmd.timeout(THUMBNAIL_TIMEOUT);
    cmd.args(["-y", "-hide_banner", "-loglevel", "error", "-i"]);
    cmd.arg(segment.to_string_lossy().as_ref());
    cmd.args(["-frames:v", "1", "-q:v", "3", "-vf"]);
    cmd.arg(format!("scale={width}:{height}"));
    cmd.arg(staging.path().to_string_lossy().as_ref());
    cmd.execute().await?;

    staging
        .persist(output)
        .map_err(|e| Error::from(e.error))?;
    Ok(())
}
