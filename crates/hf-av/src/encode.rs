//! Segmented H.264/AAC rendition encoding using ffmpeg.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hf_core::config::PackagingConfig;
use hf_core::{EncodeEngine, EncodeProgress, EncodeRequest, EncodeStrategy, Error, Result};
use tokio::sync::mpsc;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Minimum interval between two progress samples.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

/// Resolve a hardware acceleration method to the `-hwaccel` flags that go
/// before `-i` and the matching H.264 encoder.
///
/// Unknown methods resolve to software `libx264` with no extra flags.
fn resolve_hw_accel(method: &str) -> (Vec<&'static str>, &'static str) {
    match method {
        "videotoolbox" => (vec!["-hwaccel", "videotoolbox"], "h264_videotoolbox"),
        "nvenc" => (vec!["-hwaccel", "cuda"], "h264_nvenc"),
        "vaapi" => (
            vec!["-hwaccel", "vaapi", "-hwaccel_output_format", "vaapi"],
            "h264_vaapi",
        ),
        "qsv" => (vec!["-hwaccel", "qsv"], "h264_qsv"),
        _ => (vec![], "libx264"),
    }
}

/// An [`EncodeEngine`] that drives the ffmpeg CLI.
///
/// Both strategies share one argument layout: scale filter, bitrate ceiling,
/// AAC audio and the HLS muxer. The software strategy adds libx264's preset
/// and CRF; the accelerated strategy swaps in the hardware encoder and
/// targets the bitrate directly.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    ffmpeg_path: PathBuf,
    hw_method: String,
    audio_bitrate: String,
    timeout: Duration,
}

impl FfmpegEngine {
    pub fn new(ffmpeg_path: PathBuf) -> Self {
        let defaults = PackagingConfig::default();
        Self {
            ffmpeg_path,
            hw_method: defaults.hw_accel_method,
            audio_bitrate: defaults.audio_bitrate,
            timeout: Duration::from_secs(defaults.encode_timeout_secs),
        }
    }

    /// Build an engine from the discovered ffmpeg and the packaging config.
    pub fn from_config(tools: &ToolRegistry, config: &PackagingConfig) -> Result<Self> {
        let ffmpeg = tools.require("ffmpeg")?;
        Ok(Self {
            ffmpeg_path: ffmpeg.to_path_buf(),
            hw_method: config.hw_accel_method.clone(),
            audio_bitrate: config.audio_bitrate.clone(),
            timeout: Duration::from_secs(config.encode_timeout_secs),
        })
    }

    pub fn with_hw_method(mut self, method: impl Into<String>) -> Self {
        self.hw_method = method.into();
        self
    }

    /// The full ffmpeg argument list for one request.
    pub fn build_args(&self, req: &EncodeRequest) -> Vec<String> {
        let (hwaccel_args, encoder) = match req.strategy {
            EncodeStrategy::Accelerated => resolve_hw_accel(&self.hw_method),
            EncodeStrategy::Software => (vec![], "libx264"),
        };
        let software = encoder == "libx264";
        let bitrate = format!("{}k", req.bitrate_kbps);
        let bufsize = format!("{}k", req.bitrate_kbps * 2);

        let mut args: Vec<String> = ["-y", "-hide_banner", "-nostats", "-progress", "pipe:2"]
            .into_iter()
            .map(String::from)
            .collect();

        // Hardware acceleration flags must appear before -i.
        args.extend(hwaccel_args.iter().map(|a| a.to_string()));
        args.push("-i".into());
        args.push(req.input.to_string_lossy().to_string());

        args.push("-map".into());
        args.push("0:v:0".into());
        args.push("-map".into());
        args.push("0:a:0?".into());

        // 4:2:0 output needs even dimensions.
        let (width, height) = (even(req.width), even(req.height));
        let scale = if encoder == "h264_vaapi" {
            format!("scale_vaapi=w={width}:h={height}")
        } else {
            format!("scale={width}:{height}")
        };
        args.push("-vf".into());
        args.push(scale);

        args.push("-c:v".into());
        args.push(encoder.into());
        if software {
            // Capped CRF: quality-driven, never above the rendition bitrate.
            args.extend([
                "-preset".to_string(),
                req.preset.clone(),
                "-crf".to_string(),
                req.quality.to_string(),
                "-profile:v".to_string(),
                "main".to_string(),
            ]);
        } else {
            args.push("-b:v".into());
            args.push(bitrate.clone());
        }
        args.extend(["-maxrate".to_string(), bitrate, "-bufsize".to_string(), bufsize]);

        // Keyframe on every segment boundary so segments start cleanly.
        args.push("-force_key_frames".into());
        args.push(format!("expr:gte(t,n_forced*{})", req.segment_duration_secs));

        args.extend(
            ["-c:a", "aac", "-ar", "48000", "-ac", "2", "-b:a"]
                .into_iter()
                .map(String::from),
        );
        args.push(self.audio_bitrate.clone());

        args.extend(["-f", "hls", "-hls_time"].into_iter().map(String::from));
        args.push(req.segment_duration_secs.to_string());
        args.extend(
            ["-hls_list_size", "0", "-hls_playlist_type", "vod", "-hls_segment_filename"]
                .into_iter()
                .map(String::from),
        );
        args.push(req.segment_pattern.to_string_lossy().to_string());
        args.push(req.index_path.to_string_lossy().to_string());

        args
    }
}

#[async_trait]
impl EncodeEngine for FfmpegEngine {
    async fn encode(
        &self,
        request: &EncodeRequest,
        progress: mpsc::UnboundedSender<EncodeProgress>,
    ) -> Result<()> {
        let args = self.build_args(request);
        tracing::debug!(
            rendition = %request.rendition,
            strategy = %request.strategy,
            "ffmpeg {}",
            args.join(" ")
        );

        let mut cmd = ToolCommand::new(self.ffmpeg_path.clone());
        cmd.timeout(self.timeout);
        cmd.args(args);

        let mut parser = ProgressParser::new(request.duration_secs);
        cmd.execute_with_stderr_callback(|line| {
            if let Some(sample) = parser.feed(line) {
                // The reader may have gone away; the encode still runs.
                let _ = progress.send(sample);
            }
        })
        .await
        .map_err(|e| {
            Error::encode(
                &request.rendition,
                format!("{} encode failed: {e}", request.strategy),
            )
        })?;

        Ok(())
    }
}

/// Incremental parser for ffmpeg's `-progress` key/value stream.
///
/// Each block of `key=value` lines ends with `progress=continue` or
/// `progress=end`; a sample is produced at block end, throttled to one every
/// couple of seconds except for the final block.
#[derive(Debug)]
pub struct ProgressParser {
    duration_secs: Option<f64>,
    interval: Duration,
    last_emit: Option<Instant>,
    out_time_us: Option<i64>,
    frame: Option<u64>,
    fps: Option<f64>,
    speed: Option<String>,
}

impl ProgressParser {
    pub fn new(duration_secs: Option<f64>) -> Self {
        Self {
            duration_secs,
            interval: PROGRESS_INTERVAL,
            last_emit: None,
            out_time_us: None,
            frame: None,
            fps: None,
            speed: None,
        }
    }

    /// Override the throttle interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Feed one stderr line; returns a sample when a block completes and the
    /// throttle allows it.
    pub fn feed(&mut self, line: &str) -> Option<EncodeProgress> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();
        match key {
            "out_time_us" => self.out_time_us = value.parse().ok(),
            "frame" => self.frame = value.parse().ok(),
            "fps" => self.fps = value.parse().ok(),
            "speed" => {
                self.speed = (value != "N/A").then(|| value.to_string());
            }
            "progress" => return self.finish_block(value == "end"),
            _ => {}
        }
        None
    }

    fn finish_block(&mut self, end: bool) -> Option<EncodeProgress> {
        let now = Instant::now();
        let due = self
            .last_emit
            .map_or(true, |last| now.duration_since(last) >= self.interval);
        if !due && !end {
            return None;
        }
        self.last_emit = Some(now);

        let fraction = if end {
            1.0
        } else {
            match (self.out_time_us, self.duration_secs) {
                (Some(us), Some(dur)) if dur > 0.0 => {
                    (us as f64 / 1_000_000.0 / dur).clamp(0.0, 1.0)
                }
                _ => 0.0,
            }
        };

        Some(EncodeProgress {
            fraction,
            frame: self.frame,
            fps: self.fps,
            speed: self.speed.clone(),
        })
    }
}

fn even(n: u32) -> u32 {
    n.saturating_add(n & 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn request(strategy: EncodeStrategy) -> EncodeRequest {
        EncodeRequest {
            input: PathBuf::from("/media/in/clip.mp4"),
            rendition: "720p".into(),
            width: 1280,
            height: 720,
            bitrate_kbps: 2500,
            preset: "medium".into(),
            quality: 23,
            segment_duration_secs: 10,
            segment_pattern: PathBuf::from("/out/clip/.720p.partial/segment_%03d.ts"),
            index_path: PathBuf::from("/out/clip/.720p.partial/playlist.m3u8"),
            strategy,
            duration_secs: Some(100.0),
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn resolve_hw_accel_methods() {
        assert_eq!(resolve_hw_accel("nvenc"), (vec!["-hwaccel", "cuda"], "h264_nvenc"));
        assert_eq!(resolve_hw_accel("qsv"), (vec!["-hwaccel", "qsv"], "h264_qsv"));
        assert_eq!(
            resolve_hw_accel("videotoolbox"),
            (vec!["-hwaccel", "videotoolbox"], "h264_videotoolbox")
        );
        assert_eq!(resolve_hw_accel("vaapi").1, "h264_vaapi");
        assert_eq!(resolve_hw_accel("none"), (vec![], "libx264"));
    }

    #[test]
    fn software_args() {
        let engine = FfmpegEngine::new(PathBuf::from("ffmpeg"));
        let args = engine.build_args(&request(EncodeStrategy::Software));

        assert_eq!(value_after(&args, "-i"), Some("/media/in/clip.mp4"));
        assert_eq!(value_after(&args, "-vf"), Some("scale=1280:720"));
        assert_eq!(value_after(&args, "-c:v"), Some("libx264"));
        assert_eq!(value_after(&args, "-preset"), Some("medium"));
        assert_eq!(value_after(&args, "-crf"), Some("23"));
        assert_eq!(value_after(&args, "-maxrate"), Some("2500k"));
        assert_eq!(value_after(&args, "-bufsize"), Some("5000k"));
        assert_eq!(value_after(&args, "-hls_time"), Some("10"));
        assert_eq!(
            value_after(&args, "-hls_segment_filename"),
            Some("/out/clip/.720p.partial/segment_%03d.ts")
        );
        assert_eq!(args.last().map(String::as_str), Some("/out/clip/.720p.partial/playlist.m3u8"));
        assert!(!args.iter().any(|a| a == "-hwaccel"));
    }

    #[test]
    fn accelerated_args_share_scale_and_bitrate() {
        let engine = FfmpegEngine::new(PathBuf::from("ffmpeg")).with_hw_method("nvenc");
        let sw = engine.build_args(&request(EncodeStrategy::Software));
        let hw = engine.build_args(&request(EncodeStrategy::Accelerated));

        assert_eq!(value_after(&hw, "-hwaccel"), Some("cuda"));
        assert_eq!(value_after(&hw, "-c:v"), Some("h264_nvenc"));
        assert_eq!(value_after(&hw, "-b:v"), Some("2500k"));
        assert!(value_after(&hw, "-crf").is_none());
        for flag in ["-vf", "-maxrate", "-hls_time", "-hls_segment_filename"] {
            assert_eq!(value_after(&hw, flag), value_after(&sw, flag), "{flag}");
        }
        // -hwaccel must come before the input.
        let hwaccel = hw.iter().position(|a| a == "-hwaccel").unwrap();
        let input = hw.iter().position(|a| a == "-i").unwrap();
        assert!(hwaccel < input);
    }

    #[test]
    fn odd_width_is_padded_for_the_encoder() {
        let engine = FfmpegEngine::new(PathBuf::from("ffmpeg"));
        let mut req = request(EncodeStrategy::Software);
        req.rendition = "480p".into();
        req.width = 853;
        req.height = 480;
        let args = engine.build_args(&req);
        assert_eq!(value_after(&args, "-vf"), Some("scale=854:480"));
    }

    #[test]
    fn vaapi_scales_on_the_gpu() {
        let engine = FfmpegEngine::new(PathBuf::from("ffmpeg")).with_hw_method("vaapi");
        let args = engine.build_args(&request(EncodeStrategy::Accelerated));
        assert_eq!(value_after(&args, "-vf"), Some("scale_vaapi=w=1280:h=720"));
    }

    #[test]
    fn progress_block_produces_sample() {
        let mut parser = ProgressParser::new(Some(100.0)).with_interval(Duration::ZERO);
        assert!(parser.feed("frame=1200").is_none());
        assert!(parser.feed("fps=48.5").is_none());
        assert!(parser.feed("out_time_us=25000000").is_none());
        assert!(parser.feed("speed=2.01x").is_none());

        let sample = parser.feed("progress=continue").unwrap();
        assert!((sample.fraction - 0.25).abs() < 1e-9);
        assert_eq!(sample.frame, Some(1200));
        assert_eq!(sample.fps, Some(48.5));
        assert_eq!(sample.speed.as_deref(), Some("2.01x"));
    }

    #[test]
    fn progress_is_throttled_but_end_always_reported() {
        let mut parser = ProgressParser::new(Some(100.0));
        parser.feed("out_time_us=1000000");
        assert!(parser.feed("progress=continue").is_some());
        parser.feed("out_time_us=2000000");
        assert!(parser.feed("progress=continue").is_none());
        let end = parser.feed("progress=end").unwrap();
        assert_eq!(end.fraction, 1.0);
    }

    #[test]
    fn unknown_duration_reports_zero_fraction() {
        let mut parser = ProgressParser::new(None).with_interval(Duration::ZERO);
        parser.feed("out_time_us=N/A");
        parser.feed("speed=N/A");
        let sample = parser.feed("progress=continue").unwrap();
        assert_eq!(sample.fraction, 0.0);
        assert!(sample.speed.is_none());
    }

    #[test]
    fn non_progress_lines_are_ignored() {
        let mut parser = ProgressParser::new(Some(10.0)).with_interval(Duration::ZERO);
        assert!(parser.feed("[hls @ 0x55d] Opening 'segment_000.ts' for writing").is_none());
        assert!(parser.feed("").is_none());
    }

    #[tokio::test]
    async fn failing_engine_reports_encode_error() {
        let engine = FfmpegEngine::new(PathBuf::from("nonexistent_ffmpeg_xyz"));
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = engine
            .encode(&request(EncodeStrategy::Software), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Encode { ref rendition, .. } if rendition == "720p"));
        assert!(!Path::new("/out/clip/.720p.partial/playlist.m3u8").exists());
    }
}
