//! Rendition encoding with strategy fallback and atomic promotion.
//!
//! Every attempt writes into a hidden staging directory next to the final
//! rendition directory. Only a finished, complete staging directory is
//! renamed into place; a failed attempt is deleted. The completion prober
//! therefore never sees a half-written rendition.

use std::path::Path;
use std::sync::Arc;

use hf_core::events::{EventBus, EventPayload};
use hf_core::{
    EncodeEngine, EncodeRequest, EncodeStrategy, Error, JobId, NoThumbnails, Result, SourceInfo,
    ThumbnailRequester,
};
use tokio::sync::mpsc;

use crate::completion::rendition_dir_complete;
use crate::ladder::RenditionSpec;
use crate::layout::{PackageLayout, INDEX_FILE, SEGMENT_PATTERN};
use crate::progress::ProgressBoard;

/// Runs one rendition through the configured strategies.
#[derive(Clone)]
pub struct RenditionEncoder {
    engine: Arc<dyn EncodeEngine>,
    hw_accel: bool,
    segment_duration_secs: u32,
    board: ProgressBoard,
    events: Arc<EventBus>,
    thumbnails: Arc<dyn ThumbnailRequester>,
}

impl RenditionEncoder {
    pub fn new(engine: Arc<dyn EncodeEngine>, board: ProgressBoard, events: Arc<EventBus>) -> Self {
        Self {
            engine,
            hw_accel: false,
            segment_duration_secs: 10,
            board,
            events,
            thumbnails: Arc::new(NoThumbnails),
        }
    }

    pub fn with_hw_accel(mut self, enabled: bool) -> Self {
        self.hw_accel = enabled;
        self
    }

    pub fn with_segment_duration(mut self, secs: u32) -> Self {
        self.segment_duration_secs = secs;
        self
    }

    pub fn with_thumbnails(mut self, thumbnails: Arc<dyn ThumbnailRequester>) -> Self {
        self.thumbnails = thumbnails;
        self
    }

    /// Strategies in the order they are tried.
    pub fn strategies(&self) -> &'static [EncodeStrategy] {
        if self.hw_accel {
            &[EncodeStrategy::Accelerated, EncodeStrategy::Software]
        } else {
            &[EncodeStrategy::Software]
        }
    }

    /// Encode `spec` into the package, falling back through the strategies.
    ///
    /// Returns the strategy that succeeded. Fails with [`Error::Encode`]
    /// only when every strategy failed.
    pub async fn encode(
        &self,
        job_id: JobId,
        source: &Path,
        info: &SourceInfo,
        layout: &PackageLayout,
        spec: &RenditionSpec,
    ) -> Result<EncodeStrategy> {
        let mut last_error = None;

        for &strategy in self.strategies() {
            self.events.publish(EventPayload::RenditionStarted {
                job_id,
                rendition: spec.name.clone(),
                strategy,
            });

            match self.attempt(job_id, source, info, layout, spec, strategy).await {
                Ok(()) => {
                    tracing::info!(
                        rendition = %spec.name,
                        %strategy,
                        "Rendition ready in {}",
                        layout.dir().display()
                    );
                    self.events.publish(EventPayload::RenditionCompleted {
                        job_id,
                        rendition: spec.name.clone(),
                        strategy,
                    });
                    self.thumbnails
                        .request_thumbnail(&layout.rendition_dir(&spec.name));
                    return Ok(strategy);
                }
                Err(e) => {
                    tracing::warn!(rendition = %spec.name, %strategy, "Encode attempt failed: {e}");
                    self.events.publish(EventPayload::RenditionFailed {
                        job_id,
                        rendition: spec.name.clone(),
                        strategy,
                        error: e.to_string(),
                    });
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no encode strategy available".to_string());
        Err(Error::encode(&spec.name, format!("all strategies failed: {reason}")))
    }

    async fn attempt(
        &self,
        job_id: JobId,
        source: &Path,
        info: &SourceInfo,
        layout: &PackageLayout,
        spec: &RenditionSpec,
        strategy: EncodeStrategy,
    ) -> Result<()> {
        let staging = layout.staging_dir(&spec.name);
        remove_dir_if_present(&staging)?;
        std::fs::create_dir_all(&staging)?;

        let request = EncodeRequest {
            input: source.to_path_buf(),
            rendition: spec.name.clone(),
            width: spec.width,
            height: spec.height,
            bitrate_kbps: spec.bitrate_kbps,
            preset: spec.preset.clone(),
            quality: spec.quality,
            segment_duration_secs: self.segment_duration_secs,
            segment_pattern: staging.join(SEGMENT_PATTERN),
            index_path: staging.join(INDEX_FILE),
            strategy,
            duration_secs: (info.duration_secs > 0.0).then_some(info.duration_secs),
        };

        let package = layout
            .dir()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let slot = self.board.begin(job_id, &package, &spec.name, strategy);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let drain = async {
            while let Some(sample) = rx.recv().await {
                slot.update(&sample);
                self.events.publish(EventPayload::RenditionProgress {
                    job_id,
                    rendition: spec.name.clone(),
                    progress: sample.fraction,
                    fps: sample.fps,
                });
            }
        };
        let (result, ()) = tokio::join!(self.engine.encode(&request, tx), drain);
        drop(slot);

        let outcome = result.and_then(|()| {
            if rendition_dir_complete(&staging) {
                promote(&staging, &layout.rendition_dir(&spec.name))
            } else {
                Err(Error::encode(
                    &spec.name,
                    "engine finished but the rendition index or segments are missing",
                ))
            }
        });

        if outcome.is_err() {
            if let Err(e) = remove_dir_if_present(&staging) {
                tracing::warn!("Failed to remove {}: {e}", staging.display());
            }
        }
        outcome
    }
}

/// Replace `target` with the finished `staging` directory.
fn promote(staging: &Path, target: &Path) -> Result<()> {
    remove_dir_if_present(target)?;
    std::fs::rename(staging, target)?;
    Ok(())
}

fn remove_dir_if_present(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
