//! Application context.
//!
//! [`AppContext`] is the central struct shared across all route handlers via
//! Axum state and handed to the watcher. It only holds `Arc`s and cheap
//! handles, so cloning it is free.

use std::sync::Arc;

use hf_av::{FfmpegEngine, FfprobeInspector, ToolRegistry};
use hf_core::config::Config;
use hf_core::events::EventBus;
use hf_core::{EncodeEngine, MetadataInspector, Result};
use hf_package::{
    CompletionProber, FsCompletionProber, PackagePipeline, ProgressBoard, QualityProfile,
    RenditionEncoder, Scheduler, SchedulerConfig,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::thumbnails::ThumbnailService;

/// Application context shared by all request handlers (via Axum state).
#[derive(Clone)]
pub struct AppContext {
    /// Immutable application configuration snapshot.
    pub config: Arc<Config>,
    /// Broadcast event bus.
    pub event_bus: Arc<EventBus>,
    /// External tool registry.
    pub tools: Arc<ToolRegistry>,
    pub scheduler: Scheduler,
    /// In-flight rendition encodes.
    pub progress: ProgressBoard,
    pub prober: Arc<dyn CompletionProber>,
    pub thumbnails: ThumbnailService,
}

impl AppContext {
    /// Discover ffmpeg/ffprobe and start a scheduler backed by them.
    ///
    /// Fails when either tool is missing. The returned task is the
    /// scheduler's admission loop; it finishes after `cancel` fires and
    /// running jobs drain.
    pub fn build(config: Config, cancel: CancellationToken) -> Result<(Self, JoinHandle<()>)> {
        let tools = Arc::new(ToolRegistry::discover(&config.tools));
        for info in tools.check_all() {
            if info.available {
                tracing::info!(
                    "Tool found: {} ({})",
                    info.name,
                    info.version.as_deref().unwrap_or("unknown version")
                );
            } else {
                tracing::warn!("Tool not found: {}", info.name);
            }
        }

        let inspector: Arc<dyn MetadataInspector> =
            Arc::new(FfprobeInspector::from_registry(&tools)?);
        let engine: Arc<dyn EncodeEngine> =
            Arc::new(FfmpegEngine::from_config(&tools, &config.packaging)?);

        Ok(Self::with_engines(config, tools, inspector, engine, cancel))
    }

    /// Assemble the context around the given engines.
    pub fn with_engines(
        config: Config,
        tools: Arc<ToolRegistry>,
        inspector: Arc<dyn MetadataInspector>,
        engine: Arc<dyn EncodeEngine>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let event_bus = Arc::new(EventBus::default());
        let progress = ProgressBoard::new();
        let prober: Arc<dyn CompletionProber> = Arc::new(FsCompletionProber);
        let thumbnails = ThumbnailService::new(tools.clone(), config.thumbnails.clone());

        let packaging = &config.packaging;
        let encoder = RenditionEncoder::new(engine, progress.clone(), event_bus.clone())
            .with_hw_accel(packaging.hw_accel)
            .with_segment_duration(packaging.effective_segment_duration())
            .with_thumbnails(Arc::new(thumbnails.clone()));
        let pipeline = Arc::new(PackagePipeline::new(
            prober.clone(),
            encoder,
            QualityProfile::from_name(&packaging.quality_profile),
            packaging.failure_policy,
            event_bus.clone(),
        ));

        let (scheduler, task) = Scheduler::start(
            SchedulerConfig::from_config(&config),
            inspector,
            pipeline,
            event_bus.clone(),
            cancel,
        );

        let ctx = Self {
            config: Arc::new(config),
            event_bus,
            tools,
            scheduler,
            progress,
            prober,
            thumbnails,
        };
        (ctx, task)
    }
}
