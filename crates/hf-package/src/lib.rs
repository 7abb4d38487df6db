//! hf-package: the transcode job scheduler and resumable rendition pipeline.
//!
//! - [`ladder`] plans which renditions a source gets.
//! - [`completion`] decides, from the filesystem alone, what already exists.
//! - [`manifest`] loads, rebuilds and atomically persists `master.m3u8`.
//! - [`encoder`] runs a rendition through the accelerated and software
//!   strategies and promotes finished output atomically.
//! - [`pipeline`] drives one package from ladder to manifest.
//! - [`scheduler`] orders submissions and runs pipelines under a
//!   concurrency limit.

pub mod completion;
pub mod encoder;
pub mod ladder;
pub mod layout;
pub mod manifest;
pub mod pipeline;
pub mod progress;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use completion::{CompletionProber, FsCompletionProber};
pub use encoder::RenditionEncoder;
pub use ladder::{plan, QualityProfile, RenditionSpec};
pub use layout::PackageLayout;
pub use pipeline::{JobOutcome, PackagePipeline, PackageReport, PipelineJob};
pub use progress::{ProgressBoard, RenditionProgress};
pub use scheduler::{JobHandle, JobState, JobSummary, PriorityKey, Scheduler, SchedulerConfig, SchedulerStats};
