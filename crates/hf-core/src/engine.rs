//! Contracts for the external engines the packager drives.
//!
//! The packager never shells out directly. It talks to a
//! [`MetadataInspector`], an [`EncodeEngine`] and a [`ThumbnailRequester`];
//! `hf-av` provides ffprobe/ffmpeg-backed implementations and tests provide
//! scripted ones.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::media::{EncodeProgress, EncodeRequest, SourceInfo};
use crate::Result;

/// Reads dimensions, duration and bitrate from a source file.
#[async_trait]
pub trait MetadataInspector: Send + Sync {
    /// Human-readable name identifying this implementation.
    fn name(&self) -> &'static str;

    /// Inspect a source file.
    ///
    /// Fails with [`crate::Error::Probe`] when the file has no decodable
    /// video track.
    async fn inspect(&self, path: &Path) -> Result<SourceInfo>;
}

/// Produces one segmented-stream rendition.
///
/// The call completes when the engine exits. Progress samples are pushed
/// into `progress` while it runs; the sender is dropped when the encode
/// finishes, which closes the stream for the reader.
#[async_trait]
pub trait EncodeEngine: Send + Sync {
    async fn encode(
        &self,
        request: &EncodeRequest,
        progress: mpsc::UnboundedSender<EncodeProgress>,
    ) -> Result<()>;
}

/// Fire-and-forget thumbnail generation for a finished rendition directory.
pub trait ThumbnailRequester: Send + Sync {
    fn request_thumbnail(&self, rendition_dir: &Path);
}

/// A [`ThumbnailRequester`] that ignores every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoThumbnails;

impl ThumbnailRequester for NoThumbnails {
    fn request_thumbnail(&self, _rendition_dir: &Path) {}
}
