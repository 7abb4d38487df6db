//! Live progress for in-flight renditions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hf_core::{EncodeProgress, EncodeStrategy, JobId};
use serde::Serialize;

/// Snapshot of one rendition being encoded.
#[derive(Debug, Clone, Serialize)]
pub struct RenditionProgress {
    pub job_id: JobId,
    pub package: String,
    pub rendition: String,
    pub strategy: EncodeStrategy,
    pub fraction: f64,
    pub fps: Option<f64>,
    pub speed: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Shared board with one slot per in-flight rendition.
///
/// Slots are added and removed concurrently by every running pipeline.
#[derive(Debug, Clone, Default)]
pub struct ProgressBoard {
    slots: Arc<DashMap<(JobId, String), RenditionProgress>>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a slot. It disappears when the returned guard is dropped.
    pub fn begin(
        &self,
        job_id: JobId,
        package: &str,
        rendition: &str,
        strategy: EncodeStrategy,
    ) -> ProgressSlot {
        let key = (job_id, rendition.to_string());
        self.slots.insert(
            key.clone(),
            RenditionProgress {
                job_id,
                package: package.to_string(),
                rendition: rendition.to_string(),
                strategy,
                fraction: 0.0,
                fps: None,
                speed: None,
                started_at: Utc::now(),
            },
        );
        ProgressSlot {
            board: self.clone(),
            key,
        }
    }

    /// All open slots, oldest first.
    pub fn snapshot(&self) -> Vec<RenditionProgress> {
        let mut all: Vec<RenditionProgress> =
            self.slots.iter().map(|entry| entry.value().clone()).collect();
        all.sort_by_key(|p| p.started_at);
        all
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Guard for one slot on a [`ProgressBoard`].
#[derive(Debug)]
pub struct ProgressSlot {
    board: ProgressBoard,
    key: (JobId, String),
}

impl ProgressSlot {
    pub fn update(&self, sample: &EncodeProgress) {
        if let Some(mut slot) = self.board.slots.get_mut(&self.key) {
            slot.fraction = sample.fraction;
            slot.fps = sample.fps;
            slot.speed = sample.speed.clone();
        }
    }
}

impl Drop for ProgressSlot {
    fn drop(&mut self) {
        self.board.slots.remove(&self.key);
    }
}
