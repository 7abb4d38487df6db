//! Packaging event system.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent events so that late subscribers (and the status
//! endpoint) can see what happened before they attached.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use tokio::sync::broadcast;

use crate::ids::{EventId, JobId};
use crate::media::EncodeStrategy;

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 200;

/// Payload describing what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    // -- Job lifecycle -------------------------------------------------------
    JobQueued {
        job_id: JobId,
        source: PathBuf,
        duration_ms: u64,
        tier_rank: u32,
    },
    JobAdmitted {
        job_id: JobId,
        running: usize,
    },
    JobCompleted {
        job_id: JobId,
        package_dir: PathBuf,
        encoded: Vec<String>,
        reused: Vec<String>,
    },
    JobFailed {
        job_id: JobId,
        error: String,
    },

    // -- Renditions ----------------------------------------------------------
    RenditionStarted {
        job_id: JobId,
        rendition: String,
        strategy: EncodeStrategy,
    },
    RenditionProgress {
        job_id: JobId,
        rendition: String,
        progress: f64,
        fps: Option<f64>,
    },
    RenditionCompleted {
        job_id: JobId,
        rendition: String,
        strategy: EncodeStrategy,
    },
    RenditionReused {
        job_id: JobId,
        rendition: String,
    },
    RenditionFailed {
        job_id: JobId,
        rendition: String,
        strategy: EncodeStrategy,
        error: String,
    },
}

impl EventPayload {
    /// The job this event belongs to.
    pub fn job_id(&self) -> JobId {
        match self {
            EventPayload::JobQueued { job_id, .. }
            | EventPayload::JobAdmitted { job_id, .. }
            | EventPayload::JobCompleted { job_id, .. }
            | EventPayload::JobFailed { job_id, .. }
            | EventPayload::RenditionStarted { job_id, .. }
            | EventPayload::RenditionProgress { job_id, .. }
            | EventPayload::RenditionCompleted { job_id, .. }
            | EventPayload::RenditionReused { job_id, .. }
            | EventPayload::RenditionFailed { job_id, .. } => *job_id,
        }
    }
}

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh id and the current timestamp.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Broadcast channel with a bounded ring buffer of recent events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// `capacity` controls the broadcast channel buffer size (not the ring
    /// buffer, which is always [`MAX_RECENT_EVENTS`]).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers and store it in the
    /// ring buffer.
    pub fn publish(&self, payload: EventPayload) {
        let event = Event::new(payload);

        // Progress samples are high-volume; keep them out of the history.
        if !matches!(event.payload, EventPayload::RenditionProgress { .. }) {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    /// Return the `n` most recent events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
