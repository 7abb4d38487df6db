//! Source directory watcher.
//!
//! Watches the configured roots for new video files, waits until a file has
//! stopped changing for the settle time, then submits it to the scheduler.
//! Submissions run on their own tasks so a slow probe never stalls the
//! watcher.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hf_package::Scheduler;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

/// Files seen recently, keyed by path, with the time they last changed.
#[derive(Debug, Default)]
pub struct SettleTracker {
    pending: HashMap<PathBuf, Instant>,
}

impl SettleTracker {
    /// Record a change to `path` at `now`.
    pub fn touch(&mut self, path: PathBuf, now: Instant) {
        self.pending.insert(path, now);
    }

    /// Remove and return every path unchanged for at least `settle_time`.
    pub fn drain_settled(&mut self, now: Instant, settle_time: Duration) -> Vec<PathBuf> {
        let mut settled = Vec::new();
        self.pending.retain(|path, last_seen| {
            if now.duration_since(*last_seen) >= settle_time {
                settled.push(path.clone());
                false
            } else {
                true
            }
        });
        settled.sort();
        settled
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Whether `path` names a video the watcher should submit: not a dot-file,
/// and its extension is in `extensions` (lowercase, without the dot).
pub fn is_candidate(path: &Path, extensions: &[String]) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with('.') {
        return false;
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    extensions.is_empty() || extensions.contains(&ext)
}

/// Every candidate file already present under `roots`.
pub fn scan_existing(roots: &[PathBuf], extensions: &[String]) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = roots
        .iter()
        .flat_map(|root| {
            walkdir::WalkDir::new(root)
                .min_depth(1)
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
        })
        .filter(|path| is_candidate(path, extensions))
        .collect();
    found.sort();
    found
}

/// Run the watcher until `cancel` fires.
pub async fn run_watcher(ctx: AppContext, cancel: CancellationToken) {
    let watch_config = &ctx.config.watch;

    if !watch_config.enabled || watch_config.paths.is_empty() {
        tracing::info!("File watcher disabled or no paths configured");
        return;
    }

    let settle_time = Duration::from_secs(watch_config.settle_time_secs);
    let extensions: Vec<String> = watch_config
        .extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect();

    let tracker = Arc::new(Mutex::new(SettleTracker::default()));
    let tracker_clone = tracker.clone();

    let mut watcher: RecommendedWatcher = match notify::recommended_watcher(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    let now = Instant::now();
                    let mut tracker = tracker_clone.lock();
                    for path in event.paths {
                        tracker.touch(path, now);
                    }
                }
            }
            Err(e) => tracing::warn!("Watch error: {e}"),
        },
    ) {
        Ok(w) => w,
        Err(e) => {
            tracing::error!("Failed to create file watcher: {e}");
            return;
        }
    };

    for path in &watch_config.paths {
        if path.exists() {
            if let Err(e) = watcher.watch(path, RecursiveMode::Recursive) {
                tracing::warn!("Failed to watch {}: {e}", path.display());
            } else {
                tracing::info!("Watching directory: {}", path.display());
            }
        } else {
            tracing::warn!("Watch path does not exist: {}", path.display());
        }
    }

    if watch_config.scan_existing {
        let roots = watch_config.paths.clone();
        let exts = extensions.clone();
        let existing = tokio::task::spawn_blocking(move || scan_existing(&roots, &exts))
            .await
            .unwrap_or_default();
        tracing::info!("Startup scan found {} source files", existing.len());
        for path in existing {
            spawn_submit(&ctx.scheduler, path);
        }
    }

    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            _ = cancel.cancelled() => break,
        }

        let settled = tracker.lock().drain_settled(Instant::now(), settle_time);
        for path in settled {
            if !path.is_file() || !is_candidate(&path, &extensions) {
                continue;
            }
            spawn_submit(&ctx.scheduler, path);
        }
    }

    tracing::info!("File watcher stopped");
    drop(watcher);
}

/// Submit `path` and log how the job ends, without blocking the caller.
fn spawn_submit(scheduler: &Scheduler, path: PathBuf) {
    let scheduler = scheduler.clone();
    tokio::spawn(async move {
        let handle = match scheduler.submit(&path).await {
            Ok(handle) => handle,
            Err(hf_core::Error::Conflict(msg)) => {
                tracing::debug!(file = %path.display(), "Already queued: {msg}");
                return;
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Failed to queue watcher job");
                return;
            }
        };
        tracing::info!(job_id = %handle.id, file = %path.display(), "File watcher queued job");

        let id = handle.id;
        match handle.wait().await {
            hf_package::JobOutcome::Completed(report) => tracing::info!(
                job_id = %id,
                encoded = report.encoded.len(),
                reused = report.reused.len(),
                "Package ready: {}",
                report.package_dir.display()
            ),
            hf_package::JobOutcome::Failed { reason, .. } => {
                tracing::warn!(job_id = %id, file = %path.display(), "Packaging failed: {reason}")
            }
        }
    });
}
