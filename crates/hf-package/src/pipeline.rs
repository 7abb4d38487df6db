//! One package, start to finish.
//!
//! The pipeline is resume-aware per rendition: whatever the filesystem
//! already holds is reused, everything else is encoded one rendition at a
//! time, and the manifest is rewritten after every rendition that lands.

use std::path::PathBuf;
use std::sync::Arc;

use hf_core::config::FailurePolicy;
use hf_core::events::{EventBus, EventPayload};
use hf_core::{Error, JobId, SourceInfo};
use serde::Serialize;

use crate::completion::CompletionProber;
use crate::encoder::RenditionEncoder;
use crate::ladder::{plan, QualityProfile, RenditionSpec};
use crate::layout::PackageLayout;
use crate::manifest::{self, LoadedManifest, WorkingManifest};

/// An admitted job, ready to run.
#[derive(Debug, Clone)]
pub struct PipelineJob {
    pub id: JobId,
    pub source: PathBuf,
    pub info: SourceInfo,
    pub layout: PackageLayout,
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageReport {
    pub package_dir: PathBuf,
    /// Renditions encoded by this run.
    pub encoded: Vec<String>,
    /// Renditions found complete on disk and kept.
    pub reused: Vec<String>,
    /// The whole package was already complete; nothing was touched.
    pub already_complete: bool,
}

/// Terminal state of a job, delivered exactly once to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed(PackageReport),
    Failed {
        reason: String,
        /// Renditions that failed with every strategy.
        failed_renditions: Vec<String>,
    },
}

impl JobOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        JobOutcome::Failed {
            reason: reason.into(),
            failed_renditions: Vec::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed(_))
    }
}

/// Ladder planning, resume checks, encoding and manifest upkeep for one
/// source.
pub struct PackagePipeline {
    prober: Arc<dyn CompletionProber>,
    encoder: RenditionEncoder,
    profile: QualityProfile,
    failure_policy: FailurePolicy,
    events: Arc<EventBus>,
}

impl PackagePipeline {
    pub fn new(
        prober: Arc<dyn CompletionProber>,
        encoder: RenditionEncoder,
        profile: QualityProfile,
        failure_policy: FailurePolicy,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            prober,
            encoder,
            profile,
            failure_policy,
            events,
        }
    }

    pub fn ladder_for(&self, info: &SourceInfo) -> Vec<RenditionSpec> {
        plan(info.height, info.width, self.profile)
    }

    pub async fn run(&self, job: &PipelineJob) -> JobOutcome {
        let dir = job.layout.dir();
        let ladder = self.ladder_for(&job.info);
        if ladder.is_empty() {
            return JobOutcome::failed(
                Error::pipeline(
                    "plan",
                    format!("{} has no usable video height", job.source.display()),
                )
                .to_string(),
            );
        }
        let planned: Vec<&str> = ladder.iter().map(|r| r.name.as_str()).collect();

        let previous = match manifest::load(dir) {
            Ok(previous) => previous,
            Err(e) => {
                tracing::warn!("Ignoring unreadable manifest in {}: {e}", dir.display());
                None
            }
        };

        if self.prober.package_complete(dir)
            && previous
                .as_ref()
                .is_some_and(|m| m.rendition_names() == planned)
        {
            tracing::info!(source = %job.source.display(), "Package already complete; skipping");
            return JobOutcome::Completed(PackageReport {
                package_dir: dir.to_path_buf(),
                encoded: Vec::new(),
                reused: planned.iter().map(|s| s.to_string()).collect(),
                already_complete: true,
            });
        }

        if let Err(e) = std::fs::create_dir_all(dir) {
            return JobOutcome::failed(
                Error::pipeline("prepare", format!("creating {}: {e}", dir.display())).to_string(),
            );
        }

        tracing::info!(
            source = %job.source.display(),
            renditions = ?planned,
            "Packaging into {}",
            dir.display()
        );

        let mut working = previous
            .as_ref()
            .map(WorkingManifest::from_loaded)
            .unwrap_or_default();
        let mut encoded = Vec::new();
        let mut reused = Vec::new();
        let mut failed = Vec::new();
        let mut persisted = false;
        // Renditions the manifest on disk currently lists. A file that failed
        // to load counts as a stale claim until it is rewritten.
        let mut on_disk: Vec<String> = previous
            .as_ref()
            .map(|m| m.rendition_names().into_iter().map(str::to_string).collect())
            .unwrap_or_default();
        let mut stale_file = previous.is_none() && job.layout.manifest_path().exists();

        for spec in &ladder {
            if self.prober.rendition_complete(dir, &spec.name) {
                tracing::debug!(rendition = %spec.name, "Reusing complete rendition");
                self.events.publish(EventPayload::RenditionReused {
                    job_id: job.id,
                    rendition: spec.name.clone(),
                });
                reused.push(spec.name.clone());
            } else {
                if claimed(previous.as_ref(), &spec.name) {
                    tracing::warn!(
                        rendition = %spec.name,
                        "Manifest lists rendition but it is incomplete on disk; re-encoding"
                    );
                }
                // Never leave a claim on disk for a rendition that is about to
                // be replaced, or that this run has not confirmed yet.
                let confirmed = working.rendition_names();
                if stale_file || on_disk.iter().any(|name| !confirmed.contains(&name.as_str())) {
                    if let Err(e) = manifest::persist(dir, &working) {
                        return JobOutcome::Failed {
                            reason: e.to_string(),
                            failed_renditions: failed,
                        };
                    }
                    on_disk = confirmed.iter().map(|s| s.to_string()).collect();
                    stale_file = false;
                    persisted = true;
                }
                match self
                    .encoder
                    .encode(job.id, &job.source, &job.info, &job.layout, spec)
                    .await
                {
                    Ok(_) => encoded.push(spec.name.clone()),
                    Err(e) => {
                        tracing::error!(rendition = %spec.name, "Rendition failed: {e}");
                        failed.push(spec.name.clone());
                        if self.failure_policy == FailurePolicy::Abort {
                            break;
                        }
                        continue;
                    }
                }
            }

            working = working.append(spec, spec.width);
            if let Err(e) = manifest::persist(dir, &working) {
                return JobOutcome::Failed {
                    reason: e.to_string(),
                    failed_renditions: failed,
                };
            }
            on_disk = working
                .rendition_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            stale_file = false;
            persisted = true;
        }

        // Nothing landed: still replace any stale manifest.
        if !persisted {
            if let Err(e) = manifest::persist(dir, &working) {
                return JobOutcome::Failed {
                    reason: e.to_string(),
                    failed_renditions: failed,
                };
            }
        }

        if failed.is_empty() {
            JobOutcome::Completed(PackageReport {
                package_dir: dir.to_path_buf(),
                encoded,
                reused,
                already_complete: false,
            })
        } else {
            JobOutcome::Failed {
                reason: format!(
                    "{} of {} renditions failed: {}",
                    failed.len(),
                    ladder.len(),
                    failed.join(", ")
                ),
                failed_renditions: failed,
            }
        }
    }
}

fn claimed(previous: Option<&LoadedManifest>, rendition: &str) -> bool {
    previous.is_some_and(|m| m.contains(rendition))
}
