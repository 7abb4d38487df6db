//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which builds a full [`AppContext`] around a
//! scripted encode engine and a table-driven inspector, with temporary
//! source and output directories. No real ffmpeg is needed.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hf_av::ToolRegistry;
use hf_core::config::Config;
use hf_core::{
    EncodeEngine, EncodeProgress, EncodeRequest, EncodeStrategy, Error, MetadataInspector, Result,
    SourceInfo,
};
use hf_package::SchedulerStats;
use hf_server::context::AppContext;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Inspector answering from a table keyed by file name.
#[derive(Default)]
pub struct FakeInspector {
    table: Mutex<HashMap<String, SourceInfo>>,
}

impl FakeInspector {
    pub fn insert(&self, file_name: &str, width: u32, height: u32, duration_secs: f64) {
        self.table.lock().insert(
            file_name.to_string(),
            SourceInfo {
                width,
                height,
                duration_secs,
                bitrate: Some(6_000_000),
            },
        );
    }
}

#[async_trait]
impl MetadataInspector for FakeInspector {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn inspect(&self, path: &Path) -> Result<SourceInfo> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.table
            .lock()
            .get(&name)
            .copied()
            .ok_or_else(|| Error::Probe(format!("{name}: no decodable video track")))
    }
}

/// Engine that writes a small rendition (index plus segments) for every
/// request, unless told to fail a rendition or a strategy.
#[derive(Default)]
pub struct FakeEngine {
    requests: Mutex<Vec<EncodeRequest>>,
    failing: Mutex<HashSet<(String, EncodeStrategy)>>,
    no_gpu: Mutex<bool>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
}

impl FakeEngine {
    /// Make `rendition` fail with `strategy`.
    pub fn fail(&self, rendition: &str, strategy: EncodeStrategy) {
        self.failing.lock().insert((rendition.to_string(), strategy));
    }

    /// Make every accelerated attempt fail, as on a host without a GPU.
    pub fn without_gpu(&self) {
        *self.no_gpu.lock() = true;
    }

    /// Hold the first encode of the named input until the returned notify
    /// fires.
    pub fn hold(&self, input_name: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.gates
            .lock()
            .insert(input_name.to_string(), notify.clone());
        notify
    }

    pub fn requests(&self) -> Vec<EncodeRequest> {
        self.requests.lock().clone()
    }

    /// `(rendition, strategy)` of every attempt on the named input.
    pub fn attempts_for(&self, input_name: &str) -> Vec<(String, EncodeStrategy)> {
        self.requests()
            .into_iter()
            .filter(|r| r.input.file_name().is_some_and(|n| n == input_name))
            .map(|r| (r.rendition, r.strategy))
            .collect()
    }

    /// Input file names in the order their first encode started.
    pub fn input_order(&self) -> Vec<String> {
        let mut order: Vec<String> = Vec::new();
        for r in self.requests() {
            let name = r
                .input
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if !order.contains(&name) {
                order.push(name);
            }
        }
        order
    }

    pub fn clear(&self) {
        self.requests.lock().clear();
    }
}

#[async_trait]
impl EncodeEngine for FakeEngine {
    async fn encode(
        &self,
        request: &EncodeRequest,
        progress: mpsc::UnboundedSender<EncodeProgress>,
    ) -> Result<()> {
        self.requests.lock().push(request.clone());

        let input_name = request
            .input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let gate = self.gates.lock().remove(&input_name);
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let scripted = self
            .failing
            .lock()
            .contains(&(request.rendition.clone(), request.strategy));
        let no_gpu = request.strategy == EncodeStrategy::Accelerated && *self.no_gpu.lock();
        if scripted || no_gpu {
            return Err(Error::tool("ffmpeg", "scripted failure"));
        }

        let dir = request
            .index_path
            .parent()
            .ok_or_else(|| Error::Internal("index path has no parent".into()))?;
        let mut index = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n");
        for i in 0..3 {
            let name = format!("segment_{i:03}.ts");
            std::fs::write(dir.join(&name), b"ts")?;
            index.push_str(&format!("#EXTINF:10.0,\n{name}\n"));
        }
        index.push_str("#EXT-X-ENDLIST\n");
        std::fs::write(&request.index_path, index)?;

        let _ = progress.send(EncodeProgress {
            fraction: 1.0,
            ..Default::default()
        });
        Ok(())
    }
}

/// A full application context over temporary directories and fake engines.
pub struct TestHarness {
    pub ctx: AppContext,
    pub inspector: Arc<FakeInspector>,
    pub engine: Arc<FakeEngine>,
    pub sources: TempDir,
    pub output: TempDir,
    pub cancel: CancellationToken,
    pub scheduler_task: JoinHandle<()>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with(|_| {})
    }

    /// Build a harness, letting the caller adjust the config first.
    pub fn with(adjust: impl FnOnce(&mut Config)) -> Self {
        let sources = tempfile::tempdir().expect("failed to create source dir");
        let output = tempfile::tempdir().expect("failed to create output dir");

        let mut config = Config::default();
        config.watch.enabled = false;
        config.watch.paths = vec![sources.path().to_path_buf()];
        config.packaging.output_root = output.path().to_path_buf();
        config.packaging.max_concurrent_jobs = Some(2);
        config.thumbnails.enabled = false;
        adjust(&mut config);

        let inspector = Arc::new(FakeInspector::default());
        let engine = Arc::new(FakeEngine::default());
        let cancel = CancellationToken::new();
        let (ctx, scheduler_task) = AppContext::with_engines(
            config,
            Arc::new(ToolRegistry::default()),
            inspector.clone(),
            engine.clone(),
            cancel.clone(),
        );

        Self {
            ctx,
            inspector,
            engine,
            sources,
            output,
            cancel,
            scheduler_task,
        }
    }

    /// Create a source file under the source root and register its metadata.
    pub fn add_source(&self, rel: &str, width: u32, height: u32, duration_secs: f64) -> PathBuf {
        let path = self.sources.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create source subdir");
        }
        std::fs::write(&path, b"not really a video").expect("failed to write source");
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.inspector.insert(&name, width, height, duration_secs);
        path
    }

    pub fn package_dir(&self, rel: &str) -> PathBuf {
        self.output.path().join(rel)
    }

    /// The master manifest of a package, as text.
    pub fn manifest(&self, rel: &str) -> String {
        std::fs::read_to_string(self.package_dir(rel).join("master.m3u8"))
            .expect("manifest should exist")
    }

    /// Poll the scheduler until `pred` holds on its stats.
    pub async fn wait_for_stats(&self, pred: impl Fn(&SchedulerStats) -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            if pred(&self.ctx.scheduler.stats()) {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for scheduler stats: {:?}",
                self.ctx.scheduler.stats()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stop the scheduler and wait for it to drain.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.scheduler_task.await;
    }
}
