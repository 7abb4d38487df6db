//! Scripted engines and fixture writers shared by the unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use hf_core::{
    EncodeEngine, EncodeProgress, EncodeRequest, EncodeStrategy, Error, MetadataInspector, Result,
    SourceInfo, ThumbnailRequester,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::layout::PackageLayout;

/// Write a complete rendition with `segments` segment files.
pub fn write_rendition(package_dir: &Path, name: &str, segments: usize) {
    write_rendition_files(&package_dir.join(name), segments);
}

fn write_rendition_files(dir: &Path, segments: usize) {
    std::fs::create_dir_all(dir).unwrap();
    let mut index = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n");
    for i in 0..segments {
        let name = format!("segment_{i:03}.ts");
        std::fs::write(dir.join(&name), b"ts").unwrap();
        index.push_str(&format!("#EXTINF:10.0,\n{name}\n"));
    }
    index.push_str("#EXT-X-ENDLIST\n");
    std::fs::write(dir.join("playlist.m3u8"), index).unwrap();
}

/// Write a master manifest referencing `renditions` (no existence checks).
pub fn write_manifest(package_dir: &Path, renditions: &[&str]) {
    std::fs::create_dir_all(package_dir).unwrap();
    let mut text = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
    for name in renditions {
        text.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH=1000000,RESOLUTION=854x480\n{}\n",
            PackageLayout::index_uri(name)
        ));
    }
    std::fs::write(package_dir.join("master.m3u8"), text).unwrap();
}

/// What a [`ScriptedEngine`] does for one rendition and strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineScript {
    Succeed,
    /// Report success without writing anything.
    SucceedEmpty,
    Fail,
    /// Write some segments but no index, then fail.
    FailAfterPartial,
}

/// Fake encode engine that writes segment files and records requests.
#[derive(Default)]
pub struct ScriptedEngine {
    scripts: HashMap<(String, EncodeStrategy), EngineScript>,
    requests: Mutex<Vec<EncodeRequest>>,
    gates: Mutex<HashMap<PathBuf, Arc<Notify>>>,
    rendition_gates: Mutex<HashMap<String, Arc<Notify>>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, rendition: &str, strategy: EncodeStrategy, script: EngineScript) -> Self {
        self.scripts.insert((rendition.to_string(), strategy), script);
        self
    }

    /// Make encodes of `input` wait until the returned notify fires.
    pub fn gate(&self, input: &Path) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.gates
            .lock()
            .insert(input.to_path_buf(), notify.clone());
        notify
    }

    /// Make the first encode of `rendition` wait until the returned notify
    /// fires.
    pub fn hold_rendition(&self, rendition: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.rendition_gates
            .lock()
            .insert(rendition.to_string(), notify.clone());
        notify
    }

    /// Wait until an encode of `rendition` has started.
    pub async fn started(&self, rendition: &str) {
        while !self.requests().iter().any(|r| r.rendition == rendition) {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }

    pub fn requests(&self) -> Vec<EncodeRequest> {
        self.requests.lock().clone()
    }

    pub fn strategies_for(&self, rendition: &str) -> Vec<EncodeStrategy> {
        self.requests()
            .into_iter()
            .filter(|r| r.rendition == rendition)
            .map(|r| r.strategy)
            .collect()
    }

    /// Input files in the order their first encode started.
    pub fn inputs(&self) -> Vec<PathBuf> {
        let mut seen: Vec<PathBuf> = Vec::new();
        for r in self.requests() {
            if !seen.contains(&r.input) {
                seen.push(r.input);
            }
        }
        seen
    }
}

#[async_trait]
impl EncodeEngine for ScriptedEngine {
    async fn encode(
        &self,
        request: &EncodeRequest,
        progress: mpsc::UnboundedSender<EncodeProgress>,
    ) -> Result<()> {
        self.requests.lock().push(request.clone());

        let gate = self.gates.lock().remove(&request.input);
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let gate = self.rendition_gates.lock().remove(&request.rendition);
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let script = self
            .scripts
            .get(&(request.rendition.clone(), request.strategy))
            .copied()
            .unwrap_or(EngineScript::Succeed);

        let dir = request.index_path.parent().unwrap();
        let _ = progress.send(EncodeProgress {
            fraction: 0.5,
            ..Default::default()
        });

        match script {
            EngineScript::Succeed => {
                write_rendition_files(dir, 2);
                let _ = progress.send(EncodeProgress {
                    fraction: 1.0,
                    ..Default::default()
                });
                Ok(())
            }
            EngineScript::SucceedEmpty => Ok(()),
            EngineScript::Fail => Err(Error::tool("ffmpeg", "scripted failure")),
            EngineScript::FailAfterPartial => {
                std::fs::write(dir.join("segment_000.ts"), b"ts").unwrap();
                std::fs::write(dir.join("segment_001.ts"), b"ts").unwrap();
                Err(Error::tool("ffmpeg", "scripted failure after partial output"))
            }
        }
    }
}

/// Fake inspector answering from a table keyed by file name.
#[derive(Default)]
pub struct TableInspector {
    table: HashMap<String, SourceInfo>,
}

impl TableInspector {
    pub fn with(mut self, file_name: &str, height: u32, duration_secs: f64) -> Self {
        self.table.insert(
            file_name.to_string(),
            SourceInfo {
                width: height * 16 / 9,
                height,
                duration_secs,
                bitrate: Some(4_000_000),
            },
        );
        self
    }
}

#[async_trait]
impl MetadataInspector for TableInspector {
    fn name(&self) -> &'static str {
        "table"
    }

    async fn inspect(&self, path: &Path) -> Result<SourceInfo> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.table
            .get(&name)
            .copied()
            .ok_or_else(|| Error::Probe(format!("{name}: no decodable video track")))
    }
}

/// Thumbnail requester that records every request.
#[derive(Default)]
pub struct RecordingThumbnails {
    requests: Mutex<Vec<PathBuf>>,
}

impl RecordingThumbnails {
    pub fn requests(&self) -> Vec<PathBuf> {
        self.requests.lock().clone()
    }
}

impl ThumbnailRequester for RecordingThumbnails {
    fn request_thumbnail(&self, rendition_dir: &Path) {
        self.requests.lock().push(rendition_dir.to_path_buf());
    }
}
