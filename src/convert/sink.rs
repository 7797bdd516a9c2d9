//! Progress reporting for batch runs.
//!
//! The orchestrator never prints. It reports structured [`BatchEvent`]s to an
//! injected [`EventSink`]; the binary uses [`TracingSink`], embedders and
//! tests can collect events with [`MemorySink`] or their own implementation.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{error, info};

use crate::error::ErrorKind;

/// Step of the per-file pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Calibration,
    ExtractLayout,
    Stitch,
    Classify,
    OmeTiff,
    ReducedOmeTiff,
    Hdf5,
    Cleanup,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::Calibration => "calibration",
            Stage::ExtractLayout => "extract_layout",
            Stage::Stitch => "stitch",
            Stage::Classify => "classify",
            Stage::OmeTiff => "ome_tiff",
            Stage::ReducedOmeTiff => "reduced_ome_tiff",
            Stage::Hdf5 => "hdf5",
            Stage::Cleanup => "cleanup",
        }
    }
}

/// Something that happened during a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    BatchStarted {
        folder: PathBuf,
        files: usize,
    },
    FileStarted {
        index: usize,
        total: usize,
        path: PathBuf,
    },
    StageReached {
        path: PathBuf,
        stage: Stage,
    },
    FileFinished {
        path: PathBuf,
        outputs: Vec<PathBuf>,
    },
    FileFailed {
        path: PathBuf,
        kind: ErrorKind,
        message: String,
    },
    BatchFinished {
        total: usize,
        succeeded: usize,
    },
}

/// Receiver of batch events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &BatchEvent);
}

// =============================================================================
// Implementations
// =============================================================================

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &BatchEvent) {
        match event {
            BatchEvent::BatchStarted { folder, files } => {
                info!(folder = %folder.display(), files, "Batch started");
            }
            BatchEvent::FileStarted { index, total, path } => {
                info!(
                    file = %path.display(),
                    "[{}/{}] Processing",
                    index + 1,
                    total
                );
            }
            BatchEvent::StageReached { path, stage } => {
                info!(file = %path.display(), stage = stage.as_str(), "Stage");
            }
            BatchEvent::FileFinished { path, outputs } => {
                info!(file = %path.display(), outputs = outputs.len(), "File converted");
            }
            BatchEvent::FileFailed {
                path,
                kind,
                message,
            } => {
                error!(file = %path.display(), kind = ?kind, "Conversion failed: {}", message);
            }
            BatchEvent::BatchFinished { total, succeeded } => {
                info!(total, succeeded, "Processed {}/{} files successfully", succeeded, total);
            }
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<BatchEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the events received so far.
    pub fn events(&self) -> Vec<BatchEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Stages reached, in order, for one file.
    pub fn stages_for(&self, path: &std::path::Path) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                BatchEvent::StageReached { path: p, stage } if p == path => Some(stage),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &BatchEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
