//! Batch orchestration.
//!
//! Files are converted one at a time, in discovery order. A failure is
//! recorded in the [`BatchSummary`] and the batch moves on to the next file.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::error::{ConvertError, ErrorKind, WriteError};
use crate::format::ome::{persist, temp_file_for};

use super::discover::discover_inputs;
use super::pipeline::{convert_file, ConvertOptions, FileReport};
use super::sink::{BatchEvent, EventSink};
use super::stitcher::StitcherClient;

/// A file that could not be converted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub kind: ErrorKind,
    pub message: String,
}

/// Result of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub folder: PathBuf,
    pub total: usize,
    pub succeeded: usize,
    pub reports: Vec<FileReport>,
    pub failures: Vec<FileFailure>,
}

impl BatchSummary {
    fn new(folder: &Path, total: usize) -> Self {
        Self {
            folder: folder.to_path_buf(),
            total,
            succeeded: 0,
            reports: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Whether every file converted.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Write the summary as pretty-printed JSON, atomically.
    pub fn write_json(&self, path: &Path) -> Result<(), WriteError> {
        let identifier = path.display().to_string();
        let json = serde_json::to_vec_pretty(self).map_err(|e| WriteError::io(&identifier, e))?;

        let mut temp = temp_file_for(path)?;
        temp.write_all(&json)
            .and_then(|_| temp.write_all(b"\n"))
            .map_err(|e| WriteError::io(&identifier, e))?;
        persist(temp, path)?;
        Ok(())
    }
}

/// Runs the conversion pipeline over many files.
pub struct BatchRunner {
    stitcher: Arc<dyn StitcherClient>,
    options: ConvertOptions,
    sink: Arc<dyn EventSink>,
}

impl BatchRunner {
    pub fn new(
        stitcher: Arc<dyn StitcherClient>,
        options: ConvertOptions,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            stitcher,
            options,
            sink,
        }
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Discover the montages under `folder` and convert each of them.
    ///
    /// Only a folder that cannot be searched is an error; per-file failures
    /// are part of the summary.
    pub async fn run_folder(
        &self,
        folder: &Path,
        recursive: bool,
    ) -> Result<BatchSummary, ConvertError> {
        let files = discover_inputs(folder, recursive)?;
        Ok(self.run_files(folder, &files).await)
    }

    /// Convert `files` in order.
    pub async fn run_files(&self, folder: &Path, files: &[PathBuf]) -> BatchSummary {
        let mut summary = BatchSummary::new(folder, files.len());
        self.sink.emit(&BatchEvent::BatchStarted {
            folder: folder.to_path_buf(),
            files: files.len(),
        });

        for (index, path) in files.iter().enumerate() {
            self.sink.emit(&BatchEvent::FileStarted {
                index,
                total: files.len(),
                path: path.clone(),
            });

            match convert_file(
                path,
                self.stitcher.as_ref(),
                &self.options,
                Arc::clone(&self.sink),
            )
            .await
            {
                Ok(report) => {
                    self.sink.emit(&BatchEvent::FileFinished {
                        path: path.clone(),
                        outputs: report.outputs(),
                    });
                    summary.succeeded += 1;
                    summary.reports.push(report);
                }
                Err(e) => {
                    let failure = FileFailure {
                        path: path.clone(),
                        kind: e.kind(),
                        message: e.to_string(),
                    };
                    self.sink.emit(&BatchEvent::FileFailed {
                        path: failure.path.clone(),
                        kind: failure.kind,
                        message: failure.message.clone(),
                    });
                    summary.failures.push(failure);
                }
            }
        }

        self.sink.emit(&BatchEvent::BatchFinished {
            total: summary.total,
            succeeded: summary.succeeded,
        });
        summary
    }
}
