//! External stitching toolchain.
//!
//! A montage is turned into one blended image in two steps: a piece-layout
//! artifact is extracted from the montage, then the pieces are blended using
//! that layout. Both steps run external programs; [`StitcherClient`] is the
//! seam the orchestrator depends on, [`ImodStitcher`] the implementation that
//! shells out to the IMOD tools.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::StitchError;

use super::discover::OutputPaths;

/// Name of the piece-layout artifact, relative to the montage folder.
pub const LAYOUT_ARTIFACT: &str = "montage_plf";

/// Root name for the edge-function files written while blending.
pub const EDGES_ROOT: &str = "MONTAGE_EDGES";

/// Default program that extracts the piece layout.
pub const DEFAULT_EXTRACTPIECES: &str = "extractpieces";

/// Default program that blends the pieces.
pub const DEFAULT_BLENDMONT: &str = "blendmont";

/// Turns a raw montage into one blended raster on disk.
#[async_trait]
pub trait StitcherClient: Send + Sync {
    /// Write the piece-layout artifact for `montage` and return its path.
    async fn extract_layout(&self, montage: &Path) -> Result<PathBuf, StitchError>;

    /// Blend `montage` using `layout` and return the blended file.
    async fn stitch(&self, montage: &Path, layout: &Path) -> Result<PathBuf, StitchError>;

    /// Remove the intermediates left next to `montage`, returning what was
    /// removed.
    async fn cleanup(&self, montage: &Path) -> Result<Vec<PathBuf>, StitchError> {
        remove_intermediates(montage).await
    }
}

// =============================================================================
// IMOD
// =============================================================================

/// Runs `extractpieces` and `blendmont` with the montage folder as working
/// directory.
#[derive(Debug, Clone)]
pub struct ImodStitcher {
    extractpieces: PathBuf,
    blendmont: PathBuf,
}

impl ImodStitcher {
    pub fn new(extractpieces: impl Into<PathBuf>, blendmont: impl Into<PathBuf>) -> Self {
        Self {
            extractpieces: extractpieces.into(),
            blendmont: blendmont.into(),
        }
    }

    async fn run(&self, program: &Path, args: &[&str], cwd: &Path) -> Result<(), StitchError> {
        let tool = program.display().to_string();
        debug!(tool = %tool, args = ?args, cwd = %cwd.display(), "Running stitcher tool");

        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| StitchError::Launch {
                tool: tool.clone(),
                message: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(tool = %tool, "{}", stdout.trim_end());
        }

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let diagnostic = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        Err(StitchError::ToolFailed {
            tool,
            // -1 when the tool was killed by a signal
            status: output.status.code().unwrap_or(-1),
            stderr: diagnostic,
        })
    }
}

impl Default for ImodStitcher {
    fn default() -> Self {
        Self::new(DEFAULT_EXTRACTPIECES, DEFAULT_BLENDMONT)
    }
}

#[async_trait]
impl StitcherClient for ImodStitcher {
    async fn extract_layout(&self, montage: &Path) -> Result<PathBuf, StitchError> {
        let paths = OutputPaths::for_input(montage);
        self.run(
            &self.extractpieces,
            &[paths.name.as_str(), LAYOUT_ARTIFACT],
            &paths.folder,
        )
        .await?;

        let layout = paths.folder.join(LAYOUT_ARTIFACT);
        if !layout.exists() {
            return Err(StitchError::MissingOutput(layout));
        }
        Ok(layout)
    }

    async fn stitch(&self, montage: &Path, layout: &Path) -> Result<PathBuf, StitchError> {
        let paths = OutputPaths::for_input(montage);
        let layout_name = layout
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| LAYOUT_ARTIFACT.to_string());
        let blended_name = paths
            .blended
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.run(
            &self.blendmont,
            &[
                "-imi",
                paths.name.as_str(),
                "-pli",
                layout_name.as_str(),
                "-imo",
                blended_name.as_str(),
                "-roo",
                EDGES_ROOT,
            ],
            &paths.folder,
        )
        .await?;

        if !paths.blended.exists() {
            return Err(StitchError::MissingOutput(paths.blended));
        }
        info!(blended = %paths.blended.display(), "Montage blended");
        Ok(paths.blended)
    }
}

// =============================================================================
// Cleanup
// =============================================================================

/// Whether a file name in the montage folder is a stitcher intermediate.
pub fn is_intermediate(file_name: &str) -> bool {
    file_name.starts_with(EDGES_ROOT) || file_name.starts_with(LAYOUT_ARTIFACT)
}

/// Remove `MONTAGE_EDGES*`, `montage_plf*` and the blended file next to
/// `montage`.
///
/// Entries that vanish concurrently are ignored; any other failure stops the
/// cleanup and is returned.
pub async fn remove_intermediates(montage: &Path) -> Result<Vec<PathBuf>, StitchError> {
    fn cleanup_err(path: &Path, e: std::io::Error) -> StitchError {
        StitchError::Cleanup {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    }

    let paths = OutputPaths::for_input(montage);

    let mut targets = Vec::new();
    let mut entries = tokio::fs::read_dir(&paths.folder)
        .await
        .map_err(|e| cleanup_err(&paths.folder, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| cleanup_err(&paths.folder, e))?
    {
        if is_intermediate(&entry.file_name().to_string_lossy()) {
            targets.push(entry.path());
        }
    }
    targets.sort();
    targets.push(paths.blended);

    let mut removed = Vec::new();
    for target in targets {
        let result = match tokio::fs::symlink_metadata(&target).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&target).await,
            Ok(_) => tokio::fs::remove_file(&target).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                debug!(path = %target.display(), "Removed intermediate");
                removed.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %target.display(), error = %e, "Could not remove intermediate");
                return Err(cleanup_err(&target, e));
            }
        }
    }
    Ok(removed)
}
