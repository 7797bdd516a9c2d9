//! Input discovery and output naming.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::ConvertError;

/// Extension of montage files.
pub const MONTAGE_EXTENSION: &str = "mrc";

/// Suffix the stitcher appends to the stem of its output.
pub const BLENDED_SUFFIX: &str = "_blended";

/// Extension appended to the full montage file name for its descriptor.
pub const DESCRIPTOR_EXTENSION: &str = "mdoc";

/// Find montage files under `folder`, sorted by path.
///
/// Stitcher outputs (`*_blended.mrc`) left over from earlier runs are skipped.
/// Unreadable directory entries are logged and skipped.
pub fn discover_inputs(folder: &Path, recursive: bool) -> Result<Vec<PathBuf>, ConvertError> {
    if !folder.is_dir() {
        return Err(ConvertError::MissingInput(folder.to_path_buf()));
    }

    let mut walker = WalkDir::new(folder).follow_links(true);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut inputs = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(folder = %folder.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_file() && is_montage(entry.path()) {
            inputs.push(entry.into_path());
        }
    }
    inputs.sort();

    debug!(
        folder = %folder.display(),
        recursive,
        count = inputs.len(),
        "Discovered montage files"
    );
    Ok(inputs)
}

/// Whether `path` names a montage (`*.mrc`, not a stitcher output).
pub fn is_montage(path: &Path) -> bool {
    let has_extension = path
        .extension()
        .map(|e| e == MONTAGE_EXTENSION)
        .unwrap_or(false);
    let is_blended = path
        .file_stem()
        .map(|s| s.to_string_lossy().ends_with(BLENDED_SUFFIX))
        .unwrap_or(false);
    has_extension && !is_blended
}

// =============================================================================
// OutputPaths
// =============================================================================

/// Every file the pipeline reads or writes for one montage.
///
/// For `/data/grid1.mrc`:
///
/// | Field              | Path                           |
/// |--------------------|--------------------------------|
/// | `descriptor`       | `/data/grid1.mrc.mdoc`         |
/// | `blended`          | `/data/grid1_blended.mrc`      |
/// | `ome_tiff`         | `/data/grid1.ome.tif`          |
/// | `reduced_ome_tiff` | `/data/grid1_reduced.ome.tif`  |
/// | `h5`               | `/data/grid1.h5`               |
/// | `xml`              | `/data/grid1.xml`              |
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputPaths {
    pub input: PathBuf,
    pub folder: PathBuf,

    /// File name of the input
    pub name: String,

    /// File name without the `.mrc` extension
    pub stem: String,

    pub descriptor: PathBuf,
    pub blended: PathBuf,
    pub ome_tiff: PathBuf,
    pub reduced_ome_tiff: PathBuf,
    pub h5: PathBuf,
    pub xml: PathBuf,
}

impl OutputPaths {
    pub fn for_input(input: &Path) -> Self {
        let folder = match input.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            input: input.to_path_buf(),
            descriptor: folder.join(format!("{}.{}", name, DESCRIPTOR_EXTENSION)),
            blended: folder.join(format!("{}{}.{}", stem, BLENDED_SUFFIX, MONTAGE_EXTENSION)),
            ome_tiff: folder.join(format!("{}.ome.tif", stem)),
            reduced_ome_tiff: folder.join(format!("{}_reduced.ome.tif", stem)),
            h5: folder.join(format!("{}.h5", stem)),
            xml: folder.join(format!("{}.xml", stem)),
            folder,
            name,
            stem,
        }
    }
}
