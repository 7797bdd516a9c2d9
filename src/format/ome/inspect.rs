//! Read-back report of a written OME-TIFF.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::TiffError;
use crate::format::tiff::{validate_layout, Compression, TiffLayout};
use crate::io::{FileRangeReader, RangeReader};

/// One resolution level as found in the file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelSummary {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub compression: String,
    pub pixel_type: Option<&'static str>,
    pub downsample: f64,
}

/// Structure, calibration and validation findings of one file.
#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub path: PathBuf,
    pub bytes: u64,
    pub big_tiff: bool,
    pub software: Option<String>,

    pub image_name: Option<String>,
    pub physical_size_x: Option<f64>,
    pub physical_size_y: Option<f64>,
    pub physical_size_unit: Option<String>,

    pub levels: Vec<LevelSummary>,

    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Parse `path`, validate its pyramid and recover the OME calibration.
///
/// Only files that cannot be parsed at all are errors; structural problems
/// are listed in the report.
pub async fn inspect_ome_tiff(path: &Path) -> Result<InspectReport, TiffError> {
    let reader = FileRangeReader::open(path).await?;
    let layout = TiffLayout::parse(&reader).await?;
    let validation = validate_layout(&layout);

    let metadata = layout
        .description
        .as_deref()
        .and_then(super::OmeMetadata::parse)
        .unwrap_or_default();

    let levels = layout
        .levels
        .iter()
        .map(|level| LevelSummary {
            index: level.level_index,
            width: level.width,
            height: level.height,
            tile_width: level.tile_width,
            tile_height: level.tile_height,
            compression: Compression::from_u16(level.compression)
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| format!("Unknown ({})", level.compression)),
            pixel_type: level.pixel_type().map(|p| p.name()),
            downsample: level.downsample,
        })
        .collect();

    Ok(InspectReport {
        path: path.to_path_buf(),
        bytes: reader.size(),
        big_tiff: layout.header.is_bigtiff,
        software: layout.software.clone(),
        image_name: metadata.image_name,
        physical_size_x: metadata.physical_size_x,
        physical_size_y: metadata.physical_size_y,
        physical_size_unit: metadata.physical_size_unit,
        levels,
        is_valid: validation.is_valid,
        errors: validation.errors.iter().map(|e| e.to_string()).collect(),
        warnings: validation.warnings,
    })
}
