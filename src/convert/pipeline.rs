//! Per-file conversion pipeline.
//!
//! ```text
//! descriptor -> calibration -> extract layout -> stitch -> classify
//!     -> unreduced OME-TIFF
//!     -> (large) HDF5 + XML, or reduced OME-TIFF
//!     -> cleanup
//! ```
//!
//! The stitcher runs as async subprocesses; reading, pyramid construction and
//! encoding are CPU bound and run on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::calibration::{read_pixel_spacing, PixelCalibration};
use crate::error::{CalibrationError, ConvertError};
use crate::format::bdv::{write_bdv, BdvReport, H5Options};
use crate::format::ome::{write_ome_tiff, OmeTiffOptions, OmeTiffReport};
use crate::pyramid::{Pyramid, ReductionDecision, DEFAULT_MIN_SIZE};
use crate::raster::mrc::{read_first_section, MrcHeader};
use crate::raster::RasterImage;

use super::discover::OutputPaths;
use super::sink::{BatchEvent, EventSink, Stage};
use super::stitcher::StitcherClient;

/// Default pixel budget for the reduced OME-TIFF.
pub const DEFAULT_REDUCTION_TARGET: u64 = 1_000_000_000;

/// Default pixel count above which a stitched image counts as large.
pub const DEFAULT_LARGE_THRESHOLD: u64 = 2_000_000_000;

// =============================================================================
// Options and report
// =============================================================================

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Write HDF5/BDV instead of a reduced OME-TIFF for large images
    pub create_h5: bool,

    /// Pyramid stop threshold
    pub min_size: usize,

    pub ome: OmeTiffOptions,
    pub h5: H5Options,

    /// Pixel budget of the reduced OME-TIFF
    pub reduction_target: u64,

    /// Images with more pixels than this are large
    pub large_threshold: u64,

    /// Leave stitcher artifacts in place
    pub keep_intermediates: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            create_h5: false,
            min_size: DEFAULT_MIN_SIZE,
            ome: OmeTiffOptions::default(),
            h5: H5Options::default(),
            reduction_target: DEFAULT_REDUCTION_TARGET,
            large_threshold: DEFAULT_LARGE_THRESHOLD,
            keep_intermediates: false,
        }
    }
}

/// Outcome of one successful conversion.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub input: PathBuf,
    pub pixel_spacing_angstrom: f64,

    /// Stitched image size
    pub width: usize,
    pub height: usize,
    pub pixel_type: &'static str,

    /// Whether the stitched image exceeded the large-image threshold
    pub large: bool,

    pub ome_tiff: OmeTiffReport,
    pub reduction: Option<ReductionDecision>,
    pub reduced_ome_tiff: Option<OmeTiffReport>,
    pub bdv: Option<BdvReport>,

    /// Intermediates removed after stitching
    pub removed: Vec<PathBuf>,
}

impl FileReport {
    /// Every file written, in the order it was written.
    pub fn outputs(&self) -> Vec<PathBuf> {
        let mut outputs = vec![self.ome_tiff.path.clone()];
        if let Some(reduced) = &self.reduced_ome_tiff {
            outputs.push(reduced.path.clone());
        }
        if let Some(bdv) = &self.bdv {
            outputs.push(bdv.h5_path.clone());
            outputs.push(bdv.xml_path.clone());
        }
        outputs
    }
}

/// Outputs of the blocking part of the pipeline.
struct Emitted {
    width: usize,
    height: usize,
    pixel_type: &'static str,
    large: bool,
    ome_tiff: OmeTiffReport,
    reduction: Option<ReductionDecision>,
    reduced_ome_tiff: Option<OmeTiffReport>,
    bdv: Option<BdvReport>,
}

// =============================================================================
// Pipeline
// =============================================================================

/// Convert one montage.
///
/// Once the stitcher has been started its intermediates are removed on every
/// exit path unless `keep_intermediates` is set. A cleanup failure is logged
/// and does not fail an otherwise successful conversion.
pub async fn convert_file(
    input: &Path,
    stitcher: &dyn StitcherClient,
    options: &ConvertOptions,
    sink: Arc<dyn EventSink>,
) -> Result<FileReport, ConvertError> {
    let paths = OutputPaths::for_input(input);
    if !input.is_file() {
        return Err(ConvertError::MissingInput(input.to_path_buf()));
    }

    stage(sink.as_ref(), input, Stage::Calibration);
    let descriptor = paths.descriptor.clone();
    let angstrom = run_blocking(move || read_calibration(&descriptor)).await??;
    let calibration = PixelCalibration::from_angstrom(angstrom);
    debug!(
        file = %input.display(),
        angstrom,
        micrometers = calibration.micrometers(),
        "Pixel spacing read"
    );

    let result = stitch_and_emit(&paths, stitcher, options, calibration, &sink).await;

    let mut removed = Vec::new();
    if !options.keep_intermediates {
        stage(sink.as_ref(), input, Stage::Cleanup);
        match stitcher.cleanup(input).await {
            Ok(files) => removed = files,
            Err(e) => warn!(file = %input.display(), error = %e, "Cleanup failed"),
        }
    }

    let emitted = result?;
    Ok(FileReport {
        input: input.to_path_buf(),
        pixel_spacing_angstrom: angstrom,
        width: emitted.width,
        height: emitted.height,
        pixel_type: emitted.pixel_type,
        large: emitted.large,
        ome_tiff: emitted.ome_tiff,
        reduction: emitted.reduction,
        reduced_ome_tiff: emitted.reduced_ome_tiff,
        bdv: emitted.bdv,
        removed,
    })
}

async fn stitch_and_emit(
    paths: &OutputPaths,
    stitcher: &dyn StitcherClient,
    options: &ConvertOptions,
    calibration: PixelCalibration,
    sink: &Arc<dyn EventSink>,
) -> Result<Emitted, ConvertError> {
    stage(sink.as_ref(), &paths.input, Stage::ExtractLayout);
    let layout = stitcher.extract_layout(&paths.input).await?;

    stage(sink.as_ref(), &paths.input, Stage::Stitch);
    let blended = stitcher.stitch(&paths.input, &layout).await?;

    let paths = paths.clone();
    let options = options.clone();
    let sink = Arc::clone(sink);
    run_blocking(move || emit_outputs(&blended, &paths, &options, calibration, sink.as_ref()))
        .await?
}

/// Read the blended image and write every output for it.
fn emit_outputs(
    blended: &Path,
    paths: &OutputPaths,
    options: &ConvertOptions,
    calibration: PixelCalibration,
    sink: &dyn EventSink,
) -> Result<Emitted, ConvertError> {
    stage(sink, &paths.input, Stage::Classify);
    let header = MrcHeader::read(blended)?;
    let large = header.pixel_count() > options.large_threshold;
    info!(
        file = %paths.input.display(),
        width = header.nx,
        height = header.ny,
        pixels = header.pixel_count(),
        large,
        "Stitched image classified"
    );

    stage(sink, &paths.input, Stage::OmeTiff);
    let image = read_raster(blended, false)?;
    let (width, height) = image.dimensions();
    let pixel_type = image.pixel_type().name();

    let pyramid = Pyramid::build(image, calibration, options.min_size);
    let ome_options = OmeTiffOptions {
        image_name: options
            .ome
            .image_name
            .clone()
            .or_else(|| Some(paths.name.clone())),
        ..options.ome.clone()
    };
    let ome_tiff = write_ome_tiff(&pyramid, &paths.ome_tiff, &ome_options)?;
    let base = pyramid.into_base();

    let mut emitted = Emitted {
        width,
        height,
        pixel_type,
        large,
        ome_tiff,
        reduction: None,
        reduced_ome_tiff: None,
        bdv: None,
    };
    if !large {
        return Ok(emitted);
    }

    if options.create_h5 {
        stage(sink, &paths.input, Stage::Hdf5);
        emitted.bdv = Some(write_bdv(&base, calibration, &paths.h5, &options.h5)?);
    } else {
        stage(sink, &paths.input, Stage::ReducedOmeTiff);
        let decision =
            ReductionDecision::decide(width as u64, height as u64, options.reduction_target);
        info!(
            file = %paths.input.display(),
            factor = decision.factor,
            width = decision.width,
            height = decision.height,
            "Reducing large image"
        );
        let reduced =
            Pyramid::build_reduced(&base, calibration, decision.factor, options.min_size);
        drop(base);
        emitted.reduced_ome_tiff = Some(write_ome_tiff(
            &reduced,
            &paths.reduced_ome_tiff,
            &ome_options,
        )?);
        emitted.reduction = Some(decision);
    }
    Ok(emitted)
}

// =============================================================================
// Helpers
// =============================================================================

/// Read the pixel spacing from a descriptor, rejecting values that cannot
/// describe a pixel size.
pub fn read_calibration(descriptor: &Path) -> Result<f64, ConvertError> {
    let angstrom = read_pixel_spacing(descriptor)?;
    if !angstrom.is_finite() || angstrom <= 0.0 {
        return Err(ConvertError::UnparsableCalibration(
            CalibrationError::Unparsable {
                path: descriptor.to_path_buf(),
                value: angstrom.to_string(),
            },
        ));
    }
    Ok(angstrom)
}

/// Read a stitched raster as one 2D image.
///
/// A stack is rejected unless `allow_stack` is set, in which case its first
/// section is used.
pub fn read_raster(path: &Path, allow_stack: bool) -> Result<RasterImage, ConvertError> {
    let header = MrcHeader::read(path)?;
    if header.nz > 1 {
        if !allow_stack {
            return Err(ConvertError::Dimensionality {
                nx: header.nx,
                ny: header.ny,
                nz: header.nz,
                reason: "stitched image must be a single section",
            });
        }
        warn!(
            file = %path.display(),
            sections = header.nz,
            "Stack supplied, using the first section only"
        );
    }
    let (_, image) = read_first_section(path)?;
    Ok(image)
}

fn stage(sink: &dyn EventSink, path: &Path, stage: Stage) {
    sink.emit(&BatchEvent::StageReached {
        path: path.to_path_buf(),
        stage,
    });
}

async fn run_blocking<T, F>(f: F) -> Result<T, ConvertError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ConvertError::Task(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    fn write_mrc(path: &Path, nx: i32, ny: i32, nz: i32) {
        let mut bytes = vec![0u8; 1024];
        bytes[0..4].copy_from_slice(&nx.to_le_bytes());
        bytes[4..8].copy_from_slice(&ny.to_le_bytes());
        bytes[8..12].copy_from_slice(&nz.to_le_bytes());
        bytes[12..16].copy_from_slice(&6i32.to_le_bytes());
        bytes[208..212].copy_from_slice(b"MAP ");
        bytes[212..216].copy_from_slice(&[0x44, 0x44, 0, 0]);
        let count = (nx * ny * nz) as usize;
        for i in 0..count {
            bytes.extend_from_slice(&(i as u16).to_le_bytes());
        }
        fs::write(path, bytes).unwrap();
    }

    // -------------------------------------------------------------------------
    // Calibration
    // -------------------------------------------------------------------------

    #[test]
    fn test_read_calibration() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mrc.mdoc");
        fs::write(&path, "PixelSpacing = 1.5\n").unwrap();
        assert_eq!(read_calibration(&path).unwrap(), 1.5);
    }

    #[test]
    fn test_read_calibration_rejects_non_positive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mrc.mdoc");
        fs::write(&path, "PixelSpacing = 0\n").unwrap();
        let err = read_calibration(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnparsableCalibration);
    }

    #[test]
    fn test_read_calibration_missing_descriptor() {
        let dir = TempDir::new().unwrap();
        let err = read_calibration(&dir.path().join("a.mrc.mdoc")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingInput);
    }

    // -------------------------------------------------------------------------
    // Raster
    // -------------------------------------------------------------------------

    #[test]
    fn test_read_raster_single_section() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mrc");
        write_mrc(&path, 5, 3, 1);
        let image = read_raster(&path, false).unwrap();
        assert_eq!(image.dimensions(), (5, 3));
        assert_eq!(image.value_at(4, 2), Some(14.0));
    }

    #[test]
    fn test_read_raster_stack() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack.mrc");
        write_mrc(&path, 4, 2, 3);

        let err = read_raster(&path, false).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Dimensionality { nx: 4, ny: 2, nz: 3, .. }
        ));

        let image = read_raster(&path, true).unwrap();
        assert_eq!(image.dimensions(), (4, 2));
        assert_eq!(image.value_at(3, 1), Some(7.0));
    }

    #[test]
    fn test_report_outputs_order() {
        let ome = OmeTiffReport {
            path: PathBuf::from("a.ome.tif"),
            levels: 1,
            dimensions: vec![(4, 4)],
            pixel_size_um: 0.0001,
            bytes: 0,
        };
        let report = FileReport {
            input: PathBuf::from("a.mrc"),
            pixel_spacing_angstrom: 1.0,
            width: 4,
            height: 4,
            pixel_type: "uint16",
            large: true,
            ome_tiff: ome.clone(),
            reduction: None,
            reduced_ome_tiff: Some(OmeTiffReport {
                path: PathBuf::from("a_reduced.ome.tif"),
                ..ome
            }),
            bdv: None,
            removed: Vec::new(),
        };
        assert_eq!(
            report.outputs(),
            vec![PathBuf::from("a.ome.tif"), PathBuf::from("a_reduced.ome.tif")]
        );
    }
}
