//! HDF5/BigDataViewer output.
//!
//! Unlike the OME-TIFF pyramid, the three levels written here are plain
//! stride subsamples (every 1st, 2nd and 4th pixel) of the base image.
//!
//! The HDF5 emitter needs the system HDF5 library and is only compiled with
//! the `hdf5` feature; without it [`write_bdv`] fails with
//! [`WriteError::Hdf5Unavailable`]. The XML descriptor is always available.

#[cfg(feature = "hdf5")]
mod h5;
mod xml;

use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::calibration::PixelCalibration;
use crate::error::WriteError;
use crate::format::ome::persist;
use crate::raster::RasterImage;

use xml::stage_bdv_xml;

#[cfg(feature = "hdf5")]
pub use h5::write_hdf5_pyramid;
pub use xml::{write_bdv_xml, BdvDescriptor, BDV_UNIT};

/// Subsampling stride of `res0`, `res1`, `res2`.
pub const BDV_STRIDES: [usize; 3] = [1, 2, 4];

/// Value of the `source` file attribute.
pub const DATA_SOURCE: &str = "SerialEM .mdoc";

/// Unit of the coordinate scales and of the `unit` file attribute.
pub const SCALE_UNIT: &str = "nm";

/// Default gzip level.
pub const DEFAULT_GZIP_LEVEL: u8 = 4;

/// Default chunk edge.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

// =============================================================================
// Options
// =============================================================================

/// Dataset filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum H5Compression {
    None,
    /// Deflate filter, level 0-9
    Gzip { level: u8 },
}

impl Default for H5Compression {
    fn default() -> Self {
        H5Compression::Gzip {
            level: DEFAULT_GZIP_LEVEL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct H5Options {
    pub compression: H5Compression,

    /// Upper bound on each chunk edge
    pub chunk_size: usize,
}

impl Default for H5Options {
    fn default() -> Self {
        Self {
            compression: H5Compression::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// What [`write_bdv`] produced.
#[derive(Debug, Clone, Serialize)]
pub struct BdvReport {
    pub h5_path: PathBuf,
    pub xml_path: PathBuf,

    /// `(width, height)` of `res0`, `res1`, `res2`
    pub dimensions: Vec<(usize, usize)>,

    pub pixel_size_nm: f64,
    pub pixel_size_um: f64,
}

// =============================================================================
// Emitter
// =============================================================================

/// `(width, height)` of the three levels over a `width` x `height` base.
pub fn bdv_level_dimensions(width: usize, height: usize) -> Vec<(usize, usize)> {
    BDV_STRIDES
        .iter()
        .map(|&s| (width.div_ceil(s), height.div_ceil(s)))
        .collect()
}

/// Descriptor path for an HDF5 path: same base name, `.xml` extension.
pub fn descriptor_path(h5_path: &Path) -> PathBuf {
    h5_path.with_extension("xml")
}

/// Write `<h5_path>` and its `.xml` descriptor for a single-plane image.
///
/// Both files are staged before either is published. If the descriptor cannot
/// be published the container is removed again, so a pair is never left
/// half-written.
pub fn write_bdv(
    image: &RasterImage,
    calibration: PixelCalibration,
    h5_path: &Path,
    options: &H5Options,
) -> Result<BdvReport, WriteError> {
    let (h5_temp, dimensions) = stage_h5(image, calibration, h5_path, options)?;

    let pixel_size_nm = calibration.nanometers();
    let pixel_size_um = pixel_size_nm / 1000.0;
    let xml_path = descriptor_path(h5_path);
    let descriptor = BdvDescriptor {
        h5_file_name: h5_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        width: image.width(),
        height: image.height(),
        voxel_size_um: pixel_size_um,
    };
    let xml_temp = stage_bdv_xml(&descriptor, &xml_path)?;

    persist(h5_temp, h5_path)?;
    if let Err(e) = persist(xml_temp, &xml_path) {
        if let Err(remove) = std::fs::remove_file(h5_path) {
            warn!(
                file = %h5_path.display(),
                error = %remove,
                "Failed to remove orphaned HDF5 file"
            );
        }
        return Err(e);
    }

    Ok(BdvReport {
        h5_path: h5_path.to_path_buf(),
        xml_path,
        dimensions,
        pixel_size_nm,
        pixel_size_um,
    })
}

#[cfg(feature = "hdf5")]
fn stage_h5(
    image: &RasterImage,
    calibration: PixelCalibration,
    path: &Path,
    options: &H5Options,
) -> Result<(NamedTempFile, Vec<(usize, usize)>), WriteError> {
    h5::stage_hdf5_pyramid(image, calibration, path, options)
}

#[cfg(not(feature = "hdf5"))]
fn stage_h5(
    _image: &RasterImage,
    _calibration: PixelCalibration,
    _path: &Path,
    _options: &H5Options,
) -> Result<(NamedTempFile, Vec<(usize, usize)>), WriteError> {
    Err(WriteError::Hdf5Unavailable)
}

/// Whether this build can write HDF5.
pub const fn hdf5_available() -> bool {
    cfg!(feature = "hdf5")
}
