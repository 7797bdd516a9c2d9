//! # mrc-pyramid
//!
//! Batch conversion of stitched electron-microscopy montages into calibrated,
//! multi-resolution containers.
//!
//! Each `.mrc` montage is blended by an external stitcher, then written as a
//! tiled pyramidal OME-TIFF whose physical pixel size comes from the
//! `PixelSpacing` entry of the montage's `.mrc.mdoc` descriptor. Images above
//! a pixel-count threshold additionally get either a stride-reduced OME-TIFF
//! or an HDF5 file with a BigDataViewer XML descriptor.
//!
//! ## Architecture
//!
//! - [`calibration`] - Pixel size model and descriptor reader
//! - [`raster`] - In-memory images, MRC reader and resampling
//! - [`pyramid`] - Reduction policy and pyramid builder
//! - [`mod@format`] - BigTIFF writer/reader, OME-TIFF and HDF5/BDV emitters
//! - [`convert`] - Stitcher boundary, per-file pipeline and batch runner
//! - [`io`] - Range reader used by the TIFF read-back
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use mrc_pyramid::{BatchRunner, ConvertOptions, ImodStitcher, TracingSink};
//!
//! #[tokio::main]
//! async fn main() {
//!     let runner = BatchRunner::new(
//!         Arc::new(ImodStitcher::default()),
//!         ConvertOptions::default(),
//!         Arc::new(TracingSink),
//!     );
//!     let summary = runner.run_folder(Path::new("/data/grids"), true).await;
//!     if let Ok(summary) = summary {
//!         println!("{}/{} converted", summary.succeeded, summary.total);
//!     }
//! }
//! ```

pub mod calibration;
pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod io;
pub mod pyramid;
pub mod raster;

// Re-export commonly used types
pub use calibration::{read_pixel_spacing, PixelCalibration, PIXEL_SPACING_KEY};
pub use config::{Cli, Command, ConvertConfig, InspectConfig};
pub use convert::{
    convert_file, discover_inputs, BatchEvent, BatchRunner, BatchSummary, ConvertOptions,
    EventSink, FileFailure, FileReport, ImodStitcher, MemorySink, OutputPaths, Stage,
    StitcherClient, TracingSink,
};
pub use error::{
    CalibrationError, ConvertError, ErrorKind, IoError, MrcError, StitchError, TiffError,
    WriteError,
};
pub use format::bdv::{write_bdv, BdvDescriptor, BdvReport, H5Compression, H5Options};
pub use format::ome::{
    inspect_ome_tiff, write_ome_tiff, InspectReport, OmeImage, OmeMetadata, OmeTiffOptions,
    OmeTiffReport,
};
pub use format::tiff::{validate_layout, TiffLayout, TiffLevel, TiffWriter, TileCompression};
pub use io::{FileRangeReader, RangeReader};
pub use pyramid::{level_dimensions, reduction_factor, Pyramid, ReductionDecision};
pub use raster::mrc::{read_first_section, MrcHeader};
pub use raster::{PixelType, Plane, RasterImage};
