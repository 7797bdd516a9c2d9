//! Command-line configuration for mrc-pyramid.
//!
//! Every `convert` option can also be set through an environment variable
//! with the `MRCP_` prefix:
//!
//! - `MRCP_FOLDER` - Folder to search for montages
//! - `MRCP_NO_RECURSIVE` - Only search the top level of the folder
//! - `MRCP_CREATE_H5` - Write HDF5/BDV for large images (default: false)
//! - `MRCP_MIN_SIZE` - Pyramid stop threshold (default: 512)
//! - `MRCP_TILE_SIZE` - OME-TIFF tile edge (default: 256)
//! - `MRCP_COMPRESSION` - OME-TIFF tile codec, `none` or `deflate` (default: deflate)
//! - `MRCP_DEFLATE_LEVEL` - Deflate level (default: 6)
//! - `MRCP_H5_COMPRESSION` - HDF5 filter, `none` or `gzip` (default: gzip)
//! - `MRCP_GZIP_LEVEL` - Gzip level (default: 4)
//! - `MRCP_REDUCTION_TARGET` - Pixel budget of reduced outputs (default: 1e9)
//! - `MRCP_LARGE_THRESHOLD` - Pixel count above which an image is large (default: 2e9)
//! - `MRCP_EXTRACTPIECES` / `MRCP_BLENDMONT` - Stitcher programs
//! - `MRCP_KEEP_INTERMEDIATES` - Keep stitcher artifacts
//! - `MRCP_SUMMARY_JSON` - Write the batch summary to this file

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::convert::{
    ConvertOptions, ImodStitcher, DEFAULT_BLENDMONT, DEFAULT_EXTRACTPIECES,
    DEFAULT_LARGE_THRESHOLD, DEFAULT_REDUCTION_TARGET,
};
use crate::format::bdv::{hdf5_available, H5Compression, H5Options, DEFAULT_CHUNK_SIZE, DEFAULT_GZIP_LEVEL};
use crate::format::ome::{OmeTiffOptions, DEFAULT_TILE_SIZE};
use crate::format::tiff::{TileCompression, DEFAULT_DEFLATE_LEVEL, TILE_ALIGNMENT};
use crate::pyramid::DEFAULT_MIN_SIZE;

// =============================================================================
// CLI
// =============================================================================

/// mrc-pyramid - Convert stitched EM montages into calibrated pyramids.
#[derive(Parser, Debug)]
#[command(name = "mrc-pyramid")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Stitch every montage in a folder and write its pyramids.
    Convert(ConvertConfig),

    /// Report the level structure and calibration of an OME-TIFF.
    Inspect(InspectConfig),
}

/// Tile codec of the OME-TIFF output.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OmeCompressionArg {
    None,
    Deflate,
}

/// Dataset filter of the HDF5 output.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum H5CompressionArg {
    None,
    Gzip,
}

// =============================================================================
// Convert
// =============================================================================

#[derive(Parser, Debug, Clone)]
pub struct ConvertConfig {
    /// Folder containing the `.mrc` montages and their `.mrc.mdoc` descriptors.
    #[arg(env = "MRCP_FOLDER")]
    pub folder: PathBuf,

    /// Search sub-folders too (default).
    #[arg(long, overrides_with = "no_recursive")]
    pub recursive: bool,

    /// Only search the top level of the folder.
    #[arg(long, overrides_with = "recursive", env = "MRCP_NO_RECURSIVE")]
    pub no_recursive: bool,

    // =========================================================================
    // Outputs
    // =========================================================================
    /// Write HDF5 + BigDataViewer XML for large images instead of a reduced OME-TIFF.
    #[arg(long, default_value_t = false, env = "MRCP_CREATE_H5")]
    pub create_h5: bool,

    /// Stop adding pyramid levels once the smaller side is below twice this.
    #[arg(long, default_value_t = DEFAULT_MIN_SIZE, env = "MRCP_MIN_SIZE")]
    pub min_size: usize,

    /// OME-TIFF tile edge in pixels (multiple of 16).
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "MRCP_TILE_SIZE")]
    pub tile_size: u32,

    /// OME-TIFF tile compression.
    #[arg(long, value_enum, default_value_t = OmeCompressionArg::Deflate, env = "MRCP_COMPRESSION")]
    pub compression: OmeCompressionArg,

    /// Deflate level for OME-TIFF tiles (0-9).
    #[arg(long, default_value_t = DEFAULT_DEFLATE_LEVEL, env = "MRCP_DEFLATE_LEVEL")]
    pub deflate_level: u32,

    /// HDF5 dataset compression.
    #[arg(long, value_enum, default_value_t = H5CompressionArg::Gzip, env = "MRCP_H5_COMPRESSION")]
    pub h5_compression: H5CompressionArg,

    /// Gzip level for HDF5 datasets (0-9).
    #[arg(long, default_value_t = DEFAULT_GZIP_LEVEL, env = "MRCP_GZIP_LEVEL")]
    pub gzip_level: u8,

    // =========================================================================
    // Thresholds
    // =========================================================================
    /// Pixel budget of the reduced OME-TIFF written for large images.
    #[arg(long, default_value_t = DEFAULT_REDUCTION_TARGET, env = "MRCP_REDUCTION_TARGET")]
    pub reduction_target: u64,

    /// Stitched images with more pixels than this are treated as large.
    #[arg(long, default_value_t = DEFAULT_LARGE_THRESHOLD, env = "MRCP_LARGE_THRESHOLD")]
    pub large_threshold: u64,

    // =========================================================================
    // Stitcher
    // =========================================================================
    /// Program that extracts the piece layout of a montage.
    #[arg(long, default_value = DEFAULT_EXTRACTPIECES, env = "MRCP_EXTRACTPIECES")]
    pub extractpieces: PathBuf,

    /// Program that blends a montage into one image.
    #[arg(long, default_value = DEFAULT_BLENDMONT, env = "MRCP_BLENDMONT")]
    pub blendmont: PathBuf,

    /// Keep the layout, edge and blended files after conversion.
    #[arg(long, default_value_t = false, env = "MRCP_KEEP_INTERMEDIATES")]
    pub keep_intermediates: bool,

    // =========================================================================
    // Reporting
    // =========================================================================
    /// Write the batch summary as JSON to this file.
    #[arg(long, env = "MRCP_SUMMARY_JSON")]
    pub summary_json: Option<PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ConvertConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.folder.is_dir() {
            return Err(format!("Folder not found: {}", self.folder.display()));
        }

        if self.tile_size == 0 || self.tile_size % TILE_ALIGNMENT != 0 {
            return Err(format!(
                "tile_size must be a non-zero multiple of {}",
                TILE_ALIGNMENT
            ));
        }

        if self.min_size == 0 {
            return Err("min_size must be greater than 0".to_string());
        }

        if self.deflate_level > 9 {
            return Err("deflate_level must be between 0 and 9".to_string());
        }
        if self.gzip_level > 9 {
            return Err("gzip_level must be between 0 and 9".to_string());
        }

        if self.reduction_target == 0 {
            return Err("reduction_target must be greater than 0".to_string());
        }
        if self.large_threshold == 0 {
            return Err("large_threshold must be greater than 0".to_string());
        }

        if self.create_h5 && !hdf5_available() {
            return Err(
                "--create-h5 needs HDF5 support; rebuild with the `hdf5` feature".to_string(),
            );
        }

        Ok(())
    }

    /// Whether sub-folders are searched.
    pub fn is_recursive(&self) -> bool {
        !self.no_recursive
    }

    /// Pipeline options for these settings.
    pub fn to_options(&self) -> ConvertOptions {
        let compression = match self.compression {
            OmeCompressionArg::None => TileCompression::None,
            OmeCompressionArg::Deflate => TileCompression::Deflate {
                level: self.deflate_level,
            },
        };
        let h5_compression = match self.h5_compression {
            H5CompressionArg::None => H5Compression::None,
            H5CompressionArg::Gzip => H5Compression::Gzip {
                level: self.gzip_level,
            },
        };

        ConvertOptions {
            create_h5: self.create_h5,
            min_size: self.min_size,
            ome: OmeTiffOptions {
                tile_size: self.tile_size,
                compression,
                image_name: None,
            },
            h5: H5Options {
                compression: h5_compression,
                chunk_size: DEFAULT_CHUNK_SIZE,
            },
            reduction_target: self.reduction_target,
            large_threshold: self.large_threshold,
            keep_intermediates: self.keep_intermediates,
        }
    }

    /// Stitcher running the configured programs.
    pub fn stitcher(&self) -> ImodStitcher {
        ImodStitcher::new(&self.extractpieces, &self.blendmont)
    }
}

// =============================================================================
// Inspect
// =============================================================================

#[derive(Parser, Debug, Clone)]
pub struct InspectConfig {
    /// OME-TIFF file to inspect.
    pub file: PathBuf,

    /// Print the report as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl InspectConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.file.is_file() {
            return Err(format!("File not found: {}", self.file.display()));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
