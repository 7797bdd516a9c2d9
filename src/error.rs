use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// I/O errors that can occur when reading from local storage
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Underlying file system error
    #[error("File error on {path}: {message}")]
    File { path: String, message: String },

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
}

impl IoError {
    /// Wrap a `std::io::Error` with the path it occurred on.
    pub fn from_std(path: impl Into<String>, err: std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            IoError::NotFound(path)
        } else {
            IoError::File {
                path,
                message: err.to_string(),
            }
        }
    }
}

/// Errors from reading the pixel spacing out of a sidecar descriptor
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CalibrationError {
    /// The descriptor file does not exist
    #[error("Descriptor not found: {}", .0.display())]
    MissingFile(PathBuf),

    /// The descriptor exists but could not be read
    #[error("Could not read descriptor {}: {message}", .path.display())]
    Unreadable { path: PathBuf, message: String },

    /// No line with the key was found
    #[error("No line with '{key} =' found in {}", .path.display())]
    KeyNotFound { path: PathBuf, key: String },

    /// The key was found but its value is not a number
    #[error("Could not convert '{value}' to a number in {}", .path.display())]
    Unparsable { path: PathBuf, value: String },
}

/// Errors that can occur when reading MRC containers
#[derive(Debug, Clone, Error)]
pub enum MrcError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// File is too small to contain the fixed header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Header declares non-positive dimensions
    #[error("Invalid dimensions: nx={nx}, ny={ny}, nz={nz}")]
    InvalidDimensions { nx: i32, ny: i32, nz: i32 },

    /// Data mode that this reader does not decode
    #[error("Unsupported MRC mode: {0}")]
    UnsupportedMode(i32),

    /// The data block is shorter than the header promises
    #[error("Truncated data: expected {expected} bytes, file holds {actual}")]
    Truncated { expected: u64, actual: u64 },
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),

    /// Tile payload could not be decompressed
    #[error("Corrupt tile {index}: {message}")]
    CorruptTile { index: usize, message: String },

    /// Sample layout that does not map to a supported pixel type
    #[error("Unsupported sample layout: SampleFormat={sample_format}, BitsPerSample={bits}")]
    UnsupportedSampleFormat { sample_format: u16, bits: u16 },
}

/// Errors raised while serializing a pyramid into an output container
#[derive(Debug, Clone, Error)]
pub enum WriteError {
    /// File creation, write or rename failure
    #[error("I/O error writing {path}: {message}")]
    Io { path: String, message: String },

    /// Nothing to write
    #[error("Pyramid has no levels")]
    EmptyPyramid,

    /// Tile geometry rejected before writing
    #[error("Invalid tile size {width}x{height}: must be a non-zero multiple of 16")]
    InvalidTileSize { width: u32, height: u32 },

    /// A page does not match the element type of the first page
    #[error("Pixel type mismatch: file holds {expected}, page is {actual}")]
    PixelTypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// The file was closed while SubIFD slots announced by a page were still empty
    #[error("{0} announced sub-resolution page(s) were never written")]
    UnfilledSubIfds(usize),

    /// Image is too large for the container's size fields
    #[error("Image dimensions {width}x{height} exceed container limits")]
    TooLarge { width: usize, height: usize },

    /// HDF5 library error
    #[error("HDF5 error: {0}")]
    Hdf5(String),

    /// Build does not include the HDF5 emitter
    #[error("HDF5 output is not available in this build (enable the `hdf5` feature)")]
    Hdf5Unavailable,
}

impl WriteError {
    /// Wrap a `std::io::Error` with the path it occurred on.
    pub fn io(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        WriteError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "hdf5")]
impl From<hdf5::Error> for WriteError {
    fn from(err: hdf5::Error) -> Self {
        WriteError::Hdf5(err.to_string())
    }
}

/// Errors from the external stitching tools
#[derive(Debug, Clone, Error)]
pub enum StitchError {
    /// The tool could not be started at all
    #[error("Failed to launch {tool}: {message}")]
    Launch { tool: String, message: String },

    /// The tool ran and exited with a non-zero status
    #[error("{tool} exited with status {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: i32,
        stderr: String,
    },

    /// The tool reported success but its output is missing
    #[error("Expected output was not created: {}", .0.display())]
    MissingOutput(PathBuf),

    /// Removing intermediate artifacts failed
    #[error("Cleanup failed for {path}: {message}")]
    Cleanup { path: String, message: String },
}

/// Per-file failure categories reported in the batch summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingInput,
    UnparsableCalibration,
    Dimensionality,
    ExternalTool,
    OutputWrite,
    InvalidInput,
    Task,
}

/// Errors that abort the conversion of a single input file.
///
/// None of these abort a batch; the orchestrator records them and moves on.
#[derive(Debug, Clone, Error)]
pub enum ConvertError {
    /// Descriptor or source file absent
    #[error("Missing input: {}", .0.display())]
    MissingInput(PathBuf),

    /// Descriptor present but the pixel spacing is missing or not numeric
    #[error("Unparsable calibration: {0}")]
    UnparsableCalibration(CalibrationError),

    /// Raster is neither 2D nor a stack whose first plane may be used
    #[error("Unsupported dimensionality: {nx}x{ny}x{nz} ({reason})")]
    Dimensionality {
        nx: usize,
        ny: usize,
        nz: usize,
        reason: &'static str,
    },

    /// External stitcher failed
    #[error("External tool failure: {0}")]
    ExternalTool(#[from] StitchError),

    /// Output container could not be produced
    #[error("Output write failure: {0}")]
    OutputWrite(#[from] WriteError),

    /// Raster container could not be decoded
    #[error("Invalid input raster: {0}")]
    InvalidInput(#[from] MrcError),

    /// Background task panicked or was cancelled
    #[error("Conversion task failed: {0}")]
    Task(String),
}

impl ConvertError {
    /// Category of this failure for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::MissingInput(_) => ErrorKind::MissingInput,
            ConvertError::UnparsableCalibration(_) => ErrorKind::UnparsableCalibration,
            ConvertError::Dimensionality { .. } => ErrorKind::Dimensionality,
            ConvertError::ExternalTool(_) => ErrorKind::ExternalTool,
            ConvertError::OutputWrite(_) => ErrorKind::OutputWrite,
            ConvertError::InvalidInput(_) => ErrorKind::InvalidInput,
            ConvertError::Task(_) => ErrorKind::Task,
        }
    }
}

impl From<CalibrationError> for ConvertError {
    fn from(err: CalibrationError) -> Self {
        match err {
            CalibrationError::MissingFile(path) => ConvertError::MissingInput(path),
            other => ConvertError::UnparsableCalibration(other),
        }
    }
}
