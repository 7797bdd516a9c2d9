//! Structural validation of pyramid TIFF files.
//!
//! # Checked properties
//!
//! - **Organization**: tiled only (no strips)
//! - **Compression**: none or deflate
//! - **Samples**: one sample per pixel of a supported element type
//! - **Uniformity**: tile size, element type and photometric interpretation
//!   are identical on every level
//! - **Geometry**: each level is the previous one halved (floor), give or
//!   take one pixel
//!
//! Errors make a file unusable as a pyramid; warnings are reported but do not
//! invalidate it.

use crate::error::TiffError;

use super::layout::{TiffLayout, TiffLevel};
use super::parser::{ByteOrder, Ifd};
use super::tags::{Compression, TiffTag};
use super::writer::TILE_ALIGNMENT;

// =============================================================================
// Validation Result
// =============================================================================

/// Outcome of validating a file or one of its parts.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether no errors were found
    pub is_valid: bool,

    /// Validation errors (empty if valid)
    pub errors: Vec<ValidationError>,

    /// Non-fatal findings
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Create a successful validation result.
    pub fn ok() -> Self {
        ValidationResult {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error to the result.
    pub fn add_error(&mut self, error: ValidationError) {
        self.is_valid = false;
        self.errors.push(error);
    }

    /// Add a warning to the result.
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Fold another result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        for error in other.errors {
            self.add_error(error);
        }
        self.warnings.extend(other.warnings);
    }

    /// First error as a [`TiffError`], or `Ok(())` if valid.
    pub fn into_result(self) -> Result<(), TiffError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }
}

/// A specific validation error.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Page uses strip organization instead of tiles
    StripOrganization { ifd_index: usize },

    /// Compression scheme that cannot be decoded losslessly here
    UnsupportedCompression {
        level: usize,
        compression: u16,
        compression_name: String,
    },

    /// Missing required tile tags
    MissingTileTags {
        level: usize,
        missing_tags: Vec<&'static str>,
    },

    /// The file has no resolution levels
    NoPyramidLevels,

    /// Tile geometry is zero or not a multiple of 16
    InvalidTileDimensions {
        level: usize,
        tile_width: u32,
        tile_height: u32,
        message: String,
    },

    /// Sample layout does not map to a supported element type
    UnsupportedSampleFormat {
        level: usize,
        sample_format: u16,
        bits: u16,
    },

    /// More than one sample per pixel
    NotSingleChannel { level: usize, samples: u16 },

    /// A property differs from level 0
    InconsistentLevel { level: usize, message: String },

    /// Level is not half the size of the level above it
    UnexpectedLevelSize {
        level: usize,
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::StripOrganization { ifd_index } => {
                write!(f, "IFD {}: strip organization is not supported", ifd_index)
            }
            ValidationError::UnsupportedCompression {
                level,
                compression_name,
                ..
            } => write!(f, "level {}: unsupported compression {}", level, compression_name),
            ValidationError::MissingTileTags {
                level,
                missing_tags,
            } => write!(f, "level {}: missing {}", level, missing_tags.join(", ")),
            ValidationError::NoPyramidLevels => write!(f, "no resolution levels"),
            ValidationError::InvalidTileDimensions { level, message, .. } => {
                write!(f, "level {}: {}", level, message)
            }
            ValidationError::UnsupportedSampleFormat {
                level,
                sample_format,
                bits,
            } => write!(
                f,
                "level {}: unsupported SampleFormat {} with {} bits",
                level, sample_format, bits
            ),
            ValidationError::NotSingleChannel { level, samples } => {
                write!(f, "level {}: {} samples per pixel", level, samples)
            }
            ValidationError::InconsistentLevel { level, message } => {
                write!(f, "level {}: {}", level, message)
            }
            ValidationError::UnexpectedLevelSize {
                level,
                expected,
                actual,
            } => write!(
                f,
                "level {}: expected about {}x{}, found {}x{}",
                level, expected.0, expected.1, actual.0, actual.1
            ),
        }
    }
}

impl From<ValidationError> for TiffError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::UnsupportedCompression {
                compression_name, ..
            } => TiffError::UnsupportedCompression(compression_name),
            ValidationError::MissingTileTags { missing_tags, .. } => {
                TiffError::MissingTag(missing_tags.first().copied().unwrap_or("TileOffsets"))
            }
            ValidationError::NoPyramidLevels => TiffError::MissingTag("IFD"),
            ValidationError::UnsupportedSampleFormat {
                sample_format,
                bits,
                ..
            } => TiffError::UnsupportedSampleFormat {
                sample_format,
                bits,
            },
            other => TiffError::InvalidTagValue {
                tag: "structure",
                message: other.to_string(),
            },
        }
    }
}

// =============================================================================
// IFD Validation
// =============================================================================

/// Validate the organization and compression of a single IFD.
pub fn validate_ifd(ifd: &Ifd, ifd_index: usize, byte_order: ByteOrder) -> ValidationResult {
    let mut result = ValidationResult::ok();

    if ifd.is_stripped() && !ifd.is_tiled() {
        result.add_error(ValidationError::StripOrganization { ifd_index });
        return result;
    }

    let mut missing_tags = Vec::new();
    for (tag, name) in [
        (TiffTag::TileWidth, "TileWidth"),
        (TiffTag::TileLength, "TileLength"),
        (TiffTag::TileOffsets, "TileOffsets"),
        (TiffTag::TileByteCounts, "TileByteCounts"),
    ] {
        if ifd.get_entry_by_tag(tag).is_none() {
            missing_tags.push(name);
        }
    }
    if !missing_tags.is_empty() {
        result.add_error(ValidationError::MissingTileTags {
            level: ifd_index,
            missing_tags,
        });
    }

    if let Some(error) = check_compression(ifd.compression(byte_order).unwrap_or(1), ifd_index) {
        result.add_error(error);
    }

    result
}

// =============================================================================
// Level Validation
// =============================================================================

/// Validate one resolution level on its own.
pub fn validate_level(level: &TiffLevel) -> ValidationResult {
    let mut result = ValidationResult::ok();
    let index = level.level_index;

    if let Some(error) = check_compression(level.compression, index) {
        result.add_error(error);
    }

    if !level.has_tile_data() {
        let mut missing = Vec::new();
        if level.ifd.get_entry_by_tag(TiffTag::TileOffsets).is_none() {
            missing.push("TileOffsets");
        }
        if level.ifd.get_entry_by_tag(TiffTag::TileByteCounts).is_none() {
            missing.push("TileByteCounts");
        }
        result.add_error(ValidationError::MissingTileTags {
            level: index,
            missing_tags: missing,
        });
    }

    if level.tile_width == 0
        || level.tile_height == 0
        || level.tile_width % TILE_ALIGNMENT != 0
        || level.tile_height % TILE_ALIGNMENT != 0
    {
        result.add_error(ValidationError::InvalidTileDimensions {
            level: index,
            tile_width: level.tile_width,
            tile_height: level.tile_height,
            message: format!(
                "tile size {}x{} is not a non-zero multiple of {}",
                level.tile_width, level.tile_height, TILE_ALIGNMENT
            ),
        });
    }

    if level.samples_per_pixel != 1 {
        result.add_error(ValidationError::NotSingleChannel {
            level: index,
            samples: level.samples_per_pixel,
        });
    }

    if level.pixel_type().is_none() {
        result.add_error(ValidationError::UnsupportedSampleFormat {
            level: index,
            sample_format: level.sample_format,
            bits: level.bits_per_sample,
        });
    }

    if level.photometric != Some(1) {
        result.add_warning(format!(
            "Level {}: photometric interpretation {:?} is not min-is-black",
            index, level.photometric
        ));
    }

    result
}

/// Validate a complete pyramid layout.
pub fn validate_layout(layout: &TiffLayout) -> ValidationResult {
    let mut result = ValidationResult::ok();

    let Some(base) = layout.base_level() else {
        result.add_error(ValidationError::NoPyramidLevels);
        return result;
    };

    for level in &layout.levels {
        result.merge(validate_level(level));
    }

    for pair in layout.levels.windows(2) {
        let (upper, level) = (&pair[0], &pair[1]);
        let index = level.level_index;

        if (level.tile_width, level.tile_height) != (base.tile_width, base.tile_height) {
            result.add_error(ValidationError::InconsistentLevel {
                level: index,
                message: format!(
                    "tile size {}x{} differs from {}x{}",
                    level.tile_width, level.tile_height, base.tile_width, base.tile_height
                ),
            });
        }
        if level.pixel_type() != base.pixel_type() {
            result.add_error(ValidationError::InconsistentLevel {
                level: index,
                message: "element type differs from level 0".to_string(),
            });
        }
        if level.photometric != base.photometric {
            result.add_error(ValidationError::InconsistentLevel {
                level: index,
                message: "photometric interpretation differs from level 0".to_string(),
            });
        }
        if level.compression != base.compression {
            result.add_warning(format!(
                "Level {}: compression {} differs from level 0 ({})",
                index, level.compression, base.compression
            ));
        }

        let expected = ((upper.width / 2).max(1), (upper.height / 2).max(1));
        if level.width.abs_diff(expected.0) > 1 || level.height.abs_diff(expected.1) > 1 {
            result.add_error(ValidationError::UnexpectedLevelSize {
                level: index,
                expected,
                actual: (level.width, level.height),
            });
        }
    }

    if layout.description.is_none() {
        result.add_warning("Level 0: no ImageDescription (no OME metadata)".to_string());
    }

    result
}

fn check_compression(value: u16, index: usize) -> Option<ValidationError> {
    match Compression::from_u16(value) {
        Some(compression) if compression.is_supported() => None,
        Some(compression) => Some(ValidationError::UnsupportedCompression {
            level: index,
            compression: value,
            compression_name: compression.name().to_string(),
        }),
        None => Some(ValidationError::UnsupportedCompression {
            level: index,
            compression: value,
            compression_name: format!("Unknown ({})", value),
        }),
    }
}

// =============================================================================
// Tests
// =============================================================================
