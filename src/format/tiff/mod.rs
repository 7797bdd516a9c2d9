//! Tiled BigTIFF reading and writing.
//!
//! This module writes the pyramid files produced by the converter and parses
//! them back for inspection and verification.
//!
//! # Key Concepts
//!
//! - **Byte order**: TIFF files declare their endianness (II = little-endian, MM = big-endian)
//!   in the header. Output is always little-endian; the parser accepts both.
//!
//! - **Classic TIFF vs BigTIFF**: Classic TIFF uses 32-bit offsets (max 4GB files),
//!   while BigTIFF uses 64-bit offsets. Output is always BigTIFF since full-resolution
//!   montages routinely exceed 4GB.
//!
//! - **SubIFDs**: Reduced resolutions hang off the first page through the SubIFDs tag
//!   rather than being chained as further pages, so readers see a single image.
//!
//! - **Inline vs offset values**: Small values are stored inline in the IFD entry,
//!   larger values are stored at an offset pointed to by the entry.

mod layout;
mod parser;
mod tags;
mod validation;
mod values;
mod writer;

pub use layout::{TiffLayout, TiffLevel};
pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use tags::{Compression, FieldType, TiffTag};
pub use validation::{
    validate_ifd, validate_layout, validate_level, ValidationError, ValidationResult,
};
pub use values::{parse_u64_array, ValueReader};
pub use writer::{
    PageOptions, TiffWriter, TileCompression, DEFAULT_DEFLATE_LEVEL, TILE_ALIGNMENT,
};
