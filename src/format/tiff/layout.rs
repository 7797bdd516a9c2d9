//! Multi-resolution layout of a written TIFF file.
//!
//! A pyramid file stores full resolution as the first page of the main IFD
//! chain and each reduced level as one of that page's SubIFDs. This module
//! parses that structure back, for inspection and for verifying output.
//!
//! # Structure
//!
//! ```text
//! header -> IFD 0 (level 0, ImageDescription = OME-XML)
//!             |-- SubIFDs[0] -> level 1
//!             |-- SubIFDs[1] -> level 2
//!             `-- ...
//!           next -> (further main-chain pages, if any)
//! ```

use std::io::Read;

use flate2::read::ZlibDecoder;
use tracing::debug;

use crate::error::TiffError;
use crate::io::RangeReader;
use crate::raster::{IntoRaster, PixelType, Plane, RasterImage, Sample};

use super::parser::{ByteOrder, Ifd, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
use super::tags::{Compression, TiffTag};
use super::values::ValueReader;

// =============================================================================
// Constants
// =============================================================================

/// Maximum number of main-chain pages followed (safety limit)
const MAX_PAGES: usize = 64;

/// Maximum number of SubIFDs followed per page (safety limit)
const MAX_SUBIFDS: usize = 64;

// =============================================================================
// TiffLevel
// =============================================================================

/// One resolution level: page 0 or one of its SubIFDs.
#[derive(Debug, Clone)]
pub struct TiffLevel {
    /// Index of this level (0 = full resolution)
    pub level_index: usize,

    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    /// Tile width in pixels
    pub tile_width: u32,

    /// Tile height in pixels
    pub tile_height: u32,

    /// Number of tiles in X direction
    pub tiles_x: u32,

    /// Number of tiles in Y direction
    pub tiles_y: u32,

    /// Compression tag value
    pub compression: u16,

    pub bits_per_sample: u16,
    pub sample_format: u16,
    pub samples_per_pixel: u16,
    pub photometric: Option<u16>,

    /// NewSubfileType value
    pub subfile_type: u32,

    /// Width ratio to level 0
    pub downsample: f64,

    /// The parsed IFD for this level
    pub ifd: Ifd,
}

impl TiffLevel {
    /// Build a level from a tiled IFD. Returns `None` without tile geometry.
    pub(crate) fn from_ifd(ifd: Ifd, level_index: usize, byte_order: ByteOrder) -> Option<Self> {
        let tile_width = ifd.tile_width(byte_order)?;
        let tile_height = ifd.tile_height(byte_order)?;
        let width = ifd.image_width(byte_order)?;
        let height = ifd.image_height(byte_order)?;
        if tile_width == 0 || tile_height == 0 {
            return None;
        }

        Some(TiffLevel {
            level_index,
            width,
            height,
            tile_width,
            tile_height,
            tiles_x: width.div_ceil(tile_width),
            tiles_y: height.div_ceil(tile_height),
            compression: ifd.compression(byte_order).unwrap_or(1),
            bits_per_sample: ifd.bits_per_sample(byte_order),
            sample_format: ifd.sample_format(byte_order),
            samples_per_pixel: ifd.samples_per_pixel(byte_order),
            photometric: ifd.photometric(byte_order),
            subfile_type: ifd.new_subfile_type(byte_order),
            downsample: 1.0,
            ifd,
        })
    }

    /// Total number of tiles.
    pub fn tile_count(&self) -> u64 {
        self.tiles_x as u64 * self.tiles_y as u64
    }

    /// Element type, if the sample layout maps to one.
    pub fn pixel_type(&self) -> Option<PixelType> {
        PixelType::from_tiff(self.sample_format, self.bits_per_sample)
    }

    /// Check if this level has tile offset and byte count entries.
    pub fn has_tile_data(&self) -> bool {
        self.ifd.get_entry_by_tag(TiffTag::TileOffsets).is_some()
            && self.ifd.get_entry_by_tag(TiffTag::TileByteCounts).is_some()
    }
}

// =============================================================================
// TiffLayout
// =============================================================================

/// Parsed page and level structure of a pyramid TIFF.
#[derive(Debug, Clone)]
pub struct TiffLayout {
    pub header: TiffHeader,

    /// Main-chain IFDs in file order
    pub pages: Vec<Ifd>,

    /// Resolution levels: page 0, then its SubIFDs
    pub levels: Vec<TiffLevel>,

    /// ImageDescription of page 0
    pub description: Option<String>,

    /// Software tag of page 0
    pub software: Option<String>,
}

impl TiffLayout {
    /// Parse the header, the main IFD chain and the SubIFDs of page 0.
    pub async fn parse<R: RangeReader + ?Sized>(reader: &R) -> Result<Self, TiffError> {
        let header_len = (reader.size() as usize).min(BIGTIFF_HEADER_SIZE);
        if header_len < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: reader.size(),
            });
        }
        let header_bytes = reader.read_exact_at(0, header_len).await?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;
        let byte_order = header.byte_order;
        let values = ValueReader::new(reader, &header);

        let mut pages = Vec::new();
        let mut offset = header.first_ifd_offset;
        while offset != 0 && pages.len() < MAX_PAGES {
            let ifd = read_ifd(reader, &header, offset).await?;
            offset = ifd.next_ifd_offset;
            pages.push(ifd);
        }

        let Some(first) = pages.first() else {
            return Err(TiffError::MissingTag("IFD"));
        };

        let description = match first.get_entry_by_tag(TiffTag::ImageDescription) {
            Some(entry) => Some(values.read_string(entry).await?),
            None => None,
        };
        let software = match first.get_entry_by_tag(TiffTag::Software) {
            Some(entry) => Some(values.read_string(entry).await?),
            None => None,
        };

        let mut level_ifds = vec![first.clone()];
        if let Some(entry) = first.get_entry_by_tag(TiffTag::SubIfds) {
            let offsets = values.read_u64_array(entry).await?;
            for sub_offset in offsets.into_iter().take(MAX_SUBIFDS) {
                if sub_offset == 0 || sub_offset >= reader.size() {
                    return Err(TiffError::InvalidIfdOffset(sub_offset));
                }
                level_ifds.push(read_ifd(reader, &header, sub_offset).await?);
            }
        }

        let mut levels: Vec<TiffLevel> = Vec::with_capacity(level_ifds.len());
        for ifd in level_ifds {
            let index = levels.len();
            match TiffLevel::from_ifd(ifd, index, byte_order) {
                Some(level) => levels.push(level),
                None => {
                    return Err(TiffError::MissingTag("TileWidth/TileLength"));
                }
            }
        }

        if let Some(base_width) = levels.first().map(|l| l.width as f64) {
            for level in &mut levels {
                level.downsample = base_width / level.width.max(1) as f64;
            }
        }

        debug!(
            file = reader.identifier(),
            pages = pages.len(),
            levels = levels.len(),
            "Parsed TIFF layout"
        );

        Ok(TiffLayout {
            header,
            pages,
            levels,
            description,
            software,
        })
    }

    /// Get the number of resolution levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Get a level by index.
    pub fn get_level(&self, level: usize) -> Option<&TiffLevel> {
        self.levels.get(level)
    }

    /// Get the full-resolution level.
    pub fn base_level(&self) -> Option<&TiffLevel> {
        self.levels.first()
    }

    /// `(width, height)` of every level.
    pub fn dimensions(&self) -> Vec<(u32, u32)> {
        self.levels.iter().map(|l| (l.width, l.height)).collect()
    }

    /// Decode every tile of a level into a raster.
    pub async fn read_level<R: RangeReader + ?Sized>(
        &self,
        reader: &R,
        index: usize,
    ) -> Result<RasterImage, TiffError> {
        let level = self
            .levels
            .get(index)
            .ok_or_else(|| TiffError::InvalidTagValue {
                tag: "level",
                message: format!("level {} does not exist", index),
            })?;

        let pixel_type = level
            .pixel_type()
            .ok_or(TiffError::UnsupportedSampleFormat {
                sample_format: level.sample_format,
                bits: level.bits_per_sample,
            })?;

        let image = match pixel_type {
            PixelType::Int8 => decode_level::<i8, R>(reader, &self.header, level)
                .await?
                .into_raster(),
            PixelType::Int16 => decode_level::<i16, R>(reader, &self.header, level)
                .await?
                .into_raster(),
            PixelType::Uint16 => decode_level::<u16, R>(reader, &self.header, level)
                .await?
                .into_raster(),
            PixelType::Float32 => decode_level::<f32, R>(reader, &self.header, level)
                .await?
                .into_raster(),
        };
        Ok(image)
    }
}

/// Read and parse the IFD at `offset`.
async fn read_ifd<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
    offset: u64,
) -> Result<Ifd, TiffError> {
    if offset >= reader.size() {
        return Err(TiffError::InvalidIfdOffset(offset));
    }
    let count_bytes = reader.read_exact_at(offset, header.ifd_count_size()).await?;
    let entry_count = Ifd::parse_entry_count(&count_bytes, header)?;
    let ifd_size = Ifd::calculate_size(entry_count, header);
    let ifd_bytes = reader.read_exact_at(offset, ifd_size).await?;
    Ifd::parse(&ifd_bytes, offset, header)
}

async fn decode_level<T: Sample, R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
    level: &TiffLevel,
) -> Result<Plane<T>, TiffError> {
    let compression = Compression::from_u16(level.compression)
        .filter(|c| c.is_supported())
        .ok_or_else(|| {
            TiffError::UnsupportedCompression(
                Compression::from_u16(level.compression)
                    .map(|c| c.name().to_string())
                    .unwrap_or_else(|| format!("Unknown ({})", level.compression)),
            )
        })?;

    let values = ValueReader::new(reader, header);
    let offsets_entry = level
        .ifd
        .get_entry_by_tag(TiffTag::TileOffsets)
        .ok_or(TiffError::MissingTag("TileOffsets"))?;
    let counts_entry = level
        .ifd
        .get_entry_by_tag(TiffTag::TileByteCounts)
        .ok_or(TiffError::MissingTag("TileByteCounts"))?;
    let offsets = values.read_u64_array(offsets_entry).await?;
    let byte_counts = values.read_u64_array(counts_entry).await?;

    if offsets.len() as u64 != level.tile_count() || byte_counts.len() != offsets.len() {
        return Err(TiffError::InvalidTagValue {
            tag: "TileOffsets",
            message: format!(
                "expected {} tiles, found {} offsets and {} byte counts",
                level.tile_count(),
                offsets.len(),
                byte_counts.len()
            ),
        });
    }

    let width = level.width as usize;
    let height = level.height as usize;
    let tw = level.tile_width as usize;
    let th = level.tile_height as usize;
    let bps = T::PIXEL_TYPE.bytes_per_sample();
    let little_endian = header.byte_order == ByteOrder::LittleEndian;
    let expected_len = tw * th * bps;

    let mut data = vec![T::default(); width * height];

    for (index, (&offset, &count)) in offsets.iter().zip(&byte_counts).enumerate() {
        let stored = reader.read_exact_at(offset, count as usize).await?;
        let raw = match compression {
            Compression::None => stored.to_vec(),
            _ => inflate(&stored, expected_len).map_err(|e| TiffError::CorruptTile {
                index,
                message: e.to_string(),
            })?,
        };
        if raw.len() < expected_len {
            return Err(TiffError::CorruptTile {
                index,
                message: format!("expected {} bytes, got {}", expected_len, raw.len()),
            });
        }

        let x0 = (index % level.tiles_x as usize) * tw;
        let y0 = (index / level.tiles_x as usize) * th;
        let cols = tw.min(width - x0);
        let rows = th.min(height - y0);
        for r in 0..rows {
            let src = &raw[r * tw * bps..(r * tw + cols) * bps];
            let dst = &mut data[(y0 + r) * width + x0..(y0 + r) * width + x0 + cols];
            for (out, sample) in dst.iter_mut().zip(src.chunks_exact(bps)) {
                *out = T::decode(sample, little_endian);
            }
        }
    }

    Plane::from_vec(width, height, data).ok_or_else(|| TiffError::InvalidTagValue {
        tag: "ImageWidth/ImageLength",
        message: "level dimensions overflow".to_string(),
    })
}

fn inflate(stored: &[u8], capacity: usize) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(capacity);
    ZlibDecoder::new(stored).read_to_end(&mut out)?;
    Ok(out)
}
