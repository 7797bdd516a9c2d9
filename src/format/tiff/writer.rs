//! Tiled BigTIFF writer.
//!
//! Pages are written front to back: tile data first, then the IFD and its
//! out-of-line values. A page may announce `subifds` reduced-resolution
//! children through the SubIFDs tag; the next `subifds` pages written are
//! linked into those slots instead of the main IFD chain.
//!
//! All output is little-endian. Edge tiles are zero-padded to the full tile
//! size, as TIFF readers expect.

use std::collections::VecDeque;
use std::io::{Seek, SeekFrom, Write};

use flate2::write::ZlibEncoder;
use tracing::trace;

use crate::error::WriteError;
use crate::raster::{with_plane, PixelType, Plane, RasterImage, Sample};

use super::parser::VERSION_BIGTIFF;
use super::tags::{
    Compression, FieldType, TiffTag, PHOTOMETRIC_MIN_IS_BLACK, PLANAR_CHUNKY,
    SUBFILE_REDUCED_IMAGE,
};

/// Tile dimensions must be a multiple of this.
pub const TILE_ALIGNMENT: u32 = 16;

/// Default deflate level.
pub const DEFAULT_DEFLATE_LEVEL: u32 = 6;

/// BigTIFF IFD entry size.
const ENTRY_SIZE: u64 = 20;

// =============================================================================
// Options
// =============================================================================

/// Lossless tile codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileCompression {
    /// Raw samples
    None,
    /// zlib stream, level 0-9
    Deflate { level: u32 },
}

impl TileCompression {
    /// Compression tag value.
    pub fn tiff_code(self) -> Compression {
        match self {
            TileCompression::None => Compression::None,
            TileCompression::Deflate { .. } => Compression::Deflate,
        }
    }
}

impl Default for TileCompression {
    fn default() -> Self {
        TileCompression::Deflate {
            level: DEFAULT_DEFLATE_LEVEL,
        }
    }
}

/// How one page is laid out.
#[derive(Debug, Clone)]
pub struct PageOptions<'a> {
    pub tile_width: u32,
    pub tile_height: u32,
    pub compression: TileCompression,

    /// ImageDescription text
    pub description: Option<&'a str>,

    /// Software tag text
    pub software: Option<&'a str>,

    /// Number of reduced-resolution pages that will follow as children
    pub subifds: usize,
}

// =============================================================================
// IFD entries
// =============================================================================

/// An entry ready to serialize, with its value encoded little-endian.
struct OutEntry {
    tag: TiffTag,
    field_type: FieldType,
    count: u64,
    data: Vec<u8>,
}

impl OutEntry {
    fn short(tag: TiffTag, value: u16) -> Self {
        Self {
            tag,
            field_type: FieldType::Short,
            count: 1,
            data: value.to_le_bytes().to_vec(),
        }
    }

    fn long(tag: TiffTag, value: u32) -> Self {
        Self {
            tag,
            field_type: FieldType::Long,
            count: 1,
            data: value.to_le_bytes().to_vec(),
        }
    }

    fn long8_array(tag: TiffTag, values: &[u64]) -> Self {
        Self {
            tag,
            field_type: FieldType::Long8,
            count: values.len() as u64,
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    fn ifd8_placeholders(tag: TiffTag, count: usize) -> Self {
        Self {
            tag,
            field_type: FieldType::Ifd8,
            count: count as u64,
            data: vec![0u8; count * 8],
        }
    }

    fn ascii(tag: TiffTag, text: &str) -> Self {
        let mut data = text.as_bytes().to_vec();
        data.push(0);
        Self {
            tag,
            field_type: FieldType::Ascii,
            count: data.len() as u64,
            data,
        }
    }
}

// =============================================================================
// TiffWriter
// =============================================================================

/// Streaming writer for a little-endian BigTIFF file.
pub struct TiffWriter<W: Write + Seek> {
    out: W,

    /// Name used in error messages
    identifier: String,

    /// Current end of file
    position: u64,

    /// Where the offset of the next main-chain IFD goes
    next_ifd_link: u64,

    /// SubIFDs slots announced but not yet filled, in fill order
    pending_subifds: VecDeque<u64>,

    /// Element type shared by every page
    pixel_type: Option<PixelType>,

    pages: usize,
}

impl<W: Write + Seek> TiffWriter<W> {
    /// Start a file by writing the BigTIFF header.
    pub fn new(out: W, identifier: impl Into<String>) -> Result<Self, WriteError> {
        let mut writer = Self {
            out,
            identifier: identifier.into(),
            position: 0,
            next_ifd_link: 8,
            pending_subifds: VecDeque::new(),
            pixel_type: None,
            pages: 0,
        };

        let mut header = Vec::with_capacity(16);
        header.extend_from_slice(b"II");
        header.extend_from_slice(&VERSION_BIGTIFF.to_le_bytes());
        header.extend_from_slice(&8u16.to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes());
        header.extend_from_slice(&0u64.to_le_bytes());
        writer.write_bytes(&header)?;

        Ok(writer)
    }

    /// Number of pages written so far.
    pub fn pages_written(&self) -> usize {
        self.pages
    }

    /// Write one page and return the file offset of its IFD.
    pub fn write_page(
        &mut self,
        image: &RasterImage,
        options: &PageOptions<'_>,
    ) -> Result<u64, WriteError> {
        let (tw, th) = (options.tile_width, options.tile_height);
        if tw == 0 || th == 0 || tw % TILE_ALIGNMENT != 0 || th % TILE_ALIGNMENT != 0 {
            return Err(WriteError::InvalidTileSize {
                width: tw,
                height: th,
            });
        }

        let (width, height) = image.dimensions();
        let (Ok(width32), Ok(height32)) = (u32::try_from(width), u32::try_from(height)) else {
            return Err(WriteError::TooLarge { width, height });
        };

        let pixel_type = image.pixel_type();
        match self.pixel_type {
            Some(expected) if expected != pixel_type => {
                return Err(WriteError::PixelTypeMismatch {
                    expected: expected.name(),
                    actual: pixel_type.name(),
                })
            }
            _ => self.pixel_type = Some(pixel_type),
        }

        let is_subifd = !self.pending_subifds.is_empty();

        let (offsets, byte_counts) =
            with_plane!(image, plane => self.write_tiles(plane, tw as usize, th as usize, options.compression))?;

        let subfile_type = if is_subifd { SUBFILE_REDUCED_IMAGE } else { 0 };
        let mut entries = vec![
            OutEntry::long(TiffTag::NewSubfileType, subfile_type),
            OutEntry::long(TiffTag::ImageWidth, width32),
            OutEntry::long(TiffTag::ImageLength, height32),
            OutEntry::short(TiffTag::BitsPerSample, pixel_type.bits_per_sample()),
            OutEntry::short(TiffTag::Compression, options.compression.tiff_code() as u16),
            OutEntry::short(TiffTag::PhotometricInterpretation, PHOTOMETRIC_MIN_IS_BLACK),
        ];
        if let Some(description) = options.description {
            entries.push(OutEntry::ascii(TiffTag::ImageDescription, description));
        }
        entries.push(OutEntry::short(TiffTag::SamplesPerPixel, 1));
        entries.push(OutEntry::short(TiffTag::PlanarConfiguration, PLANAR_CHUNKY));
        if let Some(software) = options.software {
            entries.push(OutEntry::ascii(TiffTag::Software, software));
        }
        entries.push(OutEntry::long(TiffTag::TileWidth, tw));
        entries.push(OutEntry::long(TiffTag::TileLength, th));
        entries.push(OutEntry::long8_array(TiffTag::TileOffsets, &offsets));
        entries.push(OutEntry::long8_array(TiffTag::TileByteCounts, &byte_counts));
        if options.subifds > 0 {
            entries.push(OutEntry::ifd8_placeholders(TiffTag::SubIfds, options.subifds));
        }
        entries.push(OutEntry::short(
            TiffTag::SampleFormat,
            pixel_type.tiff_sample_format(),
        ));

        let (ifd_offset, subifd_slots, next_link) = self.write_ifd(&entries)?;

        if is_subifd {
            if let Some(slot) = self.pending_subifds.pop_front() {
                self.patch_u64(slot, ifd_offset)?;
            }
        } else {
            self.patch_u64(self.next_ifd_link, ifd_offset)?;
            self.next_ifd_link = next_link;
        }
        self.pending_subifds.extend(subifd_slots);
        self.pages += 1;

        trace!(
            file = %self.identifier,
            page = self.pages - 1,
            width,
            height,
            tiles = offsets.len(),
            ifd_offset,
            reduced = is_subifd,
            "Wrote TIFF page"
        );

        Ok(ifd_offset)
    }

    /// Flush and hand back the underlying writer.
    ///
    /// Fails if a page announced SubIFDs that were never written.
    pub fn finish(mut self) -> Result<W, WriteError> {
        if !self.pending_subifds.is_empty() {
            return Err(WriteError::UnfilledSubIfds(self.pending_subifds.len()));
        }
        self.out
            .flush()
            .map_err(|e| WriteError::io(self.identifier.clone(), e))?;
        Ok(self.out)
    }

    fn write_tiles<T: Sample>(
        &mut self,
        plane: &Plane<T>,
        tile_width: usize,
        tile_height: usize,
        compression: TileCompression,
    ) -> Result<(Vec<u64>, Vec<u64>), WriteError> {
        let bps = T::PIXEL_TYPE.bytes_per_sample();
        let tiles_x = plane.width().div_ceil(tile_width);
        let tiles_y = plane.height().div_ceil(tile_height);

        let mut offsets = Vec::with_capacity(tiles_x * tiles_y);
        let mut byte_counts = Vec::with_capacity(tiles_x * tiles_y);
        let mut raw = vec![0u8; tile_width * tile_height * bps];
        let row_bytes = tile_width * bps;

        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                raw.fill(0);
                let x0 = tx * tile_width;
                let y0 = ty * tile_height;
                let cols = tile_width.min(plane.width() - x0);
                let rows = tile_height.min(plane.height() - y0);

                for r in 0..rows {
                    let src = &plane.row(y0 + r)[x0..x0 + cols];
                    let dst = &mut raw[r * row_bytes..r * row_bytes + cols * bps];
                    for (sample, out) in src.iter().zip(dst.chunks_exact_mut(bps)) {
                        sample.encode_le(out);
                    }
                }

                self.align(2)?;
                let offset = self.position;
                let count = match compression {
                    TileCompression::None => {
                        self.write_bytes(&raw)?;
                        raw.len()
                    }
                    TileCompression::Deflate { level } => {
                        let packed = deflate(&raw, level)
                            .map_err(|e| WriteError::io(self.identifier.clone(), e))?;
                        self.write_bytes(&packed)?;
                        packed.len()
                    }
                };
                offsets.push(offset);
                byte_counts.push(count as u64);
            }
        }

        Ok((offsets, byte_counts))
    }

    /// Serialize an IFD and its out-of-line values at the end of the file.
    ///
    /// Returns the IFD offset, the file offsets of its SubIFDs slots and the
    /// offset of its next-IFD link.
    fn write_ifd(&mut self, entries: &[OutEntry]) -> Result<(u64, Vec<u64>, u64), WriteError> {
        self.align(8)?;
        let ifd_offset = self.position;
        let n = entries.len() as u64;
        let next_link = ifd_offset + 8 + n * ENTRY_SIZE;
        let extra_start = next_link + 8;

        let mut ifd = Vec::with_capacity((extra_start - ifd_offset) as usize);
        let mut extra: Vec<u8> = Vec::new();
        let mut subifd_slots = Vec::new();

        ifd.extend_from_slice(&n.to_le_bytes());
        for (index, entry) in entries.iter().enumerate() {
            ifd.extend_from_slice(&entry.tag.as_u16().to_le_bytes());
            ifd.extend_from_slice(&(entry.field_type as u16).to_le_bytes());
            ifd.extend_from_slice(&entry.count.to_le_bytes());

            let value_field = ifd_offset + 8 + index as u64 * ENTRY_SIZE + 12;
            let value_location = if entry.data.len() <= 8 {
                let mut inline = [0u8; 8];
                inline[..entry.data.len()].copy_from_slice(&entry.data);
                ifd.extend_from_slice(&inline);
                value_field
            } else {
                while extra.len() % 8 != 0 {
                    extra.push(0);
                }
                let location = extra_start + extra.len() as u64;
                ifd.extend_from_slice(&location.to_le_bytes());
                extra.extend_from_slice(&entry.data);
                location
            };

            if entry.tag == TiffTag::SubIfds {
                subifd_slots.extend((0..entry.count).map(|i| value_location + i * 8));
            }
        }
        ifd.extend_from_slice(&0u64.to_le_bytes());

        self.write_bytes(&ifd)?;
        self.write_bytes(&extra)?;
        Ok((ifd_offset, subifd_slots, next_link))
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), WriteError> {
        self.out
            .write_all(bytes)
            .map_err(|e| WriteError::io(self.identifier.clone(), e))?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn align(&mut self, to: u64) -> Result<(), WriteError> {
        let padding = (to - self.position % to) % to;
        if padding > 0 {
            self.write_bytes(&vec![0u8; padding as usize])?;
        }
        Ok(())
    }

    /// Overwrite 8 bytes at `at`, then return to the end of the file.
    fn patch_u64(&mut self, at: u64, value: u64) -> Result<(), WriteError> {
        patch(&mut self.out, at, value, self.position)
            .map_err(|e| WriteError::io(self.identifier.clone(), e))
    }
}

fn patch<W: Write + Seek>(out: &mut W, at: u64, value: u64, end: u64) -> std::io::Result<()> {
    out.seek(SeekFrom::Start(at))?;
    out.write_all(&value.to_le_bytes())?;
    out.seek(SeekFrom::Start(end))?;
    Ok(())
}

fn deflate(raw: &[u8], level: u32) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(
        Vec::with_capacity(raw.len() / 2),
        flate2::Compression::new(level.min(9)),
    );
    encoder.write_all(raw)?;
    encoder.finish()
}
