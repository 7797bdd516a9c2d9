//! MRC container reader.
//!
//! MRC files start with a fixed 1024-byte header followed by an optional
//! extended header of `NSYMBT` bytes and then the voxel data, section by
//! section, rows fastest. Only the fields needed to locate and decode the
//! first section are interpreted:
//!
//! | Offset | Field  | Meaning                                  |
//! |--------|--------|------------------------------------------|
//! | 0      | NX     | columns                                  |
//! | 4      | NY     | rows                                     |
//! | 8      | NZ     | sections                                 |
//! | 12     | MODE   | element type                             |
//! | 92     | NSYMBT | extended header size in bytes            |
//! | 208    | MAP    | `"MAP "` marker (MRC2000 and later)      |
//! | 212    | MACHST | machine stamp, byte order of the file    |

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::debug;

use crate::error::{IoError, MrcError};
use crate::io::{read_u32_be, read_u32_le};

use super::{IntoRaster, PixelType, Plane, RasterImage, Sample};

/// Size of the fixed header.
pub const MRC_HEADER_SIZE: usize = 1024;

const OFFSET_NX: usize = 0;
const OFFSET_NY: usize = 4;
const OFFSET_NZ: usize = 8;
const OFFSET_MODE: usize = 12;
const OFFSET_NSYMBT: usize = 92;
const OFFSET_MAP: usize = 208;
const OFFSET_MACHST: usize = 212;

/// Bytes decoded per read while streaming a section.
const READ_CHUNK_BYTES: usize = 8 * 1024 * 1024;

// =============================================================================
// Header
// =============================================================================

/// Data mode codes this reader decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MrcMode {
    /// Mode 0, signed 8-bit
    Int8,
    /// Mode 1, signed 16-bit
    Int16,
    /// Mode 2, 32-bit float
    Float32,
    /// Mode 6, unsigned 16-bit
    Uint16,
}

impl MrcMode {
    pub fn from_code(code: i32) -> Result<Self, MrcError> {
        match code {
            0 => Ok(MrcMode::Int8),
            1 => Ok(MrcMode::Int16),
            2 => Ok(MrcMode::Float32),
            6 => Ok(MrcMode::Uint16),
            other => Err(MrcError::UnsupportedMode(other)),
        }
    }

    pub const fn code(self) -> i32 {
        match self {
            MrcMode::Int8 => 0,
            MrcMode::Int16 => 1,
            MrcMode::Float32 => 2,
            MrcMode::Uint16 => 6,
        }
    }

    pub const fn pixel_type(self) -> PixelType {
        match self {
            MrcMode::Int8 => PixelType::Int8,
            MrcMode::Int16 => PixelType::Int16,
            MrcMode::Float32 => PixelType::Float32,
            MrcMode::Uint16 => PixelType::Uint16,
        }
    }
}

/// The parts of an MRC header needed to read the first section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MrcHeader {
    /// Columns
    pub nx: usize,
    /// Rows
    pub ny: usize,
    /// Sections
    pub nz: usize,
    /// Element type
    pub mode: MrcMode,
    /// Size of the extended header that precedes the data
    pub extended_header_bytes: u64,
    /// Byte order of header fields and data
    pub little_endian: bool,
}

impl MrcHeader {
    /// Parse the fixed header.
    ///
    /// The byte order comes from the machine stamp when the `MAP ` marker is
    /// present. Older files without the marker are read little-endian unless
    /// the mode field is only plausible big-endian.
    pub fn parse(bytes: &[u8]) -> Result<Self, MrcError> {
        if bytes.len() < MRC_HEADER_SIZE {
            return Err(MrcError::FileTooSmall {
                required: MRC_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        let little_endian = if &bytes[OFFSET_MAP..OFFSET_MAP + 4] == b"MAP " {
            bytes[OFFSET_MACHST] != 0x11
        } else {
            let mode_le = read_i32(bytes, OFFSET_MODE, true);
            (0..=16).contains(&mode_le)
        };

        let nx = read_i32(bytes, OFFSET_NX, little_endian);
        let ny = read_i32(bytes, OFFSET_NY, little_endian);
        let nz = read_i32(bytes, OFFSET_NZ, little_endian);
        if nx <= 0 || ny <= 0 || nz <= 0 {
            return Err(MrcError::InvalidDimensions { nx, ny, nz });
        }

        let mode = MrcMode::from_code(read_i32(bytes, OFFSET_MODE, little_endian))?;
        let nsymbt = read_i32(bytes, OFFSET_NSYMBT, little_endian).max(0);

        Ok(Self {
            nx: nx as usize,
            ny: ny as usize,
            nz: nz as usize,
            mode,
            extended_header_bytes: nsymbt as u64,
            little_endian,
        })
    }

    /// Read and parse the header of a file without touching the data.
    pub fn read(path: &Path) -> Result<Self, MrcError> {
        let mut file = open(path)?;
        let mut buf = vec![0u8; MRC_HEADER_SIZE];
        let read = read_up_to(&mut file, &mut buf).map_err(|e| io_err(path, e))?;
        Self::parse(&buf[..read])
    }

    /// Offset of the first data byte.
    pub fn data_offset(&self) -> u64 {
        MRC_HEADER_SIZE as u64 + self.extended_header_bytes
    }

    /// Pixels in one section.
    pub fn pixel_count(&self) -> u64 {
        self.nx as u64 * self.ny as u64
    }

    /// Bytes in one section.
    pub fn section_bytes(&self) -> u64 {
        self.pixel_count() * self.mode.pixel_type().bytes_per_sample() as u64
    }

    pub fn pixel_type(&self) -> PixelType {
        self.mode.pixel_type()
    }
}

// =============================================================================
// Data
// =============================================================================

/// Read the header and the first section of an MRC file.
///
/// Stacks (`nz > 1`) are accepted here; callers decide whether using only the
/// first section is acceptable.
pub fn read_first_section(path: &Path) -> Result<(MrcHeader, RasterImage), MrcError> {
    let header = MrcHeader::read(path)?;

    let file = open(path)?;
    let file_size = file.metadata().map_err(|e| io_err(path, e))?.len();
    let expected = header.data_offset() + header.section_bytes();
    if file_size < expected {
        return Err(MrcError::Truncated {
            expected,
            actual: file_size,
        });
    }

    debug!(
        path = %path.display(),
        nx = header.nx,
        ny = header.ny,
        nz = header.nz,
        mode = header.mode.code(),
        "Reading MRC section"
    );

    let mut reader = BufReader::new(file);
    reader
        .seek(SeekFrom::Start(header.data_offset()))
        .map_err(|e| io_err(path, e))?;

    let image = match header.mode {
        MrcMode::Int8 => decode_section::<i8>(&mut reader, &header, path)?.into_raster(),
        MrcMode::Int16 => decode_section::<i16>(&mut reader, &header, path)?.into_raster(),
        MrcMode::Float32 => decode_section::<f32>(&mut reader, &header, path)?.into_raster(),
        MrcMode::Uint16 => decode_section::<u16>(&mut reader, &header, path)?.into_raster(),
    };
    Ok((header, image))
}

/// Decode one section in bounded chunks so the raw bytes are never held
/// alongside the full decoded plane.
fn decode_section<T: Sample>(
    reader: &mut impl Read,
    header: &MrcHeader,
    path: &Path,
) -> Result<Plane<T>, MrcError> {
    let sample_size = header.pixel_type().bytes_per_sample();
    let total = header.nx * header.ny;
    let chunk_samples = (READ_CHUNK_BYTES / sample_size).max(1);

    let mut data: Vec<T> = Vec::with_capacity(total);
    let mut buf = vec![0u8; chunk_samples.min(total) * sample_size];

    while data.len() < total {
        let n = chunk_samples.min(total - data.len());
        let bytes = &mut buf[..n * sample_size];
        reader.read_exact(bytes).map_err(|e| io_err(path, e))?;
        data.extend(
            bytes
                .chunks_exact(sample_size)
                .map(|raw| T::decode(raw, header.little_endian)),
        );
    }

    Plane::from_vec(header.nx, header.ny, data).ok_or(MrcError::InvalidDimensions {
        nx: header.nx as i32,
        ny: header.ny as i32,
        nz: header.nz as i32,
    })
}

fn read_i32(bytes: &[u8], offset: usize, little_endian: bool) -> i32 {
    let raw = if little_endian {
        read_u32_le(&bytes[offset..])
    } else {
        read_u32_be(&bytes[offset..])
    };
    raw as i32
}

fn open(path: &Path) -> Result<File, MrcError> {
    File::open(path).map_err(|e| io_err(path, e))
}

fn io_err(path: &Path, err: std::io::Error) -> MrcError {
    MrcError::Io(IoError::from_std(path.display().to_string(), err))
}

/// Fill as much of `buf` as the reader can provide.
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn header_bytes(nx: i32, ny: i32, nz: i32, mode: i32, nsymbt: i32, big_endian: bool) -> Vec<u8> {
        let mut header = vec![0u8; MRC_HEADER_SIZE];
        let put = |h: &mut Vec<u8>, offset: usize, v: i32| {
            let raw = if big_endian {
                v.to_be_bytes()
            } else {
                v.to_le_bytes()
            };
            h[offset..offset + 4].copy_from_slice(&raw);
        };
        put(&mut header, OFFSET_NX, nx);
        put(&mut header, OFFSET_NY, ny);
        put(&mut header, OFFSET_NZ, nz);
        put(&mut header, OFFSET_MODE, mode);
        put(&mut header, OFFSET_NSYMBT, nsymbt);
        header[OFFSET_MAP..OFFSET_MAP + 4].copy_from_slice(b"MAP ");
        let stamp = if big_endian { 0x11 } else { 0x44 };
        header[OFFSET_MACHST] = stamp;
        header[OFFSET_MACHST + 1] = stamp;
        header
    }

    fn write_file(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    // -------------------------------------------------------------------------
    // Header parsing
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_little_endian_header() {
        let header = MrcHeader::parse(&header_bytes(40, 30, 1, 1, 0, false)).unwrap();
        assert_eq!((header.nx, header.ny, header.nz), (40, 30, 1));
        assert_eq!(header.mode, MrcMode::Int16);
        assert!(header.little_endian);
        assert_eq!(header.data_offset(), 1024);
        assert_eq!(header.section_bytes(), 40 * 30 * 2);
    }

    #[test]
    fn test_parse_big_endian_header() {
        let header = MrcHeader::parse(&header_bytes(7, 5, 2, 2, 64, true)).unwrap();
        assert_eq!((header.nx, header.ny, header.nz), (7, 5, 2));
        assert_eq!(header.mode, MrcMode::Float32);
        assert!(!header.little_endian);
        assert_eq!(header.data_offset(), 1088);
    }

    #[test]
    fn test_parse_header_without_map_marker() {
        let mut bytes = header_bytes(8, 8, 1, 6, 0, false);
        bytes[OFFSET_MAP..OFFSET_MAP + 4].fill(0);
        let header = MrcHeader::parse(&bytes).unwrap();
        assert!(header.little_endian);
        assert_eq!(header.mode, MrcMode::Uint16);
    }

    #[test]
    fn test_parse_rejects_bad_fields() {
        assert!(matches!(
            MrcHeader::parse(&[0u8; 100]),
            Err(MrcError::FileTooSmall { .. })
        ));
        assert!(matches!(
            MrcHeader::parse(&header_bytes(0, 10, 1, 1, 0, false)),
            Err(MrcError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            MrcHeader::parse(&header_bytes(10, 10, 1, 4, 0, false)),
            Err(MrcError::UnsupportedMode(4))
        ));
    }

    // -------------------------------------------------------------------------
    // Section reading
    // -------------------------------------------------------------------------

    #[test]
    fn test_read_first_section_skips_extended_header() {
        let mut bytes = header_bytes(3, 2, 1, 1, 16, false);
        bytes.extend_from_slice(&[0xAB; 16]);
        for v in [1i16, -2, 3, -4, 5, -6] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let file = write_file(&bytes);

        let (header, image) = read_first_section(file.path()).unwrap();
        assert_eq!(header.nz, 1);
        match image {
            RasterImage::Int16(plane) => assert_eq!(plane.data(), &[1, -2, 3, -4, 5, -6]),
            other => panic!("unexpected raster {:?}", other.pixel_type()),
        }
    }

    #[test]
    fn test_read_first_section_of_stack() {
        let mut bytes = header_bytes(2, 2, 3, 0, 0, false);
        bytes.extend_from_slice(&[1, 2, 3, 4, 9, 9, 9, 9, 8, 8, 8, 8]);
        let file = write_file(&bytes);

        let (header, image) = read_first_section(file.path()).unwrap();
        assert_eq!(header.nz, 3);
        assert_eq!(image, RasterImage::Int8(Plane::from_vec(2, 2, vec![1, 2, 3, 4]).unwrap()));
    }

    #[test]
    fn test_read_big_endian_float() {
        let mut bytes = header_bytes(2, 1, 1, 2, 0, true);
        bytes.extend_from_slice(&0.5f32.to_be_bytes());
        bytes.extend_from_slice(&(-1.0f32).to_be_bytes());
        let file = write_file(&bytes);

        let (_, image) = read_first_section(file.path()).unwrap();
        assert_eq!(image.value_at(0, 0), Some(0.5));
        assert_eq!(image.value_at(1, 0), Some(-1.0));
    }

    #[test]
    fn test_read_truncated_data() {
        let mut bytes = header_bytes(10, 10, 1, 1, 0, false);
        bytes.extend_from_slice(&[0u8; 50]);
        let file = write_file(&bytes);

        assert!(matches!(
            read_first_section(file.path()),
            Err(MrcError::Truncated {
                expected: 1224,
                actual: 1074
            })
        ));
    }

    #[test]
    fn test_read_header_only() {
        let bytes = header_bytes(50_000, 50_000, 1, 6, 0, false);
        let file = write_file(&bytes);
        let header = MrcHeader::read(file.path()).unwrap();
        assert_eq!(header.pixel_count(), 2_500_000_000);
    }
}
