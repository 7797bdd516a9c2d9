//! In-memory 2D rasters.
//!
//! A [`RasterImage`] is a single grayscale plane whose element type is fixed
//! by the source container. Pipeline stages take ownership of the image they
//! work on; nothing here is shared between files.
//!
//! # Components
//!
//! - [`Plane`]: width x height samples of one element type, row-major
//! - [`Sample`]: element types the pipeline can carry (int8, int16, uint16, float32)
//! - [`RasterImage`]: type-erased plane, one variant per element type
//! - [`mrc`]: reader for the MRC containers produced by the stitcher
//! - [`resample`]: stride subsampling and smoothed 2x reduction

pub mod mrc;
pub mod resample;

use serde::Serialize;

// =============================================================================
// PixelType
// =============================================================================

/// Element type of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    Int8,
    Int16,
    Uint16,
    Float32,
}

impl PixelType {
    /// OME-XML `Pixels/@Type` name.
    pub const fn name(self) -> &'static str {
        match self {
            PixelType::Int8 => "int8",
            PixelType::Int16 => "int16",
            PixelType::Uint16 => "uint16",
            PixelType::Float32 => "float32",
        }
    }

    /// Size of one sample in bytes.
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            PixelType::Int8 => 1,
            PixelType::Int16 | PixelType::Uint16 => 2,
            PixelType::Float32 => 4,
        }
    }

    /// Size of one sample in bits.
    pub const fn bits_per_sample(self) -> u16 {
        (self.bytes_per_sample() * 8) as u16
    }

    /// TIFF SampleFormat value (1 = unsigned, 2 = signed, 3 = IEEE float).
    pub const fn tiff_sample_format(self) -> u16 {
        match self {
            PixelType::Uint16 => 1,
            PixelType::Int8 | PixelType::Int16 => 2,
            PixelType::Float32 => 3,
        }
    }

    /// Inverse of (`tiff_sample_format`, `bits_per_sample`).
    pub fn from_tiff(sample_format: u16, bits: u16) -> Option<Self> {
        match (sample_format, bits) {
            (2, 8) => Some(PixelType::Int8),
            (2, 16) => Some(PixelType::Int16),
            (1, 16) => Some(PixelType::Uint16),
            (3, 32) => Some(PixelType::Float32),
            _ => None,
        }
    }
}

// =============================================================================
// Sample
// =============================================================================

/// An element type a [`Plane`] can hold.
pub trait Sample: Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    /// Matching runtime tag.
    const PIXEL_TYPE: PixelType;

    /// Widen to f32 for filtering.
    fn to_f32(self) -> f32;

    /// Narrow a filtered value back, rounding and saturating to the type range.
    fn from_f32(value: f32) -> Self;

    /// Decode one sample from the leading bytes of `bytes`.
    fn decode(bytes: &[u8], little_endian: bool) -> Self;

    /// Encode one sample little-endian into the leading bytes of `out`.
    fn encode_le(self, out: &mut [u8]);
}

macro_rules! impl_integer_sample {
    ($t:ty, $pixel_type:expr) => {
        impl Sample for $t {
            const PIXEL_TYPE: PixelType = $pixel_type;

            #[inline]
            fn to_f32(self) -> f32 {
                self as f32
            }

            #[inline]
            fn from_f32(value: f32) -> Self {
                if value.is_nan() {
                    return 0;
                }
                value.round().clamp(<$t>::MIN as f32, <$t>::MAX as f32) as $t
            }

            #[inline]
            fn decode(bytes: &[u8], little_endian: bool) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                if little_endian {
                    <$t>::from_le_bytes(raw)
                } else {
                    <$t>::from_be_bytes(raw)
                }
            }

            #[inline]
            fn encode_le(self, out: &mut [u8]) {
                out[..std::mem::size_of::<$t>()].copy_from_slice(&self.to_le_bytes());
            }
        }
    };
}

impl_integer_sample!(i8, PixelType::Int8);
impl_integer_sample!(i16, PixelType::Int16);
impl_integer_sample!(u16, PixelType::Uint16);

impl Sample for f32 {
    const PIXEL_TYPE: PixelType = PixelType::Float32;

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        value
    }

    #[inline]
    fn decode(bytes: &[u8], little_endian: bool) -> Self {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[..4]);
        if little_endian {
            f32::from_le_bytes(raw)
        } else {
            f32::from_be_bytes(raw)
        }
    }

    #[inline]
    fn encode_le(self, out: &mut [u8]) {
        out[..4].copy_from_slice(&self.to_le_bytes());
    }
}

// =============================================================================
// Plane
// =============================================================================

/// A row-major 2D grid of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T> Plane<T> {
    /// Wrap a row-major buffer. Returns `None` if the length does not match.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Option<Self> {
        let expected = width.checked_mul(height)?;
        if data.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// One row of samples.
    ///
    /// # Panics
    /// Panics if `y >= height`.
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        let start = y * self.width;
        &self.data[start..start + self.width]
    }
}

impl<T: Copy> Plane<T> {
    /// A plane with every sample set to `value`.
    pub fn new_fill(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Build a plane from a per-pixel function.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Sample at (x, y).
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.data[y * self.width + x])
    }
}

// =============================================================================
// RasterImage
// =============================================================================

/// A single-channel 2D image of one of the supported element types.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterImage {
    Int8(Plane<i8>),
    Int16(Plane<i16>),
    Uint16(Plane<u16>),
    Float32(Plane<f32>),
}

/// Run `$body` with `$plane` bound to the typed plane inside a [`RasterImage`].
macro_rules! with_plane {
    ($image:expr, $plane:ident => $body:expr) => {
        match $image {
            $crate::raster::RasterImage::Int8($plane) => $body,
            $crate::raster::RasterImage::Int16($plane) => $body,
            $crate::raster::RasterImage::Uint16($plane) => $body,
            $crate::raster::RasterImage::Float32($plane) => $body,
        }
    };
}

/// Like [`with_plane!`], re-wrapping a plane result in the same variant.
macro_rules! map_plane {
    ($image:expr, $plane:ident => $body:expr) => {
        match $image {
            $crate::raster::RasterImage::Int8($plane) => $crate::raster::RasterImage::Int8($body),
            $crate::raster::RasterImage::Int16($plane) => $crate::raster::RasterImage::Int16($body),
            $crate::raster::RasterImage::Uint16($plane) => {
                $crate::raster::RasterImage::Uint16($body)
            }
            $crate::raster::RasterImage::Float32($plane) => {
                $crate::raster::RasterImage::Float32($body)
            }
        }
    };
}

pub(crate) use {map_plane, with_plane};

impl RasterImage {
    pub fn width(&self) -> usize {
        with_plane!(self, p => p.width())
    }

    pub fn height(&self) -> usize {
        with_plane!(self, p => p.height())
    }

    /// `(width, height)` in pixels.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    /// Total number of pixels.
    pub fn pixel_count(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn pixel_type(&self) -> PixelType {
        match self {
            RasterImage::Int8(_) => PixelType::Int8,
            RasterImage::Int16(_) => PixelType::Int16,
            RasterImage::Uint16(_) => PixelType::Uint16,
            RasterImage::Float32(_) => PixelType::Float32,
        }
    }

    /// Keep every `stride`-th pixel in both axes, starting at (0, 0).
    pub fn subsample(&self, stride: usize) -> RasterImage {
        map_plane!(self, p => resample::subsample(p, stride))
    }

    /// Smoothed 2x reduction in both axes, same element type.
    pub fn reduce_half(&self) -> RasterImage {
        map_plane!(self, p => resample::reduce_half(p))
    }

    /// Sample at (x, y) widened to f64.
    pub fn value_at(&self, x: usize, y: usize) -> Option<f64> {
        with_plane!(self, p => p.get(x, y).map(|v| v.to_f32() as f64))
    }
}

impl<T: Sample> From<Plane<T>> for RasterImage
where
    Plane<T>: IntoRaster,
{
    fn from(plane: Plane<T>) -> Self {
        plane.into_raster()
    }
}

/// Conversion of a typed plane into the matching [`RasterImage`] variant.
pub trait IntoRaster {
    fn into_raster(self) -> RasterImage;
}

impl IntoRaster for Plane<i8> {
    fn into_raster(self) -> RasterImage {
        RasterImage::Int8(self)
    }
}

impl IntoRaster for Plane<i16> {
    fn into_raster(self) -> RasterImage {
        RasterImage::Int16(self)
    }
}

impl IntoRaster for Plane<u16> {
    fn into_raster(self) -> RasterImage {
        RasterImage::Uint16(self)
    }
}

impl IntoRaster for Plane<f32> {
    fn into_raster(self) -> RasterImage {
        RasterImage::Float32(self)
    }
}
