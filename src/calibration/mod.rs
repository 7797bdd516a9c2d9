//! Physical pixel calibration.
//!
//! The acquisition records one scalar pixel size in angstrom. Everything the
//! emitters need (micrometers for OME, nanometers for HDF5, per-level sizes)
//! is derived from that value on demand.

mod mdoc;

pub use mdoc::{parse_line, read_descriptor_value, read_pixel_spacing, PIXEL_SPACING_KEY};

use serde::Serialize;

/// Angstrom to micrometer conversion factor.
pub const ANGSTROM_TO_MICROMETER: f64 = 1e-4;

/// Angstrom per nanometer.
pub const ANGSTROM_PER_NANOMETER: f64 = 10.0;

/// Physical size of one (square) pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PixelCalibration {
    angstrom: f64,
}

impl PixelCalibration {
    /// Create a calibration from a pixel size in angstrom.
    pub const fn from_angstrom(angstrom: f64) -> Self {
        Self { angstrom }
    }

    /// Pixel size in angstrom.
    #[inline]
    pub fn angstrom(self) -> f64 {
        self.angstrom
    }

    /// Pixel size in micrometers (angstrom x 1e-4).
    #[inline]
    pub fn micrometers(self) -> f64 {
        self.angstrom * ANGSTROM_TO_MICROMETER
    }

    /// Pixel size in nanometers (angstrom / 10).
    #[inline]
    pub fn nanometers(self) -> f64 {
        self.angstrom / ANGSTROM_PER_NANOMETER
    }

    /// Calibration after subsampling by `factor` in each axis.
    pub fn scaled(self, factor: u32) -> Self {
        Self {
            angstrom: self.angstrom * factor as f64,
        }
    }

    /// Calibration of pyramid level `level` (each level doubles the size).
    pub fn at_level(self, level: usize) -> Self {
        Self {
            angstrom: self.angstrom * 2f64.powi(level as i32),
        }
    }
}
