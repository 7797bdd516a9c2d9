//! Multi-resolution pyramid construction.

use tracing::debug;

use crate::calibration::PixelCalibration;
use crate::raster::RasterImage;

/// Default minimum level size; halving stops below twice this value.
pub const DEFAULT_MIN_SIZE: usize = 512;

/// An ordered set of resolution levels.
///
/// Level 0 is the (possibly stride-reduced) base image; level `k` is level
/// `k - 1` reduced 2x in both axes. All levels share one element type.
#[derive(Debug, Clone)]
pub struct Pyramid {
    levels: Vec<RasterImage>,

    /// Calibration of level 0, after any stride reduction
    calibration: PixelCalibration,

    /// Stride applied to the source before level 0 was formed
    stride: u32,
}

impl Pyramid {
    /// Build a pyramid from a full-resolution base image.
    pub fn build(base: RasterImage, calibration: PixelCalibration, min_size: usize) -> Self {
        Self::from_base(base, calibration, 1, min_size)
    }

    /// Subsample the source by `stride` first, then build the pyramid on the
    /// reduced base. The base calibration is multiplied by the stride.
    pub fn build_reduced(
        source: &RasterImage,
        calibration: PixelCalibration,
        stride: u32,
        min_size: usize,
    ) -> Self {
        let stride = stride.max(1);
        let base = source.subsample(stride as usize);
        debug!(
            stride,
            from_width = source.width(),
            from_height = source.height(),
            to_width = base.width(),
            to_height = base.height(),
            "Subsampled base image"
        );
        Self::from_base(base, calibration.scaled(stride), stride, min_size)
    }

    fn from_base(
        base: RasterImage,
        calibration: PixelCalibration,
        stride: u32,
        min_size: usize,
    ) -> Self {
        let mut levels = vec![base];
        loop {
            let current = &levels[levels.len() - 1];
            if !should_reduce(current.width(), current.height(), min_size) {
                break;
            }
            let next = current.reduce_half();
            debug!(
                level = levels.len(),
                width = next.width(),
                height = next.height(),
                "Built pyramid level"
            );
            levels.push(next);
        }

        Self {
            levels,
            calibration,
            stride,
        }
    }

    /// All levels, full resolution first.
    pub fn levels(&self) -> &[RasterImage] {
        &self.levels
    }

    pub fn level(&self, index: usize) -> Option<&RasterImage> {
        self.levels.get(index)
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Level 0.
    pub fn base(&self) -> &RasterImage {
        &self.levels[0]
    }

    /// Take level 0 back, dropping the reduced levels.
    pub fn into_base(mut self) -> RasterImage {
        self.levels.truncate(1);
        self.levels.swap_remove(0)
    }

    /// Calibration of level 0.
    pub fn calibration(&self) -> PixelCalibration {
        self.calibration
    }

    /// Calibration of level `index`: base calibration x 2^index.
    pub fn level_calibration(&self, index: usize) -> PixelCalibration {
        self.calibration.at_level(index)
    }

    /// Stride applied before level 0 (1 when unreduced).
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// `(width, height)` of every level.
    pub fn dimensions(&self) -> Vec<(usize, usize)> {
        self.levels.iter().map(RasterImage::dimensions).collect()
    }
}

/// Whether a level of this size gets a further 2x level below it.
#[inline]
fn should_reduce(width: usize, height: usize, min_size: usize) -> bool {
    let smaller = width.min(height);
    smaller >= 2 && smaller >= min_size.saturating_mul(2)
}

/// Level dimensions a pyramid over a `width` x `height` base would have,
/// computed without touching pixel data.
pub fn level_dimensions(width: usize, height: usize, min_size: usize) -> Vec<(usize, usize)> {
    let mut dims = vec![(width, height)];
    let (mut w, mut h) = (width, height);
    while should_reduce(w, h, min_size) {
        w = (w / 2).max(1);
        h = (h / 2).max(1);
        dims.push((w, h));
    }
    dims
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{PixelType, Plane};

    fn image(width: usize, height: usize) -> RasterImage {
        RasterImage::Uint16(Plane::from_fn(width, height, |x, y| ((x + y) % 100) as u16))
    }

    // -------------------------------------------------------------------------
    // Level geometry
    // -------------------------------------------------------------------------

    #[test]
    fn test_level_dimensions_halving() {
        assert_eq!(
            level_dimensions(2048, 1536, 256),
            vec![(2048, 1536), (1024, 768), (512, 384)]
        );
    }

    #[test]
    fn test_level_dimensions_floor() {
        assert_eq!(level_dimensions(41, 21, 5), vec![(41, 21), (20, 10), (10, 5)]);
    }

    #[test]
    fn test_base_below_threshold_is_single_level() {
        assert_eq!(level_dimensions(1000, 300, 512), vec![(1000, 300)]);
    }

    #[test]
    fn test_stop_rule_is_strict() {
        // min dimension exactly 2 * min_size still reduces
        assert_eq!(level_dimensions(200, 100, 50).len(), 2);
        assert_eq!(level_dimensions(198, 99, 50).len(), 1);
    }

    #[test]
    fn test_zero_min_size_terminates() {
        let dims = level_dimensions(8, 5, 0);
        assert_eq!(dims.last(), Some(&(2, 1)));
    }

    #[test]
    fn test_level_count_non_increasing_in_min_size() {
        let mut previous = usize::MAX;
        for min_size in [1, 2, 8, 64, 256, 512, 1024, 4096] {
            let count = level_dimensions(5000, 3000, min_size).len();
            assert!(count <= previous);
            previous = count;
        }
    }

    // -------------------------------------------------------------------------
    // Build
    // -------------------------------------------------------------------------

    #[test]
    fn test_build_matches_geometry() {
        let pyramid = Pyramid::build(image(130, 70), PixelCalibration::from_angstrom(2.0), 16);
        assert_eq!(pyramid.dimensions(), level_dimensions(130, 70, 16));
        assert_eq!(pyramid.level_count(), 3);
        assert_eq!(pyramid.stride(), 1);
        assert!(pyramid
            .levels()
            .iter()
            .all(|l| l.pixel_type() == PixelType::Uint16));
    }

    #[test]
    fn test_level_calibration_doubles() {
        let pyramid = Pyramid::build(image(64, 64), PixelCalibration::from_angstrom(1.5), 4);
        for k in 0..pyramid.level_count() {
            let expected = 1.5 * 2f64.powi(k as i32);
            assert_eq!(pyramid.level_calibration(k).angstrom(), expected);
        }
    }

    #[test]
    fn test_build_reduced_applies_stride_first() {
        let source = image(101, 51);
        let pyramid =
            Pyramid::build_reduced(&source, PixelCalibration::from_angstrom(3.0), 2, 8);
        assert_eq!(pyramid.base().dimensions(), (51, 26));
        assert_eq!(pyramid.calibration().angstrom(), 6.0);
        assert_eq!(pyramid.level_calibration(1).angstrom(), 12.0);
        assert_eq!(pyramid.stride(), 2);
        assert_eq!(pyramid.base().value_at(1, 1), source.value_at(2, 2));
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = Pyramid::build(image(96, 80), PixelCalibration::from_angstrom(1.0), 8);
        let b = Pyramid::build(image(96, 80), PixelCalibration::from_angstrom(1.0), 8);
        assert_eq!(a.levels(), b.levels());
    }

    #[test]
    fn test_into_base_returns_level_zero() {
        let source = image(70, 40);
        let pyramid = Pyramid::build(source.clone(), PixelCalibration::from_angstrom(1.0), 8);
        assert!(pyramid.level_count() > 1);
        assert_eq!(pyramid.into_base(), source);
    }
}
