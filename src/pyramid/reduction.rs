//! Pixel-budget reduction policy.

use serde::Serialize;

/// Stride subsampling chosen for an image under a pixel budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReductionDecision {
    /// Stride applied in both axes (1 = unchanged)
    pub factor: u32,
    /// Width after subsampling
    pub width: u64,
    /// Height after subsampling
    pub height: u64,
}

impl ReductionDecision {
    /// Decide the stride for a `width` x `height` image.
    pub fn decide(width: u64, height: u64, budget: u64) -> Self {
        let factor = reduction_factor(width, height, budget);
        Self {
            factor,
            width: width.div_ceil(factor as u64),
            height: height.div_ceil(factor as u64),
        }
    }

    /// Whether any subsampling happens.
    pub fn is_reduced(&self) -> bool {
        self.factor > 1
    }

    /// Pixel count after subsampling.
    pub fn pixel_count(&self) -> u64 {
        self.width * self.height
    }
}

/// Smallest stride `f >= 1` such that keeping every f-th pixel of a
/// `width` x `height` image leaves at most `budget` pixels.
///
/// Starts from `ceil(sqrt(width * height / budget))` and steps up while the
/// subsampled grid `ceil(width / f) * ceil(height / f)` still exceeds the
/// budget. The bound is on the pixels actually kept, not on the fractional
/// `(width / f) * (height / f)`, so on small images the stride can be one
/// larger than the square-root estimate alone: `(5, 5)` under a budget of 2
/// gives 5, not 4. A zero budget is treated as one pixel.
pub fn reduction_factor(width: u64, height: u64, budget: u64) -> u32 {
    let budget = budget.max(1) as u128;
    let pixels = width as u128 * height as u128;
    if pixels <= budget {
        return 1;
    }

    // Integer ceil(sqrt(pixels / budget)): least f with f^2 * budget >= pixels.
    let mut factor = ((pixels as f64 / budget as f64).sqrt().ceil() as u128).max(1);
    while factor > 1 && (factor - 1) * (factor - 1) * budget >= pixels {
        factor -= 1;
    }
    while factor * factor * budget < pixels {
        factor += 1;
    }

    while subsampled_pixels(width, height, factor) > budget {
        factor += 1;
    }

    u32::try_from(factor).unwrap_or(u32::MAX)
}

fn subsampled_pixels(width: u64, height: u64, factor: u128) -> u128 {
    (width as u128).div_ceil(factor) * (height as u128).div_ceil(factor)
}
