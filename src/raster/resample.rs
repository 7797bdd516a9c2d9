//! Resampling kernels.
//!
//! [`subsample`] keeps every n-th pixel with no filtering. [`reduce_half`] is
//! the pyramid step: a separable Gaussian pre-filter (sigma = 2/3, radius 3,
//! half-sample symmetric boundary) followed by a 2x2 box average.
//!
//! Filtering runs in f32. Rows are blurred horizontally once and kept in a
//! small cache while the vertical pass sweeps down the image, so memory stays
//! proportional to a handful of rows rather than a second full image.

use std::collections::VecDeque;

use super::{Plane, Sample};

/// Gaussian sigma for a downscale factor of 2 (`2 * factor / 6`).
pub const GAUSSIAN_SIGMA: f32 = 2.0 / 3.0;

/// Kernel extent in standard deviations.
const GAUSSIAN_TRUNCATE: f32 = 4.0;

/// Keep every `stride`-th pixel in both axes, starting at the origin.
///
/// Output dimensions are `ceil(w / stride)` x `ceil(h / stride)`. A stride of
/// 0 or 1 returns a copy.
pub fn subsample<T: Copy>(plane: &Plane<T>, stride: usize) -> Plane<T> {
    let stride = stride.max(1);
    let width = plane.width().div_ceil(stride);
    let height = plane.height().div_ceil(stride);

    let mut data = Vec::with_capacity(width * height);
    for y in (0..plane.height()).step_by(stride) {
        data.extend(plane.row(y).iter().step_by(stride).copied());
    }

    Plane {
        width,
        height,
        data,
    }
}

/// Normalized 1D Gaussian weights, length `2 * radius + 1`.
pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as isize;
    let denom = 2.0 * sigma * sigma;

    let mut weights: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let sum: f32 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

/// Map an out-of-range index back into `0..len` by mirroring about the
/// half-sample boundary (`d c b a | a b c d | d c b a`).
#[inline]
fn reflect(index: isize, len: usize) -> usize {
    let len = len as isize;
    let period = 2 * len;
    let mut i = index.rem_euclid(period);
    if i >= len {
        i = period - 1 - i;
    }
    i as usize
}

/// Horizontally blurred and pair-averaged copy of one source row.
fn reduce_row<T: Sample>(row: &[T], kernel: &[f32], out_width: usize) -> Vec<f32> {
    let radius = (kernel.len() / 2) as isize;
    let width = row.len();

    let blur_at = |center: isize| -> f32 {
        kernel
            .iter()
            .enumerate()
            .map(|(k, w)| w * row[reflect(center + k as isize - radius, width)].to_f32())
            .sum()
    };

    (0..out_width)
        .map(|x| {
            let left = (2 * x) as isize;
            0.5 * (blur_at(left) + blur_at(left + 1))
        })
        .collect()
}

/// Cache of horizontally reduced rows keyed by source row index.
struct RowCache {
    capacity: usize,
    rows: VecDeque<(usize, Vec<f32>)>,
}

impl RowCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            rows: VecDeque::with_capacity(capacity),
        }
    }

    fn get_or_insert_with(&mut self, index: usize, f: impl FnOnce() -> Vec<f32>) -> &[f32] {
        let pos = match self.rows.iter().position(|(i, _)| *i == index) {
            Some(pos) => pos,
            None => {
                if self.rows.len() == self.capacity {
                    self.rows.pop_front();
                }
                self.rows.push_back((index, f()));
                self.rows.len() - 1
            }
        };
        &self.rows[pos].1
    }
}

/// Smoothed 2x reduction.
///
/// Output dimensions are `floor(w / 2)` x `floor(h / 2)`, never below 1. Each
/// output sample is the mean of the 2x2 block of Gaussian-blurred source
/// samples it covers, rounded and saturated to the element type.
pub fn reduce_half<T: Sample>(plane: &Plane<T>) -> Plane<T> {
    let (width, height) = (plane.width(), plane.height());
    let out_width = (width / 2).max(1);
    let out_height = (height / 2).max(1);

    let kernel = gaussian_kernel(GAUSSIAN_SIGMA);
    let radius = (kernel.len() / 2) as isize;
    let mut cache = RowCache::new(kernel.len() + 1);

    let mut data = Vec::with_capacity(out_width * out_height);
    let mut acc = vec![0f32; out_width];

    for oy in 0..out_height {
        acc.fill(0.0);
        for sub in 0..2 {
            let center = (2 * oy + sub) as isize;
            for (k, weight) in kernel.iter().enumerate() {
                let src_y = reflect(center + k as isize - radius, height);
                let row = cache.get_or_insert_with(src_y, || {
                    reduce_row(plane.row(src_y), &kernel, out_width)
                });
                for (a, v) in acc.iter_mut().zip(row) {
                    *a += weight * v;
                }
            }
        }
        data.extend(acc.iter().map(|v| T::from_f32(0.5 * v)));
    }

    Plane {
        width: out_width,
        height: out_height,
        data,
    }
}
