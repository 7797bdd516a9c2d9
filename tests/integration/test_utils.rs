//! Test utilities for integration tests.
//!
//! This module provides a mock stitcher and helpers for creating synthetic
//! MRC montages, `.mdoc` descriptors and conversion options.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use mrc_pyramid::convert::{remove_intermediates, ConvertOptions, OutputPaths, StitcherClient};
use mrc_pyramid::error::StitchError;
use mrc_pyramid::format::ome::OmeTiffOptions;
use mrc_pyramid::io::FileRangeReader;
use mrc_pyramid::{RasterImage, TiffLayout};

// =============================================================================
// MRC and descriptor builders
// =============================================================================

/// Pixel value of the synthetic blended image at `(x, y)`.
pub fn pattern(x: usize, y: usize) -> u16 {
    ((x * 7 + y * 13) % 4096) as u16
}

/// Build a little-endian uint16 (mode 6) MRC file.
pub fn mrc_bytes(nx: usize, ny: usize, nz: usize, value: impl Fn(usize, usize) -> u16) -> Vec<u8> {
    let mut bytes = vec![0u8; 1024];
    let mut put = |offset: usize, v: i32| bytes[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
    put(0, nx as i32);
    put(4, ny as i32);
    put(8, nz as i32);
    put(12, 6);
    bytes[208..212].copy_from_slice(b"MAP ");
    bytes[212] = 0x44;
    bytes[213] = 0x44;

    for _ in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                bytes.extend_from_slice(&value(x, y).to_le_bytes());
            }
        }
    }
    bytes
}

pub fn write_mrc(path: &Path, nx: usize, ny: usize, nz: usize) {
    fs::write(path, mrc_bytes(nx, ny, nz, pattern)).unwrap();
}

/// Write `<montage>.mdoc` with the given body.
pub fn write_descriptor(montage: &Path, body: &str) {
    let paths = OutputPaths::for_input(montage);
    fs::write(paths.descriptor, body).unwrap();
}

/// A typical SerialEM descriptor with the pixel spacing in the middle.
pub fn serialem_descriptor(pixel_spacing: &str) -> String {
    format!(
        "PixelSpacing = {}\nImageFile = grid.mrc\nImageSize = 4096 4096\nMontage = 1\n\n\
         [ZValue = 0]\nPieceCoordinates = 0 0 0\nMagnification = 2250\n\
         PixelSpacing = 999\n",
        pixel_spacing
    )
}

/// Create a raw montage plus its descriptor.
///
/// The montage content is never read by the mock stitcher.
pub fn create_montage(dir: &Path, name: &str, descriptor: Option<&str>) -> PathBuf {
    let montage = dir.join(name);
    if let Some(parent) = montage.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    write_mrc(&montage, 4, 4, 2);
    if let Some(body) = descriptor {
        write_descriptor(&montage, body);
    }
    montage
}

/// Options sized for small synthetic images.
pub fn test_options() -> ConvertOptions {
    ConvertOptions {
        min_size: 8,
        ome: OmeTiffOptions {
            tile_size: 16,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Options under which a `width` x `height` image counts as large.
pub fn large_options(width: usize, height: usize, create_h5: bool) -> ConvertOptions {
    ConvertOptions {
        create_h5,
        large_threshold: (width * height) as u64 - 1,
        reduction_target: (width * height / 3) as u64,
        ..test_options()
    }
}

/// Names of the files in `dir`, sorted.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =============================================================================
// OME-TIFF read-back
// =============================================================================

pub async fn read_layout(path: &Path) -> (FileRangeReader, TiffLayout) {
    let reader = FileRangeReader::open(path).await.unwrap();
    let layout = TiffLayout::parse(&reader).await.unwrap();
    (reader, layout)
}

pub async fn read_level(path: &Path, level: usize) -> RasterImage {
    let (reader, layout) = read_layout(path).await;
    layout.read_level(&reader, level).await.unwrap()
}

// =============================================================================
// Mock Stitcher
// =============================================================================

/// A stitcher that writes a synthetic blended image instead of running tools.
///
/// Every call is recorded as `"<step>:<file name>"`.
#[derive(Clone)]
pub struct MockStitcher {
    width: usize,
    height: usize,
    sections: usize,
    fail_on: Option<String>,
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockStitcher {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            sections: 1,
            fail_on: None,
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Blend into a stack of `sections` sections.
    pub fn with_sections(mut self, sections: usize) -> Self {
        self.sections = sections;
        self
    }

    /// Fail blending for the montage with this file name.
    pub fn failing_on(mut self, name: &str) -> Self {
        self.fail_on = Some(name.to_string());
        self
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.read().await.clone()
    }

    async fn record(&self, step: &str, montage: &Path) {
        let name = OutputPaths::for_input(montage).name;
        self.calls.write().await.push(format!("{}:{}", step, name));
    }
}

#[async_trait]
impl StitcherClient for MockStitcher {
    async fn extract_layout(&self, montage: &Path) -> Result<PathBuf, StitchError> {
        self.record("extract", montage).await;
        let paths = OutputPaths::for_input(montage);
        let layout = paths.folder.join("montage_plf");
        fs::write(&layout, b"piece list").unwrap();
        Ok(layout)
    }

    async fn stitch(&self, montage: &Path, layout: &Path) -> Result<PathBuf, StitchError> {
        self.record("stitch", montage).await;
        assert!(layout.exists());
        let paths = OutputPaths::for_input(montage);

        fs::write(paths.folder.join("MONTAGE_EDGES.ecd"), b"edges").unwrap();
        if self.fail_on.as_deref() == Some(paths.name.as_str()) {
            return Err(StitchError::ToolFailed {
                tool: "blendmont".to_string(),
                status: 1,
                stderr: "ERROR: BLENDMONT - piece list does not match".to_string(),
            });
        }

        write_mrc(&paths.blended, self.width, self.height, self.sections);
        Ok(paths.blended)
    }

    async fn cleanup(&self, montage: &Path) -> Result<Vec<PathBuf>, StitchError> {
        self.record("cleanup", montage).await;
        remove_intermediates(montage).await
    }
}
