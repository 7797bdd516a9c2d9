//! Pyramidal OME-TIFF emission.
//!
//! The file is written to a hidden temporary file next to the destination
//! and renamed into place only after the last page and the final flush have
//! succeeded. On any error the temporary file is dropped, which deletes it,
//! so a failed write never leaves a truncated `.ome.tif` behind.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, info};

use crate::error::WriteError;
use crate::format::tiff::{PageOptions, TiffWriter, TileCompression};
use crate::pyramid::Pyramid;

use super::xml::OmeImage;

/// Default tile edge in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Software tag written on the first page.
pub const SOFTWARE: &str = concat!("mrc-pyramid ", env!("CARGO_PKG_VERSION"));

// =============================================================================
// Options
// =============================================================================

/// How an OME-TIFF pyramid is laid out.
#[derive(Debug, Clone)]
pub struct OmeTiffOptions {
    /// Square tile edge, a multiple of 16
    pub tile_size: u32,

    /// Lossless codec applied to every tile
    pub compression: TileCompression,

    /// `Image/@Name` in the OME-XML; the output file name when `None`
    pub image_name: Option<String>,
}

impl Default for OmeTiffOptions {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            compression: TileCompression::default(),
            image_name: None,
        }
    }
}

/// What was written.
#[derive(Debug, Clone, Serialize)]
pub struct OmeTiffReport {
    pub path: PathBuf,
    pub levels: usize,

    /// `(width, height)` per level
    pub dimensions: Vec<(usize, usize)>,

    /// Physical pixel size of level 0 in micrometers
    pub pixel_size_um: f64,

    pub bytes: u64,
}

// =============================================================================
// Emitter
// =============================================================================

/// Write `pyramid` as a tiled BigTIFF with embedded OME-XML.
///
/// Level 0 is the first page and carries the OME-XML description; every
/// further level is written as one of its SubIFDs with the same tiling and
/// compression.
pub fn write_ome_tiff(
    pyramid: &Pyramid,
    path: &Path,
    options: &OmeTiffOptions,
) -> Result<OmeTiffReport, WriteError> {
    let levels = pyramid.levels();
    let Some(base) = levels.first() else {
        return Err(WriteError::EmptyPyramid);
    };

    let image_name = options.image_name.clone().unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let (width, height) = base.dimensions();
    let ome = OmeImage::single_plane(
        image_name,
        width,
        height,
        base.pixel_type(),
        pyramid.calibration(),
    );
    let description = ome.to_xml(SOFTWARE);

    let temp = temp_file_for(path)?;
    let identifier = path.display().to_string();
    let file = temp
        .as_file()
        .try_clone()
        .map_err(|e| WriteError::io(identifier.clone(), e))?;
    let mut writer = TiffWriter::new(BufWriter::new(file), identifier.clone())?;

    for (index, level) in levels.iter().enumerate() {
        let first = index == 0;
        let page = PageOptions {
            tile_width: options.tile_size,
            tile_height: options.tile_size,
            compression: options.compression,
            description: first.then_some(description.as_str()),
            software: first.then_some(SOFTWARE),
            subifds: if first { levels.len() - 1 } else { 0 },
        };
        writer.write_page(level, &page)?;
        debug!(
            file = %identifier,
            level = index,
            width = level.width(),
            height = level.height(),
            "Wrote OME-TIFF level"
        );
    }

    let buffered = writer.finish()?;
    let file = buffered
        .into_inner()
        .map_err(|e| WriteError::io(identifier.clone(), e.error()))?;
    file.sync_all()
        .map_err(|e| WriteError::io(identifier.clone(), e))?;
    drop(file);

    persist(temp, path)?;

    let bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let report = OmeTiffReport {
        path: path.to_path_buf(),
        levels: levels.len(),
        dimensions: pyramid.dimensions(),
        pixel_size_um: pyramid.calibration().micrometers(),
        bytes,
    };

    info!(
        file = %identifier,
        levels = report.levels,
        pixel_size_um = report.pixel_size_um,
        stride = pyramid.stride(),
        "OME-TIFF pyramid written"
    );

    Ok(report)
}

/// Hidden temporary file in the destination directory.
pub(crate) fn temp_file_for(path: &Path) -> Result<NamedTempFile, WriteError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let prefix = format!(
        ".{}.",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    );
    let mut builder = Builder::new();
    builder.prefix(&prefix).suffix(".partial");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Same mode as a plain create; the process umask still applies
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    builder
        .tempfile_in(dir)
        .map_err(|e| WriteError::io(dir.display().to_string(), e))
}

/// Rename a finished temporary file over `path`.
pub(crate) fn persist(temp: NamedTempFile, path: &Path) -> Result<File, WriteError> {
    temp.persist(path)
        .map_err(|e| WriteError::io(path.display().to_string(), e.error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::PixelCalibration;
    use crate::format::ome::OmeMetadata;
    use crate::format::tiff::{validate_layout, TiffLayout};
    use crate::io::FileRangeReader;
    use crate::raster::{Plane, RasterImage};
    use tempfile::TempDir;

    fn pyramid(width: usize, height: usize, min_size: usize) -> Pyramid {
        let base = RasterImage::Uint16(Plane::from_fn(width, height, |x, y| {
            ((x * 7 + y * 13) % 4096) as u16
        }));
        Pyramid::build(base, PixelCalibration::from_angstrom(2.0), min_size)
    }

    // -------------------------------------------------------------------------
    // Structure
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("grid.ome.tif");
        let pyramid = pyramid(200, 130, 20);
        assert_eq!(pyramid.level_count(), 3);

        let options = OmeTiffOptions {
            tile_size: 64,
            image_name: Some("grid.mrc".to_string()),
            ..Default::default()
        };
        let report = write_ome_tiff(&pyramid, &path, &options).unwrap();
        assert_eq!(report.levels, 3);
        assert!(report.bytes > 0);

        let reader = FileRangeReader::open(&path).await.unwrap();
        let layout = TiffLayout::parse(&reader).await.unwrap();
        assert_eq!(layout.dimensions(), vec![(200, 130), (100, 65), (50, 32)]);
        assert_eq!(layout.pages.len(), 1);
        assert_eq!(layout.software.as_deref(), Some(SOFTWARE));

        let validation = validate_layout(&layout);
        assert!(validation.is_valid, "{:?}", validation.errors);
        assert!(validation.warnings.is_empty());

        let metadata = OmeMetadata::parse(layout.description.as_deref().unwrap()).unwrap();
        assert_eq!(metadata.image_name.as_deref(), Some("grid.mrc"));
        assert_eq!(metadata.size_x, Some(200));
        assert_eq!(metadata.size_y, Some(130));
        assert_eq!(metadata.physical_size_x, Some(0.0002));
        assert_eq!(metadata.pixel_type.as_deref(), Some("uint16"));

        let level2 = layout.read_level(&reader, 2).await.unwrap();
        assert_eq!(&level2, pyramid.level(2).unwrap());
    }

    #[tokio::test]
    async fn test_single_level_has_no_subifds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("small.ome.tif");
        let pyramid = pyramid(40, 30, 512);
        write_ome_tiff(&pyramid, &path, &OmeTiffOptions::default()).unwrap();

        let reader = FileRangeReader::open(&path).await.unwrap();
        let layout = TiffLayout::parse(&reader).await.unwrap();
        assert_eq!(layout.level_count(), 1);
        let metadata = OmeMetadata::parse(layout.description.as_deref().unwrap()).unwrap();
        assert_eq!(metadata.image_name.as_deref(), Some("small.ome.tif"));
    }

    #[test]
    fn test_reduced_calibration_in_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reduced.ome.tif");
        let source = RasterImage::Int16(Plane::new_fill(64, 64, 3));
        let pyramid =
            Pyramid::build_reduced(&source, PixelCalibration::from_angstrom(2.0), 2, 512);
        let report = write_ome_tiff(&pyramid, &path, &OmeTiffOptions::default()).unwrap();
        assert_eq!(report.dimensions, vec![(32, 32)]);
        assert_eq!(report.pixel_size_um, 0.0004);
    }

    // -------------------------------------------------------------------------
    // Atomicity
    // -------------------------------------------------------------------------

    #[test]
    fn test_failed_write_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.ome.tif");
        let options = OmeTiffOptions {
            tile_size: 100,
            ..Default::default()
        };
        let result = write_ome_tiff(&pyramid(64, 64, 512), &path, &options);
        assert!(matches!(result, Err(WriteError::InvalidTileSize { .. })));
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_output_mode_matches_plain_create() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.ome.tif");
        write_ome_tiff(&pyramid(32, 32, 512), &path, &OmeTiffOptions::default()).unwrap();

        let plain = dir.path().join("plain");
        std::fs::write(&plain, b"x").unwrap();

        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&path), mode(&plain));
    }

    #[test]
    fn test_overwrites_existing_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("again.ome.tif");
        std::fs::write(&path, b"stale").unwrap();
        write_ome_tiff(&pyramid(32, 32, 512), &path, &OmeTiffOptions::default()).unwrap();
        assert!(std::fs::read(&path).unwrap().starts_with(b"II+\0"));
    }
}
