//! OME-TIFF emitter tests: structure, lossless read-back and calibration.

use mrc_pyramid::format::tiff::{validate_layout, Compression, TiffTag};
use mrc_pyramid::{
    inspect_ome_tiff, write_ome_tiff, OmeMetadata, OmeTiffOptions, PixelCalibration, PixelType,
    Plane, Pyramid, RasterImage, TileCompression,
};
use tempfile::TempDir;

use super::test_utils::{read_layout, read_level};

fn float_image(width: usize, height: usize) -> RasterImage {
    RasterImage::Float32(Plane::from_fn(width, height, |x, y| {
        (x as f32 * 0.25) - (y as f32 * 1.5)
    }))
}

// =============================================================================
// Structure
// =============================================================================

#[tokio::test]
async fn test_levels_are_subifds_of_page_zero() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("img.ome.tif");
    let pyramid = Pyramid::build(float_image(100, 70), PixelCalibration::from_angstrom(8.0), 16);
    let options = OmeTiffOptions {
        tile_size: 32,
        ..Default::default()
    };
    write_ome_tiff(&pyramid, &path, &options).unwrap();

    let (_, layout) = read_layout(&path).await;
    assert!(layout.header.is_bigtiff);
    // One top-level page; the reduced levels hang off it
    assert_eq!(layout.pages.len(), 1);
    assert_eq!(layout.level_count(), pyramid.level_count());
    assert!(layout.pages[0].get_entry_by_tag(TiffTag::SubIfds).is_some());

    for (index, level) in layout.levels.iter().enumerate() {
        assert_eq!((level.tile_width, level.tile_height), (32, 32));
        assert_eq!(level.pixel_type(), Some(PixelType::Float32));
        assert_eq!(level.compression, Compression::Deflate as u16);
        assert_eq!(level.photometric, Some(1));
        assert_eq!(level.subfile_type, if index == 0 { 0 } else { 1 });
    }

    let validation = validate_layout(&layout);
    assert!(validation.is_valid, "{:?}", validation.errors);
}

#[tokio::test]
async fn test_description_only_on_page_zero() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("img.ome.tif");
    let pyramid = Pyramid::build(float_image(64, 64), PixelCalibration::from_angstrom(8.0), 16);
    write_ome_tiff(&pyramid, &path, &OmeTiffOptions::default()).unwrap();

    let (_, layout) = read_layout(&path).await;
    assert!(layout.description.as_deref().unwrap().contains("<OME"));
    for level in layout.levels.iter().skip(1) {
        assert!(level.ifd.get_entry_by_tag(TiffTag::ImageDescription).is_none());
    }
}

// =============================================================================
// Pixel data
// =============================================================================

#[tokio::test]
async fn test_levels_read_back_losslessly() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("img.ome.tif");
    let pyramid = Pyramid::build(float_image(75, 50), PixelCalibration::from_angstrom(1.0), 10);
    write_ome_tiff(
        &pyramid,
        &path,
        &OmeTiffOptions {
            tile_size: 16,
            ..Default::default()
        },
    )
    .unwrap();

    for (index, expected) in pyramid.levels().iter().enumerate() {
        assert_eq!(&read_level(&path, index).await, expected, "level {}", index);
    }
}

#[tokio::test]
async fn test_uncompressed_tiles() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("img.ome.tif");
    let image = RasterImage::Int8(Plane::from_fn(40, 24, |x, y| (x as i8) - (y as i8)));
    let pyramid = Pyramid::build(image.clone(), PixelCalibration::from_angstrom(1.0), 8);
    let options = OmeTiffOptions {
        tile_size: 16,
        compression: TileCompression::None,
        ..Default::default()
    };
    let report = write_ome_tiff(&pyramid, &path, &options).unwrap();
    assert_eq!(report.levels, 2);

    let (_, layout) = read_layout(&path).await;
    assert!(layout
        .levels
        .iter()
        .all(|l| l.compression == Compression::None as u16));
    assert_eq!(read_level(&path, 0).await, image);
}

// =============================================================================
// Calibration
// =============================================================================

#[tokio::test]
async fn test_physical_size_per_stride() {
    let dir = TempDir::new().unwrap();
    let source = float_image(90, 90);

    for stride in [1u32, 2, 3] {
        let path = dir.path().join(format!("s{}.ome.tif", stride));
        let pyramid =
            Pyramid::build_reduced(&source, PixelCalibration::from_angstrom(5.0), stride, 8);
        write_ome_tiff(&pyramid, &path, &OmeTiffOptions::default()).unwrap();

        let (_, layout) = read_layout(&path).await;
        let metadata = OmeMetadata::parse(layout.description.as_deref().unwrap()).unwrap();
        let expected = PixelCalibration::from_angstrom(5.0).scaled(stride).micrometers();
        assert_eq!(metadata.physical_size_x, Some(expected));
        assert_eq!(metadata.physical_size_y, Some(expected));
        assert_eq!(
            metadata.size_x,
            Some(90u64.div_ceil(stride as u64)),
            "stride {}",
            stride
        );
    }
}

#[tokio::test]
async fn test_inspect_report() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("img.ome.tif");
    let pyramid = Pyramid::build(float_image(80, 60), PixelCalibration::from_angstrom(10.0), 12);
    write_ome_tiff(&pyramid, &path, &OmeTiffOptions::default()).unwrap();

    let report = inspect_ome_tiff(&path).await.unwrap();
    assert!(report.is_valid);
    assert_eq!(report.physical_size_x, Some(0.001));
    assert_eq!(report.levels.len(), pyramid.level_count());
    assert_eq!(report.levels[1].downsample, 2.0);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["levels"][0]["pixel_type"], "float32");
}
