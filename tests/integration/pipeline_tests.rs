//! End-to-end tests of the per-file pipeline with a mock stitcher.

use std::sync::Arc;

use mrc_pyramid::convert::{convert_file, MemorySink, Stage};
use mrc_pyramid::error::{ConvertError, ErrorKind};
use mrc_pyramid::{level_dimensions, OmeMetadata, PixelCalibration};
use tempfile::TempDir;

use super::test_utils::{
    create_montage, file_names, large_options, read_layout, serialem_descriptor, test_options,
    MockStitcher,
};

// =============================================================================
// Small images
// =============================================================================

#[tokio::test]
async fn test_small_image_writes_only_ome_tiff() {
    let dir = TempDir::new().unwrap();
    let montage = create_montage(dir.path(), "grid.mrc", Some(&serialem_descriptor("1.5")));
    let stitcher = MockStitcher::new(70, 50);
    let sink = Arc::new(MemorySink::new());

    let report = convert_file(&montage, &stitcher, &test_options(), sink.clone())
        .await
        .unwrap();

    assert_eq!(report.pixel_spacing_angstrom, 1.5);
    assert_eq!((report.width, report.height), (70, 50));
    assert_eq!(report.pixel_type, "uint16");
    assert!(!report.large);
    assert!(report.reduction.is_none());
    assert!(report.reduced_ome_tiff.is_none());
    assert!(report.bdv.is_none());
    assert_eq!(report.outputs(), vec![dir.path().join("grid.ome.tif")]);

    // Intermediates are gone, inputs and the output remain
    assert_eq!(
        file_names(dir.path()),
        vec!["grid.mrc", "grid.mrc.mdoc", "grid.ome.tif"]
    );
    assert_eq!(report.removed.len(), 3);
}

#[tokio::test]
async fn test_ome_tiff_calibration_and_levels() {
    let dir = TempDir::new().unwrap();
    let montage = create_montage(dir.path(), "grid.mrc", Some(&serialem_descriptor("1.5")));
    let stitcher = MockStitcher::new(70, 50);

    convert_file(&montage, &stitcher, &test_options(), Arc::new(MemorySink::new()))
        .await
        .unwrap();

    let (_, layout) = read_layout(&dir.path().join("grid.ome.tif")).await;
    let expected: Vec<(u32, u32)> = level_dimensions(70, 50, 8)
        .into_iter()
        .map(|(w, h)| (w as u32, h as u32))
        .collect();
    assert_eq!(layout.dimensions(), expected);

    let metadata = OmeMetadata::parse(layout.description.as_deref().unwrap()).unwrap();
    let micrometers = PixelCalibration::from_angstrom(1.5).micrometers();
    assert_eq!(metadata.physical_size_x, Some(micrometers));
    assert_eq!(metadata.physical_size_y, Some(micrometers));
    assert_eq!(metadata.image_name.as_deref(), Some("grid.mrc"));
    assert_eq!((metadata.size_x, metadata.size_y), (Some(70), Some(50)));
}

#[tokio::test]
async fn test_stage_order() {
    let dir = TempDir::new().unwrap();
    let montage = create_montage(dir.path(), "grid.mrc", Some("PixelSpacing = 3.0\n"));
    let stitcher = MockStitcher::new(40, 40);
    let sink = Arc::new(MemorySink::new());

    convert_file(&montage, &stitcher, &test_options(), sink.clone())
        .await
        .unwrap();

    assert_eq!(
        sink.stages_for(&montage),
        vec![
            Stage::Calibration,
            Stage::ExtractLayout,
            Stage::Stitch,
            Stage::Classify,
            Stage::OmeTiff,
            Stage::Cleanup,
        ]
    );
    assert_eq!(
        stitcher.calls().await,
        vec!["extract:grid.mrc", "stitch:grid.mrc", "cleanup:grid.mrc"]
    );
}

#[tokio::test]
async fn test_keep_intermediates() {
    let dir = TempDir::new().unwrap();
    let montage = create_montage(dir.path(), "grid.mrc", Some("PixelSpacing = 3.0\n"));
    let stitcher = MockStitcher::new(40, 40);
    let options = mrc_pyramid::ConvertOptions {
        keep_intermediates: true,
        ..test_options()
    };

    let report = convert_file(&montage, &stitcher, &options, Arc::new(MemorySink::new()))
        .await
        .unwrap();

    assert!(report.removed.is_empty());
    let names = file_names(dir.path());
    assert!(names.contains(&"grid_blended.mrc".to_string()));
    assert!(names.contains(&"montage_plf".to_string()));
    assert!(names.contains(&"MONTAGE_EDGES.ecd".to_string()));
    assert!(!stitcher.calls().await.iter().any(|c| c.starts_with("cleanup")));
}

// =============================================================================
// Large images
// =============================================================================

#[tokio::test]
async fn test_large_image_without_h5_writes_reduced_sibling() {
    let dir = TempDir::new().unwrap();
    let montage = create_montage(dir.path(), "grid.mrc", Some("PixelSpacing = 2.0\n"));
    let stitcher = MockStitcher::new(101, 61);
    let sink = Arc::new(MemorySink::new());

    let report = convert_file(&montage, &stitcher, &large_options(101, 61, false), sink.clone())
        .await
        .unwrap();

    assert!(report.large);
    let decision = report.reduction.unwrap();
    assert_eq!(decision.factor, 2);
    assert_eq!((decision.width, decision.height), (51, 31));

    let reduced = report.reduced_ome_tiff.as_ref().unwrap();
    assert_eq!(reduced.path, dir.path().join("grid_reduced.ome.tif"));
    assert_eq!(reduced.dimensions[0], (51, 31));
    assert_eq!(
        reduced.pixel_size_um,
        PixelCalibration::from_angstrom(2.0).scaled(2).micrometers()
    );
    assert_eq!(report.ome_tiff.dimensions[0], (101, 61));

    assert!(dir.path().join("grid.ome.tif").exists());
    assert!(dir.path().join("grid_reduced.ome.tif").exists());
    assert!(!dir.path().join("grid.h5").exists());
    assert!(!dir.path().join("grid.xml").exists());
    assert!(sink.stages_for(&montage).contains(&Stage::ReducedOmeTiff));
}

#[tokio::test]
async fn test_reduced_ome_tiff_calibration_is_scaled() {
    let dir = TempDir::new().unwrap();
    let montage = create_montage(dir.path(), "grid.mrc", Some("PixelSpacing = 2.0\n"));
    let stitcher = MockStitcher::new(101, 61);

    convert_file(
        &montage,
        &stitcher,
        &large_options(101, 61, false),
        Arc::new(MemorySink::new()),
    )
    .await
    .unwrap();

    let (_, layout) = read_layout(&dir.path().join("grid_reduced.ome.tif")).await;
    let metadata = OmeMetadata::parse(layout.description.as_deref().unwrap()).unwrap();
    assert_eq!(metadata.physical_size_x, Some(0.0004));
    assert_eq!(metadata.size_x, Some(51));
    assert_eq!(metadata.size_y, Some(31));
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_missing_descriptor() {
    let dir = TempDir::new().unwrap();
    let montage = create_montage(dir.path(), "grid.mrc", None);
    let stitcher = MockStitcher::new(40, 40);

    let err = convert_file(&montage, &stitcher, &test_options(), Arc::new(MemorySink::new()))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MissingInput);
    assert!(stitcher.calls().await.is_empty());
}

#[tokio::test]
async fn test_descriptor_without_pixel_spacing() {
    let dir = TempDir::new().unwrap();
    let montage = create_montage(
        dir.path(),
        "grid.mrc",
        Some("ImageFile = grid.mrc\nMagnification = 2250\n"),
    );
    let stitcher = MockStitcher::new(40, 40);

    let err = convert_file(&montage, &stitcher, &test_options(), Arc::new(MemorySink::new()))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnparsableCalibration);
    assert!(err.to_string().contains("PixelSpacing"));
    assert!(!dir.path().join("grid.ome.tif").exists());
}

#[tokio::test]
async fn test_missing_montage() {
    let dir = TempDir::new().unwrap();
    let stitcher = MockStitcher::new(40, 40);
    let err = convert_file(
        &dir.path().join("absent.mrc"),
        &stitcher,
        &test_options(),
        Arc::new(MemorySink::new()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ConvertError::MissingInput(_)));
}

#[tokio::test]
async fn test_stitch_failure_cleans_up() {
    let dir = TempDir::new().unwrap();
    let montage = create_montage(dir.path(), "grid.mrc", Some("PixelSpacing = 3.0\n"));
    let stitcher = MockStitcher::new(40, 40).failing_on("grid.mrc");

    let err = convert_file(&montage, &stitcher, &test_options(), Arc::new(MemorySink::new()))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExternalTool);
    assert!(err.to_string().contains("piece list does not match"));
    assert_eq!(file_names(dir.path()), vec!["grid.mrc", "grid.mrc.mdoc"]);
    assert_eq!(
        stitcher.calls().await,
        vec!["extract:grid.mrc", "stitch:grid.mrc", "cleanup:grid.mrc"]
    );
}

#[tokio::test]
async fn test_stacked_blend_is_dimensionality_error() {
    let dir = TempDir::new().unwrap();
    let montage = create_montage(dir.path(), "grid.mrc", Some("PixelSpacing = 3.0\n"));
    let stitcher = MockStitcher::new(20, 10).with_sections(3);

    let err = convert_file(&montage, &stitcher, &test_options(), Arc::new(MemorySink::new()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ConvertError::Dimensionality {
            nx: 20,
            ny: 10,
            nz: 3,
            ..
        }
    ));
    assert!(!dir.path().join("grid.ome.tif").exists());
    // Cleanup still ran
    assert!(!dir.path().join("grid_blended.mrc").exists());
}

// =============================================================================
// Idempotence
// =============================================================================

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let montage = create_montage(dir.path(), "grid.mrc", Some("PixelSpacing = 2.5\n"));
    let stitcher = MockStitcher::new(90, 45);

    let first = convert_file(&montage, &stitcher, &test_options(), Arc::new(MemorySink::new()))
        .await
        .unwrap();
    let first_bytes = std::fs::read(dir.path().join("grid.ome.tif")).unwrap();

    let second = convert_file(&montage, &stitcher, &test_options(), Arc::new(MemorySink::new()))
        .await
        .unwrap();
    let second_bytes = std::fs::read(dir.path().join("grid.ome.tif")).unwrap();

    assert_eq!(first.ome_tiff.dimensions, second.ome_tiff.dimensions);
    assert_eq!(first.ome_tiff.pixel_size_um, second.ome_tiff.pixel_size_um);
    assert_eq!(first_bytes, second_bytes);
}
