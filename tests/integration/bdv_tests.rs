//! HDF5/BigDataViewer output through the pipeline.

use std::sync::Arc;

use mrc_pyramid::convert::{convert_file, MemorySink, Stage};
use mrc_pyramid::format::bdv::{bdv_level_dimensions, hdf5_available};
use mrc_pyramid::ErrorKind;
use tempfile::TempDir;

use super::test_utils::{create_montage, large_options, MockStitcher};

#[tokio::test]
async fn test_large_image_with_h5_writes_pair_and_unreduced_ome_tiff() {
    if !hdf5_available() {
        return;
    }

    let dir = TempDir::new().unwrap();
    let montage = create_montage(dir.path(), "grid.mrc", Some("PixelSpacing = 15.0\n"));
    let stitcher = MockStitcher::new(101, 61);
    let sink = Arc::new(MemorySink::new());

    let report = convert_file(&montage, &stitcher, &large_options(101, 61, true), sink.clone())
        .await
        .unwrap();

    assert!(report.large);
    assert!(report.reduced_ome_tiff.is_none());
    assert!(report.reduction.is_none());
    let bdv = report.bdv.as_ref().unwrap();
    assert_eq!(bdv.dimensions, bdv_level_dimensions(101, 61));
    assert_eq!(bdv.pixel_size_nm, 1.5);
    assert_eq!(bdv.pixel_size_um, 0.0015);

    assert!(dir.path().join("grid.ome.tif").exists());
    assert!(dir.path().join("grid.h5").exists());
    assert!(dir.path().join("grid.xml").exists());
    assert!(!dir.path().join("grid_reduced.ome.tif").exists());
    assert_eq!(report.ome_tiff.dimensions[0], (101, 61));
    assert!(sink.stages_for(&montage).contains(&Stage::Hdf5));

    let xml = std::fs::read_to_string(dir.path().join("grid.xml")).unwrap();
    assert!(xml.contains("<hdf5 type=\"relative\">grid.h5</hdf5>"));
    assert!(xml.contains("<size>101 61 1</size>"));
    assert!(xml.contains("<affine>0.0015 0.0 0.0 0.0 0.0 0.0015 0.0 0.0 0.0 0.0 0.0015 0.0</affine>"));
}

#[tokio::test]
async fn test_create_h5_without_support_fails_cleanly() {
    if hdf5_available() {
        return;
    }

    let dir = TempDir::new().unwrap();
    let montage = create_montage(dir.path(), "grid.mrc", Some("PixelSpacing = 15.0\n"));
    let stitcher = MockStitcher::new(30, 20);

    let err = convert_file(
        &montage,
        &stitcher,
        &large_options(30, 20, true),
        Arc::new(MemorySink::new()),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OutputWrite);
    assert!(!dir.path().join("grid.h5").exists());
    assert!(!dir.path().join("grid.xml").exists());
}

#[cfg(feature = "hdf5")]
mod hdf5_contents {
    use super::*;
    use hdf5::types::VarLenUnicode;
    use hdf5::File;

    #[tokio::test]
    async fn test_h5_datasets_and_attributes() {
        let dir = TempDir::new().unwrap();
        let montage = create_montage(dir.path(), "grid.mrc", Some("PixelSpacing = 20.0\n"));
        let stitcher = MockStitcher::new(21, 13);

        convert_file(
            &montage,
            &stitcher,
            &large_options(21, 13, true),
            Arc::new(MemorySink::new()),
        )
        .await
        .unwrap();

        let file = File::open(dir.path().join("grid.h5")).unwrap();
        for (index, (width, height)) in bdv_level_dimensions(21, 13).into_iter().enumerate() {
            let data = file.dataset(&format!("res{}", index)).unwrap();
            assert_eq!(data.shape(), vec![height, width]);

            let x: Vec<f64> = file
                .dataset(&format!("x_scale_res{}", index))
                .unwrap()
                .read_raw()
                .unwrap();
            assert_eq!(x.len(), width);
            assert_eq!(x[1], 2.0 * (1 << index) as f64);
        }

        let res1: Vec<u16> = file.dataset("res1").unwrap().read_raw().unwrap();
        assert_eq!(res1[1], super::super::test_utils::pattern(2, 0));
        assert_eq!(res1[11], super::super::test_utils::pattern(0, 2));

        let source: VarLenUnicode = file.attr("source").unwrap().read_scalar().unwrap();
        assert_eq!(source.as_str(), "SerialEM .mdoc");
        let nm: f64 = file.attr("pixel_size_nm").unwrap().read_scalar().unwrap();
        assert_eq!(nm, 2.0);
    }
}
