//! Batch runner tests: discovery, failure isolation and the summary.

use std::sync::Arc;

use mrc_pyramid::convert::{BatchEvent, BatchRunner, MemorySink};
use mrc_pyramid::ErrorKind;
use tempfile::TempDir;

use super::test_utils::{create_montage, serialem_descriptor, test_options, MockStitcher};

#[tokio::test]
async fn test_batch_continues_after_failures() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    create_montage(root, "a.mrc", Some(&serialem_descriptor("1.5")));
    create_montage(root, "b.mrc", Some("ImageFile = b.mrc\n"));
    create_montage(root, "c.mrc", None);
    create_montage(root, "d.mrc", Some("PixelSpacing = 2.0\n"));
    create_montage(root, "e.mrc", Some("PixelSpacing = 2.0\n"));

    let stitcher = Arc::new(MockStitcher::new(40, 30).failing_on("e.mrc"));
    let sink = Arc::new(MemorySink::new());
    let runner = BatchRunner::new(stitcher.clone(), test_options(), sink.clone());

    let summary = runner.run_folder(root, true).await.unwrap();

    assert_eq!(summary.total, 5);
    assert_eq!(summary.succeeded, 2);
    let kinds: Vec<_> = summary.failures.iter().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ErrorKind::UnparsableCalibration,
            ErrorKind::MissingInput,
            ErrorKind::ExternalTool,
        ]
    );
    assert_eq!(summary.failures[0].path, root.join("b.mrc"));

    assert!(root.join("a.ome.tif").exists());
    assert!(root.join("d.ome.tif").exists());
    assert!(!root.join("b.ome.tif").exists());
    assert!(!root.join("e.ome.tif").exists());

    let finished = sink
        .events()
        .into_iter()
        .filter(|e| matches!(e, BatchEvent::FileFinished { .. }))
        .count();
    let failed = sink
        .events()
        .into_iter()
        .filter(|e| matches!(e, BatchEvent::FileFailed { .. }))
        .count();
    assert_eq!((finished, failed), (2, 3));
    assert!(matches!(
        sink.events().last(),
        Some(BatchEvent::BatchFinished {
            total: 5,
            succeeded: 2
        })
    ));
}

#[tokio::test]
async fn test_files_processed_in_sorted_order() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    for name in ["zeta.mrc", "alpha.mrc", "mid/beta.mrc"] {
        create_montage(root, name, Some("PixelSpacing = 1.0\n"));
    }

    let stitcher = Arc::new(MockStitcher::new(20, 20));
    let runner = BatchRunner::new(stitcher.clone(), test_options(), Arc::new(MemorySink::new()));
    let summary = runner.run_folder(root, true).await.unwrap();
    assert_eq!(summary.succeeded, 3);

    let extracts: Vec<String> = stitcher
        .calls()
        .await
        .into_iter()
        .filter(|c| c.starts_with("extract:"))
        .collect();
    assert_eq!(
        extracts,
        vec!["extract:alpha.mrc", "extract:beta.mrc", "extract:zeta.mrc"]
    );
    assert!(root.join("mid/beta.ome.tif").exists());
}

#[tokio::test]
async fn test_non_recursive_batch() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    create_montage(root, "top.mrc", Some("PixelSpacing = 1.0\n"));
    create_montage(root, "sub/nested.mrc", Some("PixelSpacing = 1.0\n"));

    let runner = BatchRunner::new(
        Arc::new(MockStitcher::new(20, 20)),
        test_options(),
        Arc::new(MemorySink::new()),
    );
    let summary = runner.run_folder(root, false).await.unwrap();

    assert_eq!(summary.total, 1);
    assert!(root.join("top.ome.tif").exists());
    assert!(!root.join("sub/nested.ome.tif").exists());
}

#[tokio::test]
async fn test_summary_json_lists_outputs_and_failures() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    create_montage(root, "good.mrc", Some("PixelSpacing = 1.0\n"));
    create_montage(root, "bad.mrc", None);

    let runner = BatchRunner::new(
        Arc::new(MockStitcher::new(20, 20)),
        test_options(),
        Arc::new(MemorySink::new()),
    );
    let summary = runner.run_folder(root, true).await.unwrap();

    let out = TempDir::new().unwrap();
    let json_path = out.path().join("summary.json");
    summary.write_json(&json_path).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(value["total"], 2);
    assert_eq!(value["succeeded"], 1);
    assert_eq!(value["failures"][0]["kind"], "missing_input");
    assert_eq!(value["reports"][0]["width"], 20);
    assert_eq!(value["reports"][0]["ome_tiff"]["levels"], 2);
}
