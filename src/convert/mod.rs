//! Batch conversion of montages.
//!
//! - [`discover`] finds the inputs and names the outputs
//! - [`stitcher`] is the boundary to the external stitching tools
//! - [`pipeline`] converts one file
//! - [`batch`] converts a folder and collects the summary
//! - [`sink`] carries progress events out of the orchestrator

pub mod batch;
pub mod discover;
pub mod pipeline;
pub mod sink;
pub mod stitcher;

pub use batch::{BatchRunner, BatchSummary, FileFailure};
pub use discover::{
    discover_inputs, is_montage, OutputPaths, BLENDED_SUFFIX, DESCRIPTOR_EXTENSION,
    MONTAGE_EXTENSION,
};
pub use pipeline::{
    convert_file, read_calibration, read_raster, ConvertOptions, FileReport,
    DEFAULT_LARGE_THRESHOLD, DEFAULT_REDUCTION_TARGET,
};
pub use sink::{BatchEvent, EventSink, MemorySink, Stage, TracingSink};
pub use stitcher::{
    is_intermediate, remove_intermediates, ImodStitcher, StitcherClient, DEFAULT_BLENDMONT,
    DEFAULT_EXTRACTPIECES, EDGES_ROOT, LAYOUT_ARTIFACT,
};
