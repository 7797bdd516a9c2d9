//! Output containers.
//!
//! A [`crate::pyramid::Pyramid`] is serialized into one of two containers:
//!
//! - **OME-TIFF** ([`ome`]): one tiled BigTIFF whose first page holds level 0
//!   plus OME-XML calibration, with the reduced levels as SubIFDs
//! - **HDF5/BDV** ([`bdv`]): three stride-subsampled datasets with calibrated
//!   dimension scales, plus a BigDataViewer XML descriptor
//!
//! [`tiff`] holds the BigTIFF writer and the parser used to read files back.

pub mod bdv;
pub mod ome;
pub mod tiff;
