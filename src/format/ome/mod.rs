//! OME-TIFF output.
//!
//! - [`xml`]: OME-XML model, serializer and read-back of the calibration fields
//! - [`writer`]: pyramid emitter built on [`crate::format::tiff::TiffWriter`]
//! - [`inspect`]: read-back report of a written file

mod inspect;
mod writer;
mod xml;

pub use inspect::{inspect_ome_tiff, InspectReport, LevelSummary};
pub use writer::{write_ome_tiff, OmeTiffOptions, OmeTiffReport, DEFAULT_TILE_SIZE, SOFTWARE};
pub use xml::{ome_pixel_type, OmeChannel, OmeImage, OmeMetadata, OmePixels, MICROMETER_UNIT, OME_NAMESPACE};

pub(crate) use writer::{persist, temp_file_for};
