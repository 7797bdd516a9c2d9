//! OME-XML document model.
//!
//! The converter describes exactly one 2D, single-channel, single-timepoint
//! image per file. The model covers that shape and nothing more; it is
//! serialized by hand into the ImageDescription of the first TIFF page.
//!
//! # Example
//!
//! ```text
//! <OME xmlns="http://www.openmicroscopy.org/Schemas/OME/2016-06" ...>
//!   <Image ID="Image:0" Name="grid1.mrc">
//!     <Pixels ID="Pixels:0" DimensionOrder="XYCZT" Type="int16"
//!             SizeX="4000" SizeY="3000" SizeZ="1" SizeC="1" SizeT="1"
//!             PhysicalSizeX="0.0002" PhysicalSizeXUnit="µm" ...>
//!       <Channel ID="Channel:0:0" Name="channel_0" SamplesPerPixel="1"/>
//!       <TiffData IFD="0" PlaneCount="1"/>
//!     </Pixels>
//!   </Image>
//! </OME>
//! ```

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::calibration::PixelCalibration;
use crate::raster::PixelType;

/// OME schema namespace.
pub const OME_NAMESPACE: &str = "http://www.openmicroscopy.org/Schemas/OME/2016-06";

/// Unit of the physical pixel size attributes.
pub const MICROMETER_UNIT: &str = "µm";

// =============================================================================
// Model
// =============================================================================

/// One channel of a `Pixels` element.
#[derive(Debug, Clone, PartialEq)]
pub struct OmeChannel {
    pub id: String,
    pub name: String,
    pub samples_per_pixel: u32,
}

/// The `Pixels` element: dimensions, element type and calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct OmePixels {
    pub id: String,
    pub dimension_order: String,

    /// OME pixel type name (`int8`, `int16`, `uint16`, `float`)
    pub pixel_type: String,

    pub size_x: u64,
    pub size_y: u64,
    pub size_z: u32,
    pub size_c: u32,
    pub size_t: u32,

    /// Physical pixel width in [`MICROMETER_UNIT`]
    pub physical_size_x: f64,

    /// Physical pixel height in [`MICROMETER_UNIT`]
    pub physical_size_y: f64,

    pub channels: Vec<OmeChannel>,

    /// Number of planes mapped onto IFD 0
    pub plane_count: u32,
}

/// An OME `Image` element.
#[derive(Debug, Clone, PartialEq)]
pub struct OmeImage {
    pub id: String,
    pub name: String,
    pub pixels: OmePixels,
}

impl OmeImage {
    /// Describe a single-plane grayscale image of `width` x `height` pixels.
    pub fn single_plane(
        name: impl Into<String>,
        width: usize,
        height: usize,
        pixel_type: PixelType,
        calibration: PixelCalibration,
    ) -> Self {
        let size_um = calibration.micrometers();
        OmeImage {
            id: "Image:0".to_string(),
            name: name.into(),
            pixels: OmePixels {
                id: "Pixels:0".to_string(),
                dimension_order: "XYCZT".to_string(),
                pixel_type: ome_pixel_type(pixel_type).to_string(),
                size_x: width as u64,
                size_y: height as u64,
                size_z: 1,
                size_c: 1,
                size_t: 1,
                physical_size_x: size_um,
                physical_size_y: size_um,
                channels: vec![OmeChannel {
                    id: "Channel:0:0".to_string(),
                    name: "channel_0".to_string(),
                    samples_per_pixel: 1,
                }],
                plane_count: 1,
            },
        }
    }

    /// Serialize as a complete OME-XML document.
    pub fn to_xml(&self, creator: &str) -> String {
        let p = &self.pixels;
        let mut xml = String::with_capacity(1024);

        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        // write! into a String cannot fail
        let _ = writeln!(
            xml,
            "<OME xmlns=\"{ns}\" xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
             xsi:schemaLocation=\"{ns} {ns}/ome.xsd\" Creator=\"{creator}\">",
            ns = OME_NAMESPACE,
            creator = escape_attr(creator),
        );
        let _ = writeln!(
            xml,
            "  <Image ID=\"{}\" Name=\"{}\">",
            escape_attr(&self.id),
            escape_attr(&self.name)
        );
        let _ = writeln!(
            xml,
            "    <Pixels ID=\"{}\" DimensionOrder=\"{}\" Type=\"{}\" \
             SizeX=\"{}\" SizeY=\"{}\" SizeZ=\"{}\" SizeC=\"{}\" SizeT=\"{}\" \
             PhysicalSizeX=\"{:?}\" PhysicalSizeXUnit=\"{unit}\" \
             PhysicalSizeY=\"{:?}\" PhysicalSizeYUnit=\"{unit}\">",
            escape_attr(&p.id),
            p.dimension_order,
            p.pixel_type,
            p.size_x,
            p.size_y,
            p.size_z,
            p.size_c,
            p.size_t,
            p.physical_size_x,
            p.physical_size_y,
            unit = MICROMETER_UNIT,
        );
        for channel in &p.channels {
            let _ = writeln!(
                xml,
                "      <Channel ID=\"{}\" Name=\"{}\" SamplesPerPixel=\"{}\"/>",
                escape_attr(&channel.id),
                escape_attr(&channel.name),
                channel.samples_per_pixel
            );
        }
        let _ = writeln!(
            xml,
            "      <TiffData IFD=\"0\" PlaneCount=\"{}\"/>",
            p.plane_count
        );
        xml.push_str("    </Pixels>\n");
        xml.push_str("  </Image>\n");
        xml.push_str("</OME>\n");
        xml
    }
}

/// OME `Pixels/@Type` for an element type.
pub const fn ome_pixel_type(pixel_type: PixelType) -> &'static str {
    match pixel_type {
        PixelType::Int8 => "int8",
        PixelType::Int16 => "int16",
        PixelType::Uint16 => "uint16",
        PixelType::Float32 => "float",
    }
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape_attr(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// =============================================================================
// Read-back
// =============================================================================

/// Calibration-relevant fields recovered from an ImageDescription.
///
/// Only the first `Image` and `Pixels` elements are looked at. Fields that
/// are absent or do not parse are left as `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OmeMetadata {
    pub image_name: Option<String>,
    pub pixel_type: Option<String>,
    pub size_x: Option<u64>,
    pub size_y: Option<u64>,

    /// Physical pixel width, in `physical_size_unit`
    pub physical_size_x: Option<f64>,

    /// Physical pixel height, in `physical_size_unit`
    pub physical_size_y: Option<f64>,

    pub physical_size_unit: Option<String>,

    /// All attributes of the `Pixels` element
    pub pixels_attributes: HashMap<String, String>,
}

impl OmeMetadata {
    /// Extract metadata from an OME-XML ImageDescription.
    ///
    /// Returns `None` if the text has no `<OME` root.
    pub fn parse(description: &str) -> Option<Self> {
        if !description.contains("<OME") {
            return None;
        }

        let mut metadata = OmeMetadata::default();

        if let Some(attrs) = element_attributes(description, "Image") {
            metadata.image_name = attrs.get("Name").cloned();
        }

        if let Some(attrs) = element_attributes(description, "Pixels") {
            metadata.pixel_type = attrs.get("Type").cloned();
            metadata.size_x = attrs.get("SizeX").and_then(|v| v.parse().ok());
            metadata.size_y = attrs.get("SizeY").and_then(|v| v.parse().ok());
            metadata.physical_size_x = attrs.get("PhysicalSizeX").and_then(|v| v.parse().ok());
            metadata.physical_size_y = attrs.get("PhysicalSizeY").and_then(|v| v.parse().ok());
            // The schema default unit is µm
            metadata.physical_size_unit = Some(
                attrs
                    .get("PhysicalSizeXUnit")
                    .cloned()
                    .unwrap_or_else(|| MICROMETER_UNIT.to_string()),
            );
            metadata.pixels_attributes = attrs;
        }

        Some(metadata)
    }
}

/// Attributes of the first `<name ...>` start tag in `xml`.
fn element_attributes(xml: &str, name: &str) -> Option<HashMap<String, String>> {
    let open = format!("<{}", name);
    let mut search = 0;
    let start = loop {
        let found = search + xml[search..].find(&open)?;
        let after = xml[found + open.len()..].chars().next()?;
        if after.is_whitespace() || after == '>' || after == '/' {
            break found + open.len();
        }
        search = found + open.len();
    };
    let end = start + xml[start..].find('>')?;
    let tag = xml[start..end].trim_end_matches('/');

    let mut attributes = HashMap::new();
    let mut rest = tag;
    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim();
        let after_eq = rest[eq + 1..].trim_start();
        let quote = after_eq.chars().next()?;
        if quote != '"' && quote != '\'' {
            break;
        }
        let value_end = after_eq[1..].find(quote)?;
        attributes.insert(key.to_string(), unescape_attr(&after_eq[1..1 + value_end]));
        rest = &after_eq[value_end + 2..];
    }
    Some(attributes)
}
