//! BigDataViewer SpimData descriptor.
//!
//! BigDataViewer opens an HDF5 dataset through an XML file that names the
//! container and declares one view setup per channel. The calibration is
//! recorded twice: as the voxel size of the setup and as the diagonal of the
//! view registration, since some readers only apply the registration.

use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::WriteError;
use crate::format::ome::{persist, temp_file_for};

/// Voxel size unit written to the descriptor.
pub const BDV_UNIT: &str = "μm";

/// Parameters of a single-setup, single-timepoint descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct BdvDescriptor {
    /// HDF5 file name, relative to the descriptor
    pub h5_file_name: String,

    pub width: usize,
    pub height: usize,

    /// Isotropic voxel size in micrometers
    pub voxel_size_um: f64,
}

impl BdvDescriptor {
    /// Row-major 3x4 affine: voxel size on the diagonal, no translation.
    pub fn affine(&self) -> [f64; 12] {
        let s = self.voxel_size_um;
        [s, 0.0, 0.0, 0.0, 0.0, s, 0.0, 0.0, 0.0, 0.0, s, 0.0]
    }

    /// Render the SpimData document.
    pub fn to_xml(&self) -> String {
        let s = self.voxel_size_um;
        let affine = self
            .affine()
            .iter()
            .map(|v| format!("{:?}", v))
            .collect::<Vec<_>>()
            .join(" ");

        let mut xml = String::with_capacity(1536);
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<SpimData version=\"0.2\">\n");
        xml.push_str("  <BasePath type=\"relative\">.</BasePath>\n");
        xml.push_str("  <SequenceDescription>\n");
        xml.push_str("    <ImageLoader format=\"bdv.hdf5\">\n");
        // write! into a String cannot fail
        let _ = writeln!(
            xml,
            "      <hdf5 type=\"relative\">{}</hdf5>",
            escape_text(&self.h5_file_name)
        );
        xml.push_str("    </ImageLoader>\n");
        xml.push_str("    <ViewSetups>\n");
        xml.push_str("      <ViewSetup>\n");
        xml.push_str("        <id>0</id>\n");
        xml.push_str("        <name>channel 1</name>\n");
        let _ = writeln!(xml, "        <size>{} {} 1</size>", self.width, self.height);
        xml.push_str("        <voxelSize>\n");
        let _ = writeln!(xml, "          <unit>{}</unit>", BDV_UNIT);
        let _ = writeln!(xml, "          <size>{:?} {:?} {:?}</size>", s, s, s);
        xml.push_str("        </voxelSize>\n");
        xml.push_str("        <attributes>\n");
        xml.push_str("          <channel>1</channel>\n");
        xml.push_str("        </attributes>\n");
        xml.push_str("      </ViewSetup>\n");
        xml.push_str("      <Attributes name=\"channel\">\n");
        xml.push_str("        <Channel>\n");
        xml.push_str("          <id>1</id>\n");
        xml.push_str("          <name>1</name>\n");
        xml.push_str("        </Channel>\n");
        xml.push_str("      </Attributes>\n");
        xml.push_str("    </ViewSetups>\n");
        xml.push_str("    <Timepoints type=\"range\">\n");
        xml.push_str("      <first>0</first>\n");
        xml.push_str("      <last>0</last>\n");
        xml.push_str("    </Timepoints>\n");
        xml.push_str("  </SequenceDescription>\n");
        xml.push_str("  <ViewRegistrations>\n");
        xml.push_str("    <ViewRegistration timepoint=\"0\" setup=\"0\">\n");
        xml.push_str("      <ViewTransform type=\"affine\">\n");
        let _ = writeln!(xml, "        <affine>{}</affine>", affine);
        xml.push_str("      </ViewTransform>\n");
        xml.push_str("    </ViewRegistration>\n");
        xml.push_str("  </ViewRegistrations>\n");
        xml.push_str("</SpimData>\n");
        xml
    }
}

/// Write the descriptor to `path`, atomically.
pub fn write_bdv_xml(descriptor: &BdvDescriptor, path: &Path) -> Result<(), WriteError> {
    let temp = stage_bdv_xml(descriptor, path)?;
    persist(temp, path)?;
    Ok(())
}

/// Write the descriptor into a temporary file next to `path`.
pub(crate) fn stage_bdv_xml(
    descriptor: &BdvDescriptor,
    path: &Path,
) -> Result<NamedTempFile, WriteError> {
    let identifier = path.display().to_string();
    let mut temp = temp_file_for(path)?;
    temp.write_all(descriptor.to_xml().as_bytes())
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| WriteError::io(identifier.clone(), e))?;

    debug!(file = %identifier, h5 = %descriptor.h5_file_name, "Wrote BDV descriptor");
    Ok(temp)
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn descriptor() -> BdvDescriptor {
        BdvDescriptor {
            h5_file_name: "grid1.h5".to_string(),
            width: 40001,
            height: 30001,
            voxel_size_um: 0.0002,
        }
    }

    #[test]
    fn test_descriptor_fields() {
        let xml = descriptor().to_xml();
        assert!(xml.contains("<SpimData version=\"0.2\">"));
        assert!(xml.contains("<ImageLoader format=\"bdv.hdf5\">"));
        assert!(xml.contains("<hdf5 type=\"relative\">grid1.h5</hdf5>"));
        assert!(xml.contains("<size>40001 30001 1</size>"));
        assert!(xml.contains("<unit>μm</unit>"));
        assert!(xml.contains("<size>0.0002 0.0002 0.0002</size>"));
        assert!(xml.contains("<channel>1</channel>"));
        assert!(xml.contains("<first>0</first>"));
        assert!(xml.contains("<last>0</last>"));
        assert!(xml.contains("<ViewRegistration timepoint=\"0\" setup=\"0\">"));
    }

    #[test]
    fn test_affine_diagonal() {
        let xml = descriptor().to_xml();
        assert!(xml.contains(
            "<affine>0.0002 0.0 0.0 0.0 0.0 0.0002 0.0 0.0 0.0 0.0 0.0002 0.0</affine>"
        ));
        let affine = descriptor().affine();
        assert_eq!([affine[0], affine[5], affine[10]], [0.0002; 3]);
        assert_eq!(affine.iter().filter(|v| **v == 0.0).count(), 9);
    }

    #[test]
    fn test_file_name_is_escaped() {
        let mut descriptor = descriptor();
        descriptor.h5_file_name = "a&b.h5".to_string();
        assert!(descriptor.to_xml().contains(">a&amp;b.h5<"));
    }

    #[test]
    fn test_write_descriptor() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("grid1.xml");
        write_bdv_xml(&descriptor(), &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, descriptor().to_xml());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
