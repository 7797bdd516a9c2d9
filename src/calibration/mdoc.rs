//! Pixel spacing lookup in SerialEM `.mdoc` descriptors.
//!
//! A descriptor is a plain `key = value` text file. The acquisition software
//! writes `PixelSpacing = <angstrom>` once in the header and again per
//! section; only the first occurrence is used.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::CalibrationError;

/// Key carrying the pixel size in angstrom.
pub const PIXEL_SPACING_KEY: &str = "PixelSpacing";

/// Separator between key and value on a descriptor line.
const KEY_VALUE_SEPARATOR: &str = " = ";

/// Read the pixel spacing (angstrom) from a descriptor file.
pub fn read_pixel_spacing(path: &Path) -> Result<f64, CalibrationError> {
    read_descriptor_value(path, PIXEL_SPACING_KEY)
}

/// Read the first numeric value stored under `key` in a descriptor file.
///
/// A missing file is reported as [`CalibrationError::MissingFile`], never as a
/// parse failure.
pub fn read_descriptor_value(path: &Path, key: &str) -> Result<f64, CalibrationError> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CalibrationError::MissingFile(path.to_path_buf())
        } else {
            CalibrationError::Unreadable {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        }
    })?;

    let reader = BufReader::new(file);
    for line in reader.split(b'\n') {
        let line = line.map_err(|e| CalibrationError::Unreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let line = String::from_utf8_lossy(&line);

        match parse_line(&line, key) {
            Some(Ok(value)) => return Ok(value),
            Some(Err(raw)) => {
                return Err(CalibrationError::Unparsable {
                    path: path.to_path_buf(),
                    value: raw,
                })
            }
            None => continue,
        }
    }

    Err(CalibrationError::KeyNotFound {
        path: path.to_path_buf(),
        key: key.to_string(),
    })
}

/// Interpret one descriptor line.
///
/// Returns `None` when the line does not carry `key` as a `key = value` pair,
/// `Some(Err(raw))` when it does but the value is not a usable spacing.
pub fn parse_line(line: &str, key: &str) -> Option<Result<f64, String>> {
    if !line.contains(key) {
        return None;
    }

    let parts: Vec<&str> = line.trim().split(KEY_VALUE_SEPARATOR).collect();
    if parts.len() != 2 {
        return None;
    }

    let raw = parts[1].trim();
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => Some(Ok(value)),
        _ => Some(Err(raw.to_string())),
    }
}
