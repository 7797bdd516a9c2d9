//! HDF5 container with three stride-subsampled levels.
//!
//! # Layout
//!
//! ```text
//! /res0, /res1, /res2             image data (rows = y, columns = x), chunked
//! /x_scale_res{i}, /y_scale_res{i} coordinate axes in nm, index * nm * 2^i
//! attributes on /                  source, pixel_size_nm, pixel_size_um, unit
//! ```
//!
//! Each coordinate dataset is a dimension scale (`CLASS`, `NAME`) attached to
//! its image axis the way `H5DSattach_scale` does it: the image dataset holds
//! one object reference per axis in `DIMENSION_LIST` and each scale lists the
//! datasets it is attached to in `REFERENCE_LIST`. Axis names go in
//! `DIMENSION_LABELS`.

use std::path::Path;
use std::str::FromStr;

use hdf5::types::{FixedAscii, VarLenArray, VarLenUnicode};
use hdf5::{Dataset, File, H5Type, Location, ObjectReference1};
use ndarray::{ArrayView1, ArrayView2};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::calibration::PixelCalibration;
use crate::error::WriteError;
use crate::format::ome::{persist, temp_file_for};
use crate::raster::{with_plane, Plane, RasterImage, Sample};

use super::{H5Compression, H5Options, BDV_STRIDES, DATA_SOURCE, SCALE_UNIT};

/// One `REFERENCE_LIST` entry: a dataset this scale is attached to.
#[derive(H5Type, Debug, Clone, Copy)]
#[repr(C)]
struct AttachedDataset {
    dataset: ObjectReference1,
    dimension: i32,
}

/// Write the three-level HDF5 pyramid of `image` to `path`, atomically.
///
/// Returns the `(width, height)` of each level.
pub fn write_hdf5_pyramid(
    image: &RasterImage,
    calibration: PixelCalibration,
    path: &Path,
    options: &H5Options,
) -> Result<Vec<(usize, usize)>, WriteError> {
    let (temp, dimensions) = stage_hdf5_pyramid(image, calibration, path, options)?;
    persist(temp, path)?;
    Ok(dimensions)
}

/// Write the pyramid into a temporary file next to `path` without
/// publishing it.
pub(crate) fn stage_hdf5_pyramid(
    image: &RasterImage,
    calibration: PixelCalibration,
    path: &Path,
    options: &H5Options,
) -> Result<(NamedTempFile, Vec<(usize, usize)>), WriteError> {
    let temp = temp_file_for(path)?;

    let file = File::create(temp.path())?;
    let dimensions = write_contents(&file, image, calibration, options)?;
    file.close()?;

    info!(
        file = %path.display(),
        levels = dimensions.len(),
        pixel_size_nm = calibration.nanometers(),
        "HDF5 pyramid written"
    );
    Ok((temp, dimensions))
}

fn write_contents(
    file: &File,
    image: &RasterImage,
    calibration: PixelCalibration,
    options: &H5Options,
) -> Result<Vec<(usize, usize)>, WriteError> {
    let pixel_size_nm = calibration.nanometers();
    let pixel_size_um = pixel_size_nm / 1000.0;

    let mut dimensions = Vec::with_capacity(BDV_STRIDES.len());
    for (index, &stride) in BDV_STRIDES.iter().enumerate() {
        let level = if stride == 1 {
            None
        } else {
            Some(image.subsample(stride))
        };
        let level = level.as_ref().unwrap_or(image);
        let name = format!("res{}", index);

        let dataset = with_plane!(level, plane => write_level(file, &name, plane, options))?;

        let step = pixel_size_nm * (1u64 << index) as f64;
        let x_name = format!("x_scale_res{}", index);
        let y_name = format!("y_scale_res{}", index);
        let x_scale = write_scale(file, &x_name, "x", level.width(), step)?;
        let y_scale = write_scale(file, &y_name, "y", level.height(), step)?;

        write_str_array(&dataset, "DIMENSION_LABELS", &["y", "x"])?;
        attach_scales(
            file,
            &name,
            &dataset,
            [(y_name.as_str(), &y_scale), (x_name.as_str(), &x_scale)],
        )?;

        debug!(
            dataset = %name,
            width = level.width(),
            height = level.height(),
            step_nm = step,
            "Wrote HDF5 level"
        );
        dimensions.push(level.dimensions());
    }

    write_str_attr(file, "source", DATA_SOURCE)?;
    write_f64_attr(file, "pixel_size_nm", pixel_size_nm)?;
    write_f64_attr(file, "pixel_size_um", pixel_size_um)?;
    write_str_attr(file, "unit", SCALE_UNIT)?;

    Ok(dimensions)
}

fn write_level<T: Sample + H5Type>(
    file: &File,
    name: &str,
    plane: &Plane<T>,
    options: &H5Options,
) -> Result<Dataset, WriteError> {
    let shape = (plane.height(), plane.width());

    let max_chunk = options.chunk_size.max(1);
    let chunk = (shape.0.clamp(1, max_chunk), shape.1.clamp(1, max_chunk));

    let mut builder = file.new_dataset::<T>().shape(shape).chunk(chunk);
    if let H5Compression::Gzip { level } = options.compression {
        builder = builder.deflate(level);
    }
    let dataset = builder.create(name)?;

    let view = ArrayView2::from_shape(shape, plane.data())
        .map_err(|e| WriteError::Hdf5(format!("{}: {}", name, e)))?;
    dataset.write(view)?;
    Ok(dataset)
}

/// Coordinate axis `index * step` tagged as a dimension scale.
fn write_scale(
    file: &File,
    name: &str,
    axis: &str,
    len: usize,
    step: f64,
) -> Result<Dataset, WriteError> {
    let values: Vec<f64> = (0..len).map(|i| i as f64 * step).collect();
    let dataset = file.new_dataset::<f64>().shape((len,)).create(name)?;
    dataset.write(ArrayView1::from(values.as_slice()))?;

    let class = FixedAscii::<16>::from_ascii(b"DIMENSION_SCALE")
        .map_err(|e| WriteError::Hdf5(e.to_string()))?;
    dataset
        .new_attr::<FixedAscii<16>>()
        .create("CLASS")?
        .write_scalar(&class)?;
    write_str_attr(&dataset, "NAME", axis)?;
    write_str_attr(&dataset, "units", SCALE_UNIT)?;
    write_str_attr(&dataset, "name", axis)?;
    Ok(dataset)
}

/// Attach `scales[axis]` to axis `axis` (0 = y, 1 = x) of the image dataset
/// `image_name`.
fn attach_scales(
    file: &File,
    image_name: &str,
    image: &Dataset,
    scales: [(&str, &Dataset); 2],
) -> Result<(), WriteError> {
    let image_ref: ObjectReference1 = file.reference(image_name)?;

    let mut dimension_list = Vec::with_capacity(scales.len());
    for (axis, (scale_name, scale)) in scales.into_iter().enumerate() {
        let scale_ref: ObjectReference1 = file.reference(scale_name)?;
        dimension_list.push(VarLenArray::from_slice(&[scale_ref]));

        let entry = AttachedDataset {
            dataset: image_ref,
            dimension: axis as i32,
        };
        scale
            .new_attr::<AttachedDataset>()
            .shape((1,))
            .create("REFERENCE_LIST")?
            .write(ArrayView1::from(&[entry][..]))?;
    }

    image
        .new_attr::<VarLenArray<ObjectReference1>>()
        .shape((dimension_list.len(),))
        .create("DIMENSION_LIST")?
        .write(ArrayView1::from(dimension_list.as_slice()))?;
    Ok(())
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode, WriteError> {
    VarLenUnicode::from_str(value).map_err(|e| WriteError::Hdf5(e.to_string()))
}

fn write_str_attr(location: &Location, name: &str, value: &str) -> Result<(), WriteError> {
    let value = to_var_len_unicode(value)?;
    location
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn write_f64_attr(location: &Location, name: &str, value: f64) -> Result<(), WriteError> {
    location
        .new_attr::<f64>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn write_str_array(location: &Location, name: &str, values: &[&str]) -> Result<(), WriteError> {
    let values = values
        .iter()
        .map(|v| to_var_len_unicode(v))
        .collect::<Result<Vec<_>, _>>()?;
    let attr = location
        .new_attr::<VarLenUnicode>()
        .shape((values.len(),))
        .create(name)?;
    attr.write(ArrayView1::from(values.as_slice()))?;
    Ok(())
}
