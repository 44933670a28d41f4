use crate::error::GammaError;
use crate::grid::DoseGrid;

use dicom::{
    core::Tag,
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use log::debug;
use ndarray::s;
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GridLoaderError {
    #[error("No dose samples found")]
    Empty,

    #[error("Unsupported text grid dimensionality {0}, expected 1 or 2")]
    UnsupportedDimensionality(usize),

    #[error("Invalid number {value:?} on line {line}")]
    InvalidNumber { line: usize, value: String },

    #[error("Inconsistent row length on line {line}: expected {expected}, found {found}")]
    InconsistentRows {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Missing DICOM attribute {0}")]
    MissingAttribute(&'static str),

    #[error("Pixel data error: {0}")]
    PixelData(#[from] dicom::pixeldata::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

pub struct GridLoader;

impl GridLoader {
    /// Load a 1D or 2D dose grid from a plain text file.
    ///
    /// # Arguments
    ///
    /// * `path` - Text file, one value per line (1D) or whitespace separated
    ///   rows (2D)
    /// * `dims` - 1 or 2
    /// * `spacing` - Physical voxel size per axis, axis 0 first
    pub fn load_text(
        path: impl AsRef<Path>,
        dims: usize,
        spacing: Vec<f32>,
    ) -> Result<DoseGrid, GammaError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(GridLoaderError::from)?;
        let grid = Self::parse_text(&contents, dims, spacing)?;
        debug!(
            "GridLoader::load_text {} shape={:?}",
            path.as_ref().display(),
            grid.shape()
        );
        Ok(grid)
    }

    /// Parse text dose values. Blank lines are skipped.
    ///
    /// A 2D grid takes its column count from the first row; columns run
    /// along axis 0 and rows along axis 1.
    pub fn parse_text(contents: &str, dims: usize, spacing: Vec<f32>) -> Result<DoseGrid, GammaError> {
        if !(1..=2).contains(&dims) {
            return Err(GridLoaderError::UnsupportedDimensionality(dims).into());
        }

        let mut samples = Vec::new();
        let mut columns = None;
        let mut rows = 0;

        for (number, line) in contents.lines().enumerate() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            let expected = match dims {
                1 => 1,
                _ => *columns.get_or_insert(tokens.len()),
            };
            if tokens.len() != expected {
                return Err(GridLoaderError::InconsistentRows {
                    line: number + 1,
                    expected,
                    found: tokens.len(),
                }
                .into());
            }
            for token in tokens {
                let value = token
                    .parse::<f32>()
                    .map_err(|_| GridLoaderError::InvalidNumber {
                        line: number + 1,
                        value: token.to_string(),
                    })?;
                samples.push(value);
            }
            rows += 1;
        }

        if samples.is_empty() {
            return Err(GridLoaderError::Empty.into());
        }

        let shape = match columns {
            Some(columns) => vec![columns, rows],
            None => vec![rows],
        };
        DoseGrid::new(samples, shape, spacing)
    }

    /// Load an RT Dose file.
    pub fn load_dicom(path: impl AsRef<Path>) -> Result<DoseGrid, GammaError> {
        let dicom_object = open_file(path.as_ref()).map_err(GridLoaderError::from)?;
        let grid = Self::load_from_dicom_object(&dicom_object)?;
        debug!(
            "GridLoader::load_dicom {} shape={:?} spacing={:?}",
            path.as_ref().display(),
            grid.shape(),
            grid.spacing()
        );
        Ok(grid)
    }

    /// Build a dose grid from an RT Dose object.
    ///
    /// Stored pixel values are multiplied by DoseGridScaling. Axis 0 runs
    /// along columns, axis 1 along rows and axis 2 along frames; a single
    /// frame yields a 2D grid.
    ///
    /// # Errors
    ///
    /// Returns error if a required attribute is missing or the pixel data
    /// cannot be decoded
    pub fn load_from_dicom_object(
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<DoseGrid, GammaError> {
        let (column_spacing, row_spacing) = Self::get_pixel_spacing(dicom_object)
            .ok_or(GridLoaderError::MissingAttribute("PixelSpacing"))?;
        // stored values are meaningless as dose without the scale factor
        let scaling = Self::read_float(dicom_object, tags::DOSE_GRID_SCALING)
            .ok_or(GridLoaderError::MissingAttribute("DoseGridScaling"))?;

        let pixel_data = dicom_object
            .decode_pixel_data()
            .map_err(GridLoaderError::from)?;
        let options = ConvertOptions::new()
            .with_modality_lut(ModalityLutOption::None)
            .with_voi_lut(VoiLutOption::Identity);
        // (frames, rows, columns, samples per pixel)
        let raw = pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .map_err(GridLoaderError::from)?
            .slice_move(s![.., .., .., 0]);
        let (frames, rows, columns) = raw.dim();

        // logical iteration order puts columns fastest, matching axis 0
        let samples: Vec<f32> = raw.iter().map(|&value| value * scaling).collect();

        let (shape, spacing) = if frames > 1 {
            let frame_spacing = Self::get_frame_spacing(dicom_object)
                .ok_or(GridLoaderError::MissingAttribute("SliceThickness"))?;
            (
                vec![columns, rows, frames],
                vec![column_spacing, row_spacing, frame_spacing],
            )
        } else {
            (vec![columns, rows], vec![column_spacing, row_spacing])
        };

        DoseGrid::new(samples, shape, spacing)
    }

    fn read_float(dicom_object: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<f32> {
        dicom_object.element(tag).ok()?.to_float32().ok()
    }

    /// PixelSpacing holds (row spacing, column spacing); returned as
    /// (column, row) to match axis order.
    fn get_pixel_spacing(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<(f32, f32)> {
        let pixel_spacing = dicom_object
            .element(tags::PIXEL_SPACING)
            .ok()?
            .to_multi_float32()
            .ok()?;
        match pixel_spacing.as_slice() {
            [row, column, ..] => Some((*column, *row)),
            _ => None,
        }
    }

    fn get_frame_spacing(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<f32> {
        Self::read_float(dicom_object, tags::SLICE_THICKNESS)
            .filter(|thickness| *thickness > 0.0)
            .or_else(|| {
                let offsets = dicom_object
                    .element(tags::GRID_FRAME_OFFSET_VECTOR)
                    .ok()?
                    .to_multi_float32()
                    .ok()?;
                match offsets.as_slice() {
                    [first, second, ..] => Some((second - first).abs()),
                    _ => None,
                }
            })
    }
}
