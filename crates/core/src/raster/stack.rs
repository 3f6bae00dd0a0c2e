//! Multi-band predictor grid

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};
use ndarray::{Array2, Array3, ArrayView1, ArrayView2, Axis};

/// Stack of predictor bands aligned on one grid.
///
/// Bands are stored as `(band, row, col)`. A cell is valid only when every
/// band holds a finite value that is not the source no-data value; invalid
/// cells are excluded from training and from every output surface.
#[derive(Debug, Clone)]
pub struct FeatureGrid {
    bands: Array3<f64>,
    valid: Array2<bool>,
    transform: GeoTransform,
    crs: Option<CRS>,
}

impl FeatureGrid {
    /// Build from raw band values, masking `nodata` and non-finite cells.
    pub fn from_bands(bands: Array3<f64>, nodata: Option<f64>) -> Result<Self> {
        let (n_bands, rows, cols) = bands.dim();
        if n_bands == 0 {
            return Err(Error::InvalidInput("Feature grid needs at least one band".into()));
        }
        let mut valid = Array2::from_elem((rows, cols), true);
        for band in bands.axis_iter(Axis(0)) {
            ndarray::Zip::from(&mut valid).and(&band).for_each(|ok, &v| {
                let is_nodata = nodata.is_some_and(|nd| v == nd);
                if !v.is_finite() || is_nodata {
                    *ok = false;
                }
            });
        }
        Self::from_parts(bands, valid)
    }

    /// Build from band values and an explicit cell mask
    pub fn from_parts(mut bands: Array3<f64>, valid: Array2<bool>) -> Result<Self> {
        let (_, rows, cols) = bands.dim();
        if valid.dim() != (rows, cols) {
            let (ar, ac) = valid.dim();
            return Err(Error::SizeMismatch { er: rows, ec: cols, ar, ac });
        }
        for mut band in bands.axis_iter_mut(Axis(0)) {
            ndarray::Zip::from(&mut band).and(&valid).for_each(|v, &ok| {
                if !ok {
                    *v = f64::NAN;
                }
            });
        }
        Ok(Self {
            bands,
            valid,
            transform: GeoTransform::default(),
            crs: None,
        })
    }

    /// Builder: attach a geotransform
    pub fn with_transform(mut self, transform: GeoTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Builder: attach a CRS
    pub fn with_crs(mut self, crs: Option<CRS>) -> Self {
        self.crs = crs;
        self
    }

    /// Number of predictor bands
    pub fn n_bands(&self) -> usize {
        self.bands.len_of(Axis(0))
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.bands.len_of(Axis(1))
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.bands.len_of(Axis(2))
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    /// Band values (NaN in invalid cells)
    pub fn band(&self, index: usize) -> ArrayView2<'_, f64> {
        self.bands.index_axis(Axis(0), index)
    }

    /// Predictor vector of one cell across all bands
    pub fn cell(&self, row: usize, col: usize) -> ArrayView1<'_, f64> {
        self.bands.slice(ndarray::s![.., row, col])
    }

    /// Validity mask shared by all bands
    pub fn validity(&self) -> ArrayView2<'_, bool> {
        self.valid.view()
    }

    /// Whether (row, col) is valid in every band
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.valid.get((row, col)).copied().unwrap_or(false)
    }

    /// Row-major list of valid cell indices
    pub fn valid_cells(&self) -> Vec<(usize, usize)> {
        self.valid
            .indexed_iter()
            .filter(|(_, ok)| **ok)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Get the CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Cell nearest to (x, y), snapping to the border outside the extent
    pub fn nearest_cell(&self, x: f64, y: f64) -> (usize, usize) {
        self.transform.nearest_cell(x, y, self.rows(), self.cols())
    }

    /// X coordinates of the column centres
    pub fn x_axis(&self) -> Vec<f64> {
        self.transform.x_axis(self.cols())
    }

    /// Y coordinates of the row centres
    pub fn y_axis(&self) -> Vec<f64> {
        self.transform.y_axis(self.rows())
    }

    /// Build a single-band raster on this grid's georeference.
    ///
    /// Cells outside this grid's validity mask are invalidated.
    pub fn surface(&self, values: Array2<f64>) -> Result<Raster> {
        Ok(Raster::from_parts(values, self.valid.clone())?
            .with_transform(self.transform)
            .with_crs(self.crs.clone()))
    }
}
