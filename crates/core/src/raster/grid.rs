//! Single-band raster with a validity mask

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::GeoTransform;
use ndarray::{Array2, ArrayView2, Zip};

/// A georeferenced 2D grid of `f64` values.
///
/// Every cell carries a validity flag. Invalid cells have no value; their
/// storage holds NaN but callers must go through the mask, not the number.
///
/// # Example
///
/// ```ignore
/// use metgrid_core::Raster;
///
/// let mut raster = Raster::new(100, 100);
/// raster.set(10, 20, 42.0)?;
/// assert_eq!(raster.get(10, 20)?, Some(42.0));
/// raster.set_invalid(10, 20)?;
/// assert_eq!(raster.get(10, 20)?, None);
/// ```
#[derive(Debug, Clone)]
pub struct Raster {
    /// Cell values in row-major order (row, col)
    data: Array2<f64>,
    /// `true` where the cell holds a usable value
    valid: Array2<bool>,
    /// Affine transformation
    transform: GeoTransform,
    /// Coordinate reference system
    crs: Option<CRS>,
}

impl Raster {
    /// Create a new raster filled with zeros, every cell valid
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            data: Array2::zeros((rows, cols)),
            valid: Array2::from_elem((rows, cols), true),
            transform: GeoTransform::default(),
            crs: None,
        }
    }

    /// Create a raster where every cell is invalid
    pub fn empty(rows: usize, cols: usize) -> Self {
        Self {
            data: Array2::from_elem((rows, cols), f64::NAN),
            valid: Array2::from_elem((rows, cols), false),
            transform: GeoTransform::default(),
            crs: None,
        }
    }

    /// Create a raster from values; non-finite cells become invalid.
    pub fn from_array(data: Array2<f64>) -> Self {
        let valid = data.mapv(f64::is_finite);
        Self {
            data,
            valid,
            transform: GeoTransform::default(),
            crs: None,
        }
    }

    /// Create a raster from values and an explicit mask.
    ///
    /// Cells flagged valid but holding a non-finite value are marked invalid.
    pub fn from_parts(mut data: Array2<f64>, valid: Array2<bool>) -> Result<Self> {
        if data.dim() != valid.dim() {
            let (er, ec) = data.dim();
            let (ar, ac) = valid.dim();
            return Err(Error::SizeMismatch { er, ec, ar, ac });
        }
        let mut valid = valid;
        Zip::from(&mut data).and(&mut valid).for_each(|v, ok| {
            if !*ok || !v.is_finite() {
                *ok = false;
                *v = f64::NAN;
            }
        });
        Ok(Self {
            data,
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

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster has no cells
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of valid cells
    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }

    // Data access

    fn check_bounds(&self, row: usize, col: usize) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        Ok(())
    }

    /// Value at (row, col), `None` when the cell is invalid
    pub fn get(&self, row: usize, col: usize) -> Result<Option<f64>> {
        self.check_bounds(row, col)?;
        Ok(self.valid[(row, col)].then(|| self.data[(row, col)]))
    }

    /// Set value at (row, col). Non-finite values invalidate the cell.
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        self.check_bounds(row, col)?;
        if value.is_finite() {
            self.data[(row, col)] = value;
            self.valid[(row, col)] = true;
        } else {
            self.data[(row, col)] = f64::NAN;
            self.valid[(row, col)] = false;
        }
        Ok(())
    }

    /// Mark (row, col) as invalid
    pub fn set_invalid(&mut self, row: usize, col: usize) -> Result<()> {
        self.check_bounds(row, col)?;
        self.data[(row, col)] = f64::NAN;
        self.valid[(row, col)] = false;
        Ok(())
    }

    /// Whether (row, col) holds a value
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.valid.get((row, col)).copied().unwrap_or(false)
    }

    /// View of the raw values (NaN in invalid cells)
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// View of the validity mask
    pub fn validity(&self) -> ArrayView2<'_, bool> {
        self.valid.view()
    }

    /// Values with invalid cells replaced by `fill`
    pub fn filled(&self, fill: f64) -> Array2<f64> {
        let mut out = self.data.clone();
        Zip::from(&mut out).and(&self.valid).for_each(|v, &ok| {
            if !ok {
                *v = fill;
            }
        });
        out
    }

    /// Invalidate every cell where `mask` is false
    pub fn restrict_to(&mut self, mask: ArrayView2<'_, bool>) -> Result<()> {
        if mask.dim() != self.shape() {
            let (er, ec) = self.shape();
            let (ar, ac) = mask.dim();
            return Err(Error::SizeMismatch { er, ec, ar, ac });
        }
        Zip::from(&mut self.data)
            .and(&mut self.valid)
            .and(&mask)
            .for_each(|v, ok, &keep| {
                if !keep {
                    *ok = false;
                    *v = f64::NAN;
                }
            });
        Ok(())
    }

    /// Clamp every valid value into `[min, max]`
    pub fn clamp(&mut self, min: f64, max: f64) {
        Zip::from(&mut self.data).and(&self.valid).for_each(|v, &ok| {
            if ok {
                *v = v.clamp(min, max);
            }
        });
    }

    /// Cell-wise sum with another raster; a cell stays valid only when both are.
    pub fn add(&mut self, other: &Raster) -> Result<()> {
        if other.shape() != self.shape() {
            let (er, ec) = self.shape();
            let (ar, ac) = other.shape();
            return Err(Error::SizeMismatch { er, ec, ar, ac });
        }
        Zip::from(&mut self.data)
            .and(&mut self.valid)
            .and(&other.data)
            .and(&other.valid)
            .for_each(|v, ok, &w, &other_ok| {
                if *ok && other_ok {
                    *v += w;
                } else {
                    *ok = false;
                    *v = f64::NAN;
                }
            });
        Ok(())
    }

    // Metadata

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Get the CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Set the CRS
    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Cell size (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Projected bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    // Sampling

    /// Cell nearest to (x, y), snapping to the border outside the extent
    pub fn nearest_cell(&self, x: f64, y: f64) -> (usize, usize) {
        self.transform.nearest_cell(x, y, self.rows(), self.cols())
    }

    /// Value of the cell nearest to (x, y), `None` when that cell is invalid
    pub fn sample(&self, x: f64, y: f64) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let (row, col) = self.nearest_cell(x, y);
        self.valid[(row, col)].then(|| self.data[(row, col)])
    }

    // Statistics

    /// Basic statistics over valid cells
    pub fn statistics(&self) -> RasterStatistics {
        let mut min: Option<f64> = None;
        let mut max: Option<f64> = None;
        let mut sum = 0.0;
        let mut count = 0usize;

        for (&v, &ok) in self.data.iter().zip(self.valid.iter()) {
            if !ok {
                continue;
            }
            min = Some(min.map_or(v, |m| m.min(v)));
            max = Some(max.map_or(v, |m| m.max(v)));
            sum += v;
            count += 1;
        }

        RasterStatistics {
            min,
            max,
            mean: (count > 0).then(|| sum / count as f64),
            valid_count: count,
            invalid_count: self.len() - count,
        }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone, PartialEq)]
pub struct RasterStatistics {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub invalid_count: usize,
}
