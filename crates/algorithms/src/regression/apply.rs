//! Apply a fitted model to every valid cell of a feature grid
//!
//! Valid cells are collected in row-major order. Above `max_predictions`
//! cells the index list is split into `ceil(n / max_predictions)` contiguous
//! chunks of near-equal size (the first `n % k` chunks one longer), predicted
//! chunk by chunk and scattered back. The result does not depend on the split.

use metgrid_core::{Error, FeatureGrid, Raster, Result};
use ndarray::{Array2, Array3, Axis};
use tracing::debug;

use super::ridge::RidgeModel;

/// Default cell count above which prediction is chunked
pub const MAX_PREDICTIONS: usize = 250_000;

/// Split `n` items into contiguous `(start, end)` chunks of at most
/// roughly `max_len` items.
pub fn chunk_bounds(n: usize, max_len: usize) -> Vec<(usize, usize)> {
    if n == 0 {
        return Vec::new();
    }
    let max_len = max_len.max(1);
    let k = n.div_ceil(max_len);
    let base = n / k;
    let extra = n % k;
    let mut bounds = Vec::with_capacity(k);
    let mut start = 0;
    for i in 0..k {
        let len = base + usize::from(i < extra);
        bounds.push((start, start + len));
        start += len;
    }
    bounds
}

/// Predict `(n_outputs, rows, cols)`; invalid cells are NaN.
pub fn predict_grid(
    model: &RidgeModel,
    grid: &FeatureGrid,
    max_predictions: usize,
) -> Result<Array3<f64>> {
    if model.n_features() != grid.n_bands() {
        return Err(Error::InvalidInput(format!(
            "model expects {} predictors, feature grid has {} bands",
            model.n_features(),
            grid.n_bands()
        )));
    }

    let (rows, cols) = grid.shape();
    let n_out = model.n_outputs();
    let cells = grid.valid_cells();
    let chunks = chunk_bounds(cells.len(), max_predictions);
    if chunks.len() > 1 {
        debug!(
            "Predicting {} cells in {} chunks",
            cells.len(),
            chunks.len()
        );
    }

    let mut out = Array3::from_elem((n_out, rows, cols), f64::NAN);
    for (start, end) in chunks {
        let chunk = &cells[start..end];
        let x = Array2::from_shape_fn((chunk.len(), grid.n_bands()), |(i, b)| {
            let (r, c) = chunk[i];
            grid.band(b)[[r, c]]
        });
        let predicted = model.predict(x.view())?;
        for (i, &(r, c)) in chunk.iter().enumerate() {
            for k in 0..n_out {
                out[[k, r, c]] = predicted[[i, k]];
            }
        }
    }

    Ok(out)
}

/// Predict one [`Raster`] per model output, masked and georeferenced like
/// the grid.
pub fn predict_surfaces(
    model: &RidgeModel,
    grid: &FeatureGrid,
    max_predictions: usize,
) -> Result<Vec<Raster>> {
    let stack = predict_grid(model, grid, max_predictions)?;
    stack
        .axis_iter(Axis(0))
        .map(|band| grid.surface(band.to_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regression::fit_ridge;
    use metgrid_core::GeoTransform;
    use ndarray::{array, Array3};

    fn grid(rows: usize, cols: usize) -> FeatureGrid {
        let mut bands = Array3::from_shape_fn((2, rows, cols), |(b, r, c)| {
            (b + 1) as f64 * r as f64 + 0.5 * c as f64
        });
        bands[[0, 0, 0]] = f64::NAN;
        FeatureGrid::from_bands(bands, None)
            .unwrap()
            .with_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0))
    }

    fn model() -> RidgeModel {
        let x = array![[0.0, 1.0], [1.0, 0.0], [2.0, 3.0], [4.0, 1.0], [3.0, 3.0]];
        let y = array![[1.0, 10.0], [2.0, 8.0], [4.0, 9.0], [5.0, 2.0], [6.0, 4.0]];
        fit_ridge(x.view(), y.view(), 0.05).unwrap()
    }

    #[test]
    fn test_chunk_bounds_like_array_split() {
        assert_eq!(chunk_bounds(10, 4), vec![(0, 4), (4, 7), (7, 10)]);
        assert_eq!(chunk_bounds(8, 4), vec![(0, 4), (4, 8)]);
        assert_eq!(chunk_bounds(3, 10), vec![(0, 3)]);
        assert!(chunk_bounds(0, 10).is_empty());
    }

    #[test]
    fn test_invalid_cells_stay_nan() {
        let g = grid(4, 5);
        let out = predict_grid(&model(), &g, MAX_PREDICTIONS).unwrap();
        assert_eq!(out.dim(), (2, 4, 5));
        assert!(out[[0, 0, 0]].is_nan() && out[[1, 0, 0]].is_nan());
        assert!(out[[0, 1, 1]].is_finite());
    }

    #[test]
    fn test_chunking_is_transparent() {
        let g = grid(7, 9);
        let m = model();
        let whole = predict_grid(&m, &g, MAX_PREDICTIONS).unwrap();
        for max in [1, 5, 13, 61, 62, 63] {
            let chunked = predict_grid(&m, &g, max).unwrap();
            for (a, b) in whole.iter().zip(chunked.iter()) {
                assert!(a.to_bits() == b.to_bits(), "max={max}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn test_apply_is_idempotent() {
        let g = grid(3, 3);
        let m = model();
        let first = predict_surfaces(&m, &g, MAX_PREDICTIONS).unwrap();
        let second = predict_surfaces(&m, &g, MAX_PREDICTIONS).unwrap();
        assert_eq!(first.len(), 2);
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.validity(), b.validity());
            assert_eq!(a.filled(-1.0), b.filled(-1.0));
        }
    }

    #[test]
    fn test_band_count_mismatch() {
        let bands = Array3::<f64>::zeros((3, 2, 2));
        let g = FeatureGrid::from_bands(bands, None).unwrap();
        assert!(predict_grid(&model(), &g, MAX_PREDICTIONS).is_err());
    }
}
