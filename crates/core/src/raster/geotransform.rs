//! Affine geotransformation for rasters

use serde::{Deserialize, Serialize};

/// Affine georeference of a north-up raster grid.
///
/// Converts between pixel coordinates (col, row) and projected coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height
/// ```
///
/// Rotation terms are assumed to be zero; readers reject rotated grids.
/// `pixel_height` is negative for the usual top-down row order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Create a new north-up GeoTransform
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// GDAL-style coefficients `[origin_x, pixel_width, 0, origin_y, 0, pixel_height]`
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            0.0,
            self.origin_y,
            0.0,
            self.pixel_height,
        ]
    }

    /// Coordinates of the centre of cell (col, row)
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        let x = self.origin_x + (col as f64 + 0.5) * self.pixel_width;
        let y = self.origin_y + (row as f64 + 0.5) * self.pixel_height;
        (x, y)
    }

    /// Fractional pixel coordinates (col, row) of a projected point
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        if self.pixel_width.abs() < 1e-12 || self.pixel_height.abs() < 1e-12 {
            return (f64::NAN, f64::NAN);
        }
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// X coordinates of the cell centres of each column
    pub fn x_axis(&self, cols: usize) -> Vec<f64> {
        (0..cols)
            .map(|c| self.origin_x + (c as f64 + 0.5) * self.pixel_width)
            .collect()
    }

    /// Y coordinates of the cell centres of each row
    pub fn y_axis(&self, rows: usize) -> Vec<f64> {
        (0..rows)
            .map(|r| self.origin_y + (r as f64 + 0.5) * self.pixel_height)
            .collect()
    }

    /// Cell whose centre is nearest to (x, y), resolved independently per axis.
    ///
    /// Points outside the grid snap to the border cell. When a point lies
    /// exactly halfway between two centres the lower index wins.
    pub fn nearest_cell(&self, x: f64, y: f64, rows: usize, cols: usize) -> (usize, usize) {
        let (fc, fr) = self.geo_to_pixel(x, y);
        (nearest_index(fr, rows), nearest_index(fc, cols))
    }

    /// Get the cell size (assumes square pixels)
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Check if this is a north-up image
    pub fn is_north_up(&self) -> bool {
        self.pixel_width > 0.0 && self.pixel_height < 0.0
    }

    /// Bounding box (min_x, min_y, max_x, max_y) for a raster of given dimensions
    pub fn bounds(&self, cols: usize, rows: usize) -> (f64, f64, f64, f64) {
        let x0 = self.origin_x;
        let x1 = self.origin_x + cols as f64 * self.pixel_width;
        let y0 = self.origin_y;
        let y1 = self.origin_y + rows as f64 * self.pixel_height;
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

/// Map a fractional pixel coordinate (cell edges at integers) to the index
/// of the nearest cell centre, clamped to `[0, n)`.
fn nearest_index(frac: f64, n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    // Centres sit at k + 0.5; ceil(frac - 1) keeps exact ties on the lower cell.
    let idx = (frac - 1.0).ceil();
    idx.max(0.0).min((n - 1) as f64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_to_geo_roundtrip() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);

        let (x, y) = gt.pixel_to_geo(5, 10);
        let (col, row) = gt.geo_to_pixel(x, y);

        assert_relative_eq!(col, 5.5, epsilon = 1e-10);
        assert_relative_eq!(row, 10.5, epsilon = 1e-10);
    }

    #[test]
    fn test_bounds() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let (min_x, min_y, max_x, max_y) = gt.bounds(100, 100);

        assert_relative_eq!(min_x, 0.0, epsilon = 1e-10);
        assert_relative_eq!(min_y, 0.0, epsilon = 1e-10);
        assert_relative_eq!(max_x, 100.0, epsilon = 1e-10);
        assert_relative_eq!(max_y, 100.0, epsilon = 1e-10);
    }

    #[test]
    fn test_axes_are_cell_centres() {
        let gt = GeoTransform::new(0.0, 30.0, 10.0, -10.0);
        assert_eq!(gt.x_axis(3), vec![5.0, 15.0, 25.0]);
        assert_eq!(gt.y_axis(3), vec![25.0, 15.0, 5.0]);
    }

    #[test]
    fn test_nearest_cell_inside() {
        let gt = GeoTransform::new(0.0, 100.0, 10.0, -10.0);
        assert_eq!(gt.nearest_cell(14.0, 96.0, 10, 10), (0, 1));
        assert_eq!(gt.nearest_cell(55.0, 55.0, 10, 10), (4, 5));
    }

    #[test]
    fn test_nearest_cell_tie_picks_lower_index() {
        let gt = GeoTransform::new(0.0, 100.0, 10.0, -10.0);
        // x = 10 is equidistant from centres 5 and 15
        assert_eq!(gt.nearest_cell(10.0, 95.0, 10, 10), (0, 0));
        // y = 90 is equidistant from rows 0 and 1
        assert_eq!(gt.nearest_cell(5.0, 90.0, 10, 10), (0, 0));
    }

    #[test]
    fn test_nearest_cell_outside_snaps_to_border() {
        let gt = GeoTransform::new(0.0, 100.0, 10.0, -10.0);
        assert_eq!(gt.nearest_cell(-500.0, 1000.0, 10, 10), (0, 0));
        assert_eq!(gt.nearest_cell(1e6, -1e6, 10, 10), (9, 9));
    }
}
