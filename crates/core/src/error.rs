//! Error types for metgrid

use thiserror::Error;

/// Main error type for metgrid operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TIFF error: {0}")]
    Tiff(String),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("Not enough stations for interpolation: {found} < {required}")]
    InsufficientStations { found: usize, required: usize },

    #[error("Target variables must be exactly air_temperature and relative_humidity, got [{0}]")]
    InvalidVariables(String),

    #[error("No covariance model for [{0}] and no regression fallback")]
    PartialOutput(String),

    #[error("Output is empty, no rasters were created")]
    EmptyOutput,

    #[error("{0}")]
    Other(String),
}

impl From<tiff::TiffError> for Error {
    fn from(e: tiff::TiffError) -> Self {
        Error::Tiff(e.to_string())
    }
}

impl From<ndarray::ShapeError> for Error {
    fn from(e: ndarray::ShapeError) -> Self {
        Error::Other(e.to_string())
    }
}

/// Result type alias for metgrid operations
pub type Result<T> = std::result::Result<T, Error>;
