//! Pipeline utilities applied to finished surfaces

mod fill_nodata;
mod forcing;
mod hourly_mean;

pub use fill_nodata::{fill_nodata, nodata_path};
pub use forcing::{merge_forcing, read_hourly_means, ForcingMerge, FORCING_COLUMNS, FORCING_NODATA};
pub use hourly_mean::{area_mean, hourly_means, write_hourly_means, HourlyMean, RasterStamp};
