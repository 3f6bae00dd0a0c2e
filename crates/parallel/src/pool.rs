//! Fixed-size worker pool for tile jobs

use metgrid_algorithms::workflow::InterpolationConfig;
use metgrid_core::{Error, Result};
use rayon::prelude::*;
use tracing::info;

use crate::job::{TileJob, TileReport};
use crate::log_queue::LogQueue;

/// Default number of tile workers
pub const DEFAULT_WORKERS: usize = 32;

/// Dedicated rayon pool; jobs own their arrays and share only the config.
pub struct TilePool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl TilePool {
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::InvalidParameter {
                name: "workers",
                value: "0".into(),
                reason: "need at least one worker".into(),
            });
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("metgrid-tile-{i}"))
            .build()
            .map_err(|e| Error::Other(format!("cannot build worker pool: {e}")))?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every job; reports come back in job order.
    pub fn run(
        &self,
        jobs: &[TileJob],
        config: &InterpolationConfig,
        log: &LogQueue,
    ) -> Vec<TileReport> {
        info!("Running {} tiles on {} workers", jobs.len(), self.workers);
        let reports: Vec<TileReport> = self.pool.install(|| {
            jobs.par_iter()
                .map(|job| job.execute(config, &log.sink(&job.id)))
                .collect()
        });
        let done = reports.iter().filter(|r| r.is_done()).count();
        info!("{done}/{} tiles done", reports.len());
        reports
    }
}
