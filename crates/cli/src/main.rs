//! metgrid CLI - regression kriging of urban station data

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use metgrid_algorithms::interpolation::VariogramModel;
use metgrid_algorithms::postprocess::{fill_nodata, merge_forcing, write_hourly_means};
use metgrid_algorithms::workflow::{
    run_interpolation, InterpolationConfig, OutputLayout, PartialResultPolicy,
};
use metgrid_core::io::{read_feature_grid, write_json};
use metgrid_core::DEFAULT_NODATA;
use metgrid_parallel::{load_jobs, LogQueue, TilePool, DEFAULT_WORKERS};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "metgrid")]
#[command(author, version, about = "Regression kriging of urban micro-climate station data", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interpolate air temperature and relative humidity onto a feature grid
    Interpolate {
        /// Directory for outputs and intermediate artefacts
        savedir: PathBuf,
        /// File name of the air temperature raster
        savename_ta: String,
        /// File name of the relative humidity raster
        savename_rh: String,
        /// Station GeoJSON
        stations: PathBuf,
        /// Multi-band predictor GeoTIFF
        features: PathBuf,
        #[command(flatten)]
        overrides: ConfigArgs,
    },
    /// Interpolate a list of tiles on a worker pool
    Batch {
        /// JSON array of jobs (id, stations, features, output_dir)
        jobs: PathBuf,
        /// Number of workers
        #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,
        /// Write a per-tile status summary here
        #[arg(long)]
        summary: Option<PathBuf>,
        #[command(flatten)]
        overrides: ConfigArgs,
    },
    /// Area mean of two consecutive hourly rasters as CSV
    HourlyMean {
        /// Raster of the previous hour
        #[arg(short, long)]
        prev: PathBuf,
        /// Raster of the current hour
        #[arg(short, long)]
        now: PathBuf,
        /// Output CSV
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Replace Tair and RH of a forcing file with hourly mean CSVs
    MergeForcing {
        /// Air temperature hourly means
        #[arg(short, long)]
        tair: PathBuf,
        /// Relative humidity hourly means
        #[arg(short, long)]
        relhum: PathBuf,
        /// Space separated city means forcing file
        #[arg(short = 'm', long)]
        city_means: PathBuf,
        /// Output forcing file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Replace NaN cells with a no-data value, writing <stem>_ndv.tif
    FillNodata {
        /// Input raster
        file: PathBuf,
        /// No-data value to write
        #[arg(long, default_value_t = DEFAULT_NODATA, allow_hyphen_values = true)]
        ndv: f64,
    },
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PartialArg {
    Accept,
    Abort,
}

impl From<PartialArg> for PartialResultPolicy {
    fn from(p: PartialArg) -> Self {
        match p {
            PartialArg::Accept => PartialResultPolicy::Accept,
            PartialArg::Abort => PartialResultPolicy::Abort,
        }
    }
}

/// Run settings; flags override the config file, which overrides defaults
#[derive(Args)]
struct ConfigArgs {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// No-data value of the feature raster
    #[arg(long, allow_hyphen_values = true)]
    ndv: Option<f64>,
    /// Skip the intermediate/ artefacts
    #[arg(long)]
    no_intermediate: bool,
    /// Krige regression residuals and add them back
    #[arg(long)]
    residual_correction: bool,
    /// Conditional realisations averaged into the kriged field
    #[arg(long)]
    realizations: Option<usize>,
    /// Minimum number of stations
    #[arg(long)]
    min_stations: Option<usize>,
    /// CV R² needed to keep the regression
    #[arg(long)]
    r2_threshold: Option<f64>,
    /// Covariance model: exponential, gaussian, spherical
    #[arg(long)]
    variogram_model: Option<VariogramModel>,
    /// Master seed for conditional simulation
    #[arg(long)]
    seed: Option<u64>,
    /// What to do when kriging leaves a variable without output
    #[arg(long, value_enum)]
    partial_result: Option<PartialArg>,
}

impl ConfigArgs {
    fn resolve(&self) -> Result<InterpolationConfig> {
        let mut config = match &self.config {
            Some(path) => InterpolationConfig::from_json_file(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?,
            None => InterpolationConfig::default(),
        };
        if let Some(v) = self.ndv {
            config.nodata = v;
        }
        if self.no_intermediate {
            config.save_intermediate = false;
        }
        if self.residual_correction {
            config.residual_correction = true;
        }
        if let Some(v) = self.realizations {
            config.n_realizations = v;
        }
        if let Some(v) = self.min_stations {
            config.min_stations = v;
        }
        if let Some(v) = self.r2_threshold {
            config.r2_threshold = v;
        }
        if let Some(v) = self.variogram_model {
            config.variogram_model = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.partial_result {
            config.partial_result = v.into();
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")
}

fn spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    info!("{} saved to: {} ({:.2?})", name, path.display(), elapsed);
}

fn print_info(input: &Path) -> Result<()> {
    let pb = spinner("Reading raster...")?;
    let grid = read_feature_grid(input, None).context("Failed to read raster")?;
    pb.finish_and_clear();

    let (rows, cols) = grid.shape();
    let first = grid.surface(grid.band(0).to_owned())?;
    let bounds = first.bounds();

    println!("File: {}", input.display());
    println!(
        "Dimensions: {} x {} ({} cells), {} band(s)",
        cols,
        rows,
        rows * cols,
        grid.n_bands()
    );
    println!("Cell size: {}", first.cell_size());
    println!(
        "Bounds: ({:.3}, {:.3}) - ({:.3}, {:.3})",
        bounds.0, bounds.1, bounds.2, bounds.3
    );
    if let Some(crs) = grid.crs() {
        println!("CRS: {}", crs);
    }
    println!(
        "Valid cells: {} ({:.1}%)",
        first.valid_count(),
        100.0 * first.valid_count() as f64 / (rows * cols).max(1) as f64
    );

    for b in 0..grid.n_bands() {
        let stats = grid.surface(grid.band(b).to_owned())?.statistics();
        println!("\nBand {}:", b + 1);
        if let Some(min) = stats.min {
            println!("  Min: {:.4}", min);
        }
        if let Some(max) = stats.max {
            println!("  Max: {:.4}", max);
        }
        if let Some(mean) = stats.mean {
            println!("  Mean: {:.4}", mean);
        }
    }
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Info { input } => print_info(&input)?,

        Commands::Interpolate {
            savedir,
            savename_ta,
            savename_rh,
            stations,
            features,
            overrides,
        } => {
            let config = overrides.resolve()?;
            let layout = OutputLayout::new(&savedir).with_names(savename_ta, savename_rh);
            let start = Instant::now();
            let pb = spinner("Interpolating...")?;
            let run = run_interpolation(&stations, &features, &layout, &config);
            pb.finish_and_clear();
            let run = run.with_context(|| format!("Failed to interpolate {}", stations.display()))?;

            for (var, s) in &run.meta.scores {
                info!(
                    "{}: R²={:.3} r={:.3} MAE={:.3} N={}",
                    var, s.r2, s.r, s.mae, s.n
                );
            }
            info!("Workflow path {}, qc {}", run.path, run.meta.qc);
            done("Interpolation", &savedir, start.elapsed());
        }

        Commands::Batch {
            jobs,
            workers,
            summary,
            overrides,
        } => {
            let config = overrides.resolve()?;
            let jobs = load_jobs(&jobs)
                .with_context(|| format!("Failed to read jobs {}", jobs.display()))?;
            if jobs.is_empty() {
                bail!("No jobs to run");
            }
            let pool = TilePool::new(workers)?;
            let log = LogQueue::start()?;
            let start = Instant::now();
            let reports = pool.run(&jobs, &config, &log);
            log.finish()?;

            let failed = reports.iter().filter(|r| !r.is_done()).count();
            if let Some(path) = &summary {
                write_json(&reports, path)
                    .with_context(|| format!("Failed to write summary {}", path.display()))?;
            }
            info!(
                "{} tiles, {} failed ({:.2?})",
                reports.len(),
                failed,
                start.elapsed()
            );
            if failed == reports.len() {
                bail!("All {} tiles failed", failed);
            } else if failed > 0 {
                warn!("{} tiles failed", failed);
            }
        }

        Commands::HourlyMean { prev, now, output } => {
            let start = Instant::now();
            let rows = write_hourly_means(&prev, &now, &output)
                .context("Failed to compute hourly means")?;
            for row in &rows {
                match row.value {
                    Some(v) => info!("{}-{:03} {:02}h: {:.2}", row.year, row.doy, row.hour, v),
                    None => warn!("{}-{:03} {:02}h: no valid cells", row.year, row.doy, row.hour),
                }
            }
            done("Hourly means", &output, start.elapsed());
        }

        Commands::MergeForcing {
            tair,
            relhum,
            city_means,
            output,
        } => {
            let start = Instant::now();
            let merged = merge_forcing(&tair, &relhum, &city_means, &output)
                .with_context(|| format!("Failed to merge into {}", city_means.display()))?;
            if merged.tair == 0 && merged.rh == 0 {
                warn!("No forcing row matched an interpolated hour");
            }
            done("Forcing file", &output, start.elapsed());
        }

        Commands::FillNodata { file, ndv } => {
            let start = Instant::now();
            let pb = spinner("Writing output...")?;
            let out = fill_nodata(&file, ndv);
            pb.finish_and_clear();
            let out = out.with_context(|| format!("Failed to fill {}", file.display()))?;
            done("Filled raster", &out, start.elapsed());
        }
    }

    Ok(())
}
