//! Tile jobs and their reports

use metgrid_algorithms::workflow::{
    run_interpolation, InterpolationConfig, OutputLayout, WorkflowPath,
};
use metgrid_core::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::log_queue::LogSink;

/// Inputs and output layout of one tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileJob {
    pub id: String,
    /// Station GeoJSON
    pub stations: PathBuf,
    /// Multi-band predictor GeoTIFF
    pub features: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default = "default_ta_name")]
    pub output_ta: String,
    #[serde(default = "default_rh_name")]
    pub output_rh: String,
}

fn default_ta_name() -> String {
    "output_ta.tif".into()
}

fn default_rh_name() -> String {
    "output_rh.tif".into()
}

impl TileJob {
    pub fn layout(&self) -> OutputLayout {
        OutputLayout::new(&self.output_dir).with_names(&self.output_ta, &self.output_rh)
    }

    /// Run the tile, reporting progress on `log`. Never panics on bad input;
    /// failures end up in the report.
    ///
    /// Events the workflow raises while the tile runs go to `log` as well.
    pub fn execute(&self, config: &InterpolationConfig, log: &LogSink) -> TileReport {
        log.info(format!("start: {}", self.stations.display()));
        let layout = self.layout();
        let result =
            log.capture(|| run_interpolation(&self.stations, &self.features, &layout, config));
        let status = match result {
            Ok(run) => {
                for (var, s) in &run.meta.scores {
                    log.debug(format!("{var}: R² {:.3}, MAE {:.3}, N {}", s.r2, s.mae, s.n));
                }
                log.info(format!("done: wpath {}, qc {}", run.path, run.meta.qc));
                TileStatus::Done {
                    wpath: run.path,
                    qc: run.meta.qc,
                }
            }
            Err(e) => {
                log.error(format!("failed: {e}"));
                TileStatus::Failed {
                    error: e.to_string(),
                }
            }
        };
        TileReport {
            id: self.id.clone(),
            status,
        }
    }
}

/// Outcome of one tile
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TileStatus {
    Done { wpath: WorkflowPath, qc: u8 },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileReport {
    pub id: String,
    #[serde(flatten)]
    pub status: TileStatus,
}

impl TileReport {
    pub fn is_done(&self) -> bool {
        matches!(self.status, TileStatus::Done { .. })
    }
}

/// Read a JSON array of [`TileJob`]s.
pub fn load_jobs<P: AsRef<Path>>(path: P) -> Result<Vec<TileJob>> {
    let text = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_defaults() {
        let jobs: Vec<TileJob> = serde_json::from_str(
            r#"[{"id": "t1", "stations": "s.geojson", "features": "f.tif", "output_dir": "out/t1"}]"#,
        )
        .unwrap();
        assert_eq!(jobs[0].output_ta, "output_ta.tif");
        assert_eq!(
            jobs[0].layout().meta_path(),
            PathBuf::from("out/t1/output_meta.json")
        );
    }

    #[test]
    fn test_report_json() {
        let done = TileReport {
            id: "a".into(),
            status: TileStatus::Done {
                wpath: WorkflowPath::PureKriging,
                qc: 0,
            },
        };
        let v = serde_json::to_value(&done).unwrap();
        assert_eq!(v["status"], "done");
        assert_eq!(v["wpath"], 2.0);

        let failed = TileReport {
            id: "b".into(),
            status: TileStatus::Failed {
                error: "boom".into(),
            },
        };
        let v = serde_json::to_value(&failed).unwrap();
        assert_eq!(v["status"], "failed");
        assert_eq!(v["error"], "boom");
        assert!(!failed.is_done());
    }
}
