//! Batch runs over real files on a small pool.

use metgrid_algorithms::workflow::{InterpolationConfig, WorkflowPath};
use metgrid_core::io::write_raster;
use metgrid_core::{GeoTransform, Raster};
use metgrid_parallel::{load_jobs, LogQueue, TilePool, TileStatus};
use ndarray::Array2;
use std::path::Path;

const N: usize = 30;

fn write_tile(dir: &Path, offset: f64) {
    let data = Array2::from_shape_fn((N, N), |(r, c)| ((r * 17 + c * 29) % 50) as f64);
    let gt = GeoTransform::new(700_000.0 + offset, 5_200_000.0, 20.0, -20.0);
    let raster = Raster::from_array(data).with_transform(gt);
    write_raster(&raster, dir.join("features.tif"), None).unwrap();

    let xs = gt.x_axis(N);
    let ys = gt.y_axis(N);
    let feats: Vec<serde_json::Value> = (0..52usize)
        .map(|i| {
            let (r, c) = ((i * 11) % N, (i * 7 + i / N) % N);
            let v = raster.get(r, c).unwrap().unwrap();
            serde_json::json!({
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [xs[c], ys[r]]},
                "properties": {
                    "name": format!("s{i}"),
                    "air_temperature": 12.0 + 0.2 * v,
                    "relative_humidity": 70.0 - 0.5 * v
                }
            })
        })
        .collect();
    let fc = serde_json::json!({"type": "FeatureCollection", "features": feats});
    std::fs::write(dir.join("stations.geojson"), fc.to_string()).unwrap();
}

#[test]
fn test_batch_of_tiles() {
    let root = tempfile::tempdir().unwrap();
    let mut jobs = Vec::new();
    for (i, offset) in [0.0, 600.0].iter().enumerate() {
        let dir = root.path().join(format!("tile{i}"));
        std::fs::create_dir_all(&dir).unwrap();
        write_tile(&dir, *offset);
        jobs.push(serde_json::json!({
            "id": format!("tile{i}"),
            "stations": dir.join("stations.geojson"),
            "features": dir.join("features.tif"),
            "output_dir": dir.join("out"),
        }));
    }
    jobs.push(serde_json::json!({
        "id": "broken",
        "stations": root.path().join("missing.geojson"),
        "features": root.path().join("missing.tif"),
        "output_dir": root.path().join("broken"),
    }));
    let jobs_path = root.path().join("jobs.json");
    std::fs::write(&jobs_path, serde_json::Value::Array(jobs).to_string()).unwrap();

    let jobs = load_jobs(&jobs_path).unwrap();
    let pool = TilePool::new(2).unwrap();
    let log = LogQueue::start().unwrap();
    let reports = pool.run(&jobs, &InterpolationConfig::default(), &log);
    let n_records = log.finish().unwrap();

    // start, two scores and done per tile plus start and failed for the
    // broken one; workflow events come on top of those
    assert!(n_records > 4 * 2 + 2, "only {n_records} records queued");

    assert_eq!(reports.len(), 3);
    for report in &reports[..2] {
        assert_eq!(
            report.status,
            TileStatus::Done {
                wpath: WorkflowPath::RegressionOnly,
                qc: 1
            },
            "{}",
            report.id
        );
    }
    assert!(matches!(reports[2].status, TileStatus::Failed { .. }));
    assert!(root.path().join("tile1/out/output_ta.tif").exists());
    assert!(root.path().join("tile0/out/output_meta.json").exists());
}
