//! End-to-end runs of the interpolation workflow on synthetic grids.
//!
//! The grid is 80×80 cells of 50 m; stations sit exactly on cell centres so
//! that surface samples at a station coincide with the kriging target.

use approx::assert_abs_diff_eq;
use metgrid_algorithms::workflow::{
    interpolate, InterpolationConfig, PartialResultPolicy, WorkflowPath,
};
use metgrid_core::{Error, FeatureGrid, GeoTransform, Station, StationSet, TargetVariable};
use ndarray::{Array2, Array3};

const N: usize = 80;
const CELL: f64 = 50.0;

struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as f64 / (1u64 << 31) as f64
    }
}

fn transform() -> GeoTransform {
    GeoTransform::new(500_000.0, 5_400_000.0, CELL, -CELL)
}

/// Predictor bands filled by `f(band, row, col)`
fn grid(n_bands: usize, f: impl Fn(usize, usize, usize) -> f64) -> FeatureGrid {
    let bands = Array3::from_shape_fn((n_bands, N, N), |(b, r, c)| f(b, r, c));
    FeatureGrid::from_bands(bands, Some(-32768.0))
        .unwrap()
        .with_transform(transform())
}

/// `n` distinct station cells, deterministic
fn station_cells(n: usize, seed: u64) -> Vec<(usize, usize)> {
    let mut rng = Lcg(seed);
    let mut cells = Vec::with_capacity(n);
    while cells.len() < n {
        let r = (rng.next() * N as f64) as usize % N;
        let c = (rng.next() * N as f64) as usize % N;
        if !cells.contains(&(r, c)) {
            cells.push((r, c));
        }
    }
    cells
}

fn stations(
    grid: &FeatureGrid,
    cells: &[(usize, usize)],
    mut values: impl FnMut(usize, f64, f64) -> (f64, f64),
) -> StationSet {
    let xs = grid.x_axis();
    let ys = grid.y_axis();
    cells
        .iter()
        .enumerate()
        .map(|(i, &(r, c))| {
            let (ta, rh) = values(i, xs[c], ys[r]);
            Station::new(format!("st{i:02}"), xs[c], ys[r])
                .with_value(TargetVariable::AirTemperature, ta)
                .with_value(TargetVariable::RelativeHumidity, rh)
        })
        .collect()
}

/// One predictor that explains both targets up to a little noise
fn linear_case(n_stations: usize) -> (FeatureGrid, StationSet) {
    let g = grid(1, |_, r, c| ((r * 37 + c * 91) % 100) as f64);
    let cells = station_cells(n_stations, 7);
    let band = g.band(0).to_owned();
    let mut noise = Lcg(11);
    let set = stations(&g, &cells, |i, _, _| {
        let (r, c) = cells[i];
        let v = band[[r, c]];
        let e = noise.next() * 0.1 - 0.05;
        (15.0 + 0.1 * v + e, 80.0 - 0.3 * v + e)
    });
    (g, set)
}

/// Predictors that are pure noise; targets vary smoothly in space
fn random_case(n_stations: usize) -> (FeatureGrid, StationSet) {
    let mut rng = Lcg(42);
    let noise: Vec<f64> = (0..2 * N * N).map(|_| rng.next() * 100.0).collect();
    let g = grid(2, |b, r, c| noise[b * N * N + r * N + c]);
    let cells = station_cells(n_stations, 3);
    let (x0, y0) = (500_000.0, 5_400_000.0);
    let set = stations(&g, &cells, |_, x, y| {
        let (u, v) = (x - x0, y0 - y);
        (
            18.0 + 2.0 * (u / 600.0).sin() + (v / 500.0).cos(),
            60.0 + 8.0 * (v / 700.0).sin() - 3.0 * (u / 900.0).cos(),
        )
    });
    (g, set)
}

fn small_config() -> InterpolationConfig {
    InterpolationConfig {
        min_stations: 50,
        ..Default::default()
    }
}

#[test]
fn test_49_stations_abort() {
    let (g, set) = linear_case(49);
    let err = interpolate(&set, &g, &small_config()).unwrap_err();
    assert!(
        matches!(err, Error::InsufficientStations { found: 49, required: 50 }),
        "unexpected error {err}"
    );
}

#[test]
fn test_50_stations_proceed() {
    let (g, set) = linear_case(50);
    let run = interpolate(&set, &g, &small_config()).unwrap();
    assert_eq!(run.surfaces.len(), 2);
}

#[test]
fn test_linear_data_takes_regression_path() {
    let (g, set) = linear_case(60);
    let run = interpolate(&set, &g, &small_config()).unwrap();

    assert_eq!(run.path, WorkflowPath::RegressionOnly);
    assert_eq!(run.meta.wpath, WorkflowPath::RegressionOnly);
    assert_eq!(run.meta.qc, 1);
    assert!(run.intermediates.kriged_residuals.is_empty());
    assert!(run.intermediates.variograms.is_empty());

    for var in TargetVariable::ALL {
        let tuning = run.intermediates.tuning[&var];
        assert!(tuning.r2_cv > 0.9, "{var} cv R² {}", tuning.r2_cv);
        let scores = run.meta.scores[&var];
        assert_eq!(scores.n, 60);
        assert!(scores.r2 > 0.9, "{var} station R² {}", scores.r2);
        assert!(scores.mae < 0.1, "{var} MAE {}", scores.mae);
    }

    // Residuals are recorded for every station
    let resid = &run.intermediates.residuals[&TargetVariable::AirTemperature];
    assert_eq!(resid.len(), 60);
    assert!(resid.iter().all(|r| r.residual.is_some_and(|v| v.abs() < 0.2)));
}

#[test]
fn test_residual_correction_path() {
    let (g, set) = linear_case(60);
    let config = InterpolationConfig {
        residual_correction: true,
        ..small_config()
    };
    let run = interpolate(&set, &g, &config).unwrap();
    assert_eq!(run.path, WorkflowPath::RegressionKrigedResidual);
    assert_eq!(run.surfaces.len(), 2);
    assert_eq!(run.intermediates.variograms.len(), 2);
    assert_eq!(run.intermediates.regression.len(), 2);
}

#[test]
fn test_random_predictors_fall_back_to_kriging() {
    let (g, set) = random_case(60);
    let run = interpolate(&set, &g, &small_config()).unwrap();

    assert_eq!(run.path, WorkflowPath::PureKriging);
    assert!(run.intermediates.regression.is_empty());
    assert_eq!(run.surfaces.len(), 2, "both variables must be kriged");

    for var in TargetVariable::ALL {
        let surface = run.surface(var).unwrap();
        for s in set.iter() {
            let observed = s.value(var).unwrap();
            let kriged = surface.sample(s.x, s.y).unwrap();
            assert_abs_diff_eq!(kriged, observed, epsilon = 1e-6);
        }
        assert_abs_diff_eq!(run.meta.scores[&var].r2, 1.0, epsilon = 1e-6);
    }
    assert_eq!(run.meta.qc, 1);
}

#[test]
fn test_chunked_prediction_matches_single_pass() {
    let (g, set) = linear_case(60);
    let whole = interpolate(&set, &g, &small_config()).unwrap();
    let chunked = interpolate(
        &set,
        &g,
        &InterpolationConfig {
            max_predictions: 999,
            ..small_config()
        },
    )
    .unwrap();

    for var in TargetVariable::ALL {
        let a = whole.surface(var).unwrap().filled(-9999.0);
        let b = chunked.surface(var).unwrap().filled(-9999.0);
        assert_eq!(a, b, "{var} differs when chunked");
    }
}

#[test]
fn test_simulation_runs_are_reproducible() {
    let (g, set) = random_case(60);
    let config = InterpolationConfig {
        n_realizations: 3,
        ..small_config()
    };
    let a = interpolate(&set, &g, &config).unwrap();
    let b = interpolate(&set, &g, &config).unwrap();
    for var in TargetVariable::ALL {
        assert_eq!(
            a.surface(var).unwrap().filled(0.0),
            b.surface(var).unwrap().filled(0.0)
        );
    }
}

#[test]
fn test_relative_humidity_is_clamped() {
    // RH rises past 100 with the predictor
    let g = grid(1, |_, r, c| ((r * 13 + c * 7) % 100) as f64);
    let cells = station_cells(60, 5);
    let band = g.band(0).to_owned();
    let set = stations(&g, &cells, |i, _, _| {
        let (r, c) = cells[i];
        let v = band[[r, c]];
        (10.0 + 0.2 * v, 60.0 + 0.8 * v)
    });
    assert!(set
        .iter()
        .all(|s| s.value(TargetVariable::RelativeHumidity).unwrap() <= 100.0));

    let run = interpolate(&set, &g, &small_config()).unwrap();
    let rh = run.surface(TargetVariable::RelativeHumidity).unwrap();
    let stats = rh.statistics();
    assert!(stats.min.unwrap() >= 0.0);
    assert!(stats.max.unwrap() <= 100.0);
}

#[test]
fn test_invalid_cells_stay_invalid() {
    let g = {
        let bands = Array3::from_shape_fn((1, N, N), |(_, r, c)| {
            if r < 5 {
                -32768.0
            } else {
                ((r * 37 + c * 91) % 100) as f64
            }
        });
        FeatureGrid::from_bands(bands, Some(-32768.0))
            .unwrap()
            .with_transform(transform())
    };
    let cells: Vec<(usize, usize)> = station_cells(60, 9)
        .into_iter()
        .map(|(r, c)| (r.max(5), c))
        .collect();
    let band = g.band(0).to_owned();
    let set = stations(&g, &cells, |i, _, _| {
        let (r, c) = cells[i];
        (15.0 + 0.1 * band[[r, c]], 50.0)
    });
    let run = interpolate(&set, &g, &small_config()).unwrap();
    let ta = run.surface(TargetVariable::AirTemperature).unwrap();
    assert_eq!(ta.valid_count(), (N - 5) * N);
    assert!(!ta.is_valid(0, 0));
}

/// Same stations, relative humidity replaced by a constant
fn constant_rh(set: &StationSet) -> StationSet {
    set.iter()
        .map(|s| s.clone().with_value(TargetVariable::RelativeHumidity, 55.0))
        .collect()
}

#[test]
fn test_colocated_stations_are_merged() {
    let (g, set) = random_case(60);
    let first = set.iter().next().unwrap().clone();
    let ta0 = first.value(TargetVariable::AirTemperature).unwrap();
    let rh0 = first.value(TargetVariable::RelativeHumidity).unwrap();
    let moved: StationSet = set
        .iter()
        .take(59)
        .cloned()
        .chain(std::iter::once(
            Station::new("st59", first.x, first.y)
                .with_value(TargetVariable::AirTemperature, ta0 + 0.3)
                .with_value(TargetVariable::RelativeHumidity, rh0 + 1.0),
        ))
        .collect();

    let run = interpolate(&moved, &g, &small_config()).unwrap();
    assert_eq!(run.path, WorkflowPath::PureKriging);
    assert_eq!(run.surfaces.len(), 2);

    let ta = run.surface(TargetVariable::AirTemperature).unwrap();
    let rh = run.surface(TargetVariable::RelativeHumidity).unwrap();
    assert_abs_diff_eq!(ta.sample(first.x, first.y).unwrap(), ta0 + 0.15, epsilon = 1e-6);
    assert_abs_diff_eq!(rh.sample(first.x, first.y).unwrap(), rh0 + 0.5, epsilon = 1e-6);

    // Other stations are still honoured
    for s in moved.iter().skip(1).take(58) {
        let observed = s.value(TargetVariable::AirTemperature).unwrap();
        assert_abs_diff_eq!(ta.sample(s.x, s.y).unwrap(), observed, epsilon = 1e-6);
    }
}

#[test]
fn test_failed_residual_fit_keeps_regression_surface() {
    // Stations are at least one cell apart, so no pair falls within 10 m
    let (g, set) = linear_case(60);
    let config = InterpolationConfig {
        residual_correction: true,
        variogram_max_dist: 10.0,
        ..small_config()
    };
    let run = interpolate(&set, &g, &config).unwrap();

    assert_eq!(run.path, WorkflowPath::RegressionKrigedResidual);
    assert!(run.intermediates.kriged_residuals.is_empty());
    assert_eq!(run.intermediates.variograms.len(), 2);
    assert!(run.intermediates.variograms.values().all(Option::is_none));
    for var in TargetVariable::ALL {
        assert_eq!(
            run.surface(var).unwrap().filled(-9999.0),
            run.intermediates.regression[&var].filled(-9999.0),
            "{var} must be the uncorrected regression"
        );
    }
}

#[test]
fn test_kriging_without_any_model_is_empty() {
    let (g, set) = random_case(60);
    let config = InterpolationConfig {
        variogram_max_dist: 10.0,
        ..small_config()
    };
    let err = interpolate(&set, &g, &config).unwrap_err();
    assert!(matches!(err, Error::EmptyOutput), "unexpected error {err}");
}

#[test]
fn test_partial_output_accepted_by_default() {
    let (g, set) = random_case(60);
    let set = constant_rh(&set);
    let config = InterpolationConfig {
        r2_threshold: 1.01,
        ..small_config()
    };
    let run = interpolate(&set, &g, &config).unwrap();

    assert_eq!(run.path, WorkflowPath::PureKriging);
    assert!(run.surface(TargetVariable::AirTemperature).is_some());
    assert!(run.surface(TargetVariable::RelativeHumidity).is_none());
    assert!(run.intermediates.variograms[&TargetVariable::RelativeHumidity].is_none());
    assert!(!run.meta.scores.contains_key(&TargetVariable::RelativeHumidity));
}

#[test]
fn test_partial_output_aborts_when_requested() {
    let (g, set) = random_case(60);
    let set = constant_rh(&set);
    let config = InterpolationConfig {
        r2_threshold: 1.01,
        partial_result: PartialResultPolicy::Abort,
        ..small_config()
    };
    match interpolate(&set, &g, &config).unwrap_err() {
        Error::PartialOutput(missing) => assert_eq!(missing, "relative_humidity"),
        other => panic!("unexpected error {other}"),
    }
}

/// Single-band `rows × cols` grid with stations linear in the predictor
fn large_linear_case(rows: usize, cols: usize) -> (FeatureGrid, StationSet) {
    let band = Array2::from_shape_fn((rows, cols), |(r, c)| ((r * 37 + c * 91) % 100) as f64);
    let g = FeatureGrid::from_bands(band.clone().insert_axis(ndarray::Axis(0)), None)
        .unwrap()
        .with_transform(transform());
    let cells = station_cells(60, 7);
    let set = stations(&g, &cells, |i, _, _| {
        let (r, c) = cells[i];
        let v = band[[r, c]];
        (15.0 + 0.1 * v, 80.0 - 0.3 * v)
    });
    (g, set)
}

#[test]
fn test_chunking_around_default_threshold() {
    // 250 500 valid cells: the default limit splits them, a larger one does not
    let (g, set) = large_linear_case(501, 500);
    let chunked = interpolate(&set, &g, &small_config()).unwrap();
    let single = interpolate(
        &set,
        &g,
        &InterpolationConfig {
            max_predictions: 250_500,
            ..small_config()
        },
    )
    .unwrap();
    assert_eq!(chunked.path, WorkflowPath::RegressionOnly);

    // 250 000 valid cells: one pass by default, two just below it
    let (g2, set2) = large_linear_case(500, 500);
    let whole = interpolate(&set2, &g2, &small_config()).unwrap();
    let split = interpolate(
        &set2,
        &g2,
        &InterpolationConfig {
            max_predictions: 249_999,
            ..small_config()
        },
    )
    .unwrap();

    for var in TargetVariable::ALL {
        assert_eq!(
            chunked.surface(var).unwrap().filled(-9999.0),
            single.surface(var).unwrap().filled(-9999.0),
            "{var} differs above the threshold"
        );
        assert_eq!(
            whole.surface(var).unwrap().filled(-9999.0),
            split.surface(var).unwrap().filled(-9999.0),
            "{var} differs below the threshold"
        );
    }
}
