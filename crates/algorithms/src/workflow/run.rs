//! Regression-kriging run: train, decide, interpolate, compose, score.

use metgrid_core::io::{read_feature_grid, read_stations};
use metgrid_core::{Error, FeatureGrid, Raster, Result, StationSet, TargetVariable};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error, info, warn};

use super::config::{InterpolationConfig, PartialResultPolicy};
use super::output::{
    write_outputs, Intermediates, OutputLayout, OutputMeta, StationResidual, TuningRecord,
};
use super::path::{decide_path, WorkflowPath};
use crate::interpolation::{
    empirical_variogram, fit_variogram, merge_colocated, station_points, ConditionalSimulation,
    FittedVariogram, SamplePoint, UniversalKriging, COLOCATION_TOLERANCE,
};
use crate::metrics::{evaluate, ValidationScores};
use crate::regression::{predict_surfaces, train_ridge_cv, RidgeFit, RidgeModel};
use crate::sampling::{build_design_matrix, DesignMatrix};

/// In-memory result of one run
#[derive(Debug, Clone)]
pub struct InterpolationRun {
    pub path: WorkflowPath,
    /// Final surfaces; a variable is absent when it could not be produced
    pub surfaces: BTreeMap<TargetVariable, Raster>,
    pub meta: OutputMeta,
    pub intermediates: Intermediates,
}

impl InterpolationRun {
    pub fn surface(&self, var: TargetVariable) -> Option<&Raster> {
        self.surfaces.get(&var)
    }
}

/// Interpolate both target variables onto the feature grid.
///
/// Fails before any fitting when the configuration is invalid or there are
/// fewer stations than `config.min_stations`.
pub fn interpolate(
    stations: &StationSet,
    grid: &FeatureGrid,
    config: &InterpolationConfig,
) -> Result<InterpolationRun> {
    config.validate()?;
    if stations.len() < config.min_stations {
        return Err(Error::InsufficientStations {
            found: stations.len(),
            required: config.min_stations,
        });
    }

    let variables = &config.variables;
    let design = build_design_matrix(grid, stations, variables)?;
    info!(
        "{} of {} stations usable for regression on {} predictors",
        design.n_rows(),
        stations.len(),
        design.n_features()
    );

    let mut interm = Intermediates::default();
    let fits = train_regressions(&design, config);
    interm.tuning = fits.iter().map(|(v, f)| (*v, TuningRecord::from(f))).collect();

    let best_cv = if fits.len() == variables.len() {
        fits.values().map(|f| f.r2_cv).fold(f64::NAN, f64::max)
    } else {
        f64::NAN
    };
    let path = decide_path(best_cv, config);
    info!("Best CV R² {:.3}, workflow path {}", best_cv, path);

    let mut surfaces = BTreeMap::new();
    let mut conditioning: BTreeMap<TargetVariable, Vec<SamplePoint>> = BTreeMap::new();

    if path.uses_regression() {
        let models: Vec<RidgeModel> = variables
            .iter()
            .filter_map(|v| fits.get(v).map(|f| f.model.clone()))
            .collect();
        let stacked = RidgeModel::stack(&models)?;
        let predicted = predict_surfaces(&stacked, grid, config.max_predictions)?;

        for (&var, mut surface) in variables.iter().zip(predicted) {
            clamp_to_bounds(&mut surface, var);
            let residuals = station_residuals(stations, &surface, var);
            conditioning.insert(
                var,
                residuals
                    .iter()
                    .filter_map(|r| r.residual.map(|v| SamplePoint::new(r.x, r.y, v)))
                    .collect(),
            );
            interm.residuals.insert(var, residuals);
            interm.regression.insert(var, surface.clone());
            surfaces.insert(var, surface);
        }
    }

    if path == WorkflowPath::PureKriging {
        for &var in variables {
            conditioning.insert(var, station_points(stations, var)?);
        }
    }

    if path.uses_kriging() {
        let mut missing = Vec::new();
        for &var in variables {
            let points = conditioning.get(&var).map(Vec::as_slice).unwrap_or(&[]);
            let model = fit_covariance(points, var, config);
            let kriged = model
                .as_ref()
                .and_then(|m| krige_surface(points, m, grid, var, config));
            interm.variograms.insert(var, model);

            match (path, kriged) {
                (WorkflowPath::RegressionKrigedResidual, Some(correction)) => {
                    if let Some(surface) = surfaces.get_mut(&var) {
                        surface.add(&correction)?;
                    }
                    interm.kriged_residuals.insert(var, correction);
                }
                (WorkflowPath::RegressionKrigedResidual, None) => {
                    warn!("{var}: keeping the uncorrected regression surface");
                }
                (_, Some(surface)) => {
                    surfaces.insert(var, surface);
                }
                (_, None) => {
                    error!("{var}: no covariance model and no regression fallback");
                    missing.push(var.key());
                }
            }
        }

        if !missing.is_empty() && config.partial_result == PartialResultPolicy::Abort {
            return Err(Error::PartialOutput(missing.join(", ")));
        }
    }

    if surfaces.is_empty() {
        return Err(Error::EmptyOutput);
    }

    for (&var, surface) in surfaces.iter_mut() {
        surface.restrict_to(grid.validity())?;
        clamp_to_bounds(surface, var);
    }

    let scores = score_surfaces(stations, &surfaces);
    let best_r2 = scores.values().map(|s| s.r2).fold(f64::NAN, f64::max);
    let qc = u8::from(best_r2 >= config.r2_threshold);
    info!("Station R² {:.3}, qc {}", best_r2, qc);

    Ok(InterpolationRun {
        path,
        surfaces,
        meta: OutputMeta {
            qc,
            wpath: path,
            scores,
        },
        intermediates: interm,
    })
}

/// Read inputs, interpolate and write every artefact under `layout`.
pub fn run_interpolation<P: AsRef<Path>, Q: AsRef<Path>>(
    stations_path: P,
    features_path: Q,
    layout: &OutputLayout,
    config: &InterpolationConfig,
) -> Result<InterpolationRun> {
    let stations = read_stations(stations_path.as_ref(), &config.variables)?;
    let grid = read_feature_grid(features_path.as_ref(), Some(config.nodata))?;
    info!(
        "Loaded {} stations and a {}x{} grid with {} bands",
        stations.len(),
        grid.rows(),
        grid.cols(),
        grid.n_bands()
    );

    let run = interpolate(&stations, &grid, config)?;
    write_outputs(&run.surfaces, &run.meta, &run.intermediates, layout, config)?;
    info!("{} has been processed", stations_path.as_ref().display());
    Ok(run)
}

fn train_regressions(
    design: &DesignMatrix,
    config: &InterpolationConfig,
) -> BTreeMap<TargetVariable, RidgeFit> {
    let params = config.ridge_params();
    let mut fits = BTreeMap::new();
    for &var in &config.variables {
        let trained = design
            .target(var)
            .and_then(|y| train_ridge_cv(design.features.view(), y.view(), &params));
        match trained {
            Ok(fit) => {
                info!(
                    "{var}: alpha {:.3}, R² train {:.2}, cv {:.2}",
                    fit.alpha, fit.r2_train, fit.r2_cv
                );
                fits.insert(var, fit);
            }
            Err(e) => warn!("{var}: regression training failed: {e}"),
        }
    }
    fits
}

fn clamp_to_bounds(surface: &mut Raster, var: TargetVariable) {
    if let Some((lo, hi)) = var.bounds() {
        surface.clamp(lo, hi);
    }
}

fn station_residuals(
    stations: &StationSet,
    surface: &Raster,
    var: TargetVariable,
) -> Vec<StationResidual> {
    stations
        .iter()
        .map(|s| {
            let residual = match (s.value(var), surface.sample(s.x, s.y)) {
                (Some(obs), Some(pred)) => Some(obs - pred),
                _ => None,
            };
            StationResidual {
                name: s.name.clone(),
                x: s.x,
                y: s.y,
                residual,
            }
        })
        .collect()
}

/// Fitted covariance model, or `None` (logged) when fitting fails.
fn fit_covariance(
    points: &[SamplePoint],
    var: TargetVariable,
    config: &InterpolationConfig,
) -> Option<FittedVariogram> {
    let fitted = empirical_variogram(points, &config.variogram_params())
        .and_then(|emp| fit_variogram(&emp, config.variogram_model));
    match fitted {
        Ok(model) => {
            info!(
                "{var}: {:?} nugget {:.4}, sill {:.4}, len_scale {:.1} m, R² {:.3}",
                model.model, model.nugget, model.sill, model.len_scale, model.r2
            );
            Some(model)
        }
        Err(e) => {
            warn!("{var}: covariance model fit failed: {e}");
            None
        }
    }
}

fn krige_surface(
    conditioning: &[SamplePoint],
    model: &FittedVariogram,
    grid: &FeatureGrid,
    var: TargetVariable,
    config: &InterpolationConfig,
) -> Option<Raster> {
    let points = merge_colocated(conditioning, COLOCATION_TOLERANCE);
    if points.len() < conditioning.len() {
        debug!("{var}: merged co-located stations into {} points", points.len());
    }
    let kriged = UniversalKriging::new(&points, model, config.exact).and_then(|krig| {
        let sim = ConditionalSimulation::new(
            &krig,
            &points,
            model,
            config.n_realizations,
            config.seed,
        )?;
        let field = sim.mean(&grid.x_axis(), &grid.y_axis())?;
        grid.surface(field)
    });
    match kriged {
        Ok(surface) => {
            debug!(
                "{var}: kriged {} cells from {} points",
                surface.valid_count(),
                points.len()
            );
            Some(surface)
        }
        Err(e) => {
            warn!("{var}: kriging failed: {e}");
            None
        }
    }
}

fn score_surfaces(
    stations: &StationSet,
    surfaces: &BTreeMap<TargetVariable, Raster>,
) -> BTreeMap<TargetVariable, ValidationScores> {
    let mut scores = BTreeMap::new();
    for (&var, surface) in surfaces {
        let (observed, predicted): (Vec<f64>, Vec<f64>) = stations
            .iter()
            .filter_map(|s| Some((s.value(var)?, surface.sample(s.x, s.y)?)))
            .unzip();
        match evaluate(&observed, &predicted) {
            Ok(s) => {
                debug!("{var}: station R² {:.3}, MAE {:.3}, N {}", s.r2, s.mae, s.n);
                scores.insert(var, s);
            }
            Err(e) => warn!("{var}: scoring skipped: {e}"),
        }
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use metgrid_core::{GeoTransform, Station};
    use ndarray::Array3;

    fn grid(n: usize) -> FeatureGrid {
        let bands = Array3::from_shape_fn((1, n, n), |(_, r, c)| (r * n + c) as f64);
        FeatureGrid::from_bands(bands, None)
            .unwrap()
            .with_transform(GeoTransform::new(0.0, n as f64 * 10.0, 10.0, -10.0))
    }

    fn stations(n: usize) -> StationSet {
        (0..n)
            .map(|i| {
                Station::new(format!("s{i}"), 5.0 + i as f64, 5.0)
                    .with_value(TargetVariable::AirTemperature, 20.0)
                    .with_value(TargetVariable::RelativeHumidity, 60.0)
            })
            .collect()
    }

    #[test]
    fn test_too_few_stations() {
        let err = interpolate(&stations(3), &grid(4), &InterpolationConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientStations {
                found: 3,
                required: 50
            }
        ));
    }

    #[test]
    fn test_invalid_variables_checked_first() {
        let config = InterpolationConfig {
            variables: vec![TargetVariable::AirTemperature],
            ..Default::default()
        };
        let err = interpolate(&stations(3), &grid(4), &config).unwrap_err();
        assert!(matches!(err, Error::InvalidVariables(_)));
    }

    #[test]
    fn test_station_residuals_mark_invalid_cells() {
        let mut surface = Raster::from_array(ndarray::Array2::from_elem((2, 2), 18.0))
            .with_transform(GeoTransform::new(0.0, 20.0, 10.0, -10.0));
        surface.set_invalid(0, 1).unwrap();
        let set: StationSet = vec![
            Station::new("a", 5.0, 15.0).with_value(TargetVariable::AirTemperature, 20.0),
            Station::new("b", 15.0, 15.0).with_value(TargetVariable::AirTemperature, 20.0),
        ]
        .into_iter()
        .collect();
        let res = station_residuals(&set, &surface, TargetVariable::AirTemperature);
        assert_eq!(res[0].residual, Some(2.0));
        assert_eq!(res[1].residual, None);
    }

    #[test]
    fn test_fit_covariance_failures_become_none() {
        let config = InterpolationConfig::default();
        let single = [SamplePoint::new(0.0, 0.0, 1.0)];
        assert!(fit_covariance(&single, TargetVariable::AirTemperature, &config).is_none());

        let flat: Vec<SamplePoint> = (0..20)
            .map(|i| SamplePoint::new(i as f64 * 100.0, 0.0, 3.0))
            .collect();
        assert!(fit_covariance(&flat, TargetVariable::AirTemperature, &config).is_none());
    }
}
