use std::fs::{self, File};
use std::path::Path;

use derive_more::{Display, From};
use log::{debug, info};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use slice_group_by::GroupBy;

use crate::emissions::TransportMode;
use crate::parse::{parse_mode, LoadError, Tables, ROUTES_FAC_TO_REG, ROUTES_SUP_TO_FAC};

pub const MODEL_FILE: &str = "emissions_model.json";
pub const METRICS_FILE: &str = "metrics.json";

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RouteType {
    /// supplier -> factory, material
    #[display(fmt = "S2F")]
    S2F,
    /// factory -> region, product
    #[display(fmt = "F2R")]
    F2R,
}

/// One training sample: emissions of the reference load along a route
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub distance_km: f64,
    pub mode: TransportMode,
    pub route_type: RouteType,
    pub emissions_kg: f64,
}

#[derive(Debug, Display, From)]
pub enum PredictError {
    #[display(fmt = "{}", _0)]
    Load(LoadError),
    #[display(fmt = "i/o error: {}", _0)]
    Io(std::io::Error),
    #[display(fmt = "invalid model file: {}", _0)]
    Json(serde_json::Error),
    #[display(fmt = "no training samples")]
    #[from(ignore)]
    NoSamples,
}

impl std::error::Error for PredictError {}

/// The samples of both route tables
pub fn training_frame(tables: &Tables) -> Result<Vec<Sample>, LoadError> {
    let tons_per_unit = tables.product()?.weight_kg_per_unit / 1000.0;

    let mut samples = Vec::new();
    for (i, route) in tables.routes_sup_to_fac.iter().enumerate() {
        samples.push(Sample {
            distance_km: route.distance_km,
            mode: parse_mode(ROUTES_SUP_TO_FAC, i, &route.mode)?,
            route_type: RouteType::S2F,
            emissions_kg: route.distance_km * route.ef_kg_per_ton_km,
        });
    }
    for (i, route) in tables.routes_fac_to_reg.iter().enumerate() {
        samples.push(Sample {
            distance_km: route.distance_km,
            mode: parse_mode(ROUTES_FAC_TO_REG, i, &route.mode)?,
            route_type: RouteType::F2R,
            emissions_kg: route.distance_km * route.ef_kg_per_ton_km * tons_per_unit,
        });
    }

    Ok(samples)
}

/// `emissions = intercept + slope * distance`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub intercept: f64,
    pub slope: f64,
}

impl LinearFit {
    /// Ordinary least squares. Without any spread in distance the fit is the mean.
    pub fn fit(x: &Array1<f64>, y: &Array1<f64>) -> Option<LinearFit> {
        let mx = x.mean()?;
        let my = y.mean()?;
        let dx = x - mx;
        let dy = y - my;
        let sxx = dx.dot(&dx);

        let slope = match sxx > f64::EPSILON {
            true => dx.dot(&dy) / sxx,
            false => 0.0,
        };
        Some(LinearFit {
            intercept: my - slope * mx,
            slope,
        })
    }

    pub fn predict(&self, distance_km: f64) -> f64 {
        self.intercept + self.slope * distance_km
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupFit {
    pub route_type: RouteType,
    pub mode: TransportMode,
    pub n: usize,
    pub fit: LinearFit,
}

/// Accuracy of a model on a set of samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub mae: f64,
    pub r2: f64,
    pub n: usize,
}

/// A linear fit of emissions on distance per (route type, mode) group. Groups never seen in
/// training fall back to a fit over all samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionsModel {
    pub groups: Vec<GroupFit>,
    pub fallback: LinearFit,
}

fn columns(samples: &[Sample]) -> (Array1<f64>, Array1<f64>) {
    let x = samples.iter().map(|s| s.distance_km).collect();
    let y = samples.iter().map(|s| s.emissions_kg).collect();
    (x, y)
}

impl EmissionsModel {
    pub fn fit(samples: &[Sample]) -> Result<EmissionsModel, PredictError> {
        let (x, y) = columns(samples);
        let fallback = LinearFit::fit(&x, &y).ok_or(PredictError::NoSamples)?;

        let mut sorted = samples.to_vec();
        sorted.sort_by_key(|s| (s.route_type, s.mode));

        let mut groups = Vec::new();
        for group in sorted.linear_group_by_key(|s| (s.route_type, s.mode)) {
            let (x, y) = columns(group);
            if let Some(fit) = LinearFit::fit(&x, &y) {
                debug!(
                    "{} {}: {} samples, {:.6} kg/km",
                    group[0].route_type,
                    group[0].mode,
                    group.len(),
                    fit.slope
                );
                groups.push(GroupFit {
                    route_type: group[0].route_type,
                    mode: group[0].mode,
                    n: group.len(),
                    fit,
                });
            }
        }

        Ok(EmissionsModel { groups, fallback })
    }

    /// Estimated emissions (kg CO2) of the reference load along a route
    pub fn predict(&self, distance_km: f64, mode: TransportMode, route_type: RouteType) -> f64 {
        let fit = self
            .groups
            .iter()
            .find(|g| g.mode == mode && g.route_type == route_type)
            .map(|g| &g.fit)
            .unwrap_or(&self.fallback);
        fit.predict(distance_km)
    }

    /// Mean absolute error and coefficient of determination on `samples`
    pub fn evaluate(&self, samples: &[Sample]) -> Metrics {
        let (_, y) = columns(samples);
        let predictions = samples
            .iter()
            .map(|s| self.predict(s.distance_km, s.mode, s.route_type))
            .collect::<Array1<f64>>();

        let n = samples.len();
        let residuals = &y - &predictions;
        let mae = match n {
            0 => 0.0,
            _ => residuals.mapv(f64::abs).sum() / n as f64,
        };

        let ss_res = residuals.dot(&residuals);
        let ss_tot = y.mean().map(|m| (&y - m).mapv(|d| d * d).sum()).unwrap_or(0.0);
        // a constant target is either matched exactly or not at all
        let r2 = match ss_tot > 0.0 {
            true => 1.0 - ss_res / ss_tot,
            false if ss_res <= f64::EPSILON => 1.0,
            false => 0.0,
        };

        Metrics { mae, r2, n }
    }

    pub fn save(&self, path: &Path) -> Result<(), PredictError> {
        serde_json::to_writer_pretty(File::create(path)?, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<EmissionsModel, PredictError> {
        Ok(serde_json::from_reader(File::open(path)?)?)
    }
}

/// Fits the model on the tables in `data_dir` and stores it with its metrics in `model_dir`
pub fn train_model(data_dir: &Path, model_dir: &Path) -> Result<Metrics, PredictError> {
    fs::create_dir_all(model_dir)?;

    let samples = training_frame(&Tables::read(data_dir)?)?;
    let model = EmissionsModel::fit(&samples)?;
    let metrics = model.evaluate(&samples);

    model.save(&model_dir.join(MODEL_FILE))?;
    serde_json::to_writer_pretty(File::create(model_dir.join(METRICS_FILE))?, &metrics)?;

    info!(
        "Model trained. MAE={:.4}, R2={:.4}, n={}. Saved to {}",
        metrics.mae,
        metrics.r2,
        metrics.n,
        model_dir.display()
    );
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::{generate, GeneratorConfig};
    use ndarray::array;
    use uuid::Uuid;

    #[test]
    fn least_squares_recovers_a_line() {
        let fit = LinearFit::fit(&array![0.0, 1.0, 2.0, 3.0], &array![1.0, 3.0, 5.0, 7.0]).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);

        let flat = LinearFit::fit(&array![5.0, 5.0], &array![1.0, 3.0]).unwrap();
        assert_eq!(flat, LinearFit { intercept: 2.0, slope: 0.0 });

        assert_eq!(LinearFit::fit(&array![], &array![]), None);
    }

    #[test]
    fn training_frame_uses_reference_loads() {
        let tables = generate(&GeneratorConfig::default()).unwrap();
        let samples = training_frame(&tables).unwrap();
        assert_eq!(samples.len(), 15 * 5 + 5 * 10);

        let route = &tables.routes_fac_to_reg[0];
        let sample = samples
            .iter()
            .find(|s| s.route_type == RouteType::F2R)
            .unwrap();
        // one unit of 0.5 kg
        let expected = route.distance_km * route.ef_kg_per_ton_km * 0.0005;
        assert!((sample.emissions_kg - expected).abs() < 1e-12);
    }

    #[test]
    fn grouped_fit_explains_the_factors() {
        let tables = generate(&GeneratorConfig::default()).unwrap();
        let samples = training_frame(&tables).unwrap();
        let model = EmissionsModel::fit(&samples).unwrap();
        let metrics = model.evaluate(&samples);

        assert_eq!(metrics.n, samples.len());
        assert!(metrics.mae < 1e-6, "mae {}", metrics.mae);
        assert!(metrics.r2 > 0.999, "r2 {}", metrics.r2);

        // 100 km by rail with one ton
        if model
            .groups
            .iter()
            .any(|g| g.route_type == RouteType::S2F && g.mode == TransportMode::Rail && g.n > 1)
        {
            let predicted = model.predict(100.0, TransportMode::Rail, RouteType::S2F);
            assert!((predicted - 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn unseen_group_uses_the_fallback() {
        let samples = [
            Sample {
                distance_km: 10.0,
                mode: TransportMode::Truck,
                route_type: RouteType::S2F,
                emissions_kg: 1.0,
            },
            Sample {
                distance_km: 20.0,
                mode: TransportMode::Truck,
                route_type: RouteType::S2F,
                emissions_kg: 2.0,
            },
        ];
        let model = EmissionsModel::fit(&samples).unwrap();
        assert_eq!(model.groups.len(), 1);
        let predicted = model.predict(30.0, TransportMode::Air, RouteType::F2R);
        assert!((predicted - model.fallback.predict(30.0)).abs() < 1e-12);
        assert!((predicted - 3.0).abs() < 1e-9);
    }

    #[test]
    fn no_samples_cannot_be_fitted() {
        assert!(matches!(EmissionsModel::fit(&[]), Err(PredictError::NoSamples)));
    }

    #[test]
    fn trained_model_is_stored_with_its_metrics() {
        let root = std::env::temp_dir().join(format!("cfo-{}", Uuid::new_v4()));
        let data_dir = root.join("data");
        let model_dir = root.join("model");
        generate(&GeneratorConfig::default()).unwrap().write(&data_dir).unwrap();

        let metrics = train_model(&data_dir, &model_dir).unwrap();
        let stored: Metrics =
            serde_json::from_reader(File::open(model_dir.join(METRICS_FILE)).unwrap()).unwrap();
        assert_eq!(stored.n, metrics.n);
        assert!((stored.r2 - metrics.r2).abs() < 1e-9);

        let model = EmissionsModel::load(&model_dir.join(MODEL_FILE)).unwrap();
        let samples = training_frame(&Tables::read(&data_dir).unwrap()).unwrap();
        let reloaded = model.evaluate(&samples);
        assert_eq!(reloaded.n, metrics.n);
        assert!(reloaded.mae < 1e-6);

        fs::remove_dir_all(root).unwrap();
    }
}
