use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The radius of the earth used for great-circle distances
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometers between two lat/lon pairs given in degrees.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// The ways cargo can be moved along a route
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[display(fmt = "truck")]
    Truck,
    #[display(fmt = "rail")]
    Rail,
    #[display(fmt = "ship")]
    Ship,
    #[display(fmt = "air")]
    Air,
}

impl TransportMode {
    pub const ALL: [TransportMode; 4] = [
        TransportMode::Truck,
        TransportMode::Rail,
        TransportMode::Ship,
        TransportMode::Air,
    ];

    /// kg CO2 per ton-km
    pub fn emission_factor(self) -> f64 {
        match self {
            TransportMode::Truck => 0.10,
            TransportMode::Rail => 0.03,
            TransportMode::Ship => 0.015,
            TransportMode::Air => 0.6,
        }
    }

    /// Currency per ton-km
    pub fn cost_factor(self) -> f64 {
        match self {
            TransportMode::Truck => 0.09,
            TransportMode::Rail => 0.05,
            TransportMode::Ship => 0.03,
            TransportMode::Air => 0.8,
        }
    }
}

#[derive(Debug, Display, Clone, PartialEq, Eq)]
#[display(fmt = "unknown transport mode '{}'", _0)]
pub struct UnknownMode(pub String);

impl std::error::Error for UnknownMode {}

impl FromStr for TransportMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "truck" => Ok(TransportMode::Truck),
            "rail" => Ok(TransportMode::Rail),
            "ship" => Ok(TransportMode::Ship),
            "air" => Ok(TransportMode::Air),
            _ => Err(UnknownMode(s.to_string())),
        }
    }
}

/// Emission factor (kg CO2 per ton-km) of the mode with the given name
pub fn emission_factor(mode: &str) -> Result<f64, UnknownMode> {
    mode.parse::<TransportMode>().map(TransportMode::emission_factor)
}

/// Cost factor (currency per ton-km) of the mode with the given name
pub fn cost_factor(mode: &str) -> Result<f64, UnknownMode> {
    mode.parse::<TransportMode>().map(TransportMode::cost_factor)
}

/// Emissions of moving `load_tons` over `distance_km`. Degenerate inputs yield zero.
pub fn estimate_emissions_kg(distance_km: f64, load_tons: f64, ef_kg_per_ton_km: f64) -> f64 {
    if distance_km <= 0.0 || load_tons <= 0.0 || ef_kg_per_ton_km <= 0.0 {
        return 0.0;
    }
    distance_km * load_tons * ef_kg_per_ton_km
}

/// Cost of moving `load_tons` over `distance_km`. Degenerate inputs yield zero.
pub fn estimate_cost_usd(distance_km: f64, load_tons: f64, cost_per_ton_km: f64) -> f64 {
    if distance_km <= 0.0 || load_tons <= 0.0 || cost_per_ton_km <= 0.0 {
        return 0.0;
    }
    distance_km * load_tons * cost_per_ton_km
}
