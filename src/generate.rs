use derive_more::Display;
use log::info;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::emissions::{haversine_km, TransportMode};
use crate::parse::{
    DeliveryRouteRow, DemandRow, FactoryRow, ProductRow, RegionRow, SupplierRow, SupplyRouteRow,
    Tables,
};
use crate::problem::Quantity;

/// Latitude bounds of the generated points
pub const LAT_BOUNDS: (f64, f64) = (36.0, 60.0);
/// Longitude bounds of the generated points
pub const LON_BOUNDS: (f64, f64) = (-10.0, 30.0);

/// Mode probabilities of supplier -> factory routes, mostly trucks
pub const SUPPLY_MODES: [(TransportMode, f64); 4] = [
    (TransportMode::Truck, 0.6),
    (TransportMode::Rail, 0.2),
    (TransportMode::Ship, 0.15),
    (TransportMode::Air, 0.05),
];
/// Mode probabilities of factory -> region routes. Trucks dominate, air is rare.
pub const DELIVERY_MODES: [(TransportMode, f64); 4] = [
    (TransportMode::Truck, 0.7),
    (TransportMode::Rail, 0.2),
    (TransportMode::Ship, 0.08),
    (TransportMode::Air, 0.02),
];

const MATERIALS: [&str; 4] = ["glass", "plastic", "paper", "pigment"];
const CITIES: [&str; 16] = [
    "Lisbon", "Madrid", "Lyon", "Milan", "Munich", "Vienna", "Prague", "Warsaw", "Hamburg",
    "Copenhagen", "Stockholm", "Rotterdam", "Antwerp", "Zurich", "Budapest", "Athens",
];
const PRODUCT_NAME: &str = "Beauty Product";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub num_suppliers: usize,
    pub num_factories: usize,
    pub num_regions: usize,
    pub product_weight_kg: f64,
    pub material_kg_per_unit: f64,
    /// (min, max) supply capacity in tons
    pub supplier_supply_tons: (Quantity, Quantity),
    /// (min, max) production capacity in units, inclusive
    pub factory_capacity_units: (Quantity, Quantity),
    /// (min, max) demand in units, inclusive
    pub region_demand_units: (Quantity, Quantity),
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            num_suppliers: 15,
            num_factories: 5,
            num_regions: 10,
            product_weight_kg: 0.5,
            material_kg_per_unit: 0.4,
            supplier_supply_tons: (200.0, 800.0),
            factory_capacity_units: (5000.0, 20000.0),
            region_demand_units: (1500.0, 6000.0),
            seed: 42,
        }
    }
}

#[derive(Debug, Display, Clone, PartialEq)]
pub enum GenerateError {
    #[display(fmt = "{} must be at least 1", _0)]
    NoEntities(&'static str),
    #[display(fmt = "{} must be a non-negative range, got ({}, {})", field, min, max)]
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
    },
    #[display(fmt = "{} must be positive, got {}", field, value)]
    InvalidValue { field: &'static str, value: f64 },
    /// None of the modes of a stage has a positive weight
    #[display(fmt = "no transport mode can be chosen for {}", _0)]
    NoModes(&'static str),
}

impl std::error::Error for GenerateError {}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<(), GenerateError> {
        let counts = [
            ("num_suppliers", self.num_suppliers),
            ("num_factories", self.num_factories),
            ("num_regions", self.num_regions),
        ];
        for (field, n) in counts {
            if n == 0 {
                return Err(GenerateError::NoEntities(field));
            }
        }

        let values = [
            ("product_weight_kg", self.product_weight_kg),
            ("material_kg_per_unit", self.material_kg_per_unit),
        ];
        for (field, value) in values {
            if !value.is_finite() || value <= 0.0 {
                return Err(GenerateError::InvalidValue { field, value });
            }
        }

        let ranges = [
            ("supplier_supply_tons", self.supplier_supply_tons),
            ("factory_capacity_units", self.factory_capacity_units),
            ("region_demand_units", self.region_demand_units),
        ];
        for (field, (min, max)) in ranges {
            if !min.is_finite() || !max.is_finite() || min < 0.0 || min > max {
                return Err(GenerateError::InvalidRange { field, min, max });
            }
        }

        Ok(())
    }
}

/// Picks a mode with probability proportional to its weight. Negative weights count as zero.
/// Returns `None` if no mode has a positive weight.
pub fn choose_mode<R: Rng>(modes: &[(TransportMode, f64)], rng: &mut R) -> Option<TransportMode> {
    let weight = |p: f64| p.max(0.0);
    let total: f64 = modes.iter().map(|(_, p)| weight(*p)).sum();
    if !total.is_finite() || total <= 0.0 {
        return None;
    }
    let threshold = rng.gen_range(0.0..total);

    let mut sum = 0.0;
    for (mode, p) in modes {
        sum += weight(*p);
        if sum > threshold {
            return Some(*mode);
        }
    }

    // only reachable through rounding in the sum
    modes.iter().rev().find(|(_, p)| weight(*p) > 0.0).map(|(mode, _)| *mode)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn point<R: Rng>(rng: &mut R) -> (f64, f64) {
    let lat = rng.gen_range(LAT_BOUNDS.0..LAT_BOUNDS.1);
    let lon = rng.gen_range(LON_BOUNDS.0..LON_BOUNDS.1);
    (lat, lon)
}

/// A whole number drawn from the inclusive range `(min, max)`
fn whole<R: Rng>((min, max): (Quantity, Quantity), rng: &mut R) -> Quantity {
    rng.gen_range(min..=max).round()
}

/// Generates a network with a generator seeded from `config.seed`
pub fn generate(config: &GeneratorConfig) -> Result<Tables, GenerateError> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    generate_with_rng(config, &mut rng)
}

pub fn generate_with_rng<R: Rng>(
    config: &GeneratorConfig,
    rng: &mut R,
) -> Result<Tables, GenerateError> {
    config.validate()?;

    let suppliers = (0..config.num_suppliers)
        .map(|i| {
            let (lat, lon) = point(rng);
            let (min, max) = config.supplier_supply_tons;
            SupplierRow {
                supplier_id: format!("S{:03}", i + 1),
                name: Some(format!("Supplier {}", i + 1)),
                lat,
                lon,
                material_type: MATERIALS[rng.gen_range(0..MATERIALS.len())].to_string(),
                supply_capacity_tons: round2(rng.gen_range(min..=max)),
            }
        })
        .collect::<Vec<_>>();

    let factories = (0..config.num_factories)
        .map(|i| {
            let (lat, lon) = point(rng);
            FactoryRow {
                factory_id: format!("F{:02}", i + 1),
                name: Some(format!("Factory {}", i + 1)),
                lat,
                lon,
                capacity_units: whole(config.factory_capacity_units, rng),
            }
        })
        .collect::<Vec<_>>();

    let regions = (0..config.num_regions)
        .map(|i| {
            let (lat, lon) = point(rng);
            RegionRow {
                region_id: format!("R{:03}", i + 1),
                name: CITIES.choose(rng).map(|city| city.to_string()),
                lat,
                lon,
            }
        })
        .collect::<Vec<_>>();

    let demand = regions
        .iter()
        .map(|r| DemandRow {
            region_id: r.region_id.clone(),
            product: Some(PRODUCT_NAME.to_string()),
            units_demanded: whole(config.region_demand_units, rng),
        })
        .collect::<Vec<_>>();

    let product = vec![ProductRow {
        product_id: Some("P001".to_string()),
        name: Some(PRODUCT_NAME.to_string()),
        weight_kg_per_unit: config.product_weight_kg,
        material_kg_per_unit: config.material_kg_per_unit,
    }];

    let mut routes_sup_to_fac = Vec::with_capacity(suppliers.len() * factories.len());
    for s in &suppliers {
        for f in &factories {
            let mode = choose_mode(&SUPPLY_MODES, rng)
                .ok_or(GenerateError::NoModes("routes_sup_to_fac"))?;
            routes_sup_to_fac.push(SupplyRouteRow {
                supplier_id: s.supplier_id.clone(),
                factory_id: f.factory_id.clone(),
                mode: mode.to_string(),
                distance_km: round2(haversine_km(s.lat, s.lon, f.lat, f.lon)),
                ef_kg_per_ton_km: mode.emission_factor(),
                cost_per_ton_km: mode.cost_factor(),
            });
        }
    }

    let mut routes_fac_to_reg = Vec::with_capacity(factories.len() * regions.len());
    for f in &factories {
        for r in &regions {
            let mode = choose_mode(&DELIVERY_MODES, rng)
                .ok_or(GenerateError::NoModes("routes_fac_to_reg"))?;
            routes_fac_to_reg.push(DeliveryRouteRow {
                factory_id: f.factory_id.clone(),
                region_id: r.region_id.clone(),
                mode: mode.to_string(),
                distance_km: round2(haversine_km(f.lat, f.lon, r.lat, r.lon)),
                ef_kg_per_ton_km: mode.emission_factor(),
                cost_per_ton_km: mode.cost_factor(),
            });
        }
    }

    info!(
        "Generated {} suppliers, {} factories, {} regions and {} routes",
        suppliers.len(),
        factories.len(),
        regions.len(),
        routes_sup_to_fac.len() + routes_fac_to_reg.len()
    );

    Ok(Tables {
        suppliers,
        factories,
        regions,
        demand,
        product,
        routes_sup_to_fac,
        routes_fac_to_reg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_gives_same_tables() {
        let config = GeneratorConfig::default();
        assert_eq!(generate(&config).unwrap(), generate(&config).unwrap());

        let other = GeneratorConfig {
            seed: 7,
            ..Default::default()
        };
        assert_ne!(generate(&config).unwrap(), generate(&other).unwrap());
    }

    #[test]
    fn tables_follow_the_configuration() {
        let config = GeneratorConfig::default();
        let tables = generate(&config).unwrap();

        assert_eq!(tables.suppliers.len(), 15);
        assert_eq!(tables.factories.len(), 5);
        assert_eq!(tables.regions.len(), 10);
        assert_eq!(tables.demand.len(), 10);
        assert_eq!(tables.routes_sup_to_fac.len(), 15 * 5);
        assert_eq!(tables.routes_fac_to_reg.len(), 5 * 10);

        assert_eq!(tables.suppliers[0].supplier_id, "S001");
        assert_eq!(tables.factories[4].factory_id, "F05");
        assert_eq!(tables.regions[9].region_id, "R010");

        for s in &tables.suppliers {
            assert!((LAT_BOUNDS.0..LAT_BOUNDS.1).contains(&s.lat));
            assert!((LON_BOUNDS.0..LON_BOUNDS.1).contains(&s.lon));
            assert!((200.0..=800.0).contains(&s.supply_capacity_tons));
            assert!(MATERIALS.contains(&s.material_type.as_str()));
        }
        for f in &tables.factories {
            assert!((5000.0..=20000.0).contains(&f.capacity_units));
            assert_eq!(f.capacity_units.fract(), 0.0);
        }
        for d in &tables.demand {
            assert!((1500.0..=6000.0).contains(&d.units_demanded));
        }
    }

    #[test]
    fn routes_carry_the_factors_of_their_mode() {
        let tables = generate(&GeneratorConfig::default()).unwrap();
        for route in &tables.routes_fac_to_reg {
            let mode: TransportMode = route.mode.parse().unwrap();
            assert_eq!(route.ef_kg_per_ton_km, mode.emission_factor());
            assert_eq!(route.cost_per_ton_km, mode.cost_factor());
            assert_eq!(route.distance_km, round2(route.distance_km));
        }
    }

    #[test]
    fn modes_follow_their_weights() {
        let mut rng = StdRng::seed_from_u64(3);
        let n = 10_000;
        let trucks = (0..n)
            .filter(|_| choose_mode(&DELIVERY_MODES, &mut rng) == Some(TransportMode::Truck))
            .count();
        let share = trucks as f64 / n as f64;
        assert!((share - 0.7).abs() < 0.03, "truck share {}", share);

        let only_rail = [(TransportMode::Rail, 1.0), (TransportMode::Air, 0.0)];
        assert!((0..100).all(|_| choose_mode(&only_rail, &mut rng) == Some(TransportMode::Rail)));

        let unweighted = [(TransportMode::Rail, 0.0), (TransportMode::Air, -1.0)];
        assert_eq!(choose_mode(&unweighted, &mut rng), None);
        assert_eq!(choose_mode(&[], &mut rng), None);
    }

    #[test]
    fn equal_bounds_give_constant_values() {
        let config = GeneratorConfig {
            supplier_supply_tons: (300.0, 300.0),
            factory_capacity_units: (8000.0, 8000.0),
            region_demand_units: (2000.0, 2000.0),
            ..Default::default()
        };
        let tables = generate(&config).unwrap();
        assert!(tables.suppliers.iter().all(|s| s.supply_capacity_tons == 300.0));
        assert!(tables.factories.iter().all(|f| f.capacity_units == 8000.0));
        assert!(tables.demand.iter().all(|d| d.units_demanded == 2000.0));
    }

    #[test]
    fn degenerate_configuration_is_rejected() {
        let reversed = GeneratorConfig {
            factory_capacity_units: (20000.0, 5000.0),
            ..Default::default()
        };
        assert_eq!(
            generate(&reversed).unwrap_err(),
            GenerateError::InvalidRange {
                field: "factory_capacity_units",
                min: 20000.0,
                max: 5000.0
            }
        );

        let unbounded = GeneratorConfig {
            supplier_supply_tons: (200.0, f64::INFINITY),
            ..Default::default()
        };
        assert!(matches!(
            generate(&unbounded),
            Err(GenerateError::InvalidRange {
                field: "supplier_supply_tons",
                ..
            })
        ));

        let no_regions = GeneratorConfig {
            num_regions: 0,
            ..Default::default()
        };
        assert_eq!(
            generate(&no_regions).unwrap_err(),
            GenerateError::NoEntities("num_regions")
        );

        let weightless = GeneratorConfig {
            product_weight_kg: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            generate(&weightless),
            Err(GenerateError::InvalidValue {
                field: "product_weight_kg",
                ..
            })
        ));
    }
}
