use float_ord::FloatOrd;
use log::debug;
use serde::Serialize;
use slice_group_by::GroupBy;

use crate::emissions::{estimate_cost_usd, estimate_emissions_kg};
use crate::problem::{Cost, FactoryIndex, Network, Quantity, RegionIndex, SupplierIndex};

/// Baseline key figures
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BaselineKpis {
    pub baseline_total_units: Quantity,
    pub baseline_total_co2_kg: f64,
    pub baseline_total_cost_usd: Cost,
    /// `None` when nothing is demanded
    pub avg_co2_per_unit_kg: Option<f64>,
}

/// A region served by its nearest factory
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Delivery {
    pub factory: FactoryIndex,
    pub region: RegionIndex,
    pub units: Quantity,
}

/// A factory supplied by its nearest supplier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shipment {
    pub supplier: SupplierIndex,
    pub factory: FactoryIndex,
    pub tons: Quantity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Baseline {
    pub deliveries: Vec<Delivery>,
    pub shipments: Vec<Shipment>,
    pub kpis: BaselineKpis,
}

/// Picks the nearest origin for every destination.
///
/// Candidates are sorted by (destination, distance) and the first of each destination group is
/// kept. The sort is stable, so ties go to the origin listed first.
fn nearest<O: Copy, D: Copy + Ord>(mut candidates: Vec<(D, f64, O)>) -> Vec<(D, O)> {
    candidates.sort_by_key(|(d, distance, _)| (*d, FloatOrd(*distance)));
    candidates
        .linear_group_by_key(|(d, _, _)| *d)
        .map(|group| (group[0].0, group[0].2))
        .collect()
}

impl Baseline {
    /// Serves every region from its nearest factory. Material is estimated from total demand
    /// split evenly over all factories, not from that assignment, and comes from the nearest
    /// supplier of each factory. Capacities are ignored.
    pub fn new(network: &Network) -> Baseline {
        let product = network.product();
        let factories = network.factory_indices().collect::<Vec<FactoryIndex>>();

        // 1) every region gets all of its demand from the nearest factory
        let candidates = network
            .region_indices()
            .flat_map(|r| {
                factories
                    .iter()
                    .map(move |&f| (r, network.delivery_route(f, r).distance_km, f))
            })
            .collect();
        let deliveries = nearest(candidates)
            .into_iter()
            .map(|(region, factory)| Delivery {
                factory,
                region,
                units: network.demand(region),
            })
            .collect::<Vec<_>>();

        // 2-4) total demand is split evenly over the factories and converted to material
        let total_units = network.total_demand();
        let per_factory_units = total_units / factories.len() as f64;
        let per_factory_tons = product.material_tons(per_factory_units);

        // 5) every factory gets its share from the nearest supplier
        let candidates = factories
            .iter()
            .flat_map(|&f| {
                network
                    .supplier_indices()
                    .map(move |s| (f, network.supply_route(s, f).distance_km, s))
            })
            .collect();
        let shipments = nearest(candidates)
            .into_iter()
            .map(|(factory, supplier)| Shipment {
                supplier,
                factory,
                tons: per_factory_tons,
            })
            .collect::<Vec<_>>();

        // 6) emissions and cost over both hops
        let mut co2 = 0.0;
        let mut cost = 0.0;
        for d in &deliveries {
            let route = network.delivery_route(d.factory, d.region);
            let tons = product.weight_tons(d.units);
            co2 += estimate_emissions_kg(route.distance_km, tons, route.ef_kg_per_ton_km);
            cost += estimate_cost_usd(route.distance_km, tons, route.cost_per_ton_km);
        }
        for s in &shipments {
            let route = network.supply_route(s.supplier, s.factory);
            co2 += estimate_emissions_kg(route.distance_km, s.tons, route.ef_kg_per_ton_km);
            cost += estimate_cost_usd(route.distance_km, s.tons, route.cost_per_ton_km);
        }

        let kpis = BaselineKpis {
            baseline_total_units: total_units,
            baseline_total_co2_kg: co2,
            baseline_total_cost_usd: cost,
            avg_co2_per_unit_kg: per_unit(co2, total_units),
        };
        debug!("Baseline: {:?}", kpis);

        Baseline {
            deliveries,
            shipments,
            kpis,
        }
    }

    /// The cost of the baseline allocation
    pub fn cost(&self) -> Cost {
        self.kpis.baseline_total_cost_usd
    }
}

/// `total / units`, or `None` when no units are involved
pub fn per_unit(total: f64, units: Quantity) -> Option<f64> {
    match units > 0.0 {
        true => Some(total / units),
        false => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emissions::TransportMode;
    use crate::problem::fixtures::*;
    use crate::problem::{Network, Product};

    fn product() -> Product {
        Product {
            weight_kg_per_unit: 0.5,
            material_kg_per_unit: 0.4,
        }
    }

    /// Suppliers at x = 0 and 10, factories at x = 1 and 9, regions at x = 2 and 8 (km)
    fn line_network(demand: [f64; 2]) -> Network {
        let mut supply = Vec::new();
        for (s, xs) in [("S1", 0.0), ("S2", 10.0)] {
            for (f, xf) in [("F1", 1.0), ("F2", 9.0)] {
                supply.push(edge(s, f, TransportMode::Truck, f64::abs(xs - xf)));
            }
        }
        let mut delivery = Vec::new();
        for (f, xf) in [("F1", 1.0), ("F2", 9.0)] {
            for (r, xr) in [("R1", 2.0), ("R2", 8.0)] {
                delivery.push(edge(f, r, TransportMode::Rail, f64::abs(xf - xr)));
            }
        }

        Network::new(
            vec![supplier("S1", 0.0, 0.0, 1.0), supplier("S2", 0.0, 0.0, 1.0)],
            vec![factory("F1", 0.0, 0.0, 1.0), factory("F2", 0.0, 0.0, 1.0)],
            vec![region("R1", 0.0, 0.0), region("R2", 0.0, 0.0)],
            vec![("R1".to_string(), demand[0]), ("R2".to_string(), demand[1])],
            product(),
            supply,
            delivery,
        )
        .unwrap()
    }

    #[test]
    fn nearest_routes_are_selected() {
        let baseline = Baseline::new(&line_network([1000.0, 3000.0]));

        let served = baseline
            .deliveries
            .iter()
            .map(|d| (*d.region, *d.factory, d.units))
            .collect::<Vec<_>>();
        assert_eq!(served, vec![(0, 0, 1000.0), (1, 1, 3000.0)]);

        let supplied = baseline
            .shipments
            .iter()
            .map(|s| (*s.factory, *s.supplier))
            .collect::<Vec<_>>();
        assert_eq!(supplied, vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn material_is_split_evenly_not_by_assignment() {
        let baseline = Baseline::new(&line_network([1000.0, 3000.0]));
        // 4000 units / 2 factories * 0.4 kg = 0.8 t each, although F2 serves three times F1's demand
        for shipment in &baseline.shipments {
            assert!((shipment.tons - 0.8).abs() < 1e-12);
        }
    }

    #[test]
    fn kpis_sum_both_hops() {
        let baseline = Baseline::new(&line_network([1000.0, 3000.0]));
        // product: (1000 + 3000) units * 0.5 kg = 2 t over 1 km by rail
        // material: 2 * 0.8 t over 1 km by truck
        let co2 = 2.0 * 0.03 + 1.6 * 0.10;
        let cost = 2.0 * 0.05 + 1.6 * 0.09;
        let kpis = baseline.kpis;
        assert_eq!(kpis.baseline_total_units, 4000.0);
        assert!((kpis.baseline_total_co2_kg - co2).abs() < 1e-9);
        assert!((kpis.baseline_total_cost_usd - cost).abs() < 1e-9);
        assert!((kpis.avg_co2_per_unit_kg.unwrap() - co2 / 4000.0).abs() < 1e-12);
        assert_eq!(baseline.cost(), kpis.baseline_total_cost_usd);
    }

    #[test]
    fn zero_demand_has_no_per_unit_kpi() {
        let baseline = Baseline::new(&line_network([0.0, 0.0]));
        assert_eq!(baseline.kpis.baseline_total_co2_kg, 0.0);
        assert_eq!(baseline.kpis.avg_co2_per_unit_kg, None);
    }

    #[test]
    fn baseline_is_deterministic() {
        let network = small_network();
        assert_eq!(Baseline::new(&network), Baseline::new(&network));
    }
}
