use std::collections::{HashMap, HashSet};

use derive_more::{Deref, Display, From, Into};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use typed_index_collections::TiVec;

use crate::emissions::{haversine_km, TransportMode};

/// The type used for material quantities (tons) and product quantities (units)
pub type Quantity = f64;
/// The type used for distance (km)
pub type Distance = f64;
/// The type used for cost
pub type Cost = f64;

#[derive(Deref, Debug, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash)]
pub struct SupplierIndex(usize);

#[derive(Deref, Debug, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash)]
pub struct FactoryIndex(usize);

#[derive(Deref, Debug, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash)]
pub struct RegionIndex(usize);

/// A point on the globe, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance to `other`
    pub fn distance_to(&self, other: &Position) -> Distance {
        haversine_km(self.lat, self.lon, other.lat, other.lon)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Supplier {
    pub id: String,
    pub name: Option<String>,
    pub position: Position,
    pub material_type: String,
    /// The maximum amount of material this supplier can ship, in tons
    pub supply_capacity_tons: Quantity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Factory {
    pub id: String,
    pub name: Option<String>,
    pub position: Position,
    /// The maximum number of product units the factory can produce
    pub capacity_units: Quantity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub id: String,
    pub name: Option<String>,
    pub position: Position,
}

/// Unit conversion constants shared by every computation in a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub weight_kg_per_unit: f64,
    pub material_kg_per_unit: f64,
}

impl Product {
    /// The material (tons) required to produce `units` units
    pub fn material_tons(&self, units: Quantity) -> Quantity {
        units * self.material_kg_per_unit / 1000.0
    }

    /// The shipping weight (tons) of `units` units
    pub fn weight_tons(&self, units: Quantity) -> Quantity {
        units * self.weight_kg_per_unit / 1000.0
    }
}

/// A single transport link between two nodes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Route {
    pub mode: TransportMode,
    pub distance_km: Distance,
    pub ef_kg_per_ton_km: f64,
    pub cost_per_ton_km: f64,
}

impl Route {
    /// A route using the default factors of `mode`
    pub fn with_mode(mode: TransportMode, distance_km: Distance) -> Self {
        Route {
            mode,
            distance_km,
            ef_kg_per_ton_km: mode.emission_factor(),
            cost_per_ton_km: mode.cost_factor(),
        }
    }

    /// kg CO2 emitted per ton moved along the whole route
    pub fn co2_per_ton(&self) -> f64 {
        self.distance_km * self.ef_kg_per_ton_km
    }

    /// Cost per ton moved along the whole route
    pub fn cost_per_ton(&self) -> Cost {
        self.distance_km * self.cost_per_ton_km
    }
}

/// A route as it appears in a route table, keyed by the ids of its end points
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub origin: String,
    pub destination: String,
    pub route: Route,
}

#[derive(Debug, Display, Clone, PartialEq)]
pub enum NetworkError {
    /// There must be at least one entity of every kind
    #[display(fmt = "no {} were given", _0)]
    Empty(&'static str),
    /// Two entities of the same kind share an id
    #[display(fmt = "duplicate {} id '{}'", kind, id)]
    DuplicateId { kind: &'static str, id: String },
    /// A row refers to an id that does not exist
    #[display(fmt = "{} refers to unknown {} '{}'", table, kind, id)]
    UnknownId {
        table: &'static str,
        kind: &'static str,
        id: String,
    },
    /// Every region must have exactly one demand row
    #[display(fmt = "no demand was given for region '{}'", _0)]
    MissingDemand(String),
    /// The route table lacks an edge of the complete bipartite graph
    #[display(fmt = "{} has no route from '{}' to '{}'", table, origin, destination)]
    MissingRoute {
        table: &'static str,
        origin: String,
        destination: String,
    },
    /// The same edge appears twice in a route table
    #[display(fmt = "{} has more than one route from '{}' to '{}'", table, origin, destination)]
    DuplicateRoute {
        table: &'static str,
        origin: String,
        destination: String,
    },
    /// A quantity, distance or factor is negative or not finite
    #[display(fmt = "invalid {} for '{}': {}", field, id, value)]
    InvalidValue {
        field: &'static str,
        id: String,
        value: f64,
    },
}

impl std::error::Error for NetworkError {}

/// A validated two-stage supply network: suppliers -> factories -> regions.
///
/// All route tables are complete, so every (supplier, factory) and (factory, region) pair
/// has exactly one route. Routes are stored densely and are addressed by typed indices.
#[derive(Debug, Clone)]
pub struct Network {
    suppliers: TiVec<SupplierIndex, Supplier>,
    factories: TiVec<FactoryIndex, Factory>,
    regions: TiVec<RegionIndex, Region>,
    /// Units demanded in each region
    demand: TiVec<RegionIndex, Quantity>,
    product: Product,
    /// Material routes, indexed (s, f)
    supply_routes: TiVec<SupplierIndex, TiVec<FactoryIndex, Route>>,
    /// Product routes, indexed (f, r)
    delivery_routes: TiVec<FactoryIndex, TiVec<RegionIndex, Route>>,
}

fn check_value(field: &'static str, id: &str, value: f64) -> Result<(), NetworkError> {
    match value.is_finite() && value >= 0.0 {
        true => Ok(()),
        false => Err(NetworkError::InvalidValue {
            field,
            id: id.to_string(),
            value,
        }),
    }
}

fn index_ids<'a, K: From<usize>>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<HashMap<String, K>, NetworkError> {
    let mut lookup = HashMap::new();
    for (i, id) in ids.enumerate() {
        if lookup.insert(id.to_string(), K::from(i)).is_some() {
            return Err(NetworkError::DuplicateId {
                kind,
                id: id.to_string(),
            });
        }
    }
    if lookup.is_empty() {
        return Err(NetworkError::Empty(kind));
    }
    Ok(lookup)
}

/// Arrange `edges` into a dense (origin, destination) matrix, requiring every pair exactly once.
fn route_matrix<O, D>(
    table: &'static str,
    edges: Vec<Edge>,
    origins: &HashMap<String, O>,
    origin_ids: &[&str],
    destinations: &HashMap<String, D>,
    destination_ids: &[&str],
) -> Result<TiVec<O, TiVec<D, Route>>, NetworkError>
where
    O: From<usize> + Into<usize> + Copy,
    D: From<usize> + Into<usize> + Copy,
{
    let mut dense: Vec<Vec<Option<Route>>> = vec![vec![None; destination_ids.len()]; origin_ids.len()];

    for edge in edges {
        let o = *origins
            .get(&edge.origin)
            .ok_or_else(|| NetworkError::UnknownId {
                table,
                kind: "origin",
                id: edge.origin.clone(),
            })?;
        let d = *destinations
            .get(&edge.destination)
            .ok_or_else(|| NetworkError::UnknownId {
                table,
                kind: "destination",
                id: edge.destination.clone(),
            })?;

        let id = format!("{}->{}", edge.origin, edge.destination);
        check_value("distance_km", &id, edge.route.distance_km)?;
        check_value("ef_kg_per_ton_km", &id, edge.route.ef_kg_per_ton_km)?;
        check_value("cost_per_ton_km", &id, edge.route.cost_per_ton_km)?;

        let (o, d): (usize, usize) = (o.into(), d.into());
        let slot = &mut dense[o][d];
        if slot.is_some() {
            return Err(NetworkError::DuplicateRoute {
                table,
                origin: edge.origin,
                destination: edge.destination,
            });
        }
        *slot = Some(edge.route);
    }

    dense
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            row.into_iter()
                .enumerate()
                .map(|(j, route)| {
                    route.ok_or_else(|| NetworkError::MissingRoute {
                        table,
                        origin: origin_ids[i].to_string(),
                        destination: destination_ids[j].to_string(),
                    })
                })
                .collect::<Result<TiVec<D, Route>, _>>()
        })
        .collect()
}

impl Network {
    pub fn new(
        suppliers: Vec<Supplier>,
        factories: Vec<Factory>,
        regions: Vec<Region>,
        demand: Vec<(String, Quantity)>,
        product: Product,
        supply_edges: Vec<Edge>,
        delivery_edges: Vec<Edge>,
    ) -> Result<Network, NetworkError> {
        let supplier_ids: HashMap<String, SupplierIndex> =
            index_ids("suppliers", suppliers.iter().map(|s| s.id.as_str()))?;
        let factory_ids: HashMap<String, FactoryIndex> =
            index_ids("factories", factories.iter().map(|f| f.id.as_str()))?;
        let region_ids: HashMap<String, RegionIndex> =
            index_ids("regions", regions.iter().map(|r| r.id.as_str()))?;

        for s in &suppliers {
            check_value("supply_capacity_tons", &s.id, s.supply_capacity_tons)?;
        }
        for f in &factories {
            check_value("capacity_units", &f.id, f.capacity_units)?;
        }
        check_value("weight_kg_per_unit", "product", product.weight_kg_per_unit)?;
        check_value("material_kg_per_unit", "product", product.material_kg_per_unit)?;

        // exactly one demand row per region
        let mut units: Vec<Option<Quantity>> = vec![None; regions.len()];
        for (id, quantity) in demand {
            let r = *region_ids.get(&id).ok_or_else(|| NetworkError::UnknownId {
                table: "demand",
                kind: "region",
                id: id.clone(),
            })?;
            check_value("units_demanded", &id, quantity)?;
            if units[*r].replace(quantity).is_some() {
                return Err(NetworkError::DuplicateId { kind: "demand", id });
            }
        }
        let demand = units
            .into_iter()
            .zip(&regions)
            .map(|(q, region)| q.ok_or_else(|| NetworkError::MissingDemand(region.id.clone())))
            .collect::<Result<TiVec<RegionIndex, Quantity>, _>>()?;

        let s_ids = suppliers.iter().map(|s| s.id.as_str()).collect::<Vec<_>>();
        let f_ids = factories.iter().map(|f| f.id.as_str()).collect::<Vec<_>>();
        let r_ids = regions.iter().map(|r| r.id.as_str()).collect::<Vec<_>>();

        let supply_routes = route_matrix(
            "routes_sup_to_fac",
            supply_edges,
            &supplier_ids,
            &s_ids,
            &factory_ids,
            &f_ids,
        )?;
        let delivery_routes = route_matrix(
            "routes_fac_to_reg",
            delivery_edges,
            &factory_ids,
            &f_ids,
            &region_ids,
            &r_ids,
        )?;

        let network = Network {
            suppliers: suppliers.into(),
            factories: factories.into(),
            regions: regions.into(),
            demand,
            product,
            supply_routes,
            delivery_routes,
        };
        network.check_capacity();

        debug!(
            "Network with {} suppliers, {} factories and {} regions using {} transport modes",
            network.suppliers.len(),
            network.factories.len(),
            network.regions.len(),
            network.modes().len()
        );

        Ok(network)
    }

    /// Logs a warning if the aggregate capacities cannot cover total demand.
    /// Such a network is still valid, but the optimizer will report it as infeasible.
    fn check_capacity(&self) {
        let units = self.total_demand();
        let production: Quantity = self.factories.iter().map(|f| f.capacity_units).sum();
        let supply: Quantity = self.suppliers.iter().map(|s| s.supply_capacity_tons).sum();
        let material = self.product.material_tons(units);

        if production < units {
            warn!(
                "Total factory capacity ({} units) is below total demand ({} units)",
                production, units
            );
        }
        if supply < material {
            warn!(
                "Total supply ({} tons) is below the material required for total demand ({} tons)",
                supply, material
            );
        }
    }

    pub fn suppliers(&self) -> &TiVec<SupplierIndex, Supplier> {
        &self.suppliers
    }

    pub fn factories(&self) -> &TiVec<FactoryIndex, Factory> {
        &self.factories
    }

    pub fn regions(&self) -> &TiVec<RegionIndex, Region> {
        &self.regions
    }

    pub fn supplier_indices(&self) -> impl Iterator<Item = SupplierIndex> + Clone {
        (0..self.suppliers.len()).map(SupplierIndex)
    }

    pub fn factory_indices(&self) -> impl Iterator<Item = FactoryIndex> + Clone {
        (0..self.factories.len()).map(FactoryIndex)
    }

    pub fn region_indices(&self) -> impl Iterator<Item = RegionIndex> + Clone {
        (0..self.regions.len()).map(RegionIndex)
    }

    /// Units demanded in region `r`
    pub fn demand(&self, r: RegionIndex) -> Quantity {
        self.demand[r]
    }

    /// Total units demanded across all regions
    pub fn total_demand(&self) -> Quantity {
        self.demand.iter().sum()
    }

    pub fn product(&self) -> &Product {
        &self.product
    }

    /// The material route from supplier `s` to factory `f`
    pub fn supply_route(&self, s: SupplierIndex, f: FactoryIndex) -> &Route {
        &self.supply_routes[s][f]
    }

    /// The product route from factory `f` to region `r`
    pub fn delivery_route(&self, f: FactoryIndex, r: RegionIndex) -> &Route {
        &self.delivery_routes[f][r]
    }

    /// The distinct transport modes used anywhere in the network
    pub fn modes(&self) -> HashSet<TransportMode> {
        self.supply_routes
            .iter()
            .flatten()
            .chain(self.delivery_routes.iter().flatten())
            .map(|route| route.mode)
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn product() -> Product {
        Product {
            weight_kg_per_unit: 0.5,
            material_kg_per_unit: 0.4,
        }
    }

    fn build(
        supply_edges: Vec<Edge>,
        delivery_edges: Vec<Edge>,
        demand: Vec<(String, f64)>,
    ) -> Result<Network, NetworkError> {
        Network::new(
            vec![supplier("S1", 0.0, 0.0, 10.0), supplier("S2", 0.0, 1.0, 10.0)],
            vec![factory("F1", 1.0, 0.0, 100.0)],
            vec![region("R1", 2.0, 0.0)],
            demand,
            product(),
            supply_edges,
            delivery_edges,
        )
    }

    fn complete_supply() -> Vec<Edge> {
        vec![
            edge("S1", "F1", TransportMode::Truck, 10.0),
            edge("S2", "F1", TransportMode::Rail, 20.0),
        ]
    }

    fn complete_delivery() -> Vec<Edge> {
        vec![edge("F1", "R1", TransportMode::Ship, 30.0)]
    }

    fn demand() -> Vec<(String, f64)> {
        vec![("R1".to_string(), 50.0)]
    }

    #[test]
    fn complete_network_is_accepted() {
        let network = build(complete_supply(), complete_delivery(), demand()).unwrap();
        assert_eq!(network.suppliers().len(), 2);
        assert_eq!(network.total_demand(), 50.0);
        let route = network.supply_route(SupplierIndex::from(1), FactoryIndex::from(0));
        assert_eq!(route.mode, TransportMode::Rail);
        assert_eq!(route.distance_km, 20.0);
        assert_eq!(network.modes().len(), 3);
    }

    #[test]
    fn missing_route_is_rejected() {
        let err = build(complete_supply()[..1].to_vec(), complete_delivery(), demand()).unwrap_err();
        assert_eq!(
            err,
            NetworkError::MissingRoute {
                table: "routes_sup_to_fac",
                origin: "S2".to_string(),
                destination: "F1".to_string(),
            }
        );
    }

    #[test]
    fn duplicate_route_is_rejected() {
        let mut supply = complete_supply();
        supply.push(edge("S1", "F1", TransportMode::Air, 10.0));
        let err = build(supply, complete_delivery(), demand()).unwrap_err();
        assert!(matches!(err, NetworkError::DuplicateRoute { .. }));
    }

    #[test]
    fn route_to_unknown_node_is_rejected() {
        let mut delivery = complete_delivery();
        delivery.push(edge("F1", "R9", TransportMode::Truck, 1.0));
        let err = build(complete_supply(), delivery, demand()).unwrap_err();
        assert!(matches!(err, NetworkError::UnknownId { id, .. } if id == "R9"));
    }

    #[test]
    fn demand_must_cover_every_region_once() {
        let err = build(complete_supply(), complete_delivery(), vec![]).unwrap_err();
        assert_eq!(err, NetworkError::MissingDemand("R1".to_string()));

        let twice = vec![("R1".to_string(), 1.0), ("R1".to_string(), 2.0)];
        let err = build(complete_supply(), complete_delivery(), twice).unwrap_err();
        assert!(matches!(err, NetworkError::DuplicateId { .. }));
    }

    #[test]
    fn duplicate_ids_and_empty_tables_are_rejected() {
        let err = Network::new(
            vec![supplier("S1", 0.0, 0.0, 1.0), supplier("S1", 0.0, 0.0, 1.0)],
            vec![factory("F1", 0.0, 0.0, 1.0)],
            vec![region("R1", 0.0, 0.0)],
            demand(),
            product(),
            vec![],
            vec![],
        )
        .unwrap_err();
        assert_eq!(
            err,
            NetworkError::DuplicateId {
                kind: "suppliers",
                id: "S1".to_string()
            }
        );

        let err = Network::new(
            vec![supplier("S1", 0.0, 0.0, 1.0)],
            vec![],
            vec![region("R1", 0.0, 0.0)],
            demand(),
            product(),
            vec![],
            vec![],
        )
        .unwrap_err();
        assert_eq!(err, NetworkError::Empty("factories"));
    }

    #[test]
    fn negative_values_are_rejected() {
        let err = build(
            complete_supply(),
            complete_delivery(),
            vec![("R1".to_string(), -5.0)],
        )
        .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidValue { field: "units_demanded", .. }));

        let mut supply = complete_supply();
        supply[0].route.distance_km = f64::NAN;
        let err = build(supply, complete_delivery(), demand()).unwrap_err();
        assert!(matches!(err, NetworkError::InvalidValue { field: "distance_km", .. }));
    }

    #[test]
    fn product_conversions() {
        let p = product();
        assert!((p.material_tons(1000.0) - 0.4).abs() < 1e-12);
        assert!((p.weight_tons(1000.0) - 0.5).abs() < 1e-12);
    }
}
