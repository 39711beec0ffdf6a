use log::trace;
use typed_index_collections::TiVec;

use crate::problem::{FactoryIndex, Network, RegionIndex, Route, SupplierIndex};

/// sets for the flow model
#[derive(Debug)]
#[allow(non_snake_case)]
pub struct Sets {
    /// Set of suppliers
    pub S: Vec<SupplierIndex>,
    /// Set of factories
    pub F: Vec<FactoryIndex>,
    /// Set of regions
    pub R: Vec<RegionIndex>,
}

/// parameters for the flow model
#[derive(Debug)]
#[allow(non_snake_case)]
pub struct Parameters {
    /// supply capacity of supplier s, in tons
    pub A: TiVec<SupplierIndex, f64>,
    /// production capacity of factory f, in units
    pub K: TiVec<FactoryIndex, f64>,
    /// units demanded in region r
    pub D: TiVec<RegionIndex, f64>,
    /// tons of material required per produced unit
    pub M: f64,
    /// kg CO2 per ton shipped from supplier s to factory f
    pub E_sf: TiVec<SupplierIndex, TiVec<FactoryIndex, f64>>,
    /// kg CO2 per unit shipped from factory f to region r
    pub E_fr: TiVec<FactoryIndex, TiVec<RegionIndex, f64>>,
    /// cost per ton shipped from supplier s to factory f
    pub C_sf: TiVec<SupplierIndex, TiVec<FactoryIndex, f64>>,
    /// cost per unit shipped from factory f to region r
    pub C_fr: TiVec<FactoryIndex, TiVec<RegionIndex, f64>>,
    /// upper limit on the total transportation cost
    pub B: f64,
}

impl Sets {
    pub fn new(network: &Network) -> Sets {
        Sets {
            S: network.supplier_indices().collect(),
            F: network.factory_indices().collect(),
            R: network.region_indices().collect(),
        }
    }
}

#[allow(non_snake_case)]
impl Parameters {
    /// Parameters of `network` with the cost ceiling `budget`
    pub fn new(network: &Network, sets: &Sets, budget: f64) -> Parameters {
        let product = network.product();
        // F->R flows are in units, while the factors are per ton
        let tons_per_unit = product.weight_tons(1.0);

        let A = sets
            .S
            .iter()
            .map(|s| network.suppliers()[*s].supply_capacity_tons)
            .collect();
        let K = sets
            .F
            .iter()
            .map(|f| network.factories()[*f].capacity_units)
            .collect();
        let D = sets.R.iter().map(|r| network.demand(*r)).collect();

        let supply = |per_ton: fn(&Route) -> f64| -> TiVec<SupplierIndex, TiVec<FactoryIndex, f64>> {
            sets.S
                .iter()
                .map(|s| {
                    sets.F
                        .iter()
                        .map(|f| per_ton(network.supply_route(*s, *f)))
                        .collect()
                })
                .collect()
        };
        let delivery = |per_ton: fn(&Route) -> f64| -> TiVec<FactoryIndex, TiVec<RegionIndex, f64>> {
            sets.F
                .iter()
                .map(|f| {
                    sets.R
                        .iter()
                        .map(|r| per_ton(network.delivery_route(*f, *r)) * tons_per_unit)
                        .collect()
                })
                .collect()
        };

        let parameters = Parameters {
            A,
            K,
            D,
            M: product.material_tons(1.0),
            E_sf: supply(|route| route.co2_per_ton()),
            E_fr: delivery(|route| route.co2_per_ton()),
            C_sf: supply(|route| route.cost_per_ton()),
            C_fr: delivery(|route| route.cost_per_ton()),
            B: budget,
        };
        trace!("parameters: {:?}", parameters);
        parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::fixtures::small_network;

    #[test]
    fn product_stage_factors_are_per_unit() {
        let network = small_network();
        let sets = Sets::new(&network);
        let parameters = Parameters::new(&network, &sets, 123.0);

        let (f, r) = (FactoryIndex::from(1), RegionIndex::from(2));
        let route = network.delivery_route(f, r);
        // 0.5 kg per unit
        let expected = route.distance_km * route.ef_kg_per_ton_km * 0.5 / 1000.0;
        assert!((parameters.E_fr[f][r] - expected).abs() < 1e-12);

        let s = SupplierIndex::from(0);
        let route = network.supply_route(s, f);
        assert!((parameters.C_sf[s][f] - route.distance_km * route.cost_per_ton_km).abs() < 1e-12);

        assert!((parameters.M - 0.0004).abs() < 1e-15);
        assert_eq!(parameters.D.len(), 3);
        assert_eq!(parameters.B, 123.0);
    }
}
