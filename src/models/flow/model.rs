use derive_more::Constructor;
use itertools::iproduct;
use log::{info, warn};
use typed_index_collections::TiVec;

use super::sets_and_parameters::{Parameters, Sets};
use crate::models::lp::{self, LpModel, Sense, SolveStatus, Term};
use crate::models::utils::{convert_matrix, evaluate, var_matrix};
use crate::problem::{FactoryIndex, RegionIndex, SupplierIndex};

#[derive(Constructor)]
pub struct Variables<V> {
    /// material (tons) shipped from supplier s to factory f
    pub x: TiVec<SupplierIndex, TiVec<FactoryIndex, V>>,
    /// product (units) shipped from factory f to region r
    pub y: TiVec<FactoryIndex, TiVec<RegionIndex, V>>,
}

impl<V: Copy> Variables<V> {
    /// Terms of `sum(C_sf * x) + sum(C_fr * y)`
    fn weighted(
        &self,
        sets: &Sets,
        sf: &TiVec<SupplierIndex, TiVec<FactoryIndex, f64>>,
        fr: &TiVec<FactoryIndex, TiVec<RegionIndex, f64>>,
    ) -> Vec<Term<V>> {
        let material = iproduct!(&sets.S, &sets.F).map(|(s, f)| (self.x[*s][*f], sf[*s][*f]));
        let product = iproduct!(&sets.F, &sets.R).map(|(f, r)| (self.y[*f][*r], fr[*f][*r]));
        material.chain(product).collect()
    }
}

pub struct FlowSolver {}

#[allow(non_snake_case)]
impl FlowSolver {
    /// builds the minimum emission flow model
    pub fn build<M: LpModel>(
        model: &mut M,
        sets: &Sets,
        parameters: &Parameters,
    ) -> lp::Result<Variables<M::Var>> {
        info!(
            "Building flow model with {} suppliers, {} factories and {} regions",
            sets.S.len(),
            sets.F.len(),
            sets.R.len()
        );

        //*************CREATE VARIABLES*************//

        // material transported from supplier s to factory f, in tons
        let x = var_matrix(model, sets.S.len(), sets.F.len(), |m, s: SupplierIndex, f: FactoryIndex| {
            m.add_var(&format!("flow_sf_tons_{}_{}", *s, *f), 0.0, lp::non_negative())
        })?;

        // product transported from factory f to region r, in units
        let y = var_matrix(model, sets.F.len(), sets.R.len(), |m, f: FactoryIndex, r: RegionIndex| {
            m.add_var(&format!("flow_fr_units_{}_{}", *f, *r), 0.0, lp::non_negative())
        })?;

        let vars = Variables::new(x, y);

        // ******************** ADD CONSTRAINTS ********************

        // suppliers can not ship more material than they have
        for s in &sets.S {
            let lhs = sets.F.iter().map(|f| (vars.x[*s][*f], 1.0)).collect::<Vec<_>>();
            model.add_constr(&format!("supplier_cap_{}", **s), &lhs, Sense::Le, parameters.A[*s])?;
        }

        // factories must receive enough material for what they produce: sum_s x - M * sum_r y >= 0
        for f in &sets.F {
            let incoming = sets.S.iter().map(|s| (vars.x[*s][*f], 1.0));
            let outgoing = sets.R.iter().map(|r| (vars.y[*f][*r], -parameters.M));
            let lhs = incoming.chain(outgoing).collect::<Vec<_>>();
            model.add_constr(&format!("material_balance_{}", **f), &lhs, Sense::Ge, 0.0)?;
        }

        // factories can not produce more than their capacity
        for f in &sets.F {
            let lhs = sets.R.iter().map(|r| (vars.y[*f][*r], 1.0)).collect::<Vec<_>>();
            model.add_constr(&format!("factory_cap_{}", **f), &lhs, Sense::Le, parameters.K[*f])?;
        }

        // every region must receive at least its demand
        for r in &sets.R {
            let lhs = sets.F.iter().map(|f| (vars.y[*f][*r], 1.0)).collect::<Vec<_>>();
            model.add_constr(&format!("demand_{}", **r), &lhs, Sense::Ge, parameters.D[*r])?;
        }

        // the total transportation cost is bounded by the budget
        let cost = vars.weighted(sets, &parameters.C_sf, &parameters.C_fr);
        model.add_constr("budget", &cost, Sense::Le, parameters.B)?;

        // minimize the total emissions
        let co2 = vars.weighted(sets, &parameters.E_sf, &parameters.E_fr);
        model.set_objective(&co2)?;

        info!(
            "Successfully built flow model with {} variables and {} constraints",
            model.num_vars(),
            model.num_constrs()
        );
        Ok(vars)
    }

    pub fn solve<M: LpModel>(
        mut model: M,
        sets: &Sets,
        parameters: &Parameters,
    ) -> lp::Result<FlowResult> {
        // build model
        let vars = FlowSolver::build(&mut model, sets, parameters)?;

        // optimize model
        let status = model.optimize()?;
        match model.objective_value() {
            Some(objective) if status.is_optimal() => {
                info!("Flow model solved, objective value {:.4}", objective)
            }
            _ => warn!("Flow model was not solved to optimality: solver status {}", status),
        }

        Ok(FlowResult::new(status, &vars, &model, sets, parameters))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowResult {
    pub status: SolveStatus,
    /// material (tons) shipped from supplier s to factory f
    pub x: TiVec<SupplierIndex, TiVec<FactoryIndex, f64>>,
    /// product (units) shipped from factory f to region r
    pub y: TiVec<FactoryIndex, TiVec<RegionIndex, f64>>,
    /// total emissions (kg CO2) of the extracted flows
    pub co2: f64,
    /// total cost of the extracted flows
    pub cost: f64,
}

impl FlowResult {
    pub fn new<M: LpModel>(
        status: SolveStatus,
        vars: &Variables<M::Var>,
        model: &M,
        sets: &Sets,
        parameters: &Parameters,
    ) -> FlowResult {
        let co2 = evaluate(model, &vars.weighted(sets, &parameters.E_sf, &parameters.E_fr));
        let cost = evaluate(model, &vars.weighted(sets, &parameters.C_sf, &parameters.C_fr));

        FlowResult {
            status,
            x: convert_matrix(&vars.x, model),
            y: convert_matrix(&vars.y, model),
            co2,
            cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::lp::SimplexModel;

    fn one<I, J>(v: f64) -> TiVec<I, TiVec<J, f64>> {
        TiVec::from(vec![TiVec::from(vec![v])])
    }

    /// One supplier, one factory, one region with the given capacities and costs
    fn tiny(supply: f64, capacity: f64, demand: f64, budget: f64) -> (Sets, Parameters) {
        let sets = Sets {
            S: vec![SupplierIndex::from(0)],
            F: vec![FactoryIndex::from(0)],
            R: vec![RegionIndex::from(0)],
        };
        let parameters = Parameters {
            A: vec![supply].into(),
            K: vec![capacity].into(),
            D: vec![demand].into(),
            M: 0.5,
            E_sf: one(2.0),
            E_fr: one(1.0),
            C_sf: one(1.0),
            C_fr: one(1.0),
            B: budget,
        };
        (sets, parameters)
    }

    #[test]
    fn model_has_one_constraint_per_node_and_a_budget() {
        let (sets, parameters) = tiny(100.0, 100.0, 10.0, 100.0);
        let mut model = SimplexModel::new();
        FlowSolver::build(&mut model, &sets, &parameters).unwrap();
        assert_eq!(model.num_vars(), 2);
        // supplier cap, material balance, factory cap, demand, budget
        assert_eq!(model.num_constrs(), 5);
    }

    #[test]
    fn demand_is_met_exactly_with_just_enough_material() {
        let (sets, parameters) = tiny(100.0, 100.0, 10.0, 100.0);
        let result = FlowSolver::solve(SimplexModel::new(), &sets, &parameters).unwrap();

        let (s, f, r) = (SupplierIndex::from(0), FactoryIndex::from(0), RegionIndex::from(0));
        assert_eq!(result.status, SolveStatus::Optimal);
        assert!((result.y[f][r] - 10.0).abs() < 1e-9);
        assert!((result.x[s][f] - 5.0).abs() < 1e-9);
        assert!((result.co2 - (5.0 * 2.0 + 10.0)).abs() < 1e-9);
        assert!((result.cost - 15.0).abs() < 1e-9);
    }

    #[test]
    fn insufficient_supply_is_infeasible() {
        let (sets, parameters) = tiny(1.0, 100.0, 10.0, 100.0);
        let result = FlowSolver::solve(SimplexModel::new(), &sets, &parameters).unwrap();
        assert_eq!(result.status, SolveStatus::Infeasible);
        assert_eq!(result.co2, 0.0);
    }

    #[test]
    fn budget_below_minimum_cost_is_infeasible() {
        let (sets, parameters) = tiny(100.0, 100.0, 10.0, 14.0);
        let result = FlowSolver::solve(SimplexModel::new(), &sets, &parameters).unwrap();
        assert!(!result.status.is_optimal());
    }
}
