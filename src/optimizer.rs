use std::path::Path;

use chrono::Utc;
use derive_more::{Display, From};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::baseline::Baseline;
use crate::emissions::{estimate_cost_usd, estimate_emissions_kg};
use crate::models::flow::{FlowResult, FlowSolver, Parameters, Sets};
use crate::models::lp::{Backend, LpModel, SimplexModel, SolverError};
use crate::models::utils::EPSILON;
use crate::parse::{read_network, LoadError};
use crate::problem::Network;
use crate::solution::{FlowQuantity, FlowRecord, NodeKind, OptimizationRun, OutputError};

/// The range of budget multipliers the model is tuned for
pub const TYPICAL_MULTIPLIERS: (f64, f64) = (0.5, 1.5);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// The cost ceiling is the baseline cost times this factor
    pub cost_budget_multiplier: f64,
    /// Flows at or below this value are dropped from the result
    pub flow_epsilon: f64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        FlowConfig {
            cost_budget_multiplier: 1.0,
            flow_epsilon: EPSILON,
        }
    }
}

impl FlowConfig {
    pub fn with_multiplier(cost_budget_multiplier: f64) -> Self {
        FlowConfig {
            cost_budget_multiplier,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), OptimizeError> {
        if !self.cost_budget_multiplier.is_finite() {
            return Err(OptimizeError::InvalidConfig {
                field: "cost_budget_multiplier",
                value: self.cost_budget_multiplier,
            });
        }
        if !self.flow_epsilon.is_finite() || self.flow_epsilon < 0.0 {
            return Err(OptimizeError::InvalidConfig {
                field: "flow_epsilon",
                value: self.flow_epsilon,
            });
        }

        let (low, high) = TYPICAL_MULTIPLIERS;
        if self.cost_budget_multiplier < low || self.cost_budget_multiplier > high {
            warn!(
                "Cost budget multiplier {} is outside [{}, {}], the budget may be vacuous or infeasible",
                self.cost_budget_multiplier, low, high
            );
        }
        Ok(())
    }
}

#[derive(Debug, Display, From)]
pub enum OptimizeError {
    #[display(fmt = "invalid {}: {}", field, value)]
    #[from(ignore)]
    InvalidConfig { field: &'static str, value: f64 },
    #[display(fmt = "{}", _0)]
    Load(LoadError),
    #[display(fmt = "{}", _0)]
    Solver(SolverError),
    #[display(fmt = "{}", _0)]
    Output(OutputError),
}

impl std::error::Error for OptimizeError {}

/// Turns the dense flow values into records, dropping everything at or below `epsilon`
fn extract(network: &Network, result: &FlowResult, epsilon: f64) -> Vec<FlowRecord> {
    let mut flows = Vec::new();

    for s in network.supplier_indices() {
        for f in network.factory_indices() {
            let tons = result.x[s][f];
            if tons > epsilon {
                flows.push(FlowRecord {
                    from_kind: NodeKind::Supplier,
                    from_id: network.suppliers()[s].id.clone(),
                    to_kind: NodeKind::Factory,
                    to_id: network.factories()[f].id.clone(),
                    quantity: FlowQuantity::Tons(tons),
                });
            }
        }
    }

    for f in network.factory_indices() {
        for r in network.region_indices() {
            let units = result.y[f][r];
            if units > epsilon {
                flows.push(FlowRecord {
                    from_kind: NodeKind::Factory,
                    from_id: network.factories()[f].id.clone(),
                    to_kind: NodeKind::Region,
                    to_id: network.regions()[r].id.clone(),
                    quantity: FlowQuantity::Units(units),
                });
            }
        }
    }

    flows
}

/// Emissions and cost of the extracted flows
fn totals(network: &Network, result: &FlowResult, epsilon: f64) -> (f64, f64) {
    let product = network.product();
    let mut co2 = 0.0;
    let mut cost = 0.0;

    for s in network.supplier_indices() {
        for f in network.factory_indices() {
            let tons = result.x[s][f];
            if tons > epsilon {
                let route = network.supply_route(s, f);
                co2 += estimate_emissions_kg(route.distance_km, tons, route.ef_kg_per_ton_km);
                cost += estimate_cost_usd(route.distance_km, tons, route.cost_per_ton_km);
            }
        }
    }
    for f in network.factory_indices() {
        for r in network.region_indices() {
            let units = result.y[f][r];
            if units > epsilon {
                let route = network.delivery_route(f, r);
                let tons = product.weight_tons(units);
                co2 += estimate_emissions_kg(route.distance_km, tons, route.ef_kg_per_ton_km);
                cost += estimate_cost_usd(route.distance_km, tons, route.cost_per_ton_km);
            }
        }
    }

    (co2, cost)
}

/// Minimizes the emissions of `network` under a cost ceiling derived from the baseline, using
/// `model` as the solver.
///
/// A run that is not solved to optimality is returned with its status, not as an error.
pub fn optimize<M: LpModel>(
    network: &Network,
    config: &FlowConfig,
    model: M,
) -> Result<OptimizationRun, OptimizeError> {
    config.validate()?;

    // the budget must be known before the model is built
    let baseline = Baseline::new(network);
    let budget = baseline.cost() * config.cost_budget_multiplier;
    info!(
        "Baseline cost {:.2} with multiplier {} gives a budget of {:.2}",
        baseline.cost(),
        config.cost_budget_multiplier,
        budget
    );

    let sets = Sets::new(network);
    let parameters = Parameters::new(network, &sets, budget);
    let result = FlowSolver::solve(model, &sets, &parameters)?;

    if !result.status.is_optimal() {
        warn!(
            "Optimization ended with status {}, the extracted flows are not a valid plan",
            result.status
        );
    }

    let flows = extract(network, &result, config.flow_epsilon);
    let (total_co2_kg, total_cost_usd) = totals(network, &result, config.flow_epsilon);
    debug!(
        "Model emissions {:.6} and cost {:.6}, extracted flows {:.6} and {:.6}",
        result.co2, result.cost, total_co2_kg, total_cost_usd
    );

    let run = OptimizationRun {
        run_id: Uuid::new_v4(),
        completed_at: Utc::now(),
        status: result.status,
        flows,
        total_co2_kg,
        total_cost_usd,
        budget_usd: budget,
        baseline: baseline.kpis,
        config: *config,
    };

    info!(
        "Run {}: {} flows, {:.2} kg CO2 ({:+.2} vs baseline), cost {:.2} of {:.2}",
        run.run_id,
        run.flows.len(),
        run.total_co2_kg,
        run.co2_change_vs_baseline_kg(),
        run.total_cost_usd,
        run.budget_usd
    );
    Ok(run)
}

/// Loads the network in `data_dir` and optimizes it with the selected solver backend
pub fn optimize_min_co2(
    data_dir: &Path,
    config: &FlowConfig,
    backend: Backend,
) -> Result<OptimizationRun, OptimizeError> {
    let network = read_network(data_dir)?;

    match backend {
        Backend::Simplex => optimize(&network, config, SimplexModel::new()),
        Backend::Gurobi => optimize_gurobi(&network, config),
    }
}

#[cfg(feature = "gurobi")]
fn optimize_gurobi(network: &Network, config: &FlowConfig) -> Result<OptimizationRun, OptimizeError> {
    let model = crate::models::lp::GurobiModel::new("min_co2")?;
    optimize(network, config, model)
}

#[cfg(not(feature = "gurobi"))]
fn optimize_gurobi(_: &Network, _: &FlowConfig) -> Result<OptimizationRun, OptimizeError> {
    Err(SolverError::Unavailable(Backend::Gurobi.to_string()).into())
}
