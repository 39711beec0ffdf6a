use std::ops::Range;

use log::{debug, trace, warn};
use microlp::{ComparisonOp, OptimizationDirection, Problem};

use super::{LpModel, Result, Sense, SolveStatus, SolverError, Term};

/// Largest violation of a constraint accepted in a solution reported as optimal
const CHECK_TOLERANCE: f64 = 1e-6;

/// Handle to a variable of a [`SimplexModel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimplexVar(usize);

struct Constraint {
    name: String,
    terms: Vec<Term<SimplexVar>>,
    sense: Sense,
    rhs: f64,
}

/// An [`LpModel`] solved by the pure Rust simplex implementation of `microlp`.
///
/// The model is buffered and only handed to the solver on [`LpModel::optimize`], which
/// allows the objective to be set after the variables are created.
#[derive(Default)]
pub struct SimplexModel {
    names: Vec<String>,
    bounds: Vec<(f64, f64)>,
    objective: Vec<f64>,
    constraints: Vec<Constraint>,
    solution: Option<Vec<f64>>,
    objective_value: Option<f64>,
}

impl SimplexModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&self, var: SimplexVar) -> Result<()> {
        match var.0 < self.names.len() {
            true => Ok(()),
            false => Err(SolverError::UnknownVariable(var.0)),
        }
    }

    /// The name given to `var` when it was created
    #[cfg(test)]
    pub(crate) fn name(&self, var: SimplexVar) -> Option<&str> {
        self.names.get(var.0).map(String::as_str)
    }
}

impl LpModel for SimplexModel {
    type Var = SimplexVar;

    fn add_var(&mut self, name: &str, obj: f64, bounds: Range<f64>) -> Result<SimplexVar> {
        let var = SimplexVar(self.names.len());
        self.names.push(name.to_string());
        self.bounds.push((bounds.start, bounds.end));
        self.objective.push(obj);
        Ok(var)
    }

    fn add_constr(
        &mut self,
        name: &str,
        terms: &[Term<SimplexVar>],
        sense: Sense,
        rhs: f64,
    ) -> Result<()> {
        for (var, _) in terms {
            self.check(*var)?;
        }
        trace!("{}: {} terms {} {}", name, terms.len(), sense, rhs);
        self.constraints.push(Constraint {
            name: name.to_string(),
            terms: terms.to_vec(),
            sense,
            rhs,
        });
        Ok(())
    }

    fn set_objective(&mut self, terms: &[Term<SimplexVar>]) -> Result<()> {
        let mut objective = vec![0.0; self.names.len()];
        for (var, coeff) in terms {
            self.check(*var)?;
            objective[var.0] += coeff;
        }
        self.objective = objective;
        Ok(())
    }

    fn optimize(&mut self) -> Result<SolveStatus> {
        self.solution = None;
        self.objective_value = None;

        let mut problem = Problem::new(OptimizationDirection::Minimize);
        let vars = self
            .objective
            .iter()
            .zip(&self.bounds)
            .map(|(obj, bounds)| problem.add_var(*obj, *bounds))
            .collect::<Vec<_>>();

        for constraint in &self.constraints {
            let op = match constraint.sense {
                Sense::Le => ComparisonOp::Le,
                Sense::Ge => ComparisonOp::Ge,
                Sense::Eq => ComparisonOp::Eq,
            };
            let expr = constraint
                .terms
                .iter()
                .map(|(var, coeff)| (vars[var.0], *coeff))
                .collect::<Vec<_>>();
            problem.add_constraint(expr.as_slice(), op, constraint.rhs);
        }

        debug!(
            "Solving lp with {} variables and {} constraints",
            self.names.len(),
            self.constraints.len()
        );

        match problem.solve() {
            Ok(solution) => {
                self.objective_value = Some(solution.objective());
                self.solution = Some(vars.iter().map(|v| solution[*v]).collect());
                let violated = self.violated(CHECK_TOLERANCE);
                if !violated.is_empty() {
                    warn!("Solution violates {} constraints: {:?}", violated.len(), violated);
                }
                Ok(SolveStatus::Optimal)
            }
            Err(microlp::Error::Infeasible) => Ok(SolveStatus::Infeasible),
            Err(microlp::Error::Unbounded) => Ok(SolveStatus::Unbounded),
            Err(microlp::Error::InternalError(msg)) => Err(SolverError::Backend(msg)),
        }
    }

    fn value(&self, var: SimplexVar) -> Option<f64> {
        self.solution.as_ref().and_then(|s| s.get(var.0).copied())
    }

    fn objective_value(&self) -> Option<f64> {
        self.objective_value
    }

    fn num_vars(&self) -> usize {
        self.names.len()
    }

    fn num_constrs(&self) -> usize {
        self.constraints.len()
    }
}

impl std::fmt::Debug for SimplexModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimplexModel")
            .field("num_vars", &self.names.len())
            .field("num_constraints", &self.constraints.len())
            .field("solved", &self.solution.is_some())
            .finish()
    }
}

impl SimplexModel {
    /// Names of the constraints violated in the last solution by more than `tolerance`, relative
    /// to the right hand side when that exceeds 1
    fn violated(&self, tolerance: f64) -> Vec<&str> {
        let solution = match &self.solution {
            Some(solution) => solution,
            None => return Vec::new(),
        };

        self.constraints
            .iter()
            .filter(|c| {
                let lhs: f64 = c.terms.iter().map(|(v, coeff)| coeff * solution[v.0]).sum();
                let tolerance = tolerance * c.rhs.abs().max(1.0);
                match c.sense {
                    Sense::Le => lhs > c.rhs + tolerance,
                    Sense::Ge => lhs < c.rhs - tolerance,
                    Sense::Eq => (lhs - c.rhs).abs() > tolerance,
                }
            })
            .map(|c| c.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::lp::non_negative;

    #[test]
    fn solves_small_lp() {
        // min x + 2y s.t. x + y >= 4, x <= 3
        let mut model = SimplexModel::new();
        let x = model.add_var("x", 1.0, non_negative()).unwrap();
        let y = model.add_var("y", 2.0, non_negative()).unwrap();
        model
            .add_constr("cover", &[(x, 1.0), (y, 1.0)], Sense::Ge, 4.0)
            .unwrap();
        model.add_constr("cap", &[(x, 1.0)], Sense::Le, 3.0).unwrap();

        assert_eq!(model.optimize().unwrap(), SolveStatus::Optimal);
        assert!((model.value(x).unwrap() - 3.0).abs() < 1e-9);
        assert!((model.value(y).unwrap() - 1.0).abs() < 1e-9);
        assert!((model.objective_value().unwrap() - 5.0).abs() < 1e-9);
        assert!(model.violated(1e-9).is_empty());
    }

    #[test]
    fn constraints_added_after_solving_are_checked_against_the_solution() {
        let mut model = SimplexModel::new();
        let x = model.add_var("x", 1.0, non_negative()).unwrap();
        model.add_constr("demand", &[(x, 1.0)], Sense::Ge, 4.0).unwrap();
        assert_eq!(model.optimize().unwrap(), SolveStatus::Optimal);

        model.add_constr("cap", &[(x, 1.0)], Sense::Le, 2.0).unwrap();
        assert_eq!(model.violated(1e-9), vec!["cap"]);
        assert!(model.violated(2.5).is_empty());
    }

    #[test]
    fn objective_can_be_replaced_after_construction() {
        let mut model = SimplexModel::new();
        let x = model.add_var("x", 0.0, 0.0..10.0).unwrap();
        model.set_objective(&[(x, -1.0)]).unwrap();
        assert_eq!(model.optimize().unwrap(), SolveStatus::Optimal);
        assert!((model.value(x).unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn infeasible_model_has_no_values() {
        let mut model = SimplexModel::new();
        let x = model.add_var("x", 1.0, non_negative()).unwrap();
        model.add_constr("low", &[(x, 1.0)], Sense::Le, 1.0).unwrap();
        model.add_constr("high", &[(x, 1.0)], Sense::Ge, 2.0).unwrap();

        assert_eq!(model.optimize().unwrap(), SolveStatus::Infeasible);
        assert_eq!(model.value(x), None);
        assert_eq!(model.objective_value(), None);
    }

    #[test]
    fn foreign_variable_is_rejected() {
        let mut model = SimplexModel::new();
        let err = model
            .add_constr("bad", &[(SimplexVar(3), 1.0)], Sense::Le, 1.0)
            .unwrap_err();
        assert_eq!(err, SolverError::UnknownVariable(3));
    }
}
