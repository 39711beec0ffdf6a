use std::ops::Range;

use grb::prelude::*;
use log::{debug, warn};

use super::{LpModel, Result, Sense, SolveStatus, SolverError, Term};

fn backend(err: grb::Error) -> SolverError {
    SolverError::Backend(format!("{:?}", err))
}

/// An [`LpModel`] backed by Gurobi
pub struct GurobiModel {
    model: Model,
    vars: Vec<Var>,
    constrs: usize,
}

impl GurobiModel {
    pub fn new(name: &str) -> Result<Self> {
        let mut model = Model::new(name).map_err(backend)?;
        // Disable output logging.
        model.set_param(param::OutputFlag, 0).map_err(backend)?;
        // Single threaded, so repeated runs give the same flows.
        model.set_param(param::Threads, 1).map_err(backend)?;

        Ok(GurobiModel {
            model,
            vars: Vec::new(),
            constrs: 0,
        })
    }

    fn expr(&self, terms: &[Term<usize>]) -> Result<Expr> {
        let mut expr = grb::expr::LinExpr::new();
        for (i, coeff) in terms {
            let var = self.vars.get(*i).ok_or(SolverError::UnknownVariable(*i))?;
            expr.add_term(*coeff, *var);
        }
        Ok(expr.into())
    }
}

impl LpModel for GurobiModel {
    type Var = usize;

    fn add_var(&mut self, name: &str, obj: f64, bounds: Range<f64>) -> Result<usize> {
        let var = self
            .model
            .add_var(
                name,
                VarType::Continuous,
                obj,
                bounds.start,
                bounds.end,
                std::iter::empty(),
            )
            .map_err(backend)?;
        self.vars.push(var);
        Ok(self.vars.len() - 1)
    }

    fn add_constr(&mut self, name: &str, terms: &[Term<usize>], sense: Sense, rhs: f64) -> Result<()> {
        let lhs = self.expr(terms)?;
        let constr = match sense {
            Sense::Le => c!(lhs <= rhs),
            Sense::Ge => c!(lhs >= rhs),
            Sense::Eq => c!(lhs == rhs),
        };
        self.model.add_constr(name, constr).map_err(backend)?;
        self.constrs += 1;
        Ok(())
    }

    fn set_objective(&mut self, terms: &[Term<usize>]) -> Result<()> {
        let expr = self.expr(terms)?;
        self.model.set_objective(expr, Minimize).map_err(backend)
    }

    fn optimize(&mut self) -> Result<SolveStatus> {
        self.model.update().map_err(backend)?;
        debug!(
            "Solving gurobi model with {} variables and {} constraints",
            self.vars.len(),
            self.constrs
        );
        self.model.optimize().map_err(backend)?;

        let status = match self.model.status().map_err(backend)? {
            Status::Optimal => SolveStatus::Optimal,
            Status::Infeasible => SolveStatus::Infeasible,
            Status::Unbounded => SolveStatus::Unbounded,
            Status::InfOrUnbd => SolveStatus::NotOptimal("infeasible or unbounded".to_string()),
            other => {
                warn!("Gurobi stopped with status {:?}", other);
                SolveStatus::NotOptimal(format!("{:?}", other))
            }
        };
        Ok(status)
    }

    fn value(&self, var: usize) -> Option<f64> {
        let var = self.vars.get(var)?;
        self.model.get_obj_attr(attr::X, var).ok()
    }

    fn objective_value(&self) -> Option<f64> {
        self.model.get_attr(attr::ObjVal).ok()
    }

    fn num_vars(&self) -> usize {
        self.vars.len()
    }

    fn num_constrs(&self) -> usize {
        self.constrs
    }
}
