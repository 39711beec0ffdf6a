#[cfg(feature = "gurobi")]
pub mod gurobi;
pub mod simplex;

use derive_more::Display;
use serde::Serialize;
use std::ops::Range;

#[cfg(feature = "gurobi")]
pub use gurobi::GurobiModel;
pub use simplex::SimplexModel;

/// The relation between the left and right hand side of a constraint
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    #[display(fmt = "<=")]
    Le,
    #[display(fmt = ">=")]
    Ge,
    #[display(fmt = "==")]
    Eq,
}

/// The outcome of a call to [`LpModel::optimize`]
#[derive(Debug, Display, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    /// The solver stopped without proving optimality, e.g. due to a limit
    #[display(fmt = "NotOptimal({})", _0)]
    NotOptimal(String),
}

impl SolveStatus {
    pub fn is_optimal(&self) -> bool {
        matches!(self, SolveStatus::Optimal)
    }
}

/// A failure of the solver itself, as opposed to an infeasible or unbounded model
#[derive(Debug, Display, Clone, PartialEq)]
pub enum SolverError {
    #[display(fmt = "solver backend error: {}", _0)]
    Backend(String),
    /// A variable handle that does not belong to the model
    #[display(fmt = "unknown variable {}", _0)]
    UnknownVariable(usize),
    #[display(fmt = "the '{}' backend is not available in this build", _0)]
    Unavailable(String),
}

impl std::error::Error for SolverError {}

pub type Result<T> = std::result::Result<T, SolverError>;

/// A linear term `coefficient * variable`
pub type Term<V> = (V, f64);

/// A linear program under construction, and later its solution.
///
/// Models always minimize their objective.
pub trait LpModel {
    /// A handle to a decision variable of this model
    type Var: Copy;

    /// Add a continuous variable with the given bounds and objective coefficient.
    fn add_var(&mut self, name: &str, obj: f64, bounds: Range<f64>) -> Result<Self::Var>;

    /// Add the constraint `sum(terms) <sense> rhs`. Every variable may appear at most once in `terms`.
    fn add_constr(&mut self, name: &str, terms: &[Term<Self::Var>], sense: Sense, rhs: f64)
        -> Result<()>;

    /// Replace the objective with `sum(terms)`.
    fn set_objective(&mut self, terms: &[Term<Self::Var>]) -> Result<()>;

    /// Solve the model. A non-optimal outcome is reported through the status, not as an error.
    fn optimize(&mut self) -> Result<SolveStatus>;

    /// The value of `var` in the last solution, if there is one.
    fn value(&self, var: Self::Var) -> Option<f64>;

    /// The objective value of the last solution, if there is one.
    fn objective_value(&self) -> Option<f64>;

    fn num_vars(&self) -> usize;

    fn num_constrs(&self) -> usize;
}

/// The solvers that can be selected at run time
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, clap::ArgEnum)]
pub enum Backend {
    /// Pure Rust simplex solver
    #[display(fmt = "simplex")]
    Simplex,
    /// Gurobi, requires the `gurobi` feature
    #[display(fmt = "gurobi")]
    Gurobi,
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Simplex
    }
}

/// A non-negative continuous variable
pub fn non_negative() -> Range<f64> {
    0.0..f64::INFINITY
}
