pub mod model;
pub mod sets_and_parameters;

pub use model::{FlowResult, FlowSolver, Variables};
pub use sets_and_parameters::{Parameters, Sets};
