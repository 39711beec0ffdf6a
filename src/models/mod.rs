pub mod flow;
pub mod lp;
pub mod utils;

pub use flow::FlowSolver;
