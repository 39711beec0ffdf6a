pub mod baseline;
pub mod emissions;
pub mod generate;
pub mod models;
pub mod optimizer;
pub mod parse;
pub mod predict;
pub mod problem;
pub mod solution;

pub use baseline::{Baseline, BaselineKpis};
pub use optimizer::{optimize, optimize_min_co2, FlowConfig, OptimizeError};
pub use problem::Network;
pub use solution::{FlowQuantity, FlowRecord, OptimizationRun};
