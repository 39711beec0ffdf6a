use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use derive_more::{Display, From};
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::baseline::{per_unit, BaselineKpis};
use crate::models::lp::SolveStatus;
use crate::optimizer::FlowConfig;
use crate::problem::{Cost, Quantity};

/// The kind of node at either end of a flow
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[display(fmt = "supplier")]
    Supplier,
    #[display(fmt = "factory")]
    Factory,
    #[display(fmt = "region")]
    Region,
}

/// The amount moved along an edge. Material is measured in tons and product in units, and the two
/// are never comparable.
#[derive(Debug, Display, Clone, Copy, PartialEq)]
pub enum FlowQuantity {
    #[display(fmt = "{} t", _0)]
    Tons(Quantity),
    #[display(fmt = "{} units", _0)]
    Units(Quantity),
}

impl FlowQuantity {
    pub fn tons(&self) -> Option<Quantity> {
        match self {
            FlowQuantity::Tons(tons) => Some(*tons),
            FlowQuantity::Units(_) => None,
        }
    }

    pub fn units(&self) -> Option<Quantity> {
        match self {
            FlowQuantity::Tons(_) => None,
            FlowQuantity::Units(units) => Some(*units),
        }
    }
}

/// A non-zero flow along one edge of the network
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRecord {
    pub from_kind: NodeKind,
    pub from_id: String,
    pub to_kind: NodeKind,
    pub to_id: String,
    pub quantity: FlowQuantity,
}

/// One row of the flow table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRow {
    pub from_type: NodeKind,
    pub from_id: String,
    pub to_type: NodeKind,
    pub to_id: String,
    pub flow_tons: Option<Quantity>,
    pub flow_units: Option<Quantity>,
}

impl From<&FlowRecord> for FlowRow {
    fn from(record: &FlowRecord) -> Self {
        FlowRow {
            from_type: record.from_kind,
            from_id: record.from_id.clone(),
            to_type: record.to_kind,
            to_id: record.to_id.clone(),
            flow_tons: record.quantity.tons(),
            flow_units: record.quantity.units(),
        }
    }
}

#[derive(Debug, Display, From)]
pub enum OutputError {
    #[display(fmt = "failed to write results: {}", _0)]
    Io(std::io::Error),
    #[display(fmt = "failed to write the flow table: {}", _0)]
    Csv(csv::Error),
    #[display(fmt = "failed to write run metadata: {}", _0)]
    Json(serde_json::Error),
}

impl std::error::Error for OutputError {}

/// The outcome of a single optimization run.
///
/// The flows and totals of a run that is not optimal are unreliable, and it must not be used
/// as a plan.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationRun {
    pub run_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub status: SolveStatus,
    #[serde(skip)]
    pub flows: Vec<FlowRecord>,
    /// Emissions of the extracted flows, in kg CO2
    pub total_co2_kg: f64,
    /// Cost of the extracted flows
    pub total_cost_usd: Cost,
    /// The cost ceiling the flows were optimized under
    pub budget_usd: Cost,
    pub baseline: BaselineKpis,
    pub config: FlowConfig,
}

/// Run level figures written next to the flow table
#[derive(Debug, Serialize)]
struct Metadata<'a> {
    #[serde(flatten)]
    run: &'a OptimizationRun,
    num_flows: usize,
    total_units_delivered: Quantity,
    avg_co2_per_unit_kg: Option<f64>,
    co2_change_vs_baseline_kg: f64,
    cost_change_vs_baseline_usd: Cost,
    co2_reduction_pct: Option<f64>,
}

impl OptimizationRun {
    pub fn is_optimal(&self) -> bool {
        self.status.is_optimal()
    }

    fn sum(&self, filter: impl Fn(&FlowRecord) -> Option<Quantity>) -> Quantity {
        self.flows.iter().filter_map(filter).sum()
    }

    /// Tons shipped out of supplier `id`
    pub fn material_out_of(&self, id: &str) -> Quantity {
        self.sum(|f| (f.from_id == id).then(|| f.quantity.tons()).flatten())
    }

    /// Tons received by factory `id`
    pub fn material_into(&self, id: &str) -> Quantity {
        self.sum(|f| (f.to_id == id).then(|| f.quantity.tons()).flatten())
    }

    /// Units shipped out of factory `id`
    pub fn units_out_of(&self, id: &str) -> Quantity {
        self.sum(|f| (f.from_id == id).then(|| f.quantity.units()).flatten())
    }

    /// Units received by region `id`
    pub fn units_into(&self, id: &str) -> Quantity {
        self.sum(|f| (f.to_id == id).then(|| f.quantity.units()).flatten())
    }

    /// Units delivered to all regions
    pub fn total_units_delivered(&self) -> Quantity {
        self.sum(|f| f.quantity.units())
    }

    /// `None` when nothing is delivered
    pub fn avg_co2_per_unit_kg(&self) -> Option<f64> {
        per_unit(self.total_co2_kg, self.total_units_delivered())
    }

    /// Emissions relative to the baseline, negative when the run emits less
    pub fn co2_change_vs_baseline_kg(&self) -> f64 {
        self.total_co2_kg - self.baseline.baseline_total_co2_kg
    }

    pub fn cost_change_vs_baseline_usd(&self) -> Cost {
        self.total_cost_usd - self.baseline.baseline_total_cost_usd
    }

    /// Percentage of the baseline emissions saved, `None` if the baseline emits nothing
    pub fn co2_reduction_pct(&self) -> Option<f64> {
        let baseline = self.baseline.baseline_total_co2_kg;
        match baseline > 0.0 {
            true => Some(100.0 * (baseline - self.total_co2_kg) / baseline),
            false => None,
        }
    }

    /// The rows of the flow table, in the order of the flows
    pub fn rows(&self) -> Vec<FlowRow> {
        self.flows.iter().map(FlowRow::from).collect()
    }

    /// Writes the flow table to `path` as CSV and the run level figures to the
    /// sidecar file returned by [`metadata_path`].
    pub fn write(&self, path: &Path) -> Result<(), OutputError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::Writer::from_path(path)?;
        for row in self.rows() {
            writer.serialize(row)?;
        }
        writer.flush()?;

        let metadata = Metadata {
            run: self,
            num_flows: self.flows.len(),
            total_units_delivered: self.total_units_delivered(),
            avg_co2_per_unit_kg: self.avg_co2_per_unit_kg(),
            co2_change_vs_baseline_kg: self.co2_change_vs_baseline_kg(),
            cost_change_vs_baseline_usd: self.cost_change_vs_baseline_usd(),
            co2_reduction_pct: self.co2_reduction_pct(),
        };
        let meta_path = metadata_path(path);
        serde_json::to_writer_pretty(File::create(&meta_path)?, &metadata)?;

        info!(
            "Wrote {} flows to {} and run metadata to {}",
            self.flows.len(),
            path.display(),
            meta_path.display()
        );
        Ok(())
    }
}

/// `<dir>/<stem>.meta.json` for a flow table at `<dir>/<stem>.csv`
pub fn metadata_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "results".to_string());
    path.with_file_name(format!("{}.meta.json", stem))
}
