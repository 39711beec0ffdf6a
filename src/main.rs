use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{info, warn};

use cfo::baseline::Baseline;
use cfo::generate::{generate, GeneratorConfig};
use cfo::models::lp::Backend;
use cfo::optimizer::{optimize_min_co2, FlowConfig};
use cfo::parse::read_network;
use cfo::predict::train_model;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Minimizes the transport emissions of a two-stage supply network")]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a synthetic network
    Generate {
        #[clap(long, default_value = "data")]
        out_dir: PathBuf,
        /// Seed of the random generator
        #[clap(long, default_value_t = 42)]
        seed: u64,
        #[clap(long, default_value_t = 15)]
        suppliers: usize,
        #[clap(long, default_value_t = 5)]
        factories: usize,
        #[clap(long, default_value_t = 10)]
        regions: usize,
    },
    /// Fit the per-route emissions model and store it with its metrics
    Train {
        #[clap(long, default_value = "data")]
        data_dir: PathBuf,
        #[clap(long, default_value = "outputs/model")]
        model_dir: PathBuf,
    },
    /// Print the key figures of the nearest-route baseline
    Baseline {
        #[clap(long, default_value = "data")]
        data_dir: PathBuf,
    },
    /// Minimize emissions under a budget derived from the baseline cost
    Optimize {
        #[clap(long, default_value = "data")]
        data_dir: PathBuf,
        #[clap(long, default_value = "outputs/optimized_flows.csv")]
        results_path: PathBuf,
        /// The budget is the baseline cost times this factor, typically between 0.5 and 1.5
        #[clap(long, default_value_t = 1.0)]
        cost_budget_multiplier: f64,
        #[clap(long, arg_enum, default_value_t = Backend::Simplex)]
        solver: Backend,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Args::parse().command {
        Command::Generate {
            out_dir,
            seed,
            suppliers,
            factories,
            regions,
        } => {
            let config = GeneratorConfig {
                num_suppliers: suppliers,
                num_factories: factories,
                num_regions: regions,
                seed,
                ..Default::default()
            };
            generate(&config)?.write(&out_dir)?;
            info!("Data generated in {}", out_dir.display());
        }
        Command::Train {
            data_dir,
            model_dir,
        } => {
            let metrics = train_model(&data_dir, &model_dir)?;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
        Command::Baseline { data_dir } => {
            let network = read_network(&data_dir)?;
            let baseline = Baseline::new(&network);
            println!("{}", serde_json::to_string_pretty(&baseline.kpis)?);
        }
        Command::Optimize {
            data_dir,
            results_path,
            cost_budget_multiplier,
            solver,
        } => {
            let config = FlowConfig::with_multiplier(cost_budget_multiplier);
            let run = optimize_min_co2(&data_dir, &config, solver)?;
            run.write(&results_path)?;

            if !run.is_optimal() {
                warn!("The results in {} are not a valid plan", results_path.display());
                return Err(format!("optimization ended with status {}", run.status).into());
            }
            println!(
                "Total CO2 (kg): {:.2}, total cost: {:.2}, budget: {:.2}",
                run.total_co2_kg, run.total_cost_usd, run.budget_usd
            );
        }
    }

    Ok(())
}
