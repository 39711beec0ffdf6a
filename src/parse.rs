use std::fs;
use std::path::{Path, PathBuf};

use derive_more::{Display, From};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::emissions::TransportMode;
use crate::problem::{
    Edge, Factory, Network, NetworkError, Position, Product, Quantity, Region, Route, Supplier,
};

pub const SUPPLIERS: &str = "suppliers.csv";
pub const FACTORIES: &str = "factories.csv";
pub const REGIONS: &str = "regions.csv";
pub const DEMAND: &str = "demand.csv";
pub const PRODUCT: &str = "product.csv";
pub const ROUTES_SUP_TO_FAC: &str = "routes_sup_to_fac.csv";
pub const ROUTES_FAC_TO_REG: &str = "routes_fac_to_reg.csv";
pub const TRANSPORT_MODES: &str = "transport_modes.csv";

#[derive(Debug, Display, From)]
pub enum LoadError {
    #[display(fmt = "missing input table {}", "path.display()")]
    #[from(ignore)]
    MissingTable { path: PathBuf },
    #[display(fmt = "malformed {}: {}", table, error)]
    #[from(ignore)]
    Csv {
        table: &'static str,
        error: csv::Error,
    },
    #[display(fmt = "{} row {} has unknown transport mode '{}'", table, row, mode)]
    #[from(ignore)]
    UnknownMode {
        table: &'static str,
        row: usize,
        mode: String,
    },
    #[display(fmt = "{} has no rows", PRODUCT)]
    #[from(ignore)]
    EmptyProduct,
    #[display(fmt = "invalid network: {}", _0)]
    Network(NetworkError),
}

impl std::error::Error for LoadError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierRow {
    pub supplier_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub material_type: String,
    pub supply_capacity_tons: Quantity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactoryRow {
    pub factory_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub capacity_units: Quantity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRow {
    pub region_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandRow {
    pub region_id: String,
    #[serde(default)]
    pub product: Option<String>,
    pub units_demanded: Quantity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRow {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub weight_kg_per_unit: f64,
    pub material_kg_per_unit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplyRouteRow {
    pub supplier_id: String,
    pub factory_id: String,
    pub mode: String,
    pub distance_km: f64,
    pub ef_kg_per_ton_km: f64,
    pub cost_per_ton_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRouteRow {
    pub factory_id: String,
    pub region_id: String,
    pub mode: String,
    pub distance_km: f64,
    pub ef_kg_per_ton_km: f64,
    pub cost_per_ton_km: f64,
}

/// The default factors of a transport mode, as written next to the input tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportModeRow {
    pub mode: TransportMode,
    pub ef_kg_per_ton_km: f64,
    pub cost_per_ton_km: f64,
}

impl TransportModeRow {
    pub fn all() -> Vec<TransportModeRow> {
        TransportMode::ALL
            .iter()
            .map(|mode| TransportModeRow {
                mode: *mode,
                ef_kg_per_ton_km: mode.emission_factor(),
                cost_per_ton_km: mode.cost_factor(),
            })
            .collect()
    }
}

/// The raw input tables of a network
#[derive(Debug, Clone, PartialEq)]
pub struct Tables {
    pub suppliers: Vec<SupplierRow>,
    pub factories: Vec<FactoryRow>,
    pub regions: Vec<RegionRow>,
    pub demand: Vec<DemandRow>,
    pub product: Vec<ProductRow>,
    pub routes_sup_to_fac: Vec<SupplyRouteRow>,
    pub routes_fac_to_reg: Vec<DeliveryRouteRow>,
}

fn read_table<T: DeserializeOwned>(dir: &Path, table: &'static str) -> Result<Vec<T>, LoadError> {
    let path = dir.join(table);
    if !path.is_file() {
        return Err(LoadError::MissingTable { path });
    }

    let csv_error = |error| LoadError::Csv { table, error };
    let mut reader = csv::Reader::from_path(&path).map_err(csv_error)?;
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(csv_error)?;

    debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

fn write_table<T: Serialize>(dir: &Path, table: &str, rows: &[T]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(dir.join(table))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub(crate) fn parse_mode(table: &'static str, row: usize, mode: &str) -> Result<TransportMode, LoadError> {
    mode.parse().map_err(|_| LoadError::UnknownMode {
        table,
        row,
        mode: mode.to_string(),
    })
}

impl Tables {
    /// Reads every table from `dir`. Fails on the first missing or malformed table.
    pub fn read(dir: &Path) -> Result<Tables, LoadError> {
        Ok(Tables {
            suppliers: read_table(dir, SUPPLIERS)?,
            factories: read_table(dir, FACTORIES)?,
            regions: read_table(dir, REGIONS)?,
            demand: read_table(dir, DEMAND)?,
            product: read_table(dir, PRODUCT)?,
            routes_sup_to_fac: read_table(dir, ROUTES_SUP_TO_FAC)?,
            routes_fac_to_reg: read_table(dir, ROUTES_FAC_TO_REG)?,
        })
    }

    /// Writes every table to `dir`, together with the table of transport mode factors
    pub fn write(&self, dir: &Path) -> Result<(), csv::Error> {
        fs::create_dir_all(dir)?;
        write_table(dir, SUPPLIERS, &self.suppliers)?;
        write_table(dir, FACTORIES, &self.factories)?;
        write_table(dir, REGIONS, &self.regions)?;
        write_table(dir, DEMAND, &self.demand)?;
        write_table(dir, PRODUCT, &self.product)?;
        write_table(dir, ROUTES_SUP_TO_FAC, &self.routes_sup_to_fac)?;
        write_table(dir, ROUTES_FAC_TO_REG, &self.routes_fac_to_reg)?;
        write_table(dir, TRANSPORT_MODES, &TransportModeRow::all())?;
        Ok(())
    }

    /// The product constants. Only the first row of the product table is used.
    pub fn product(&self) -> Result<Product, LoadError> {
        let row = self.product.first().ok_or(LoadError::EmptyProduct)?;
        if self.product.len() > 1 {
            warn!(
                "{} has {} rows, only the first one is used",
                PRODUCT,
                self.product.len()
            );
        }
        Ok(Product {
            weight_kg_per_unit: row.weight_kg_per_unit,
            material_kg_per_unit: row.material_kg_per_unit,
        })
    }

    /// Validates the tables and assembles them into a network
    pub fn into_network(self) -> Result<Network, LoadError> {
        let product = self.product()?;

        let supply_edges = self
            .routes_sup_to_fac
            .into_iter()
            .enumerate()
            .map(|(i, row)| -> Result<Edge, LoadError> {
                Ok(Edge {
                    route: Route {
                        mode: parse_mode(ROUTES_SUP_TO_FAC, i, &row.mode)?,
                        distance_km: row.distance_km,
                        ef_kg_per_ton_km: row.ef_kg_per_ton_km,
                        cost_per_ton_km: row.cost_per_ton_km,
                    },
                    origin: row.supplier_id,
                    destination: row.factory_id,
                })
            })
            .collect::<Result<Vec<_>, LoadError>>()?;
        let delivery_edges = self
            .routes_fac_to_reg
            .into_iter()
            .enumerate()
            .map(|(i, row)| -> Result<Edge, LoadError> {
                Ok(Edge {
                    route: Route {
                        mode: parse_mode(ROUTES_FAC_TO_REG, i, &row.mode)?,
                        distance_km: row.distance_km,
                        ef_kg_per_ton_km: row.ef_kg_per_ton_km,
                        cost_per_ton_km: row.cost_per_ton_km,
                    },
                    origin: row.factory_id,
                    destination: row.region_id,
                })
            })
            .collect::<Result<Vec<_>, LoadError>>()?;

        let suppliers = self
            .suppliers
            .into_iter()
            .map(|row| Supplier {
                id: row.supplier_id,
                name: row.name,
                position: Position::new(row.lat, row.lon),
                material_type: row.material_type,
                supply_capacity_tons: row.supply_capacity_tons,
            })
            .collect();
        let factories = self
            .factories
            .into_iter()
            .map(|row| Factory {
                id: row.factory_id,
                name: row.name,
                position: Position::new(row.lat, row.lon),
                capacity_units: row.capacity_units,
            })
            .collect();
        let regions = self
            .regions
            .into_iter()
            .map(|row| Region {
                id: row.region_id,
                name: row.name,
                position: Position::new(row.lat, row.lon),
            })
            .collect();
        let demand = self
            .demand
            .into_iter()
            .map(|row| (row.region_id, row.units_demanded))
            .collect();

        Ok(Network::new(
            suppliers,
            factories,
            regions,
            demand,
            product,
            supply_edges,
            delivery_edges,
        )?)
    }
}

/// Reads the network stored in `dir`
pub fn read_network(dir: &Path) -> Result<Network, LoadError> {
    Tables::read(dir)?.into_network()
}
