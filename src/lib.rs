//! Synthetic coupled-product demand simulation.
//!
//! Products that are often bought together (bread and jam) tend to have
//! similar demand. This crate augments a demand table for forecasting
//! experiments by grouping products into random "couples" and pulling the
//! lower-demand members of each couple toward the couple's peak demand.
//!
//! The input is a `polars::DataFrame` with a product id (`P_ID`), a location
//! id (`L_ID`) and a log demand rate (`LOG_LAMBDA`). The simulation writes a
//! couple id column (`C_ID`, `-1` for uncoupled products) and rewrites
//! `LOG_LAMBDA` in place.
//!
//! # Example
//!
//! ```ignore
//! use polars::prelude::*;
//! use coupling_demand::CouplingSimulationBuilder;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let df = df!(
//!         "P_ID" => &["A", "B", "C", "D", "A", "B", "C", "D"],
//!         "L_ID" => &[1, 1, 1, 1, 2, 2, 2, 2],
//!         "LOG_LAMBDA" => &[1.0, 3.0, 0.5, 2.0, 1.5, 0.2, 0.9, 1.1]
//!     )?;
//!
//!     let results = CouplingSimulationBuilder::new(df, 1)
//!         .max_products(2)
//!         .seed(42)
//!         .run()?;
//!
//!     results.summary();
//!     Ok(())
//! }
//! ```

use comfy_table::{Cell, Table};
use getset::Getters;
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

pub mod balance;
pub mod coupling;
pub mod generate;
pub mod schema;

pub use crate::balance::{
    balance, balance_demand, balance_demand_with, balance_partition, BalanceReport, DEFAULT_GAIN,
};
pub use crate::coupling::{
    assign_couples, assign_couples_with, form_couples, CouplingMap, PoolExhaustion,
    DEFAULT_MAX_PRODUCTS, UNCOUPLED,
};
pub use crate::generate::DemandTableGenerator;
pub use crate::schema::ColumnNames;

/// Error type for the `coupling_demand` library.
#[derive(Error, Debug)]
pub enum CouplingError {
    /// Wraps a `PolarsError`.
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
    /// A required column is absent from the DataFrame.
    #[error("Column not found: {0}")]
    ColumnNotFound(String),
    /// A required column contains nulls.
    #[error("Column contains null values: {0}")]
    NullValues(String),
    /// The distinct products cannot fill the requested couples.
    #[error("Insufficient product pool: {requested} couples requested but only {available} distinct products available (each couple needs at least 2)")]
    InsufficientPool { requested: usize, available: usize },
    /// A parameter is outside its legal range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Assigns couples and balances demand with the default gain.
///
/// This is the whole pipeline on the default column names: every row gets a
/// `C_ID` and each (`C_ID`, `L_ID`) partition is balanced once. All inputs are
/// validated before `df` is modified.
pub fn simulate_coupling_demand<R: Rng + ?Sized>(
    df: &mut DataFrame,
    n_couples: usize,
    max_products: usize,
    rng: &mut R,
) -> Result<CouplingMap, CouplingError> {
    let columns = ColumnNames::default();
    coupling::validate_max_products(max_products)?;
    schema::validate_input(df, &columns)?;

    let couples = assign_couples_with(
        df,
        &columns,
        n_couples,
        max_products,
        PoolExhaustion::Error,
        rng,
    )?;
    balance_demand_with(df, &columns, DEFAULT_GAIN)?;
    Ok(couples)
}

/// The main entry point for configuring and running a coupling simulation.
///
/// This struct is created using a builder pattern.
#[derive(Debug, Clone)]
pub struct CouplingSimulationBuilder {
    dataframe: DataFrame,
    n_couples: usize,
    max_products: usize,
    gain: f64,
    seed: Option<u64>,
    exhaustion: PoolExhaustion,
    columns: ColumnNames,
}

impl CouplingSimulationBuilder {
    /// Creates a new `CouplingSimulationBuilder`.
    ///
    /// # Arguments
    ///
    /// * `dataframe` - A `polars::DataFrame` with product, location and log demand columns.
    /// * `n_couples` - The number of couples to form.
    pub fn new(dataframe: DataFrame, n_couples: usize) -> Self {
        Self {
            dataframe,
            n_couples,
            max_products: DEFAULT_MAX_PRODUCTS,
            gain: DEFAULT_GAIN,
            seed: None,
            exhaustion: PoolExhaustion::Error,
            columns: ColumnNames::default(),
        }
    }

    /// Sets the largest number of products in one couple. Defaults to 3.
    pub fn max_products(&mut self, max_products: usize) -> &mut Self {
        self.max_products = max_products;
        self
    }

    /// Sets how strongly lower-demand products are pulled toward the couple peak.
    ///
    /// Defaults to 0.5. Values above 1 overshoot the peak.
    pub fn gain(&mut self, gain: f64) -> &mut Self {
        self.gain = gain;
        self
    }

    /// Seeds the random generator so runs are reproducible.
    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the behaviour when the product pool cannot supply every couple.
    pub fn pool_exhaustion(&mut self, policy: PoolExhaustion) -> &mut Self {
        self.exhaustion = policy;
        self
    }

    /// Replaces all column names at once.
    pub fn columns(&mut self, columns: ColumnNames) -> &mut Self {
        self.columns = columns;
        self
    }

    pub fn product_column(&mut self, name: &str) -> &mut Self {
        self.columns.product = name.to_string();
        self
    }

    pub fn location_column(&mut self, name: &str) -> &mut Self {
        self.columns.location = name.to_string();
        self
    }

    pub fn log_lambda_column(&mut self, name: &str) -> &mut Self {
        self.columns.log_lambda = name.to_string();
        self
    }

    pub fn couple_column(&mut self, name: &str) -> &mut Self {
        self.columns.couple = name.to_string();
        self
    }

    /// Runs the simulation with a generator built from the configured seed
    /// (or from entropy when no seed is set).
    pub fn run(&self) -> Result<SimulationResults, CouplingError> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.run_with_rng(&mut rng)
    }

    /// Runs the simulation drawing from a caller supplied generator.
    pub fn run_with_rng<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<SimulationResults, CouplingError> {
        coupling::validate_max_products(self.max_products)?;
        balance::validate_gain(self.gain)?;
        schema::validate_input(&self.dataframe, &self.columns)?;

        let mut df = self.dataframe.clone();
        let couples = assign_couples_with(
            &mut df,
            &self.columns,
            self.n_couples,
            self.max_products,
            self.exhaustion,
            rng,
        )?;
        let report = balance_demand_with(&mut df, &self.columns, self.gain)?;

        info!(
            rows = df.height(),
            couples = couples.n_groups(),
            coupled_products = couples.coupled_products(),
            partitions = report.partitions_balanced(),
            "coupling simulation finished"
        );

        Ok(SimulationResults {
            n_rows: df.height(),
            n_couples_requested: self.n_couples,
            max_products: self.max_products,
            couples,
            balance: report,
            dataframe: df,
        })
    }
}

/// Holds the augmented table and a report of what the simulation did.
#[derive(Debug, Getters, Serialize)]
#[getset(get = "pub")]
pub struct SimulationResults {
    /// Rows in the table.
    n_rows: usize,
    /// Couples asked for; fewer may be formed when truncating.
    n_couples_requested: usize,
    max_products: usize,
    /// The product to couple mapping that was written to the table.
    couples: CouplingMap,
    /// The demand balancing summary.
    balance: BalanceReport,
    /// The table with the couple id column added and log demand balanced.
    #[serde(skip)]
    dataframe: DataFrame,
}

impl SimulationResults {
    /// Consumes the results, returning the augmented table.
    pub fn into_dataframe(self) -> DataFrame {
        self.dataframe
    }

    /// Prints a formatted summary of the simulation to the console.
    pub fn summary(&self) {
        println!("Coupling Demand Simulation Results");
        println!("========================================");
        println!("Rows: {}", self.n_rows);
        println!(
            "Couples: {} formed ({} requested, max {} products each)",
            self.couples.n_groups(),
            self.n_couples_requested,
            self.max_products
        );
        println!();

        let mut overview = Table::new();
        overview.set_header(vec!["Metric", "Value"]);
        overview.add_row(vec![
            Cell::new("Coupled products"),
            Cell::new(self.couples.coupled_products()),
        ]);
        overview.add_row(vec![
            Cell::new("Uncoupled products"),
            Cell::new(self.couples.uncoupled_products()),
        ]);
        overview.add_row(vec![
            Cell::new("Partitions balanced"),
            Cell::new(self.balance.partitions_balanced()),
        ]);
        overview.add_row(vec![
            Cell::new("Partitions passed through"),
            Cell::new(self.balance.partitions_passed_through()),
        ]);
        overview.add_row(vec![
            Cell::new("Rows adjusted"),
            Cell::new(self.balance.rows_adjusted()),
        ]);
        overview.add_row(vec![
            Cell::new("Gain"),
            Cell::new(format!("{:.4}", self.balance.gain())),
        ]);
        overview.add_row(vec![
            Cell::new("Mean uplift"),
            Cell::new(format!("{:.4}", self.balance.mean_uplift())),
        ]);
        overview.add_row(vec![
            Cell::new("Max uplift"),
            Cell::new(format!("{:.4}", self.balance.max_uplift())),
        ]);
        println!("Overview");
        println!("{}", overview);

        let mut couples_table = Table::new();
        couples_table.set_header(vec!["C_ID", "Size", "Products"]);
        for (c_id, members) in self.couples.groups() {
            couples_table.add_row(vec![
                Cell::new(c_id),
                Cell::new(members.len()),
                Cell::new(members.join(", ")),
            ]);
        }
        println!("\nCouples");
        println!("{}", couples_table);
    }

    /// Exports the report to Markdown tables.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        md.push_str("### Coupling Demand Simulation Results\n\n");
        md.push_str("| Metric | Value |\n");
        md.push_str("|---|---|\n");
        md.push_str(&format!("| Rows | {} |\n", self.n_rows));
        md.push_str(&format!("| Couples | {} |\n", self.couples.n_groups()));
        md.push_str(&format!(
            "| Coupled products | {} |\n",
            self.couples.coupled_products()
        ));
        md.push_str(&format!(
            "| Uncoupled products | {} |\n",
            self.couples.uncoupled_products()
        ));
        md.push_str(&format!(
            "| Partitions balanced | {} |\n",
            self.balance.partitions_balanced()
        ));
        md.push_str(&format!("| Gain | {:.4} |\n", self.balance.gain()));
        md.push_str(&format!(
            "| Mean uplift | {:.4} |\n",
            self.balance.mean_uplift()
        ));
        md.push_str(&format!("| Max uplift | {:.4} |\n", self.balance.max_uplift()));

        md.push_str("\n| C_ID | Products |\n");
        md.push_str("|---|---|\n");
        for (c_id, members) in self.couples.groups() {
            md.push_str(&format!("| {} | {} |\n", c_id, members.join(", ")));
        }
        md
    }

    /// Exports the report to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
