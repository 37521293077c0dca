//! Synthetic demand tables to feed the coupling simulation.

use crate::schema::ColumnNames;
use crate::CouplingError;
use polars::prelude::*;
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use statrs::distribution::Normal;
use tracing::debug;

/// Builds a products x locations table with normally distributed log demand.
///
/// Product ids are `P0000`, `P0001`, ...; location ids are `L000`, `L001`, ....
#[derive(Debug, Clone)]
pub struct DemandTableGenerator {
    n_products: usize,
    n_locations: usize,
    mean: f64,
    std_dev: f64,
    seed: Option<u64>,
    columns: ColumnNames,
}

impl DemandTableGenerator {
    pub fn new(n_products: usize, n_locations: usize) -> Self {
        Self {
            n_products,
            n_locations,
            mean: 0.0,
            std_dev: 1.0,
            seed: None,
            columns: ColumnNames::default(),
        }
    }

    /// Mean of the log demand rate. Defaults to 0.
    pub fn mean(&mut self, mean: f64) -> &mut Self {
        self.mean = mean;
        self
    }

    /// Standard deviation of the log demand rate. Defaults to 1.
    pub fn std_dev(&mut self, std_dev: f64) -> &mut Self {
        self.std_dev = std_dev;
        self
    }

    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = Some(seed);
        self
    }

    pub fn columns(&mut self, columns: ColumnNames) -> &mut Self {
        self.columns = columns;
        self
    }

    /// Generates the table, one row per (product, location) pair.
    pub fn generate(&self) -> Result<DataFrame, CouplingError> {
        let normal = Normal::new(self.mean, self.std_dev).map_err(|e| {
            CouplingError::InvalidParameter(format!("log demand distribution: {}", e))
        })?;
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let n_rows = self.n_products * self.n_locations;
        let mut products = Vec::with_capacity(n_rows);
        let mut locations = Vec::with_capacity(n_rows);
        let mut log_lambda = Vec::with_capacity(n_rows);
        for l in 0..self.n_locations {
            for p in 0..self.n_products {
                products.push(format!("P{:04}", p));
                locations.push(format!("L{:03}", l));
                log_lambda.push(normal.sample(&mut rng));
            }
        }
        debug!(
            products = self.n_products,
            locations = self.n_locations,
            rows = n_rows,
            "generated demand table"
        );

        let df = DataFrame::new(vec![
            Series::new(self.columns.product.as_str().into(), products).into(),
            Series::new(self.columns.location.as_str().into(), locations).into(),
            Series::new(self.columns.log_lambda.as_str().into(), log_lambda).into(),
        ])?;
        Ok(df)
    }
}
