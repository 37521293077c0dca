//! Random partitioning of products into coupled groups.
//!
//! A couple is a set of 2..=`max_products` products whose demand is treated as
//! correlated (bread and jam). Products left over after the requested number of
//! couples has been formed get the sentinel group id [`UNCOUPLED`].

use crate::schema::{self, ColumnNames};
use crate::CouplingError;
use polars::prelude::*;
use rand::seq::index;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Group id given to products that belong to no couple.
pub const UNCOUPLED: i64 = -1;
/// Smallest legal couple.
pub const MIN_COUPLE_SIZE: usize = 2;
/// Default upper bound on couple size.
pub const DEFAULT_MAX_PRODUCTS: usize = 3;

/// What to do when the product pool cannot supply the requested couples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PoolExhaustion {
    /// Reject the request with [`CouplingError::InsufficientPool`].
    #[default]
    Error,
    /// Form as many couples as the pool allows.
    Truncate,
}

/// Explicit product id -> group id mapping produced by the assigner.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CouplingMap {
    n_groups: usize,
    assignments: BTreeMap<String, i64>,
}

impl CouplingMap {
    /// Number of real couples (the sentinel group is not counted).
    pub fn n_groups(&self) -> usize {
        self.n_groups
    }

    /// Group id of `product`, or `None` if the product was never seen.
    pub fn group_of(&self, product: &str) -> Option<i64> {
        self.assignments.get(product).copied()
    }

    /// Products assigned to `group`, sorted.
    pub fn members(&self, group: i64) -> Vec<&str> {
        self.assignments
            .iter()
            .filter(|(_, g)| **g == group)
            .map(|(p, _)| p.as_str())
            .collect()
    }

    /// Every couple with its members, in group id order.
    pub fn groups(&self) -> Vec<(i64, Vec<&str>)> {
        (0..self.n_groups as i64)
            .map(|g| (g, self.members(g)))
            .collect()
    }

    pub fn coupled_products(&self) -> usize {
        self.assignments.values().filter(|&&g| g != UNCOUPLED).count()
    }

    pub fn uncoupled_products(&self) -> usize {
        self.assignments.values().filter(|&&g| g == UNCOUPLED).count()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

pub(crate) fn validate_max_products(max_products: usize) -> Result<(), CouplingError> {
    if max_products < MIN_COUPLE_SIZE {
        return Err(CouplingError::InvalidParameter(format!(
            "max_products must be at least {}, got {}",
            MIN_COUPLE_SIZE, max_products
        )));
    }
    Ok(())
}

/// Resolves how many couples will actually be formed from `available` products.
fn planned_groups(
    available: usize,
    n_couples: usize,
    policy: PoolExhaustion,
) -> Result<usize, CouplingError> {
    let capacity = available / MIN_COUPLE_SIZE;
    if n_couples <= capacity {
        return Ok(n_couples);
    }
    match policy {
        PoolExhaustion::Error => Err(CouplingError::InsufficientPool {
            requested: n_couples,
            available,
        }),
        PoolExhaustion::Truncate => {
            warn!(
                requested = n_couples,
                formed = capacity,
                available,
                "product pool too small, truncating couples"
            );
            Ok(capacity)
        }
    }
}

/// Distinct values of `keys` in order of first appearance.
pub(crate) fn distinct_products(keys: &[String]) -> Vec<String> {
    let mut seen: HashSet<&String> = HashSet::new();
    keys.iter()
        .filter(|k| seen.insert(*k))
        .cloned()
        .collect()
}

/// Partitions `products` into `n_couples` disjoint random couples.
///
/// Each couple's size is drawn uniformly from `[2, max_products]`, capped so
/// that enough products remain for the couples still to be formed. Members are
/// drawn uniformly without replacement from the products not yet assigned.
/// Every product ends up in exactly one group; leftovers get [`UNCOUPLED`].
/// Duplicate entries in `products` are ignored.
pub fn form_couples<R: Rng + ?Sized>(
    products: &[String],
    n_couples: usize,
    max_products: usize,
    policy: PoolExhaustion,
    rng: &mut R,
) -> Result<CouplingMap, CouplingError> {
    validate_max_products(max_products)?;
    let mut pool = distinct_products(products);
    let n_groups = planned_groups(pool.len(), n_couples, policy)?;

    let mut assignments = BTreeMap::new();
    for c_id in 0..n_groups {
        let still_to_form = n_groups - c_id - 1;
        let upper = max_products.min(pool.len() - MIN_COUPLE_SIZE * still_to_form);
        let size = rng.gen_range(MIN_COUPLE_SIZE..=upper);

        let mut picked = index::sample(rng, pool.len(), size).into_vec();
        // Descending order keeps swap_remove from moving a picked index.
        picked.sort_unstable_by(|a, b| b.cmp(a));
        for i in picked {
            let product = pool.swap_remove(i);
            assignments.insert(product, c_id as i64);
        }
        debug!(c_id, size, remaining = pool.len(), "formed couple");
    }

    for product in pool {
        assignments.insert(product, UNCOUPLED);
    }

    Ok(CouplingMap {
        n_groups,
        assignments,
    })
}

/// Assigns every row of `df` to a couple and writes the `C_ID` column.
///
/// Uses the default column names and rejects requests the product pool
/// cannot satisfy. See [`assign_couples_with`] for the configurable form.
pub fn assign_couples<R: Rng + ?Sized>(
    df: &mut DataFrame,
    n_couples: usize,
    max_products: usize,
    rng: &mut R,
) -> Result<CouplingMap, CouplingError> {
    assign_couples_with(
        df,
        &ColumnNames::default(),
        n_couples,
        max_products,
        PoolExhaustion::Error,
        rng,
    )
}

/// Assigns every row of `df` to a couple using the given column names and policy.
///
/// The table is only modified once the couples have been formed successfully.
pub fn assign_couples_with<R: Rng + ?Sized>(
    df: &mut DataFrame,
    columns: &ColumnNames,
    n_couples: usize,
    max_products: usize,
    policy: PoolExhaustion,
    rng: &mut R,
) -> Result<CouplingMap, CouplingError> {
    validate_max_products(max_products)?;
    schema::require_columns(df, &[columns.product.as_str()])?;
    let keys = schema::string_keys(df, &columns.product)?;

    let couples = form_couples(&keys, n_couples, max_products, policy, rng)?;

    let c_ids: Vec<i64> = keys
        .iter()
        .map(|k| couples.group_of(k).unwrap_or(UNCOUPLED))
        .collect();
    df.with_column(Series::new(columns.couple.as_str().into(), c_ids))?;

    Ok(couples)
}
