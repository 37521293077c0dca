use coupling_demand::{
    assign_couples, balance_demand, form_couples, simulate_coupling_demand, CouplingError,
    CouplingSimulationBuilder, DemandTableGenerator, PoolExhaustion, UNCOUPLED,
};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;

fn floats(df: &DataFrame, name: &str) -> Vec<f64> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

fn ints(df: &DataFrame, name: &str) -> Vec<i64> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .i64()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

fn strings(df: &DataFrame, name: &str) -> Vec<String> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .str()
        .unwrap()
        .into_no_null_iter()
        .map(str::to_string)
        .collect()
}

fn four_products() -> DataFrame {
    df!(
        "P_ID" => &["A", "B", "C", "D"],
        "L_ID" => &[1i64, 1, 1, 1],
        "LOG_LAMBDA" => &[1.0, 3.0, 0.5, 2.0]
    )
    .unwrap()
}

/// First seed whose single pair drawn from A..D is {A, B}.
fn seed_coupling_a_and_b() -> u64 {
    let products: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
    (0..10_000u64)
        .find(|&seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let map = form_couples(&products, 1, 2, PoolExhaustion::Error, &mut rng).unwrap();
            map.members(0) == vec!["A", "B"]
        })
        .expect("no seed couples A and B")
}

#[test]
fn test_pair_a_b_among_four_products() {
    let mut df = four_products();
    let mut rng = StdRng::seed_from_u64(seed_coupling_a_and_b());

    let couples = simulate_coupling_demand(&mut df, 1, 2, &mut rng).unwrap();

    assert_eq!(couples.n_groups(), 1);
    assert_eq!(ints(&df, "C_ID"), vec![0, 0, UNCOUPLED, UNCOUPLED]);
    // A is pulled halfway to B; C and D are untouched.
    assert_eq!(floats(&df, "LOG_LAMBDA"), vec![2.0, 3.0, 0.5, 2.0]);
}

#[test]
fn test_single_pair_among_four_products() {
    let mut df = four_products();
    let before = floats(&df, "LOG_LAMBDA");
    let mut rng = StdRng::seed_from_u64(11);

    let couples = simulate_coupling_demand(&mut df, 1, 2, &mut rng).unwrap();

    let c_ids = ints(&df, "C_ID");
    assert_eq!(couples.n_groups(), 1);
    assert_eq!(c_ids.iter().filter(|&&c| c == 0).count(), 2);
    assert_eq!(c_ids.iter().filter(|&&c| c == UNCOUPLED).count(), 2);

    let after = floats(&df, "LOG_LAMBDA");
    let peak = (0..4)
        .filter(|&i| c_ids[i] == 0)
        .map(|i| before[i])
        .fold(f64::NEG_INFINITY, f64::max);
    for i in 0..4 {
        if c_ids[i] == UNCOUPLED {
            assert_eq!(after[i], before[i]);
        } else {
            let expected = before[i] + (peak - before[i]).abs() * 0.5;
            assert!((after[i] - expected).abs() < 1e-12);
        }
    }
}

#[test]
fn test_zero_couples_leaves_table_uncoupled() {
    let mut df = four_products();
    let before = floats(&df, "LOG_LAMBDA");
    let mut rng = StdRng::seed_from_u64(0);

    let couples = simulate_coupling_demand(&mut df, 0, 3, &mut rng).unwrap();

    assert_eq!(couples.n_groups(), 0);
    assert!(ints(&df, "C_ID").iter().all(|&c| c == UNCOUPLED));
    assert_eq!(floats(&df, "LOG_LAMBDA"), before);
}

#[test]
fn test_insufficient_pool_fails_without_touching_table() {
    let mut df = four_products();
    let mut rng = StdRng::seed_from_u64(0);

    let err = simulate_coupling_demand(&mut df, 3, 3, &mut rng).unwrap_err();

    assert!(matches!(
        err,
        CouplingError::InsufficientPool {
            requested: 3,
            available: 4
        }
    ));
    assert!(df.column("C_ID").is_err());
    assert_eq!(floats(&df, "LOG_LAMBDA"), vec![1.0, 3.0, 0.5, 2.0]);
}

#[test]
fn test_missing_log_lambda_fails_before_assignment() {
    let mut df = df!(
        "P_ID" => &["A", "B"],
        "L_ID" => &[1i64, 1]
    )
    .unwrap();
    let mut rng = StdRng::seed_from_u64(0);

    let err = simulate_coupling_demand(&mut df, 1, 2, &mut rng).unwrap_err();

    assert!(matches!(err, CouplingError::ColumnNotFound(ref c) if c == "LOG_LAMBDA"));
    assert!(df.column("C_ID").is_err());
}

#[test]
fn test_invalid_max_products_rejected() {
    let mut df = four_products();
    let mut rng = StdRng::seed_from_u64(0);
    let err = assign_couples(&mut df, 1, 1, &mut rng).unwrap_err();
    assert!(matches!(err, CouplingError::InvalidParameter(_)));
}

#[test]
fn test_every_row_matches_its_partition() {
    for seed in 0..10 {
        let df = DemandTableGenerator::new(25, 4).seed(seed).generate().unwrap();
        let before = floats(&df, "LOG_LAMBDA");

        let results = CouplingSimulationBuilder::new(df, 6)
            .max_products(4)
            .gain(0.7)
            .seed(seed)
            .run()
            .unwrap();
        let out = results.dataframe();

        let products = strings(out, "P_ID");
        let locations = strings(out, "L_ID");
        let c_ids = ints(out, "C_ID");
        let after = floats(out, "LOG_LAMBDA");

        // One group per product, and couple sizes within bounds.
        let mut group_of: HashMap<&str, i64> = HashMap::new();
        for (p, &c) in products.iter().zip(&c_ids) {
            let g = *group_of.entry(p.as_str()).or_insert(c);
            assert_eq!(g, c);
        }
        for (_, members) in results.couples().groups() {
            assert!(members.len() >= 2 && members.len() <= 4);
        }
        assert_eq!(results.couples().n_groups(), 6);

        let mut peaks: HashMap<(i64, &str), f64> = HashMap::new();
        for i in 0..before.len() {
            let peak = peaks
                .entry((c_ids[i], locations[i].as_str()))
                .or_insert(f64::NEG_INFINITY);
            *peak = peak.max(before[i]);
        }
        for i in 0..before.len() {
            if c_ids[i] == UNCOUPLED {
                assert_eq!(after[i], before[i]);
                continue;
            }
            let peak = peaks[&(c_ids[i], locations[i].as_str())];
            let expected = before[i] + (peak - before[i]).abs() * 0.7;
            assert!((after[i] - expected).abs() < 1e-12);
            if before[i] == peak {
                assert_eq!(after[i], before[i]);
            }
        }
    }
}

#[test]
fn test_zero_gain_is_idempotent() {
    let df = DemandTableGenerator::new(10, 2).seed(5).generate().unwrap();
    let before = floats(&df, "LOG_LAMBDA");

    let results = CouplingSimulationBuilder::new(df, 3)
        .gain(0.0)
        .seed(5)
        .run()
        .unwrap();
    let mut out = results.into_dataframe();
    assert_eq!(floats(&out, "LOG_LAMBDA"), before);

    balance_demand(&mut out, 0.0).unwrap();
    assert_eq!(floats(&out, "LOG_LAMBDA"), before);
}

#[test]
fn test_negative_gain_rejected_by_builder() {
    let err = CouplingSimulationBuilder::new(four_products(), 1)
        .gain(-0.5)
        .run()
        .unwrap_err();
    assert!(matches!(err, CouplingError::InvalidParameter(_)));
}

#[test]
fn test_truncate_policy_forms_fewer_couples() {
    let results = CouplingSimulationBuilder::new(four_products(), 5)
        .pool_exhaustion(PoolExhaustion::Truncate)
        .seed(2)
        .run()
        .unwrap();
    assert_eq!(results.couples().n_groups(), 2);
    assert_eq!(results.couples().uncoupled_products(), 0);
    assert_eq!(*results.n_couples_requested(), 5);
}

#[test]
fn test_same_seed_same_table() {
    let df = DemandTableGenerator::new(12, 3).seed(1).generate().unwrap();
    let a = CouplingSimulationBuilder::new(df.clone(), 4).seed(99).run().unwrap();
    let b = CouplingSimulationBuilder::new(df, 4).seed(99).run().unwrap();
    assert!(a.dataframe().equals(b.dataframe()));
    assert_eq!(a.couples(), b.couples());
}

#[test]
fn test_custom_columns_and_integer_ids() {
    let df = df!(
        "sku" => &[10i64, 20, 30, 10, 20, 30],
        "store" => &["north", "north", "north", "south", "south", "south"],
        "log_rate" => &[0.0, 2.0, 1.0, 4.0, 0.0, 1.0]
    )
    .unwrap();

    let results = CouplingSimulationBuilder::new(df, 1)
        .max_products(3)
        .product_column("sku")
        .location_column("store")
        .log_lambda_column("log_rate")
        .couple_column("couple")
        .seed(4)
        .run()
        .unwrap();
    let out = results.dataframe();

    assert!(out.column("C_ID").is_err());
    let c_ids = ints(out, "couple");
    assert_eq!(c_ids.len(), 6);
    // A product keeps its couple across stores.
    assert_eq!(c_ids[0], c_ids[3]);
    assert_eq!(c_ids[1], c_ids[4]);
    assert_eq!(c_ids[2], c_ids[5]);
    assert_eq!(results.couples().group_of("10"), Some(c_ids[0]));
}
