use coupling_demand::CouplingSimulationBuilder;
use polars::prelude::*;
use serde_json::Value;

#[test]
fn test_export_methods() -> Result<(), Box<dyn std::error::Error>> {
    let df = df!(
        "P_ID" => &["A", "B", "C", "D", "E", "A", "B", "C", "D", "E"],
        "L_ID" => &[1i64, 1, 1, 1, 1, 2, 2, 2, 2, 2],
        "LOG_LAMBDA" => &[1.0, 3.0, 0.5, 2.0, 1.2, 0.4, 0.9, 2.2, 1.7, 0.1]
    )?;

    let results = CouplingSimulationBuilder::new(df, 2)
        .max_products(2)
        .seed(17)
        .run()?;

    // Markdown
    let markdown = results.to_markdown();
    assert!(markdown.contains("| Metric | Value |"));
    assert!(markdown.contains("| Couples | 2 |"));
    assert!(markdown.contains("| C_ID | Products |"));

    // JSON
    let json_str = results.to_json()?;
    let json: Value = serde_json::from_str(&json_str)?;

    assert_eq!(json["n_rows"], 10);
    assert_eq!(json["couples"]["n_groups"], 2);
    assert_eq!(json["couples"]["assignments"].as_object().unwrap().len(), 5);
    assert!(json["balance"].get("mean_uplift").is_some());
    assert!(json.get("dataframe").is_none());

    // Summary must not panic
    results.summary();

    Ok(())
}
