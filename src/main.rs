use clap::{CommandFactory, Parser, Subcommand};
use coupling_demand::{
    ColumnNames, CouplingSimulationBuilder, DemandTableGenerator, PoolExhaustion,
    DEFAULT_GAIN, DEFAULT_MAX_PRODUCTS,
};
use polars::prelude::*;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Couple products in a demand table and balance their log demand
    Simulate(SimulateArgs),
    /// Generate a synthetic products x locations demand table
    Generate(GenerateArgs),
}

#[derive(Parser, Debug)]
struct SimulateArgs {
    /// Path to the input CSV demand table
    #[arg(short, long)]
    data: PathBuf,

    /// The number of couples to form
    #[arg(long)]
    n_couples: usize,

    /// The largest number of products in one couple
    #[arg(long, default_value_t = DEFAULT_MAX_PRODUCTS)]
    max_products: usize,

    /// How strongly lower-demand products are pulled toward the couple peak
    #[arg(long, default_value_t = DEFAULT_GAIN)]
    gain: f64,

    /// Seed for the random generator
    #[arg(long)]
    seed: Option<u64>,

    /// Form as many couples as the product pool allows instead of failing
    #[arg(long)]
    truncate: bool,

    /// Path to write the augmented table as CSV
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to export the simulation report as JSON
    #[arg(long)]
    output_json: Option<PathBuf>,

    /// Path to export the simulation report as Markdown
    #[arg(long)]
    output_markdown: Option<PathBuf>,

    /// Name of the product id column
    #[arg(long, default_value = "P_ID")]
    product_column: String,

    /// Name of the location id column
    #[arg(long, default_value = "L_ID")]
    location_column: String,

    /// Name of the log demand rate column
    #[arg(long, default_value = "LOG_LAMBDA")]
    log_lambda_column: String,

    /// Name of the couple id column to write
    #[arg(long, default_value = "C_ID")]
    couple_column: String,
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    /// Number of distinct products
    #[arg(long)]
    products: usize,

    /// Number of distinct locations
    #[arg(long)]
    locations: usize,

    /// Mean of the log demand rate
    #[arg(long, default_value_t = 0.0)]
    mean: f64,

    /// Standard deviation of the log demand rate
    #[arg(long, default_value_t = 1.0)]
    std_dev: f64,

    /// Seed for the random generator
    #[arg(long)]
    seed: Option<u64>,

    /// Path to save the generated CSV
    #[arg(short, long)]
    output: PathBuf,
}

fn write_csv(df: &mut DataFrame, path: &Path) -> Result<(), Box<dyn Error>> {
    let mut file = std::fs::File::create(path)?;
    CsvWriter::new(&mut file).finish(df)?;
    Ok(())
}

fn run_simulation(args: SimulateArgs) -> Result<(), Box<dyn Error>> {
    let df = LazyCsvReader::new(&args.data)
        .with_has_header(true)
        .finish()?
        .collect()?;
    info!(rows = df.height(), path = %args.data.display(), "loaded demand table");

    let columns = ColumnNames {
        product: args.product_column,
        location: args.location_column,
        log_lambda: args.log_lambda_column,
        couple: args.couple_column,
    };
    let policy = if args.truncate {
        PoolExhaustion::Truncate
    } else {
        PoolExhaustion::Error
    };

    let mut builder = CouplingSimulationBuilder::new(df, args.n_couples);
    builder
        .max_products(args.max_products)
        .gain(args.gain)
        .pool_exhaustion(policy)
        .columns(columns);
    if let Some(seed) = args.seed {
        builder.seed(seed);
    }
    let results = builder.run()?;
    results.summary();

    if let Some(path) = args.output_json {
        let json = results
            .to_json()
            .map_err(|e| format!("Failed to serialize to JSON: {}", e))?;
        std::fs::write(path, json)?;
    }
    if let Some(path) = args.output_markdown {
        std::fs::write(path, results.to_markdown())?;
    }
    if let Some(path) = args.output {
        let mut df = results.into_dataframe();
        write_csv(&mut df, &path)?;
        println!("Augmented table written to: {}", path.display());
    }
    Ok(())
}

fn run_generate(args: GenerateArgs) -> Result<(), Box<dyn Error>> {
    let mut generator = DemandTableGenerator::new(args.products, args.locations);
    generator.mean(args.mean).std_dev(args.std_dev);
    if let Some(seed) = args.seed {
        generator.seed(seed);
    }
    let mut df = generator.generate()?;
    write_csv(&mut df, &args.output)?;
    println!(
        "Generated {} with {} rows.",
        args.output.display(),
        df.height()
    );
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Simulate(args) => run_simulation(args),
        Commands::Generate(args) => run_generate(args),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        let mut cmd = Cli::command();
        let _ = cmd.print_help();
        std::process::exit(1);
    }
}
