//! ctbnc - learn and run continuous-time Bayesian network classifiers
//!
//! Usage:
//!   ctbnc learn --train a.csv b.csv                  # Learn CIMs and print them
//!   ctbnc classify --train a.csv --test c.csv        # Classify test files
//!   ctbnc classify ... --interval 0.5 -o json        # Add a query grid, JSON output
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `warn`).

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use ctbnc_cli::pipeline::{evaluate, train};
use ctbnc_cli::{ClassifyReport, CliConfig, LearnReport};
use ctbnc_core::storage::read_csv_files;
use ctbnc_core::CtbnError;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ctbnc")]
#[command(version)]
#[command(about = "Continuous-time Bayesian network classifier CLI")]
#[command(long_about = "Learn CTBN classifiers from CSV trajectories and classify new ones")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Learn a model from training files and print its CIMs
    Learn(CommonArgs),
    /// Learn from training files, then classify test files
    Classify(ClassifyArgs),
}

#[derive(Args)]
struct CommonArgs {
    /// Training CSV files, one trajectory per file
    #[arg(long, required = true, num_args = 1.., value_name = "CSV")]
    train: Vec<PathBuf>,

    /// TOML config with [dataset], [learning] and [classification] tables
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format: summary or json
    #[arg(short, long, default_value = "summary", value_name = "FORMAT")]
    output: String,
}

#[derive(Args)]
struct ClassifyArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Test CSV files to classify
    #[arg(long, required = true, num_args = 1.., value_name = "CSV")]
    test: Vec<PathBuf>,

    /// Also query the posterior on a uniform grid with this spacing
    #[arg(long, value_name = "DT")]
    interval: Option<f64>,

    /// Predict the positive class when its posterior reaches this value
    #[arg(long, value_name = "P")]
    threshold: Option<f64>,

    /// Class state the threshold applies to
    #[arg(long, value_name = "STATE", requires = "threshold")]
    positive: Option<String>,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Learn(args) => run_learn(args),
        Command::Classify(args) => run_classify(args),
    };
    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load_config(args: &CommonArgs) -> Result<CliConfig, CtbnError> {
    match &args.config {
        Some(path) => CliConfig::load(path),
        None => Ok(CliConfig::default()),
    }
}

fn run_learn(args: CommonArgs) -> Result<(), CtbnError> {
    let config = load_config(&args)?;
    let trained = train(&read_csv_files(&args.train)?, &config)?;
    let report = LearnReport::new(&trained);
    match args.output.as_str() {
        "json" => print_json(&report),
        _ => {
            print_learn_summary(&report);
            Ok(())
        }
    }
}

fn run_classify(args: ClassifyArgs) -> Result<(), CtbnError> {
    let mut config = load_config(&args.common)?;
    if args.interval.is_some() {
        config.classification.interval = args.interval;
    }
    if args.threshold.is_some() {
        config.classification.threshold = args.threshold;
    }
    if args.positive.is_some() {
        config.classification.positive_class = args.positive;
    }
    config.validate()?;

    let trained = train(&read_csv_files(&args.common.train)?, &config)?;
    let evaluation = evaluate(&trained, &read_csv_files(&args.test)?, &config)?;
    let report = ClassifyReport::new(&evaluation);
    match args.common.output.as_str() {
        "json" => print_json(&report),
        _ => {
            print_classify_summary(&report);
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CtbnError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CtbnError::Construction(format!("error serializing to JSON: {}", e)))?;
    println!("{}", json);
    Ok(())
}

fn print_learn_summary(report: &LearnReport) {
    println!(
        "✓ Learned '{}' from {} trajectories ({} records)\n",
        report.model, report.trajectories, report.transitions
    );
    for node in &report.nodes {
        let parents = if node.parents.is_empty() {
            "none".to_string()
        } else {
            node.parents.join(", ")
        };
        println!(
            "{} ({:?}, states: {}; parents: {})",
            node.name,
            node.kind,
            node.states.join(", "),
            parents
        );
        for (entry, rows) in node.cims.iter().enumerate() {
            println!("  entry {}:", entry);
            for row in rows {
                let cells: Vec<String> = row.iter().map(|v| format!("{:>10.6}", v)).collect();
                println!("    [{}]", cells.join(" "));
            }
        }
    }
}

fn print_classify_summary(report: &ClassifyReport) {
    println!("Predictions ({}):", report.predictions.len());
    for p in &report.predictions {
        let probabilities: Vec<String> =
            p.probabilities.iter().map(|v| format!("{:.4}", v)).collect();
        match &p.actual {
            Some(actual) => println!(
                "  {}: {} (actual {}) [{}]",
                p.file,
                p.predicted,
                actual,
                probabilities.join(", ")
            ),
            None => println!("  {}: {} [{}]", p.file, p.predicted, probabilities.join(", ")),
        }
    }

    if let Some(metrics) = &report.metrics {
        println!("\nMetrics ({} labelled):", metrics.labelled);
        for (name, value) in &metrics.values {
            println!("  {} = {:.6}", name, value);
        }
        println!("\nConfusion (rows actual, columns predicted):");
        for row in &metrics.confusion {
            let cells: Vec<String> = row.iter().map(|c| format!("{:>6}", c)).collect();
            println!("  {}", cells.join(""));
        }
    }
}
