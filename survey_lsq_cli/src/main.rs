use clap::{Args, Parser, Subcommand};
use log::info;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use survey_lsq::methods::parse_free_adjustment;
use survey_lsq::robust::TuningConstants;
use survey_lsq::{
    AdjustmentSettings, AdjustmentSummary, BuildStrategy, Dataset, Estimator, MethodManager,
    SigmaConfigSet, Solver, SolverConfig,
};

#[derive(Parser)]
#[command(name = "survey_lsq_cli", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Adjust a network read from a JSON dataset and print the summary.
    Adjust(AdjustArgs),
    /// List the weighting methods and their default tuning constants.
    Methods,
}

#[derive(Args)]
struct AdjustArgs {
    dataset: PathBuf,
    /// JSON file with named rows of fallback sigmas.
    #[arg(long)]
    sigma_config: Option<PathBuf>,
    /// Sigma row to use instead of the file's default row.
    #[arg(long)]
    sigma_index: Option<String>,
    #[arg(long, default_value = "weighted")]
    method: String,
    /// Tuning constant override for a robust method, as KEY=VALUE.
    #[arg(long = "tuning", value_parser = parse_key_value)]
    tuning: Vec<(String, f64)>,
    /// Free-adjustment method, or `none` to weight control coordinates.
    #[arg(long, default_value = "none")]
    free_adjustment: String,
    #[arg(long = "free-tuning", value_parser = parse_key_value)]
    free_tuning: Vec<(String, f64)>,
    /// `speed` or `memory-safe`; picked from the dataset size when omitted.
    #[arg(long)]
    strategy: Option<String>,
    #[arg(long, default_value_t = 0.001)]
    threshold: f64,
    #[arg(long, default_value_t = 100)]
    max_iter: usize,
    /// Include the per-iteration sigma history.
    #[arg(long)]
    history: bool,
    /// Write the summary here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn parse_key_value(s: &str) -> Result<(String, f64), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("{key}: {e}"))?;
    Ok((key.trim().to_string(), value))
}

fn overrides(pairs: Vec<(String, f64)>) -> Option<TuningConstants> {
    if pairs.is_empty() {
        None
    } else {
        Some(pairs.into_iter().collect())
    }
}

fn adjust(args: AdjustArgs) -> Result<(), Box<dyn std::error::Error>> {
    let dataset = Dataset::from_json_file(&args.dataset)?;
    let sigma_set = match &args.sigma_config {
        Some(path) => SigmaConfigSet::from_json_file(path)?,
        None => SigmaConfigSet::default(),
    };

    let mut methods = MethodManager::default();
    methods.set_method(args.method.parse()?, overrides(args.tuning).as_ref());
    methods.set_free_adjustment(
        parse_free_adjustment(&args.free_adjustment)?,
        overrides(args.free_tuning).as_ref(),
    );

    let settings = AdjustmentSettings {
        solver: SolverConfig::new(args.threshold, args.max_iter)?,
        sigmas: sigma_set.get(args.sigma_index.as_deref())?.clone(),
        strategy: args
            .strategy
            .as_deref()
            .map(str::parse::<BuildStrategy>)
            .transpose()?,
        keep_history: args.history,
    };
    let mut solver = Solver::new(dataset, settings)?.with_methods(methods);
    let results = solver.solve()?;
    info!(
        "{} after {} iterations, sigma0 {:.6}",
        results.status,
        results.iterations,
        results.residual_sigma()
    );
    write_summary(&results.summary(), args.output.as_deref())
}

fn write_summary(
    summary: &AdjustmentSummary,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(path) => {
            let file = File::create(path)?;
            serde_json::to_writer_pretty(BufWriter::new(file), summary)?;
            println!("Wrote summary to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(summary)?),
    }
    Ok(())
}

fn print_methods() {
    println!("ordinary");
    println!("weighted");
    for estimator in Estimator::ALL {
        let constants: Vec<String> = estimator
            .default_constants()
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        println!("{} {}", estimator, constants.join(" "));
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Adjust(args) => adjust(args),
        Commands::Methods => {
            print_methods();
            Ok(())
        }
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
