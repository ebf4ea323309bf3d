//! Regional risk engine CLI
//!
//! Scores single regions or whole tables with a trained tree ensemble and
//! prints machine-readable JSON on stdout. Logs go to stderr.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use regional_risk_core::{
    BatchPipeline, EngineConfig, PredictOptions, RawFeatures, RiskEngine, VERSION,
};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "risk-engine")]
#[command(author = "Regional Risk Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Regional risk inference and explainability engine", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Model artifact path (overrides configuration)
    #[arg(short, long, global = true)]
    model: Option<PathBuf>,

    /// Scaler artifact path (overrides configuration)
    #[arg(long, global = true)]
    scaler: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score a single region
    Predict(PredictArgs),
    /// Score every row of a CSV or JSON table
    Batch(BatchArgs),
    /// Print model metadata
    Info,
    /// Rank features by their global importance in the ensemble
    Importance {
        /// Number of features to list
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Write the effective configuration as TOML
    InitConfig {
        /// Destination file
        #[arg(default_value = "risk_engine.toml")]
        output: PathBuf,
    },
}

#[derive(Args, Debug)]
struct PredictArgs {
    /// JSON file holding one region's indicators
    #[arg(short, long, conflicts_with = "json", required_unless_present = "json")]
    input: Option<PathBuf>,

    /// Inline JSON object of indicators
    #[arg(long)]
    json: Option<String>,

    /// Include per-feature contributions
    #[arg(long)]
    contributions: bool,

    /// Include attention weights
    #[arg(long)]
    attention: bool,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Input table (.csv or .json)
    #[arg(short, long)]
    input: PathBuf,

    /// Output table; the format follows the extension
    #[arg(short, long)]
    output: PathBuf,

    /// Add a feature_contributions column
    #[arg(long)]
    contributions: bool,

    /// Add an attention_weights column
    #[arg(long)]
    attention: bool,

    /// Score rows on the current thread only
    #[arg(long)]
    sequential: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config, cli.verbose)?;

    debug!("risk-engine v{VERSION}");
    for warning in config.validate().context("Invalid configuration")? {
        warn!("{warning}");
    }

    match &cli.command {
        Command::Predict(args) => predict(&config, args),
        Command::Batch(args) => batch(&config, args),
        Command::Info => {
            let engine = load_engine(&config)?;
            print_json(engine.metadata())
        }
        Command::Importance { limit } => {
            let engine = load_engine(&config)?;
            print_json(&engine.importance(*limit))
        }
        Command::InitConfig { output } => {
            if output.exists() {
                bail!("{} already exists", output.display());
            }
            config
                .save_to_file(output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            Ok(())
        }
    }
}

/// File (if any), then `RISK_ENGINE_*` variables, then command-line flags
fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("Invalid environment override")?;

    if let Some(model) = &cli.model {
        config.model.path = model.clone();
    }
    if let Some(scaler) = &cli.scaler {
        config.model.scaler_path = Some(scaler.clone());
    }
    Ok(config)
}

fn init_logging(config: &EngineConfig, verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .context("Invalid log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {e}"))
}

fn load_engine(config: &EngineConfig) -> Result<RiskEngine> {
    RiskEngine::from_config(config)
        .with_context(|| format!("Failed to load model {}", config.model.path.display()))
}

fn predict(config: &EngineConfig, args: &PredictArgs) -> Result<()> {
    let input = match (&args.input, &args.json) {
        (Some(path), _) => read_region(path)?,
        (None, Some(json)) => parse_region(json).context("Invalid --json input")?,
        (None, None) => bail!("either --input or --json is required"),
    };

    let engine = load_engine(config)?;
    let options = PredictOptions {
        include_contributions: args.contributions,
        include_attention: args.attention,
    };
    let prediction = engine.predict(&input, options).context("Prediction failed")?;
    info!(
        level = prediction.risk_level,
        score = prediction.risk_score,
        "region scored"
    );
    print_json(&prediction)
}

fn batch(config: &EngineConfig, args: &BatchArgs) -> Result<()> {
    let engine = load_engine(config)?;
    let mut batch_config = config.batch.clone();
    batch_config.include_contributions |= args.contributions;
    batch_config.include_attention |= args.attention;
    if args.sequential {
        batch_config.parallel = false;
    }

    let pipeline = BatchPipeline::new(engine, batch_config);
    let outcome = pipeline
        .run_path(&args.input, &args.output)
        .with_context(|| format!("Batch scoring of {} failed", args.input.display()))?;

    if outcome.summary.failed > 0 {
        warn!(
            failed = outcome.summary.failed,
            total = outcome.summary.total,
            "some rows could not be scored"
        );
    }
    print_json(&outcome.summary)
}

fn read_region(path: &Path) -> Result<RawFeatures> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_region(&content).with_context(|| format!("Invalid input in {}", path.display()))
}

fn parse_region(text: &str) -> Result<RawFeatures> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        other => bail!("expected a JSON object of indicators, got {other}"),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{out}");
    Ok(())
}
