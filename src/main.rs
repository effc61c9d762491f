use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueHint};

use cruise_fuel::config::RunConfig;
use cruise_fuel::data::loader::{LoadOptions, load_all};
use cruise_fuel::data::model::{DataSource, IndexRange};
use cruise_fuel::data::segment::{SegmentParams, find_steady_windows};
use cruise_fuel::data::units::UnitConverter;
use cruise_fuel::learn::registry;
use cruise_fuel::learn::snapshot::ModelSnapshot;
use cruise_fuel::learn::supervised::SupervisedModel;
use cruise_fuel::pipeline;

#[derive(Parser, Debug)]
#[command(author, version, about = "Cruise fuel-flow model fitting", long_about = None)]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Segment, train and evaluate as described by a run configuration
    Fit(FitArgs),
    /// Print the cruise windows found in telemetry files
    Segment(SegmentArgs),
    /// Evaluate a saved model on telemetry files
    Evaluate(EvaluateArgs),
    /// List registered models
    Models,
}

#[derive(Parser, Debug)]
struct FitArgs {
    /// Run configuration (JSON)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    config: PathBuf,
}

#[derive(Parser, Debug)]
struct SegmentArgs {
    /// Telemetry files, concatenated in order
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    #[arg(long, default_value = "|")]
    delimiter: char,

    #[arg(long, default_value = "true air speed")]
    speed: String,

    #[arg(long, default_value = "_zulu,_time")]
    time: String,

    #[arg(long, default_value_t = SegmentParams::default().accel_tolerance)]
    accel_tolerance: f64,

    #[arg(long, default_value_t = SegmentParams::default().min_speed)]
    min_speed: f64,

    #[arg(long, default_value_t = SegmentParams::default().min_length)]
    min_length: usize,

    /// Unit conversion file applied before segmenting
    #[arg(long, value_hint = ValueHint::FilePath)]
    units: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct EvaluateArgs {
    /// Saved model snapshot
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    model: PathBuf,

    /// Telemetry files, concatenated in order
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    #[arg(long, default_value = "|")]
    delimiter: char,

    #[arg(long, value_hint = ValueHint::FilePath)]
    units: Option<PathBuf>,

    /// First row (inclusive)
    #[arg(long, default_value_t = 0)]
    start: usize,

    /// Last row (exclusive); defaults to the table length
    #[arg(long)]
    end: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Command::Fit(args) => {
            let mut config = RunConfig::load(&args.config)?;
            config.verbose |= cli.verbose;
            let report = pipeline::run(&config)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Segment(args) => {
            let converter = args.units.as_deref().map(UnitConverter::load).transpose()?;
            let table = load_all(&args.inputs, &load_options(args.delimiter)?, converter.as_ref())?;
            let params = SegmentParams {
                accel_tolerance: args.accel_tolerance,
                min_speed: args.min_speed,
                min_length: args.min_length,
            };
            let windows =
                find_steady_windows(table.channel(&args.speed)?, table.channel(&args.time)?, &params)?;
            println!("{}", serde_json::to_string_pretty(&windows)?);
        }
        Command::Evaluate(args) => {
            let snapshot = ModelSnapshot::load(&args.model)?;
            let model = SupervisedModel::from_snapshot(&snapshot)
                .with_context(|| format!("restoring {}", args.model.display()))?;
            let converter = args.units.as_deref().map(UnitConverter::load).transpose()?;
            let table = load_all(&args.inputs, &load_options(args.delimiter)?, converter.as_ref())?;
            let range = IndexRange::new(args.start, args.end.unwrap_or(table.len()))?;
            let report = model.out_sample_error(&table, range, cli.verbose)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Models => {
            for entry in registry::available() {
                println!("{:<16} {}", entry.id, entry.description);
            }
        }
    }
    Ok(())
}

fn load_options(delimiter: char) -> Result<LoadOptions> {
    anyhow::ensure!(delimiter.is_ascii(), "delimiter '{delimiter}' is not a single-byte character");
    Ok(LoadOptions {
        delimiter: delimiter as u8,
    })
}
