use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::RunConfig;
use crate::data::loader::load_all;
use crate::data::model::{DataSource, IndexRange, TelemetryTable};
use crate::data::segment::find_steady_windows;
use crate::data::units::UnitConverter;
use crate::learn::metrics::ErrorReport;
use crate::learn::registry::build_model;
use crate::learn::supervised::SupervisedModel;

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// A cruise window the model could not use.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedWindow {
    pub range: IndexRange,
    pub reason: String,
}

/// Outcome of one fit-and-evaluate run, printed as JSON by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub training_rows: usize,
    pub windows: Vec<IndexRange>,
    pub skipped: Vec<SkippedWindow>,
    /// Fitted parameters, one inner vector per target column.
    pub parameters: Vec<Vec<f64>>,
    pub in_sample: ErrorReport,
    pub out_sample: Option<ErrorReport>,
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Cruise windows of a table, using the configured speed/time channels.
pub fn cruise_windows(table: &TelemetryTable, config: &RunConfig) -> Result<Vec<IndexRange>> {
    let speed = table.channel(&config.speed_channel)?;
    let time = table.channel(&config.time_channel)?;
    let windows = find_steady_windows(speed, time, &config.segmentation)
        .context("segmenting cruise phases")?;
    log::info!(
        "found {} cruise windows covering {} samples",
        windows.len(),
        windows.iter().map(IndexRange::len).sum::<usize>()
    );
    Ok(windows)
}

/// Feed every window to the model.  A window the model rejects is logged
/// and skipped; the remaining windows are still read.
pub fn accumulate_windows(
    model: &mut SupervisedModel,
    source: &dyn DataSource,
    windows: &[IndexRange],
) -> Vec<SkippedWindow> {
    let mut skipped = Vec::new();
    for &range in windows {
        if let Err(err) = model.read_data(source, range) {
            log::warn!("skipping window {range}: {err}");
            skipped.push(SkippedWindow {
                range,
                reason: err.to_string(),
            });
        }
    }
    skipped
}

// ---------------------------------------------------------------------------
// Full run
// ---------------------------------------------------------------------------

/// Load → segment → accumulate → train → evaluate → (save).
pub fn run(config: &RunConfig) -> Result<RunReport> {
    let converter = config
        .units
        .as_deref()
        .map(UnitConverter::load)
        .transpose()?;
    let options = config.load_options();

    let train = load_all(&config.train_files, &options, converter.as_ref())
        .context("loading training data")?;
    let windows = cruise_windows(&train, config)?;

    let mut model = build_model(&config.model, &config.transform, &config.regressor)?;
    let skipped = accumulate_windows(&mut model, &train, &windows);

    let params = model.train().context("training model")?.clone();
    let in_sample = model.in_sample_error(config.verbose)?;
    log::info!("in-sample: RMSE {:?}, SE {:?}", in_sample.rmse, in_sample.se);

    let out_sample = if config.test_files.is_empty() {
        None
    } else {
        let test = load_all(&config.test_files, &options, converter.as_ref())
            .context("loading test data")?;
        let range = match config.test_range {
            Some((start, end)) => IndexRange::new(start, end)?,
            None => IndexRange::new(0, test.len())?,
        };
        let report = model
            .out_sample_error(&test, range, config.verbose)
            .with_context(|| format!("evaluating test range {range}"))?;
        log::info!("out-of-sample: RMSE {:?}, SE {:?}", report.rmse, report.se);
        Some(report)
    };

    if let Some(path) = &config.save_model {
        model.snapshot(Some(in_sample.clone()))?.save(path)?;
    }

    Ok(RunReport {
        training_rows: model.rows(),
        windows,
        skipped,
        parameters: params
            .column_iter()
            .map(|c| c.iter().copied().collect())
            .collect(),
        in_sample,
        out_sample,
    })
}
