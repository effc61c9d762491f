use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::data::loader::LoadOptions;
use crate::data::model::IndexRange;
use crate::data::segment::SegmentParams;
use crate::learn::least_squares::LeastSquaresRegressor;
use crate::learn::registry::RegressorOptions;
use crate::learn::transform::TransformConfig;

// ---------------------------------------------------------------------------
// RunConfig – everything one fit-and-evaluate run needs
// ---------------------------------------------------------------------------

/// Configuration for [`crate::pipeline::run`], read from JSON.
///
/// ```json
/// {
///   "train_files": ["data/High Power King Air.txt", "data/Medium Power King Air.txt"],
///   "test_files": ["data/Low Power King Air.txt"],
///   "units": "unit.json",
///   "segmentation": { "accel_tolerance": 0.01, "min_speed": 10.0, "min_length": 200 },
///   "test_range": [0, 3000],
///   "save_model": "models/king_air.json"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub train_files: Vec<PathBuf>,
    pub test_files: Vec<PathBuf>,
    /// Single-character field separator for delimited files.
    pub delimiter: char,
    /// Optional unit-conversion file applied to every loaded table.
    pub units: Option<PathBuf>,
    pub time_channel: String,
    pub speed_channel: String,
    pub segmentation: SegmentParams,
    pub model: String,
    #[serde(flatten)]
    pub regressor: RegressorOptions,
    pub transform: TransformConfig,
    /// `[start, end)` of the test table; the whole table when absent.
    pub test_range: Option<(usize, usize)>,
    pub save_model: Option<PathBuf>,
    pub verbose: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            train_files: Vec::new(),
            test_files: Vec::new(),
            delimiter: '|',
            units: None,
            time_channel: "_zulu,_time".to_string(),
            speed_channel: "true air speed".to_string(),
            segmentation: SegmentParams::default(),
            model: LeastSquaresRegressor::ID.to_string(),
            regressor: RegressorOptions::default(),
            transform: TransformConfig::default(),
            test_range: None,
            save_model: None,
            verbose: false,
        }
    }
}

impl RunConfig {
    /// Read and validate a configuration file.  Relative paths inside it
    /// are resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: RunConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.train_files.iter_mut().for_each(resolve);
        self.test_files.iter_mut().for_each(resolve);
        self.units.iter_mut().for_each(resolve);
        self.save_model.iter_mut().for_each(resolve);
    }

    pub fn validate(&self) -> Result<()> {
        if self.train_files.is_empty() {
            bail!("config lists no training files");
        }
        if !self.delimiter.is_ascii() {
            bail!("delimiter '{}' is not a single-byte character", self.delimiter);
        }
        if !(self.segmentation.accel_tolerance > 0.0) {
            bail!(
                "accel_tolerance must be positive, got {}",
                self.segmentation.accel_tolerance
            );
        }
        if !(self.regressor.max_condition > 1.0) {
            bail!("max_condition must exceed 1, got {}", self.regressor.max_condition);
        }
        if let Some((start, end)) = self.test_range {
            IndexRange::new(start, end).context("invalid test_range")?;
        }
        Ok(())
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            delimiter: self.delimiter as u8,
        }
    }
}
