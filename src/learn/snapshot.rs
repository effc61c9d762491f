use std::path::Path;

use anyhow::Context;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::metrics::ErrorReport;
use super::registry::{RegressorOptions, regressor_for};
use super::supervised::SupervisedModel;
use super::transform::TransformConfig;
use crate::error::{ModelError, Result};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Stable on-disk form of a trained model.
///
/// ```json
/// {
///   "format_version": 1,
///   "model": "least_squares",
///   "options": { "max_condition": 1e12 },
///   "transform": { "kind": "fuel_flow", "features": [...], "targets": [...], "bias": 37836.35 },
///   "parameters": { "rows": 3, "cols": 1, "values": [...] },
///   "metadata": { "trained_rows": 5120, "in_sample": { "RMSE": [...], "SE": [...], "rows": 5120 }, "crate_version": "0.1.0" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub format_version: u32,
    pub model: String,
    /// Absent in older files, which restore with the defaults.
    #[serde(default)]
    pub options: RegressorOptions,
    pub transform: TransformConfig,
    pub parameters: ParameterBlock,
    pub metadata: SnapshotMetadata,
}

/// Parameter matrix, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBlock {
    pub rows: usize,
    pub cols: usize,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub trained_rows: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_sample: Option<ErrorReport>,
    pub crate_version: String,
}

impl ParameterBlock {
    pub fn from_matrix(m: &DMatrix<f64>) -> Self {
        let values = m.transpose().as_slice().to_vec();
        ParameterBlock {
            rows: m.nrows(),
            cols: m.ncols(),
            values,
        }
    }

    pub fn to_matrix(&self) -> Result<DMatrix<f64>> {
        if self.values.len() != self.rows * self.cols {
            return Err(ModelError::ShapeMismatch(format!(
                "parameter block declares {}x{} but holds {} values",
                self.rows,
                self.cols,
                self.values.len()
            )));
        }
        Ok(DMatrix::from_row_slice(self.rows, self.cols, &self.values))
    }
}

impl ModelSnapshot {
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let file = std::fs::File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)
            .context("writing model snapshot")?;
        log::info!("saved {} model to {}", self.model, path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let snapshot: ModelSnapshot =
            serde_json::from_str(&text).context("parsing model snapshot")?;
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(ModelError::SnapshotVersion {
                found: snapshot.format_version,
                expected: SNAPSHOT_FORMAT_VERSION,
            }
            .into());
        }
        Ok(snapshot)
    }
}

impl SupervisedModel {
    /// Capture the fitted parameters and transformer configuration.
    pub fn snapshot(&self, in_sample: Option<ErrorReport>) -> Result<ModelSnapshot> {
        let params = self
            .parameters()
            .ok_or(ModelError::InsufficientData { rows: self.rows() })?;
        Ok(ModelSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            model: self.regressor().id().to_string(),
            options: self.regressor().options(),
            transform: self.transformer().config(),
            parameters: ParameterBlock::from_matrix(params),
            metadata: SnapshotMetadata {
                trained_rows: self.rows(),
                in_sample,
                crate_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        })
    }

    /// Rebuild a trained model.  It has no accumulated rows, so only
    /// prediction and out-of-sample evaluation are available.
    pub fn from_snapshot(snapshot: &ModelSnapshot) -> Result<Self> {
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(ModelError::SnapshotVersion {
                found: snapshot.format_version,
                expected: SNAPSHOT_FORMAT_VERSION,
            });
        }
        let regressor = regressor_for(&snapshot.model, &snapshot.options)?;
        let transformer = snapshot.transform.build()?;
        let parameters = snapshot.parameters.to_matrix()?;
        Ok(SupervisedModel::with_parameters(transformer, regressor, parameters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{IndexRange, TelemetryTable};
    use crate::learn::least_squares::DEFAULT_MAX_CONDITION;
    use crate::learn::registry::build_model;

    fn trained_model() -> (SupervisedModel, TelemetryTable) {
        let a: Vec<f64> = (0..40).map(|i| 0.1 * i as f64 + 0.013).collect();
        let y: Vec<f64> = a.iter().map(|a| 1.0 / 3.0 + a * std::f64::consts::PI + (7.0 * a).sin()).collect();
        let data = TelemetryTable::from_columns(vec![
            ("a".to_string(), a),
            ("y".to_string(), y),
        ])
        .unwrap();
        let transform = TransformConfig::Linear {
            features: vec!["a".to_string()],
            targets: vec!["y".to_string()],
            intercept: true,
        };
        let mut model =
            build_model("least_squares", &transform, &RegressorOptions::default()).unwrap();
        model.read_data(&data, IndexRange::new(0, 40).unwrap()).unwrap();
        model.train().unwrap();
        (model, data)
    }

    #[test]
    fn file_round_trip_predicts_identically() {
        let (model, data) = trained_model();
        let in_sample = model.in_sample_error(false).unwrap();
        let snapshot = model.snapshot(Some(in_sample)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("fuel.json");
        snapshot.save(&path).unwrap();
        let loaded = ModelSnapshot::load(&path).unwrap();
        assert_eq!(loaded, snapshot);

        let restored = SupervisedModel::from_snapshot(&loaded).unwrap();
        let range = IndexRange::new(0, 40).unwrap();
        assert_eq!(
            restored.predict(&data, range).unwrap(),
            model.predict(&data, range).unwrap()
        );
        assert_eq!(restored.parameters(), model.parameters());
    }

    #[test]
    fn restored_model_has_no_training_rows() {
        let (model, data) = trained_model();
        let restored = SupervisedModel::from_snapshot(&model.snapshot(None).unwrap()).unwrap();
        assert!(restored.in_sample_error(false).is_err());
        assert!(restored
            .out_sample_error(&data, IndexRange::new(0, 10).unwrap(), false)
            .is_ok());
    }

    #[test]
    fn untrained_model_has_no_snapshot() {
        let model = build_model(
            "least_squares",
            &TransformConfig::default(),
            &RegressorOptions::default(),
        )
        .unwrap();
        assert!(matches!(
            model.snapshot(None),
            Err(ModelError::InsufficientData { rows: 0 })
        ));
    }

    #[test]
    fn rejects_bad_version_and_shape() {
        let (model, _) = trained_model();
        let mut snapshot = model.snapshot(None).unwrap();
        snapshot.format_version = 99;
        assert!(matches!(
            SupervisedModel::from_snapshot(&snapshot),
            Err(ModelError::SnapshotVersion { found: 99, .. })
        ));

        let mut snapshot = model.snapshot(None).unwrap();
        snapshot.parameters.values.pop();
        assert!(SupervisedModel::from_snapshot(&snapshot).is_err());
    }

    #[test]
    fn regressor_options_survive_restore() {
        let data = TelemetryTable::from_columns(vec![
            ("a".to_string(), (0..10).map(f64::from).collect()),
            ("y".to_string(), (0..10).map(|i| 3.0 * f64::from(i)).collect()),
        ])
        .unwrap();
        let transform = TransformConfig::Linear {
            features: vec!["a".to_string()],
            targets: vec!["y".to_string()],
            intercept: true,
        };
        let options = RegressorOptions { max_condition: 1.5 };
        let mut model = build_model("least_squares", &transform, &RegressorOptions::default()).unwrap();
        model.read_data(&data, IndexRange::new(0, 10).unwrap()).unwrap();
        model.train().unwrap();
        let mut snapshot = model.snapshot(None).unwrap();
        assert_eq!(snapshot.options, RegressorOptions::default());
        snapshot.options = options;

        let text = serde_json::to_string(&snapshot).unwrap();
        let parsed: ModelSnapshot = serde_json::from_str(&text).unwrap();
        let mut restored = SupervisedModel::from_snapshot(&parsed).unwrap();
        assert_eq!(restored.regressor().options(), options);

        // Refitting after restore applies the persisted limit.
        restored.read_data(&data, IndexRange::new(0, 10).unwrap()).unwrap();
        assert!(matches!(
            restored.train(),
            Err(ModelError::NumericalInstability { .. })
        ));
    }

    #[test]
    fn snapshot_without_options_uses_defaults() {
        let (model, _) = trained_model();
        let mut value = serde_json::to_value(model.snapshot(None).unwrap()).unwrap();
        value.as_object_mut().unwrap().remove("options");
        let parsed: ModelSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.options, RegressorOptions::default());
        let restored = SupervisedModel::from_snapshot(&parsed).unwrap();
        assert_eq!(restored.regressor().options().max_condition, DEFAULT_MAX_CONDITION);
    }

    #[test]
    fn parameter_block_is_row_major() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let block = ParameterBlock::from_matrix(&m);
        assert_eq!(block.values, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(block.to_matrix().unwrap(), m);
    }
}
