use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::data::model::{DataSource, IndexRange};
use crate::error::{ModelError, Result};

/// Pound-force to newton.
pub const LBF_TO_NEWTON: f64 = 4.448221628254617;

/// Fixed correction added to the summed fuel channels.
pub const DEFAULT_FUEL_BIAS: f64 = 8506.0 * LBF_TO_NEWTON;

// ---------------------------------------------------------------------------
// DataTransformer – raw channels → (X, Y)
// ---------------------------------------------------------------------------

/// Maps selected raw channels to a feature matrix X and target matrix Y.
///
/// Both transforms must be pure: they receive an owned copy of the raw
/// selection, must not change its row count, and must not keep it.
pub trait DataTransformer: std::fmt::Debug {
    /// Raw channels handed to [`transform_features`](Self::transform_features), in order.
    fn feature_channels(&self) -> &[String];

    /// Raw channels handed to [`transform_targets`](Self::transform_targets), in order.
    fn target_channels(&self) -> &[String];

    fn transform_features(&self, raw: &DMatrix<f64>) -> Result<DMatrix<f64>>;

    fn transform_targets(&self, raw: &DMatrix<f64>) -> Result<DMatrix<f64>>;

    /// Serializable description sufficient to rebuild this transformer.
    fn config(&self) -> TransformConfig;

    /// Select the raw channels over `range` and produce `(X, Y)`.
    fn build(
        &self,
        source: &dyn DataSource,
        range: IndexRange,
    ) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
        let raw_x = source.select(self.feature_channels(), range)?;
        let raw_y = source.select(self.target_channels(), range)?;
        let x = self.transform_features(&raw_x)?;
        let y = self.transform_targets(&raw_y)?;
        if x.nrows() != range.len() || y.nrows() != range.len() {
            return Err(ModelError::ShapeMismatch(format!(
                "transform produced {} feature rows and {} target rows for a range of {}",
                x.nrows(),
                y.nrows(),
                range.len()
            )));
        }
        Ok((x, y))
    }
}

// ---------------------------------------------------------------------------
// TransformConfig – the persisted, registry-resolvable form
// ---------------------------------------------------------------------------

/// Every transformer variant, as stored in configuration and snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformConfig {
    FuelFlow {
        features: Vec<String>,
        targets: Vec<String>,
        #[serde(default = "default_fuel_bias")]
        bias: f64,
    },
    Linear {
        features: Vec<String>,
        targets: Vec<String>,
        #[serde(default = "default_true")]
        intercept: bool,
    },
}

fn default_fuel_bias() -> f64 {
    DEFAULT_FUEL_BIAS
}

fn default_true() -> bool {
    true
}

impl Default for TransformConfig {
    fn default() -> Self {
        let features = ["true air speed", "ambient pressure", "ambient temperature", "angle of attack"];
        TransformConfig::FuelFlow {
            features: features.iter().map(|s| s.to_string()).collect(),
            targets: (1..=8).map(|i| format!("fuel {i}")).collect(),
            bias: DEFAULT_FUEL_BIAS,
        }
    }
}

impl TransformConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            TransformConfig::FuelFlow { .. } => "fuel_flow",
            TransformConfig::Linear { .. } => "linear",
        }
    }

    pub fn build(&self) -> Result<Box<dyn DataTransformer>> {
        Ok(match self.clone() {
            TransformConfig::FuelFlow {
                features,
                targets,
                bias,
            } => Box::new(FuelFlowTransform::new(features, targets, bias)?),
            TransformConfig::Linear {
                features,
                targets,
                intercept,
            } => Box::new(LinearTransform::new(features, targets, intercept)),
        })
    }
}

// ---------------------------------------------------------------------------
// FuelFlowTransform
// ---------------------------------------------------------------------------

/// Fuel-flow model features for a turboprop in cruise.
///
/// Raw features are `[v, p, T, α]` (true air speed, ambient pressure,
/// ambient temperature, angle of attack).  With `q = v²·p/T`, proportional
/// to dynamic pressure, the features are `[1, q, q·α]`.  The target is the
/// sum of all fuel channels plus a constant bias.
#[derive(Debug, Clone, PartialEq)]
pub struct FuelFlowTransform {
    features: Vec<String>,
    targets: Vec<String>,
    bias: f64,
}

impl FuelFlowTransform {
    pub fn new(features: Vec<String>, targets: Vec<String>, bias: f64) -> Result<Self> {
        if features.len() != 4 {
            return Err(ModelError::ShapeMismatch(format!(
                "fuel-flow transform needs 4 feature channels (speed, pressure, temperature, angle of attack), got {}",
                features.len()
            )));
        }
        if targets.is_empty() {
            return Err(ModelError::ShapeMismatch(
                "fuel-flow transform needs at least one target channel".to_string(),
            ));
        }
        Ok(Self {
            features,
            targets,
            bias,
        })
    }
}

impl DataTransformer for FuelFlowTransform {
    fn feature_channels(&self) -> &[String] {
        &self.features
    }

    fn target_channels(&self) -> &[String] {
        &self.targets
    }

    fn transform_features(&self, raw: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        if raw.ncols() != 4 {
            return Err(ModelError::ShapeMismatch(format!(
                "expected 4 raw feature columns, got {}",
                raw.ncols()
            )));
        }
        let mut x = DMatrix::from_element(raw.nrows(), 3, 1.0);
        for i in 0..raw.nrows() {
            let (v, p, t, alpha) = (raw[(i, 0)], raw[(i, 1)], raw[(i, 2)], raw[(i, 3)]);
            if t == 0.0 {
                return Err(ModelError::InvalidFeature {
                    row: i,
                    reason: "ambient temperature is zero".to_string(),
                });
            }
            let q = v * v * p / t;
            let q_alpha = q * alpha;
            if !q.is_finite() || !q_alpha.is_finite() {
                return Err(ModelError::InvalidFeature {
                    row: i,
                    reason: format!("non-finite dynamic pressure term (q = {q}, alpha = {alpha})"),
                });
            }
            x[(i, 1)] = q;
            x[(i, 2)] = q_alpha;
        }
        Ok(x)
    }

    fn transform_targets(&self, raw: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let sums = DMatrix::from_fn(raw.nrows(), 1, |i, _| raw.row(i).sum() + self.bias);
        Ok(sums)
    }

    fn config(&self) -> TransformConfig {
        TransformConfig::FuelFlow {
            features: self.features.clone(),
            targets: self.targets.clone(),
            bias: self.bias,
        }
    }
}

// ---------------------------------------------------------------------------
// LinearTransform
// ---------------------------------------------------------------------------

/// Raw channels used as-is, optionally behind a leading intercept column.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearTransform {
    features: Vec<String>,
    targets: Vec<String>,
    intercept: bool,
}

impl LinearTransform {
    pub fn new(features: Vec<String>, targets: Vec<String>, intercept: bool) -> Self {
        Self {
            features,
            targets,
            intercept,
        }
    }
}

impl DataTransformer for LinearTransform {
    fn feature_channels(&self) -> &[String] {
        &self.features
    }

    fn target_channels(&self) -> &[String] {
        &self.targets
    }

    fn transform_features(&self, raw: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        if !self.intercept {
            return Ok(raw.clone());
        }
        Ok(raw.clone().insert_column(0, 1.0))
    }

    fn transform_targets(&self, raw: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        Ok(raw.clone())
    }

    fn config(&self) -> TransformConfig {
        TransformConfig::Linear {
            features: self.features.clone(),
            targets: self.targets.clone(),
            intercept: self.intercept,
        }
    }
}
