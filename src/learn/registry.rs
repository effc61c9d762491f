use serde::{Deserialize, Serialize};

use super::least_squares::{DEFAULT_MAX_CONDITION, LeastSquaresRegressor};
use super::supervised::{Regressor, SupervisedModel};
use super::transform::TransformConfig;
use crate::error::{ModelError, Result};

/// Tuning shared by the registered regressors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressorOptions {
    /// Reject designs whose condition number exceeds this.
    pub max_condition: f64,
}

impl Default for RegressorOptions {
    fn default() -> Self {
        Self {
            max_condition: DEFAULT_MAX_CONDITION,
        }
    }
}

/// One entry of the static model table.
#[derive(Clone, Copy)]
pub struct RegressorEntry {
    pub id: &'static str,
    pub description: &'static str,
    build: fn(&RegressorOptions) -> Box<dyn Regressor>,
}

fn least_squares(options: &RegressorOptions) -> Box<dyn Regressor> {
    Box::new(LeastSquaresRegressor::new(options.max_condition))
}

static REGISTRY: &[RegressorEntry] = &[RegressorEntry {
    id: LeastSquaresRegressor::ID,
    description: "ordinary least squares via QR decomposition",
    build: least_squares,
}];

/// Every registered regressor, in registration order.
pub fn available() -> &'static [RegressorEntry] {
    REGISTRY
}

pub fn regressor_for(id: &str, options: &RegressorOptions) -> Result<Box<dyn Regressor>> {
    let id = id.trim();
    REGISTRY
        .iter()
        .find(|entry| entry.id == id)
        .map(|entry| (entry.build)(options))
        .ok_or_else(|| ModelError::UnknownModel(id.to_string()))
}

/// Resolve a regressor by id and pair it with a transformer.
pub fn build_model(
    id: &str,
    transform: &TransformConfig,
    options: &RegressorOptions,
) -> Result<SupervisedModel> {
    let regressor = regressor_for(id, options)?;
    Ok(SupervisedModel::new(transform.build()?, regressor))
}
