use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::model::TelemetryTable;

/// Linear unit conversion `v * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
}

impl Conversion {
    pub fn apply(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }
}

/// Per-channel conversions normalising raw telemetry to SI units before
/// it reaches a transformer.
///
/// JSON layout:
///
/// ```json
/// {
///   "true air speed": { "scale": 0.514444 },
///   "ambient temperature": { "scale": 1.0, "offset": 273.15 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitConverter {
    pub conversions: BTreeMap<String, Conversion>,
}

impl UnitConverter {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading unit file {}", path.display()))?;
        serde_json::from_str(&text).context("parsing unit file")
    }

    /// Rewrite every listed channel in place.  A conversion naming a
    /// channel the table lacks is an error rather than a silent no-op.
    pub fn apply(&self, table: &mut TelemetryTable) -> Result<()> {
        for (name, conversion) in &self.conversions {
            let values = table
                .channel_mut(name)
                .with_context(|| format!("applying unit conversion to '{name}'"))?;
            for v in values.iter_mut() {
                *v = conversion.apply(*v);
            }
        }
        log::debug!("applied {} unit conversions", self.conversions.len());
        Ok(())
    }
}
