use serde::{Deserialize, Serialize};

use super::model::IndexRange;
use crate::error::{ModelError, Result};

// ---------------------------------------------------------------------------
// Steady-flight predicate parameters
// ---------------------------------------------------------------------------

/// Thresholds defining a cruise sample.  All three comparisons are strict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentParams {
    /// Maximum |acceleration| (speed units per time unit), exclusive.
    pub accel_tolerance: f64,
    /// Minimum speed, exclusive.
    pub min_speed: f64,
    /// A window is kept only when its length is strictly greater.
    pub min_length: usize,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            accel_tolerance: 0.01,
            min_speed: 10.0,
            min_length: 200,
        }
    }
}

// ---------------------------------------------------------------------------
// Differencing
// ---------------------------------------------------------------------------

/// Forward-difference acceleration, one value per consecutive pair.
///
/// Fails on a zero time step instead of producing an infinity.
pub fn accelerations(speed: &[f64], time: &[f64]) -> Result<Vec<f64>> {
    if speed.len() != time.len() {
        return Err(ModelError::LengthMismatch {
            channel: "time".to_string(),
            expected: speed.len(),
            found: time.len(),
        });
    }
    speed
        .windows(2)
        .zip(time.windows(2))
        .enumerate()
        .map(|(i, (v, t))| {
            let dt = t[1] - t[0];
            if dt == 0.0 {
                return Err(ModelError::Division { index: i, time: t[0] });
            }
            Ok((v[1] - v[0]) / dt)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Cruise-window scan
// ---------------------------------------------------------------------------

/// Return the steady-flight windows of a speed series, in encounter order.
///
/// Sample `i` (for `i < n - 1`) is steady when `|a[i]| < accel_tolerance`
/// and `speed[i] > min_speed`.  Maximal runs of steady samples become
/// `[first, last + 1)` windows; runs not longer than `min_length` are
/// dropped.
///
/// Time running backwards (the seam between concatenated flights) ends a
/// run: the sample before the step is never steady, so no window spans it.
pub fn find_steady_windows(
    speed: &[f64],
    time: &[f64],
    params: &SegmentParams,
) -> Result<Vec<IndexRange>> {
    let accel = accelerations(speed, time)?;

    let mut windows = Vec::new();
    let mut run_start: Option<usize> = None;

    for (i, a) in accel.iter().enumerate() {
        let forward = time[i + 1] > time[i];
        let steady =
            forward && a.abs() < params.accel_tolerance && speed[i] > params.min_speed;
        match (steady, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                windows.push(IndexRange { start, end: i });
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        windows.push(IndexRange {
            start,
            end: accel.len(),
        });
    }

    let total = windows.len();
    windows.retain(|w| w.len() > params.min_length);
    log::debug!(
        "segmentation: {} samples, {total} steady runs, {} longer than {}",
        speed.len(),
        windows.len(),
        params.min_length
    );
    Ok(windows)
}
