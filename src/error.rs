use thiserror::Error;

// ---------------------------------------------------------------------------
// ModelError – failures raised by segmentation and the learning core
// ---------------------------------------------------------------------------

/// Errors raised by the segmenter, the data-source contract and the
/// learning harness.  All of them are local and recoverable by the caller;
/// nothing in the core retries.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    /// Two consecutive timestamps are equal, so the acceleration at
    /// `index` would divide by zero.
    #[error("zero time step between samples {index} and {} (t = {time})", .index + 1)]
    Division { index: usize, time: f64 },

    #[error("empty or inverted range [{start}, {end})")]
    EmptyRange { start: usize, end: usize },

    /// Not enough rows to fit, or no fitted parameters to evaluate with.
    #[error("insufficient data: {rows} training rows accumulated and no usable fit")]
    InsufficientData { rows: usize },

    #[error("regression system is ill-conditioned (condition number {condition_number:e})")]
    NumericalInstability { condition_number: f64 },

    #[error("channel length mismatch: '{channel}' has {found} samples, expected {expected}")]
    LengthMismatch {
        channel: String,
        expected: usize,
        found: usize,
    },

    #[error("unknown channel '{0}'")]
    UnknownChannel(String),

    #[error("range [{start}, {end}) is outside a source of {len} rows")]
    RangeOutOfBounds { start: usize, end: usize, len: usize },

    #[error("invalid feature value at row {row}: {reason}")]
    InvalidFeature { row: usize, reason: String },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("unsupported snapshot format version {found} (expected {expected})")]
    SnapshotVersion { found: u32, expected: u32 },
}

pub type Result<T, E = ModelError> = std::result::Result<T, E>;
