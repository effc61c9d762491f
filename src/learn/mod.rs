/// Supervised-learning layer: transformers, regressors and the harness
/// that accumulates training rows and evaluates fits.
///
/// ```text
///   DataSource + IndexRange
///        │
///        ▼
///   ┌──────────────────┐
///   │ DataTransformer   │  raw channels → (X, Y)
///   └──────────────────┘
///        │
///        ▼
///   ┌──────────────────┐
///   │ SupervisedModel   │  TrainingSet, state, ErrorReport
///   └──────────────────┘
///        │
///        ▼
///   ┌──────────────────┐
///   │ Regressor         │  train / eval (least squares via QR)
///   └──────────────────┘
/// ```

pub mod least_squares;
pub mod metrics;
pub mod registry;
pub mod snapshot;
pub mod supervised;
pub mod transform;

pub use least_squares::LeastSquaresRegressor;
pub use metrics::ErrorReport;
pub use supervised::{ModelState, Regressor, SupervisedModel, TrainingSet};
pub use transform::{DataTransformer, FuelFlowTransform, LinearTransform, TransformConfig};
