use nalgebra::DMatrix;
use serde::Serialize;

use super::metrics::{ErrorReport, log_residuals};
use super::registry::RegressorOptions;
use super::transform::DataTransformer;
use crate::data::model::{DataSource, IndexRange};
use crate::error::{ModelError, Result};

// ---------------------------------------------------------------------------
// Regressor – the numeric method plugged into a SupervisedModel
// ---------------------------------------------------------------------------

/// A regression algorithm.  The harness only sequences calls; it never
/// looks at how parameters are produced.
pub trait Regressor: std::fmt::Debug {
    /// Registry identifier, persisted in snapshots.
    fn id(&self) -> &'static str;

    /// Tuning this regressor was built with, persisted in snapshots.
    fn options(&self) -> RegressorOptions;

    /// Fit parameters (`features × targets`) to `(x, y)`.
    fn train(&self, x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<DMatrix<f64>>;

    /// Predicted targets for `x`.
    fn eval(&self, x: &DMatrix<f64>, params: &DMatrix<f64>) -> Result<DMatrix<f64>>;

    fn residuals(
        &self,
        x: &DMatrix<f64>,
        y: &DMatrix<f64>,
        params: &DMatrix<f64>,
    ) -> Result<DMatrix<f64>> {
        let predicted = self.eval(x, params)?;
        if predicted.shape() != y.shape() {
            return Err(ModelError::ShapeMismatch(format!(
                "predictions are {:?} but targets are {:?}",
                predicted.shape(),
                y.shape()
            )));
        }
        Ok(y - predicted)
    }

    fn error(
        &self,
        x: &DMatrix<f64>,
        y: &DMatrix<f64>,
        params: &DMatrix<f64>,
    ) -> Result<ErrorReport> {
        ErrorReport::from_residuals(&self.residuals(x, y, params)?)
    }
}

// ---------------------------------------------------------------------------
// TrainingSet – accumulated (X, Y) rows
// ---------------------------------------------------------------------------

/// Row-major buffers of accumulated feature and target rows.
///
/// Batches built independently (e.g. one per cruise window) can be merged
/// before training.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSet {
    x: Vec<f64>,
    y: Vec<f64>,
    features: usize,
    targets: usize,
    rows: usize,
}

impl TrainingSet {
    pub fn from_matrices(x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<Self> {
        let mut set = TrainingSet::default();
        set.append(x, y)?;
        Ok(set)
    }

    /// Append aligned rows.  Column counts must match earlier rows.
    pub fn append(&mut self, x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<()> {
        if x.nrows() != y.nrows() {
            return Err(ModelError::ShapeMismatch(format!(
                "{} feature rows but {} target rows",
                x.nrows(),
                y.nrows()
            )));
        }
        if x.nrows() == 0 {
            return Ok(());
        }
        if self.rows == 0 {
            self.features = x.ncols();
            self.targets = y.ncols();
        } else if x.ncols() != self.features || y.ncols() != self.targets {
            return Err(ModelError::ShapeMismatch(format!(
                "batch is {}+{} columns, accumulated data is {}+{}",
                x.ncols(),
                y.ncols(),
                self.features,
                self.targets
            )));
        }
        for i in 0..x.nrows() {
            self.x.extend(x.row(i).iter());
            self.y.extend(y.row(i).iter());
        }
        self.rows += x.nrows();
        Ok(())
    }

    pub fn merge(&mut self, other: TrainingSet) -> Result<()> {
        if other.rows == 0 {
            return Ok(());
        }
        if self.rows == 0 {
            *self = other;
            return Ok(());
        }
        if other.features != self.features || other.targets != self.targets {
            return Err(ModelError::ShapeMismatch(format!(
                "batch is {}+{} columns, accumulated data is {}+{}",
                other.features, other.targets, self.features, self.targets
            )));
        }
        self.x.extend(other.x);
        self.y.extend(other.y);
        self.rows += other.rows;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn x(&self) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.rows, self.features, &self.x)
    }

    pub fn y(&self) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.rows, self.targets, &self.y)
    }
}

// ---------------------------------------------------------------------------
// SupervisedModel – accumulate, train, evaluate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModelState {
    Empty,
    Accumulating,
    Trained,
}

/// A transformer and a regressor sharing one accumulated training set.
///
/// Lifecycle: `Empty → Accumulating → Trained`.  Reading more data after
/// training drops the fitted parameters; calling [`train`](Self::train)
/// again refits on everything accumulated so far.
#[derive(Debug)]
pub struct SupervisedModel {
    transformer: Box<dyn DataTransformer>,
    regressor: Box<dyn Regressor>,
    training: TrainingSet,
    parameters: Option<DMatrix<f64>>,
}

impl SupervisedModel {
    pub fn new(transformer: Box<dyn DataTransformer>, regressor: Box<dyn Regressor>) -> Self {
        Self {
            transformer,
            regressor,
            training: TrainingSet::default(),
            parameters: None,
        }
    }

    /// A trained model with no accumulated rows, e.g. restored from disk.
    pub(crate) fn with_parameters(
        transformer: Box<dyn DataTransformer>,
        regressor: Box<dyn Regressor>,
        parameters: DMatrix<f64>,
    ) -> Self {
        Self {
            parameters: Some(parameters),
            ..Self::new(transformer, regressor)
        }
    }

    pub fn state(&self) -> ModelState {
        if self.parameters.is_some() {
            ModelState::Trained
        } else if self.training.is_empty() {
            ModelState::Empty
        } else {
            ModelState::Accumulating
        }
    }

    /// Accumulated training rows.
    pub fn rows(&self) -> usize {
        self.training.rows()
    }

    pub fn parameters(&self) -> Option<&DMatrix<f64>> {
        self.parameters.as_ref()
    }

    pub fn transformer(&self) -> &dyn DataTransformer {
        self.transformer.as_ref()
    }

    pub fn regressor(&self) -> &dyn Regressor {
        self.regressor.as_ref()
    }

    /// Build `(X, Y)` for `range` without touching the model.  Independent
    /// batches can be read in parallel and handed to [`absorb`](Self::absorb).
    pub fn read_batch(&self, source: &dyn DataSource, range: IndexRange) -> Result<TrainingSet> {
        if range.is_empty() {
            return Err(ModelError::EmptyRange {
                start: range.start,
                end: range.end,
            });
        }
        let (x, y) = self.transformer.build(source, range)?;
        TrainingSet::from_matrices(&x, &y)
    }

    /// Merge a batch into the training set.
    pub fn absorb(&mut self, batch: TrainingSet) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.training.merge(batch)?;
        if self.parameters.take().is_some() {
            log::debug!("training data changed; fitted parameters discarded");
        }
        Ok(())
    }

    /// Transform rows `[range.start, range.end)` of `source` and append
    /// them to the training set.  Returns the number of rows added.
    pub fn read_data(&mut self, source: &dyn DataSource, range: IndexRange) -> Result<usize> {
        let batch = self.read_batch(source, range)?;
        let added = batch.rows();
        self.absorb(batch)?;
        log::debug!("read {added} rows from {range}; {} accumulated", self.rows());
        Ok(added)
    }

    /// Fit parameters on everything accumulated, replacing any earlier fit.
    pub fn train(&mut self) -> Result<&DMatrix<f64>> {
        if self.training.is_empty() {
            return Err(ModelError::InsufficientData { rows: 0 });
        }
        let params = self
            .regressor
            .train(&self.training.x(), &self.training.y())?;
        log::info!(
            "{} trained on {} rows: {} parameters x {} targets",
            self.regressor.id(),
            self.rows(),
            params.nrows(),
            params.ncols()
        );
        Ok(self.parameters.insert(params))
    }

    fn fitted(&self) -> Result<&DMatrix<f64>> {
        self.parameters
            .as_ref()
            .ok_or(ModelError::InsufficientData { rows: self.rows() })
    }

    /// Error of the current fit against the accumulated training data.
    pub fn in_sample_error(&self, verbose: bool) -> Result<ErrorReport> {
        let params = self.fitted()?;
        if self.training.is_empty() {
            return Err(ModelError::InsufficientData { rows: 0 });
        }
        let x = self.training.x();
        let y = self.training.y();
        self.report("in-sample", &x, &y, params, verbose)
    }

    /// Error of the current fit on `range` of an independent source.  The
    /// training set is left untouched.
    pub fn out_sample_error(
        &self,
        source: &dyn DataSource,
        range: IndexRange,
        verbose: bool,
    ) -> Result<ErrorReport> {
        let params = self.fitted()?;
        let batch = self.read_batch(source, range)?;
        self.report("out-of-sample", &batch.x(), &batch.y(), params, verbose)
    }

    /// Predicted targets for `range` of `source`.
    pub fn predict(&self, source: &dyn DataSource, range: IndexRange) -> Result<DMatrix<f64>> {
        let params = self.fitted()?;
        let batch = self.read_batch(source, range)?;
        self.regressor.eval(&batch.x(), params)
    }

    fn report(
        &self,
        label: &str,
        x: &DMatrix<f64>,
        y: &DMatrix<f64>,
        params: &DMatrix<f64>,
        verbose: bool,
    ) -> Result<ErrorReport> {
        let residuals = self.regressor.residuals(x, y, params)?;
        if verbose {
            log_residuals(label, &residuals);
        }
        let report = ErrorReport::from_residuals(&residuals)?;
        if verbose {
            log::info!("{label}: RMSE {:?}, SE {:?}", report.rmse, report.se);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::TelemetryTable;
    use crate::learn::least_squares::LeastSquaresRegressor;
    use crate::learn::transform::LinearTransform;
    use approx::assert_abs_diff_eq;

    /// `y = 3 + 2a - b` over 50 rows.
    fn source() -> TelemetryTable {
        let a: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let b: Vec<f64> = (0..50).map(|i| ((i * 7) % 11) as f64).collect();
        let y = a.iter().zip(&b).map(|(a, b)| 3.0 + 2.0 * a - b).collect();
        TelemetryTable::from_columns(vec![
            ("a".to_string(), a),
            ("b".to_string(), b),
            ("y".to_string(), y),
        ])
        .unwrap()
    }

    fn model() -> SupervisedModel {
        SupervisedModel::new(
            Box::new(LinearTransform::new(
                vec!["a".to_string(), "b".to_string()],
                vec!["y".to_string()],
                true,
            )),
            Box::new(LeastSquaresRegressor::default()),
        )
    }

    fn range(start: usize, end: usize) -> IndexRange {
        IndexRange::new(start, end).unwrap()
    }

    #[test]
    fn lifecycle_and_fit() {
        let data = source();
        let mut m = model();
        assert_eq!(m.state(), ModelState::Empty);

        assert_eq!(m.read_data(&data, range(0, 20)).unwrap(), 20);
        assert_eq!(m.read_data(&data, range(30, 45)).unwrap(), 15);
        assert_eq!(m.state(), ModelState::Accumulating);
        assert_eq!(m.rows(), 35);

        let w = m.train().unwrap().clone();
        assert_eq!(m.state(), ModelState::Trained);
        for (got, want) in w.iter().zip([3.0, 2.0, -1.0]) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-9);
        }

        let ins = m.in_sample_error(true).unwrap();
        assert_eq!(ins.rows, 35);
        assert_abs_diff_eq!(ins.se[0], 0.0, epsilon = 1e-12);

        let out = m.out_sample_error(&data, range(20, 30), false).unwrap();
        assert_eq!(out.rows, 10);
        assert_abs_diff_eq!(out.rmse[0], 0.0, epsilon = 1e-6);
        assert_eq!(m.rows(), 35);

        let predicted = m.predict(&data, range(48, 50)).unwrap();
        assert_abs_diff_eq!(predicted[(0, 0)], data.channel("y").unwrap()[48], epsilon = 1e-8);
    }

    #[test]
    fn errors_before_training() {
        let data = source();
        let mut m = model();
        assert_eq!(
            m.in_sample_error(false).unwrap_err(),
            ModelError::InsufficientData { rows: 0 }
        );
        assert_eq!(m.train().unwrap_err(), ModelError::InsufficientData { rows: 0 });

        m.read_data(&data, range(0, 10)).unwrap();
        assert_eq!(
            m.in_sample_error(false).unwrap_err(),
            ModelError::InsufficientData { rows: 10 }
        );
        assert!(matches!(
            m.out_sample_error(&data, range(0, 5), false),
            Err(ModelError::InsufficientData { rows: 10 })
        ));
    }

    #[test]
    fn empty_range_is_rejected() {
        let data = source();
        let mut m = model();
        assert_eq!(
            m.read_data(&data, range(5, 5)).unwrap_err(),
            ModelError::EmptyRange { start: 5, end: 5 }
        );
        assert_eq!(m.state(), ModelState::Empty);
    }

    #[test]
    fn reading_after_training_requires_retrain() {
        let data = source();
        let mut m = model();
        m.read_data(&data, range(0, 25)).unwrap();
        m.train().unwrap();
        m.read_data(&data, range(25, 50)).unwrap();
        assert_eq!(m.state(), ModelState::Accumulating);
        assert!(m.parameters().is_none());
        m.train().unwrap();
        assert_eq!(m.in_sample_error(false).unwrap().rows, 50);
    }

    #[test]
    fn batches_read_separately_match_sequential_reads() {
        let data = source();
        let reader = model();
        let first = reader.read_batch(&data, range(0, 20)).unwrap();
        let second = reader.read_batch(&data, range(20, 40)).unwrap();

        let mut merged = model();
        merged.absorb(first).unwrap();
        merged.absorb(second).unwrap();

        let mut sequential = model();
        sequential.read_data(&data, range(0, 20)).unwrap();
        sequential.read_data(&data, range(20, 40)).unwrap();

        assert_eq!(merged.train().unwrap(), sequential.train().unwrap());
    }

    #[test]
    fn training_set_rejects_mismatched_batches() {
        let mut set = TrainingSet::from_matrices(
            &DMatrix::from_element(2, 3, 1.0),
            &DMatrix::from_element(2, 1, 1.0),
        )
        .unwrap();
        assert!(set
            .append(&DMatrix::from_element(1, 2, 1.0), &DMatrix::from_element(1, 1, 1.0))
            .is_err());
        assert!(set
            .append(&DMatrix::from_element(2, 3, 1.0), &DMatrix::from_element(1, 1, 1.0))
            .is_err());
        assert_eq!(set.rows(), 2);
        assert_eq!(set.x().shape(), (2, 3));
    }
}
