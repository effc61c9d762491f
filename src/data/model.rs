use std::collections::BTreeMap;
use std::fmt;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

// ---------------------------------------------------------------------------
// IndexRange – a contiguous slice of rows treated as one flight regime
// ---------------------------------------------------------------------------

/// Half-open row range `[start, end)`.  Both the segmenter and the
/// learning harness use this convention, so `len() == end - start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexRange {
    pub start: usize,
    pub end: usize,
}

impl IndexRange {
    /// Build a range, rejecting `end < start`.  An empty range (`end ==
    /// start`) is representable; consumers decide whether it is usable.
    pub fn new(start: usize, end: usize) -> Result<Self> {
        if end < start {
            return Err(ModelError::EmptyRange { start, end });
        }
        Ok(IndexRange { start, end })
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl fmt::Display for IndexRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ---------------------------------------------------------------------------
// DataSource – what the learning core needs from a telemetry store
// ---------------------------------------------------------------------------

/// Read access to aligned, named numeric channels.
pub trait DataSource {
    /// Number of rows shared by every channel.
    fn len(&self) -> usize;

    /// Borrow a whole channel.
    fn channel(&self, name: &str) -> Result<&[f64]>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the named channels over `range` into a matrix with one column
    /// per channel, in the order given.  The result never aliases the
    /// source.
    fn select(&self, names: &[String], range: IndexRange) -> Result<DMatrix<f64>> {
        let len = self.len();
        if range.end > len || range.start > range.end {
            return Err(ModelError::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                len,
            });
        }
        let columns = names
            .iter()
            .map(|name| self.channel(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(DMatrix::from_fn(range.len(), columns.len(), |r, c| {
            columns[c][range.start + r]
        }))
    }
}

// ---------------------------------------------------------------------------
// TelemetryTable – the complete loaded time series
// ---------------------------------------------------------------------------

/// Column-oriented telemetry: every channel has the same number of rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryTable {
    /// Channel names in file order.
    pub column_names: Vec<String>,
    channels: BTreeMap<String, Vec<f64>>,
    rows: usize,
}

impl TelemetryTable {
    /// Build a table from `(name, samples)` pairs, checking alignment.
    /// A repeated channel name keeps the last column.
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut column_names = Vec::with_capacity(columns.len());
        let mut channels = BTreeMap::new();

        for (name, values) in columns {
            if values.len() != rows {
                return Err(ModelError::LengthMismatch {
                    channel: name,
                    expected: rows,
                    found: values.len(),
                });
            }
            if !channels.contains_key(&name) {
                column_names.push(name.clone());
            }
            channels.insert(name, values);
        }

        Ok(TelemetryTable {
            column_names,
            channels,
            rows,
        })
    }

    /// Append the rows of `other` below this table.  Both tables must carry
    /// the same channel set; an empty table adopts `other` wholesale.
    pub fn extend(&mut self, other: TelemetryTable) -> Result<()> {
        if self.channels.is_empty() {
            *self = other;
            return Ok(());
        }
        if let Some(missing) = other
            .column_names
            .iter()
            .find(|name| !self.channels.contains_key(*name))
        {
            return Err(ModelError::UnknownChannel(missing.clone()));
        }
        if let Some(missing) = self
            .column_names
            .iter()
            .find(|name| !other.channels.contains_key(*name))
        {
            return Err(ModelError::UnknownChannel(missing.clone()));
        }

        let mut other_channels = other.channels;
        for (name, values) in self.channels.iter_mut() {
            if let Some(extra) = other_channels.remove(name) {
                values.extend(extra);
            }
        }
        self.rows += other.rows;
        Ok(())
    }

    /// Mutable access to a channel, used by unit conversion.
    pub fn channel_mut(&mut self, name: &str) -> Result<&mut Vec<f64>> {
        self.channels
            .get_mut(name)
            .ok_or_else(|| ModelError::UnknownChannel(name.to_string()))
    }
}

impl DataSource for TelemetryTable {
    fn len(&self) -> usize {
        self.rows
    }

    fn channel(&self, name: &str) -> Result<&[f64]> {
        self.channels
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| ModelError::UnknownChannel(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TelemetryTable {
        TelemetryTable::from_columns(vec![
            ("time".to_string(), vec![0.0, 1.0, 2.0, 3.0]),
            ("speed".to_string(), vec![10.0, 11.0, 12.0, 13.0]),
        ])
        .unwrap()
    }

    #[test]
    fn rejects_misaligned_channels() {
        let err = TelemetryTable::from_columns(vec![
            ("a".to_string(), vec![1.0, 2.0]),
            ("b".to_string(), vec![1.0]),
        ])
        .unwrap_err();
        assert!(matches!(err, ModelError::LengthMismatch { found: 1, .. }));
    }

    #[test]
    fn select_copies_requested_rows_in_channel_order() {
        let t = table();
        let m = t
            .select(
                &["speed".to_string(), "time".to_string()],
                IndexRange::new(1, 3).unwrap(),
            )
            .unwrap();
        assert_eq!(m.shape(), (2, 2));
        assert_eq!(m[(0, 0)], 11.0);
        assert_eq!(m[(1, 1)], 2.0);
    }

    #[test]
    fn select_out_of_bounds_and_unknown_channel() {
        let t = table();
        let err = t
            .select(&["speed".to_string()], IndexRange::new(2, 9).unwrap())
            .unwrap_err();
        assert!(matches!(err, ModelError::RangeOutOfBounds { len: 4, .. }));

        let err = t
            .select(&["fuel".to_string()], IndexRange::new(0, 1).unwrap())
            .unwrap_err();
        assert_eq!(err, ModelError::UnknownChannel("fuel".to_string()));
    }

    #[test]
    fn extend_concatenates_rows() {
        let mut t = table();
        t.extend(table()).unwrap();
        assert_eq!(t.len(), 8);
        assert_eq!(t.channel("time").unwrap()[4], 0.0);

        let mut empty = TelemetryTable::default();
        empty.extend(table()).unwrap();
        assert_eq!(empty.len(), 4);
    }

    #[test]
    fn extend_requires_same_channels() {
        let mut t = table();
        let other =
            TelemetryTable::from_columns(vec![("time".to_string(), vec![0.0])]).unwrap();
        assert!(t.extend(other).is_err());
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(IndexRange::new(3, 2).is_err());
        assert!(IndexRange::new(2, 2).unwrap().is_empty());
    }
}
