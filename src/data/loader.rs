use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, Float32Array, Float64Array, Int32Array, Int64Array};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{DataSource as _, TelemetryTable};
use super::units::UnitConverter;

/// Options for the delimited-text reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Field separator for `.csv` / `.txt` / `.dat` files.
    pub delimiter: u8,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { delimiter: b'|' }
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a telemetry table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – flat numeric columns, one per channel (recommended)
/// * `.json`    – `{ "channel": [...], ... }` or `[{ "channel": v, ... }, ...]`
/// * `.csv` / `.txt` / `.dat` – delimited text with a header row of channel names
pub fn load_file(path: &Path, options: &LoadOptions) -> Result<TelemetryTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" | "txt" | "dat" => load_delimited(path, options.delimiter),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading {}", path.display()))?;

    log::info!(
        "loaded {} rows x {} channels from {}",
        table.len(),
        table.column_names.len(),
        path.display()
    );
    Ok(table)
}

/// Load several files, concatenate them row-wise and normalise units.
pub fn load_all(
    paths: &[impl AsRef<Path>],
    options: &LoadOptions,
    converter: Option<&UnitConverter>,
) -> Result<TelemetryTable> {
    let mut table = TelemetryTable::default();
    for path in paths {
        let path = path.as_ref();
        table
            .extend(load_file(path, options)?)
            .with_context(|| format!("appending {}", path.display()))?;
    }
    if let Some(converter) = converter {
        converter.apply(&mut table)?;
    }
    Ok(table)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Two JSON layouts are accepted.
///
/// Column-oriented (`df.to_json(orient='list')`):
///
/// ```json
/// { "_zulu,_time": [0.0, 0.1, ...], "true air speed": [101.2, 101.3, ...] }
/// ```
///
/// Records-oriented (`df.to_json(orient='records')`):
///
/// ```json
/// [ { "_zulu,_time": 0.0, "true air speed": 101.2 }, ... ]
/// ```
fn load_json(path: &Path) -> Result<TelemetryTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    match &root {
        JsonValue::Object(obj) => {
            let columns = obj
                .iter()
                .map(|(name, val)| Ok((name.clone(), json_array_to_f64(val, name)?)))
                .collect::<Result<Vec<_>>>()?;
            Ok(TelemetryTable::from_columns(columns)?)
        }
        JsonValue::Array(records) => {
            let mut names: Vec<String> = Vec::new();
            let mut columns: BTreeMap<String, Vec<f64>> = BTreeMap::new();

            for (i, rec) in records.iter().enumerate() {
                let obj = rec
                    .as_object()
                    .with_context(|| format!("Row {i} is not a JSON object"))?;
                if i == 0 {
                    names = obj.keys().cloned().collect();
                } else if obj.len() != names.len() {
                    bail!("Row {i}: has {} fields, expected {}", obj.len(), names.len());
                }
                for name in &names {
                    let v = obj
                        .get(name)
                        .and_then(JsonValue::as_f64)
                        .with_context(|| format!("Row {i}, '{name}': missing or not a number"))?;
                    columns.entry(name.clone()).or_default().push(v);
                }
            }

            let columns = names
                .into_iter()
                .map(|name| {
                    let values = columns.remove(&name).unwrap_or_default();
                    (name, values)
                })
                .collect();
            Ok(TelemetryTable::from_columns(columns)?)
        }
        _ => bail!("Expected a top-level JSON object or array"),
    }
}

fn json_array_to_f64(val: &JsonValue, col: &str) -> Result<Vec<f64>> {
    let arr = val
        .as_array()
        .with_context(|| format!("'{col}' is not an array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| {
            v.as_f64()
                .with_context(|| format!("{col}[{j}]: not a number"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Delimited text loader
// ---------------------------------------------------------------------------

/// Header row with channel names, one numeric column per channel.
/// Names and cells are trimmed; a column with an empty header (from a
/// trailing delimiter) is ignored.
fn load_delimited(path: &Path, delimiter: u8) -> Result<TelemetryTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .context("opening delimited file")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let kept: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !h.is_empty())
        .map(|(i, _)| i)
        .collect();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); kept.len()];

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("row {row_no}"))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        for (slot, &col_idx) in kept.iter().enumerate() {
            let cell = record.get(col_idx).unwrap_or("");
            let value = cell.parse::<f64>().with_context(|| {
                format!("row {row_no}, '{}': '{cell}' is not a number", headers[col_idx])
            })?;
            columns[slot].push(value);
        }
    }

    let columns = kept
        .iter()
        .zip(columns)
        .map(|(&i, values)| (headers[i].clone(), values))
        .collect();
    Ok(TelemetryTable::from_columns(columns)?)
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with one flat numeric column per channel
/// (Float64, Float32, Int32 or Int64).  Nulls become NaN.
fn load_parquet(path: &Path) -> Result<TelemetryTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let names: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for (i, name) in names.iter().enumerate() {
            extend_f64(&mut columns[i], batch.column(i))
                .with_context(|| format!("column '{name}'"))?;
        }
    }

    Ok(TelemetryTable::from_columns(names.into_iter().zip(columns).collect())?)
}

// -- Parquet / Arrow helpers --

/// Append the values of a numeric Arrow column to `out`.
fn extend_f64(out: &mut Vec<f64>, col: &Arc<dyn Array>) -> Result<()> {
    let any = col.as_any();
    match col.data_type() {
        DataType::Float64 => {
            let arr = any.downcast_ref::<Float64Array>().context("expected Float64Array")?;
            out.extend(arr.iter().map(|v| v.unwrap_or(f64::NAN)));
        }
        DataType::Float32 => {
            let arr = any.downcast_ref::<Float32Array>().context("expected Float32Array")?;
            out.extend(arr.iter().map(|v| v.map(f64::from).unwrap_or(f64::NAN)));
        }
        DataType::Int32 => {
            let arr = any.downcast_ref::<Int32Array>().context("expected Int32Array")?;
            out.extend(arr.iter().map(|v| v.map(f64::from).unwrap_or(f64::NAN)));
        }
        DataType::Int64 => {
            let arr = any.downcast_ref::<Int64Array>().context("expected Int64Array")?;
            out.extend(arr.iter().map(|v| v.map(|i| i as f64).unwrap_or(f64::NAN)));
        }
        other => bail!("expected a numeric column, got {other:?}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::data::model::DataSource;

    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use tempfile::NamedTempFile;

    fn write_temp(suffix: &str, contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn pipe_delimited_with_trailing_separator() {
        let file = write_temp(
            ".txt",
            "   _zulu,_time | true air speed |  fuel 1 |\n 0.0 | 100.5 | 3.0 |\n 0.1 | 100.6 | 3.1 |\n",
        );
        let table = load_file(file.path(), &LoadOptions::default()).unwrap();
        assert_eq!(
            table.column_names,
            vec!["_zulu,_time", "true air speed", "fuel 1"]
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.channel("true air speed").unwrap(), &[100.5, 100.6]);
    }

    #[test]
    fn comma_delimited_reports_bad_cells() {
        let file = write_temp(".csv", "t,v\n0,1\n1,abc\n");
        let err = load_file(file.path(), &LoadOptions { delimiter: b',' }).unwrap_err();
        assert!(format!("{err:#}").contains("'abc' is not a number"));
    }

    #[test]
    fn json_columns_and_records() {
        let cols = write_temp(".json", r#"{ "t": [0, 1, 2], "v": [5.0, 6.0, 7.0] }"#);
        let table = load_file(cols.path(), &LoadOptions::default()).unwrap();
        assert_eq!(table.channel("v").unwrap(), &[5.0, 6.0, 7.0]);

        let recs = write_temp(".json", r#"[ { "t": 0, "v": 5.0 }, { "t": 1, "v": 6.0 } ]"#);
        let table = load_file(recs.path(), &LoadOptions::default()).unwrap();
        assert_eq!(table.channel("t").unwrap(), &[0.0, 1.0]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn parquet_numeric_columns() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("t", DataType::Int64, false),
            Field::new("v", DataType::Float32, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![0, 1, 2])),
                Arc::new(Float32Array::from(vec![Some(1.5), None, Some(2.5)])),
            ],
        )
        .unwrap();
        let file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        let mut writer = ArrowWriter::try_new(std::fs::File::create(file.path()).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = load_file(file.path(), &LoadOptions::default()).unwrap();
        assert_eq!(table.channel("t").unwrap(), &[0.0, 1.0, 2.0]);
        let v = table.channel("v").unwrap();
        assert_eq!(v[0], 1.5);
        assert!(v[1].is_nan());
    }

    #[test]
    fn load_all_concatenates_and_converts() {
        let a = write_temp(".csv", "t|v\n0|10\n1|20\n");
        let b = write_temp(".csv", "t|v\n2|30\n");
        let converter: UnitConverter =
            serde_json::from_str(r#"{ "v": { "scale": 0.5 } }"#).unwrap();
        let table = load_all(
            &[a.path(), b.path()],
            &LoadOptions::default(),
            Some(&converter),
        )
        .unwrap();
        assert_eq!(table.channel("v").unwrap(), &[5.0, 10.0, 15.0]);
    }

    #[test]
    fn unsupported_extension() {
        let file = write_temp(".xlsx", "");
        assert!(load_file(file.path(), &LoadOptions::default()).is_err());
    }
}
