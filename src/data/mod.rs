/// Data layer: telemetry tables, loading, unit normalisation and cruise
/// segmentation.
///
/// Architecture:
/// ```text
///  .txt / .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file(s) → TelemetryTable
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  units    │  per-channel scale/offset → SI
///   └──────────┘
///        │
///        ▼
///   ┌────────────────┐
///   │ TelemetryTable  │  aligned named channels (DataSource)
///   └────────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ segment   │  speed/time → steady-flight IndexRanges
///   └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod segment;
pub mod units;
