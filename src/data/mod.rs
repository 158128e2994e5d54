/// Data layer: sheet model, loading, per-sheet reduction and matching.
///
/// Architecture:
/// ```text
///  .csv / .parquet (one file per sheet)
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  RawTable + ColumnMap → DataSheet (3 sets, setup)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  reduce   │  mean subtract → combine → sort → window average
///   └──────────┘
///        │  (all sheets)
///        ▼
///   ┌──────────┐
///   │ matcher   │  first point within ε of each reference → CurveMatrix
///   └──────────┘
/// ```

pub mod loader;
pub mod matcher;
pub mod model;
pub mod reduce;
