//! Purpose: Define the stable public Rust API boundary for tfsview.
//! Exports: Document model, reader/writer entry points, query, profile and chart types.
//! Role: Public, additive-only surface used by the CLI and integration tests.
//! Invariants: Items are re-exported here rather than redefined.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::chart::{
    AxisRange, ChartOutcome, ChartRequest, ChartSpec, ContourColoring, DENSITY_BINS,
    DensityRequest, FIGURE_HEIGHT_LIMITS, HISTOGRAM_BINS, HistNorm, HistogramRequest, Marginal,
    ScatterMode, ScatterRequest, build_chart,
};
pub use crate::core::document::Document;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::header::{Header, HeaderEntry};
pub use crate::core::reader::{read_from, read_path, read_str};
pub use crate::core::table::{ColumnSpec, Row, Table};
pub use crate::core::value::{TypeCode, Value, ValueKind};
pub use crate::core::writer::{write_path, write_string, write_to};
pub use crate::profile::{ColumnProfile, ColumnStats, DocumentProfile, profile};
pub use crate::query::{RowPredicate, compile_row_predicates, matches_all};
