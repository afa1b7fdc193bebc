//! Purpose: Turn a table plus chart options into a renderer-neutral chart description.
//! Exports: `ChartRequest` (+ per-kind requests and options), `ChartSpec`, `ChartOutcome`, `build_chart`.
//! Role: Everything a plotting backend needs (series, bins, grids, axis ranges) without drawing.
//! Invariants: Unknown columns fail with `ColumnNotFound`; text where numbers are needed with `TypeMismatch`.
//! Invariants: Error-bar count mismatches are notices, never errors.
//! Invariants: Presentation options (marginal, height, colorscale) pass through; only height is range-checked.
//! Invariants: Axis ranges and bins cover finite values only; NaN and inf cells are left unbinned.
use serde::Serialize;
use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::table::Table;
use crate::core::value::Value;
use crate::notice::Notice;

pub const HISTOGRAM_BINS: usize = 100;
pub const HISTOGRAM_BIN_LIMITS: (usize, usize) = (5, 1000);
pub const DENSITY_BINS: usize = 20;
pub const DENSITY_BIN_LIMITS: (usize, usize) = (2, 500);
/// Figure height in pixels, passed through to the renderer.
pub const FIGURE_HEIGHT_LIMITS: (u32, u32) = (200, 1450);

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub enum ScatterMode {
    #[serde(rename = "lines")]
    Lines,
    #[default]
    #[serde(rename = "markers")]
    Markers,
    #[serde(rename = "lines+markers")]
    LinesMarkers,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistNorm {
    #[default]
    Count,
    Percent,
    Probability,
    Density,
    ProbabilityDensity,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContourColoring {
    #[default]
    Fill,
    Heatmap,
    Lines,
    None,
}

/// Distribution plot drawn on the histogram's upper axis.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Marginal {
    Box,
    Violin,
    Rug,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScatterRequest {
    pub x: String,
    pub y: Vec<String>,
    /// Paired positionally with `y`.
    pub error_x: Vec<String>,
    pub error_y: Vec<String>,
    pub mode: ScatterMode,
    pub height: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HistogramRequest {
    pub columns: Vec<String>,
    pub bins: usize,
    pub norm: HistNorm,
    pub marginal: Option<Marginal>,
    pub height: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DensityRequest {
    pub x: String,
    pub y: String,
    pub bins: usize,
    pub coloring: ContourColoring,
    /// Named renderer colorscale; `None` keeps the renderer default.
    pub colorscale: Option<String>,
    pub reverse_scale: bool,
    pub height: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChartRequest {
    Scatter(ScatterRequest),
    Histogram(HistogramRequest),
    Density(DensityRequest),
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorBars {
    pub column: String,
    pub values: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScatterTrace {
    pub name: String,
    pub y: Vec<f64>,
    pub error_x: Option<ErrorBars>,
    pub error_y: Option<ErrorBars>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistogramTrace {
    pub name: String,
    pub samples: usize,
    pub heights: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartSpec {
    Scatter {
        x_column: String,
        mode: ScatterMode,
        x: Vec<serde_json::Value>,
        x_range: Option<AxisRange>,
        y_range: Option<AxisRange>,
        traces: Vec<ScatterTrace>,
        #[serde(skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
    Histogram {
        norm: HistNorm,
        edges: Vec<f64>,
        x_range: Option<AxisRange>,
        traces: Vec<HistogramTrace>,
        #[serde(skip_serializing_if = "Option::is_none")]
        marginal: Option<Marginal>,
        #[serde(skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
    Density {
        x_column: String,
        y_column: String,
        coloring: ContourColoring,
        x_edges: Vec<f64>,
        y_edges: Vec<f64>,
        /// `counts[j][i]` counts points in y bin `j` and x bin `i`.
        counts: Vec<Vec<u64>>,
        x_range: Option<AxisRange>,
        y_range: Option<AxisRange>,
        #[serde(skip_serializing_if = "Option::is_none")]
        colorscale: Option<String>,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        reverse_scale: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChartOutcome {
    pub spec: ChartSpec,
    pub notices: Vec<Notice>,
}

pub fn build_chart(table: &Table, request: &ChartRequest) -> Result<ChartOutcome, Error> {
    check_height(match request {
        ChartRequest::Scatter(req) => req.height,
        ChartRequest::Histogram(req) => req.height,
        ChartRequest::Density(req) => req.height,
    })?;
    let outcome = match request {
        ChartRequest::Scatter(req) => scatter(table, req)?,
        ChartRequest::Histogram(req) => ChartOutcome {
            spec: histogram(table, req)?,
            notices: Vec::new(),
        },
        ChartRequest::Density(req) => ChartOutcome {
            spec: density(table, req)?,
            notices: Vec::new(),
        },
    };
    debug!(rows = table.num_rows(), notices = outcome.notices.len(), "built chart");
    Ok(outcome)
}

fn scatter(table: &Table, req: &ScatterRequest) -> Result<ChartOutcome, Error> {
    if req.y.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("scatter chart needs at least one y column")
            .with_hint("Pass one or more --y columns."));
    }
    let x = table
        .column(&req.x)?
        .into_iter()
        .map(Value::to_json)
        .collect();
    let x_range = if table.column_spec(&req.x)?.kind.is_numeric() {
        axis_range(table, [req.x.as_str()])?
    } else {
        None
    };
    let y_range = axis_range(table, req.y.iter().map(String::as_str))?;

    let mut notices = Vec::new();
    for (label, errors) in [("horizontal", &req.error_x), ("vertical", &req.error_y)] {
        if !errors.is_empty() && errors.len() != req.y.len() {
            notices.push(
                Notice::new(
                    "error_bars_mismatch",
                    format!(
                        "{} {label} error-bar columns for {} plotted columns; unpaired columns are drawn without error bars",
                        errors.len(),
                        req.y.len()
                    ),
                )
                .with_detail("axis", label)
                .with_detail("error_columns", errors.len())
                .with_detail("plotted_columns", req.y.len()),
            );
        }
    }

    // Error columns beyond the plotted ones are still checked so typos surface.
    for column in req.error_x.iter().chain(&req.error_y) {
        table.numeric_column(column)?;
    }
    let bars = |columns: &[String], idx: usize| -> Result<Option<ErrorBars>, Error> {
        let Some(column) = columns.get(idx) else {
            return Ok(None);
        };
        Ok(Some(ErrorBars {
            column: column.clone(),
            values: table.numeric_column(column)?,
        }))
    };

    let mut traces = Vec::with_capacity(req.y.len());
    for (idx, name) in req.y.iter().enumerate() {
        traces.push(ScatterTrace {
            name: name.clone(),
            y: table.numeric_column(name)?,
            error_x: bars(&req.error_x, idx)?,
            error_y: bars(&req.error_y, idx)?,
        });
    }

    Ok(ChartOutcome {
        spec: ChartSpec::Scatter {
            x_column: req.x.clone(),
            mode: req.mode,
            x,
            x_range,
            y_range,
            traces,
            height: req.height,
        },
        notices,
    })
}

fn histogram(table: &Table, req: &HistogramRequest) -> Result<ChartSpec, Error> {
    if req.columns.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("histogram needs at least one column")
            .with_hint("Pass one or more --x columns."));
    }
    check_bins(req.bins, HISTOGRAM_BIN_LIMITS)?;
    let x_range = axis_range(table, req.columns.iter().map(String::as_str))?;
    let Some(range) = x_range else {
        return Ok(ChartSpec::Histogram {
            norm: req.norm,
            edges: Vec::new(),
            x_range,
            traces: req
                .columns
                .iter()
                .map(|name| HistogramTrace {
                    name: name.clone(),
                    samples: 0,
                    heights: Vec::new(),
                })
                .collect(),
            marginal: req.marginal,
            height: req.height,
        });
    };

    let binning = Binning::new(range, req.bins);
    let mut traces = Vec::with_capacity(req.columns.len());
    for name in &req.columns {
        let mut counts = vec![0u64; req.bins];
        let mut samples = 0usize;
        for value in table.numeric_column(name)? {
            if let Some(bin) = binning.bin(value) {
                counts[bin] += 1;
                samples += 1;
            }
        }
        let heights = counts
            .iter()
            .map(|&count| normalize(count, samples, binning.width, req.norm))
            .collect();
        traces.push(HistogramTrace {
            name: name.clone(),
            samples,
            heights,
        });
    }

    Ok(ChartSpec::Histogram {
        norm: req.norm,
        edges: binning.edges(),
        x_range,
        traces,
        marginal: req.marginal,
        height: req.height,
    })
}

fn density(table: &Table, req: &DensityRequest) -> Result<ChartSpec, Error> {
    check_bins(req.bins, DENSITY_BIN_LIMITS)?;
    let xs = table.numeric_column(&req.x)?;
    let ys = table.numeric_column(&req.y)?;
    let x_range = axis_range(table, [req.x.as_str()])?;
    let y_range = axis_range(table, [req.y.as_str()])?;

    let (x_edges, y_edges, counts) = match (x_range, y_range) {
        (Some(xr), Some(yr)) => {
            let xb = Binning::new(xr, req.bins);
            let yb = Binning::new(yr, req.bins);
            let mut counts = vec![vec![0u64; req.bins]; req.bins];
            for (x, y) in xs.into_iter().zip(ys) {
                if let (Some(i), Some(j)) = (xb.bin(x), yb.bin(y)) {
                    counts[j][i] += 1;
                }
            }
            (xb.edges(), yb.edges(), counts)
        }
        _ => (Vec::new(), Vec::new(), Vec::new()),
    };

    Ok(ChartSpec::Density {
        x_column: req.x.clone(),
        y_column: req.y.clone(),
        coloring: req.coloring,
        x_edges,
        y_edges,
        counts,
        x_range,
        y_range,
        colorscale: req.colorscale.clone(),
        reverse_scale: req.reverse_scale,
        height: req.height,
    })
}

/// Joint min/max over the finite values of several numeric columns.
fn axis_range<'a>(
    table: &Table,
    columns: impl IntoIterator<Item = &'a str>,
) -> Result<Option<AxisRange>, Error> {
    let mut joint: Option<AxisRange> = None;
    for column in columns {
        for value in table.numeric_column(column)? {
            if !value.is_finite() {
                continue;
            }
            joint = Some(match joint {
                Some(r) => AxisRange {
                    min: r.min.min(value),
                    max: r.max.max(value),
                },
                None => AxisRange {
                    min: value,
                    max: value,
                },
            });
        }
    }
    Ok(joint)
}

fn check_bins(bins: usize, (lo, hi): (usize, usize)) -> Result<(), Error> {
    if !(lo..=hi).contains(&bins) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("bin count {bins} is out of range"))
            .with_hint(format!("Use between {lo} and {hi} bins.")));
    }
    Ok(())
}

fn check_height(height: Option<u32>) -> Result<(), Error> {
    let (lo, hi) = FIGURE_HEIGHT_LIMITS;
    match height {
        Some(height) if !(lo..=hi).contains(&height) => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("figure height {height} is out of range"))
            .with_hint(format!("Use a height between {lo} and {hi} pixels."))),
        _ => Ok(()),
    }
}

fn normalize(count: u64, samples: usize, width: f64, norm: HistNorm) -> f64 {
    let count = count as f64;
    let total = samples.max(1) as f64;
    match norm {
        HistNorm::Count => count,
        HistNorm::Percent => 100.0 * count / total,
        HistNorm::Probability => count / total,
        HistNorm::Density => count / width,
        HistNorm::ProbabilityDensity => count / (total * width),
    }
}

struct Binning {
    lo: f64,
    width: f64,
    bins: usize,
}

impl Binning {
    // A degenerate range is widened to one unit centered on the value.
    fn new(range: AxisRange, bins: usize) -> Self {
        let (lo, hi) = if range.max > range.min {
            (range.min, range.max)
        } else {
            (range.min - 0.5, range.max + 0.5)
        };
        Self {
            lo,
            width: (hi - lo) / bins as f64,
            bins,
        }
    }

    fn bin(&self, value: f64) -> Option<usize> {
        if !value.is_finite() || value < self.lo {
            return None;
        }
        let idx = ((value - self.lo) / self.width) as usize;
        (idx <= self.bins).then(|| idx.min(self.bins - 1))
    }

    fn edges(&self) -> Vec<f64> {
        (0..=self.bins)
            .map(|i| self.lo + self.width * i as f64)
            .collect()
    }
}
