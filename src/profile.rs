//! Purpose: Exploratory per-column profile of a TFS table.
//! Exports: `profile`, `DocumentProfile`, `ColumnProfile`, `ColumnStats`, `quantile`.
//! Role: Data behind the "describe this file" report; serializes to stable JSON.
//! Invariants: NaN is counted separately and excluded from every numeric statistic.
//! Invariants: Quantiles interpolate linearly between order statistics.
use std::collections::HashMap;

use serde::Serialize;

use crate::core::document::Document;
use crate::core::table::Table;
use crate::core::value::Value;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DocumentProfile {
    pub header_entries: usize,
    pub rows: usize,
    pub columns: Vec<ColumnProfile>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    #[serde(rename = "type")]
    pub type_code: String,
    pub count: usize,
    #[serde(flatten)]
    pub stats: ColumnStats,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnStats {
    Numeric {
        nan_count: usize,
        mean: Option<f64>,
        std: Option<f64>,
        min: Option<f64>,
        q25: Option<f64>,
        median: Option<f64>,
        q75: Option<f64>,
        max: Option<f64>,
    },
    Text {
        unique: usize,
        top: Option<String>,
        freq: usize,
    },
}

pub fn profile(document: &Document) -> DocumentProfile {
    DocumentProfile {
        header_entries: document.header.len(),
        rows: document.table.num_rows(),
        columns: profile_table(&document.table),
    }
}

pub fn profile_table(table: &Table) -> Vec<ColumnProfile> {
    table
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let values = table.rows().map(|row| &row.values()[idx]);
            let stats = if column.kind.is_numeric() {
                numeric_stats(values.filter_map(Value::as_f64).collect())
            } else {
                text_stats(values.filter_map(Value::as_str))
            };
            ColumnProfile {
                name: column.name.clone(),
                type_code: column.type_code.to_string(),
                count: table.num_rows(),
                stats,
            }
        })
        .collect()
}

fn numeric_stats(values: Vec<f64>) -> ColumnStats {
    let total = values.len();
    let mut sorted = values.into_iter().filter(|v| !v.is_nan()).collect::<Vec<_>>();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();

    let mean = (n > 0).then(|| sorted.iter().sum::<f64>() / n as f64);
    let std = mean.filter(|_| n > 1).map(|mean| {
        let sq = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
        (sq / (n - 1) as f64).sqrt()
    });

    ColumnStats::Numeric {
        nan_count: total - n,
        mean,
        std,
        min: sorted.first().copied(),
        q25: quantile(&sorted, 0.25),
        median: quantile(&sorted, 0.5),
        q75: quantile(&sorted, 0.75),
        max: sorted.last().copied(),
    }
}

fn text_stats<'a>(values: impl Iterator<Item = &'a str>) -> ColumnStats {
    // (count, first seen) per value; ties on count go to the earliest value.
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (pos, value) in values.enumerate() {
        counts.entry(value).or_insert((0, pos)).0 += 1;
    }
    let top = counts
        .iter()
        .max_by(|a, b| a.1.0.cmp(&b.1.0).then(b.1.1.cmp(&a.1.1)))
        .map(|(value, (freq, _))| (value.to_string(), *freq));

    ColumnStats::Text {
        unique: counts.len(),
        freq: top.as_ref().map_or(0, |(_, freq)| *freq),
        top: top.map(|(value, _)| value),
    }
}

/// Linearly interpolated quantile of already sorted, NaN-free values.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let pos = q.clamp(0.0, 1.0) * last as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

#[cfg(test)]
mod tests {
    use super::{ColumnStats, profile, quantile};
    use crate::core::document::Document;

    const TEXT: &str = "@ TITLE %s \"x\"\n* NAME BETX N\n$ %s %le %d\n\
\"QF\" 1.0 1\n\"QD\" 2.0 2\n\"QF\" nan 3\n\"QD\" 4.0 4\n\"BPM\" 8.0 5\n";

    #[test]
    fn numeric_profile_skips_nan() {
        let doc = Document::parse(TEXT).unwrap();
        let report = profile(&doc);
        assert_eq!(report.rows, 5);
        assert_eq!(report.header_entries, 1);

        let betx = &report.columns[1];
        assert_eq!(betx.count, 5);
        let ColumnStats::Numeric {
            nan_count,
            mean,
            min,
            median,
            max,
            std,
            ..
        } = &betx.stats
        else {
            panic!("expected numeric stats");
        };
        assert_eq!(*nan_count, 1);
        assert_eq!(*mean, Some(3.75));
        assert_eq!(*min, Some(1.0));
        assert_eq!(*median, Some(3.0));
        assert_eq!(*max, Some(8.0));
        let std = std.unwrap();
        assert!((std - 3.095_695_936_834_452).abs() < 1e-12);
    }

    #[test]
    fn text_profile_breaks_ties_by_first_appearance() {
        let doc = Document::parse(TEXT).unwrap();
        let report = profile(&doc);
        assert_eq!(
            report.columns[0].stats,
            ColumnStats::Text {
                unique: 3,
                top: Some("QF".to_string()),
                freq: 2,
            }
        );
    }

    #[test]
    fn profile_serializes_with_kind_tag() {
        let doc = Document::parse(TEXT).unwrap();
        let json = serde_json::to_value(profile(&doc)).unwrap();
        let n = &json["columns"][2];
        assert_eq!(n["name"], "N");
        assert_eq!(n["type"], "%d");
        assert_eq!(n["kind"], "numeric");
        assert_eq!(n["q25"], 2.0);
        assert_eq!(json["columns"][0]["kind"], "text");
    }

    #[test]
    fn quantile_interpolates() {
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(quantile(&[2.0], 0.75), Some(2.0));
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0], 0.5), Some(2.5));
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0], 0.25), Some(1.75));
    }
}
