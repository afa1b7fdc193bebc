//! Purpose: Typed, column-ordered TFS data table with pure query operations.
//! Exports: `Table`, `ColumnSpec`, `Row`.
//! Role: Data half of a document; selections and filters return new tables.
//! Invariants: Every row holds exactly one value per column, of that column's kind.
//! Invariants: Column names are unique; column and row order are significant.
//! Invariants: Aggregates skip NaN and reject text columns with `TypeMismatch`.
use std::collections::HashSet;

use crate::core::error::{Error, ErrorKind};
use crate::core::value::{TypeCode, Value, ValueKind};

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    /// Code as declared in the `$` line, kept for re-serialization.
    pub type_code: TypeCode,
    /// Kind the cells were parsed as (declared or inferred).
    pub kind: ValueKind,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            type_code: TypeCode::for_kind(kind),
            kind,
        }
    }

    pub fn with_type_code(mut self, type_code: TypeCode) -> Self {
        self.type_code = type_code;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    columns: Vec<ColumnSpec>,
    rows: Vec<Vec<Value>>,
}

/// Borrowed view of one row, addressable by column name.
#[derive(Clone, Copy, Debug)]
pub struct Row<'a> {
    index: usize,
    columns: &'a [ColumnSpec],
    values: &'a [Value],
}

impl<'a> Row<'a> {
    /// Position of the row in the table it was borrowed from.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }

    pub fn columns(&self) -> &'a [ColumnSpec] {
        self.columns
    }

    pub fn get(&self, name: &str) -> Result<&'a Value, Error> {
        self.columns
            .iter()
            .position(|column| column.name == name)
            .map(|idx| &self.values[idx])
            .ok_or_else(|| Error::column_not_found(name))
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).ok().and_then(Value::as_f64)
    }
}

impl Table {
    pub fn new(columns: Vec<ColumnSpec>) -> Result<Self, Error> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("duplicate column `{}`", column.name))
                    .with_column(column.name.clone()));
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    // Callers guarantee unique names and rows matching the column kinds.
    pub(crate) fn from_parts(columns: Vec<ColumnSpec>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), Error> {
        if row.len() != self.columns.len() {
            return Err(Error::new(ErrorKind::RowArity).with_message(format!(
                "row has {} values but the table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        for (column, value) in self.columns.iter().zip(&row) {
            if column.kind != value.kind() {
                return Err(Error::new(ErrorKind::TypeMismatch)
                    .with_message(format!(
                        "column holds {} values, got {}",
                        column.kind.label(),
                        value.kind().label()
                    ))
                    .with_column(column.name.clone()));
            }
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, Error> {
        self.columns
            .iter()
            .position(|column| column.name == name)
            .ok_or_else(|| Error::column_not_found(name))
    }

    pub fn column_spec(&self, name: &str) -> Result<&ColumnSpec, Error> {
        self.column_index(name).map(|idx| &self.columns[idx])
    }

    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        self.rows.get(index).map(|values| Row {
            index,
            columns: &self.columns,
            values,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().enumerate().map(|(index, values)| Row {
            index,
            columns: &self.columns,
            values,
        })
    }

    pub fn column(&self, name: &str) -> Result<Vec<&Value>, Error> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Values of a numeric column as f64; text columns are a `TypeMismatch`.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>, Error> {
        let idx = self.column_index(name)?;
        let spec = &self.columns[idx];
        if !spec.kind.is_numeric() {
            return Err(Error::new(ErrorKind::TypeMismatch)
                .with_message(format!("column `{name}` is not numeric"))
                .with_column(name));
        }
        Ok(self
            .rows
            .iter()
            .filter_map(|row| row[idx].as_f64())
            .collect())
    }

    /// Keeps the named columns in source order. Every name must exist.
    pub fn select_columns<I, S>(&self, names: I) -> Result<Table, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut wanted = HashSet::new();
        for name in names {
            let name = name.as_ref();
            self.column_index(name)?;
            wanted.insert(name.to_string());
        }
        let keep = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, column)| wanted.contains(&column.name))
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();

        let columns = keep.iter().map(|&idx| self.columns[idx].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| keep.iter().map(|&idx| row[idx].clone()).collect())
            .collect();
        Ok(Table::from_parts(columns, rows))
    }

    pub fn filter_rows<F>(&self, mut predicate: F) -> Table
    where
        F: FnMut(&Row<'_>) -> bool,
    {
        let rows = self
            .rows()
            .filter(|row| predicate(row))
            .map(|row| row.values.to_vec())
            .collect();
        Table::from_parts(self.columns.clone(), rows)
    }

    /// Like `filter_rows`, but the first predicate error aborts the whole filter.
    pub fn try_filter_rows<F>(&self, mut predicate: F) -> Result<Table, Error>
    where
        F: FnMut(&Row<'_>) -> Result<bool, Error>,
    {
        let mut rows = Vec::new();
        for row in self.rows() {
            if predicate(&row)? {
                rows.push(row.values.to_vec());
            }
        }
        Ok(Table::from_parts(self.columns.clone(), rows))
    }

    /// Moves the named column to the front; the other columns keep their order.
    pub fn with_index_column(&self, name: &str) -> Result<Table, Error> {
        let idx = self.column_index(name)?;
        let order = std::iter::once(idx)
            .chain((0..self.columns.len()).filter(|&other| other != idx))
            .collect::<Vec<_>>();
        let columns = order.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| order.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Table::from_parts(columns, rows))
    }

    pub fn head(&self, limit: usize) -> Table {
        Table::from_parts(
            self.columns.clone(),
            self.rows.iter().take(limit).cloned().collect(),
        )
    }

    pub fn min(&self, name: &str) -> Result<Option<f64>, Error> {
        Ok(self.range(name)?.map(|(min, _)| min))
    }

    pub fn max(&self, name: &str) -> Result<Option<f64>, Error> {
        Ok(self.range(name)?.map(|(_, max)| max))
    }

    pub fn mean(&self, name: &str) -> Result<Option<f64>, Error> {
        let values = self.numeric_column(name)?;
        let (sum, count) = values
            .iter()
            .filter(|v| !v.is_nan())
            .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
        Ok((count > 0).then(|| sum / count as f64))
    }

    /// `(min, max)` over the non-NaN values, `None` when there are none.
    pub fn range(&self, name: &str) -> Result<Option<(f64, f64)>, Error> {
        let values = self.numeric_column(name)?;
        Ok(values
            .into_iter()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
            }))
    }
}
