//! Purpose: Pair a parsed header with its table as one immutable unit.
//! Exports: `Document`.
//! Role: Value returned by the reader and accepted by the writer and query layer.
//! Invariants: Query operations return new documents; the source is never mutated.
//! Invariants: Derived documents carry the source header unchanged.
use crate::core::error::Error;
use crate::core::header::Header;
use crate::core::table::{Row, Table};
use crate::core::{reader, writer};
use crate::query::{RowPredicate, matches_all};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    pub header: Header,
    pub table: Table,
}

impl Document {
    pub fn new(header: Header, table: Table) -> Self {
        Self { header, table }
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        reader::read_str(text)
    }

    pub fn to_tfs_string(&self) -> Result<String, Error> {
        writer::write_string(self)
    }

    pub fn select_columns<I, S>(&self, names: I) -> Result<Document, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(self.derive(self.table.select_columns(names)?))
    }

    pub fn with_index_column(&self, name: &str) -> Result<Document, Error> {
        Ok(self.derive(self.table.with_index_column(name)?))
    }

    pub fn filter_rows<F>(&self, predicate: F) -> Document
    where
        F: FnMut(&Row<'_>) -> bool,
    {
        self.derive(self.table.filter_rows(predicate))
    }

    /// Keeps rows matching every compiled expression; an empty slice keeps all rows.
    pub fn query(&self, predicates: &[RowPredicate]) -> Result<Document, Error> {
        if predicates.is_empty() {
            return Ok(self.clone());
        }
        let table = self
            .table
            .try_filter_rows(|row| matches_all(predicates, row))?;
        Ok(self.derive(table))
    }

    fn derive(&self, table: Table) -> Document {
        Document::new(self.header.clone(), table)
    }
}
