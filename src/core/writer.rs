//! Purpose: Serialize a `Document` back to TFS text.
//! Exports: `write_string`, `write_to`, `write_path`.
//! Role: Inverse of the reader: header lines, `*` names, `$` codes, then rows.
//! Invariants: Output read back yields a structurally equal document.
//! Invariants: Writing a document read from writer output reproduces the same text.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::core::document::Document;
use crate::core::error::{Error, ErrorKind};
use crate::core::header::validate_text;
use crate::core::value::{Value, format_float};

pub fn write_string(document: &Document) -> Result<String, Error> {
    let mut out = String::new();
    for line in render_lines(document)? {
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

pub fn write_to<W: Write>(document: &Document, mut out: W) -> Result<(), Error> {
    let text = write_string(document)?;
    out.write_all(text.as_bytes())
        .and_then(|()| out.flush())
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to write tfs output")
                .with_source(err)
        })
}

pub fn write_path(document: &Document, path: &Path) -> Result<(), Error> {
    let file = File::create(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to create tfs file")
            .with_path(path)
            .with_source(err)
    })?;
    write_to(document, BufWriter::new(file)).map_err(|err| err.with_path(path))?;
    debug!(path = %path.display(), rows = document.table.num_rows(), "wrote tfs file");
    Ok(())
}

fn render_lines(document: &Document) -> Result<Vec<String>, Error> {
    let table = &document.table;
    for entry in document.header.entries() {
        if let Value::Text(text) = &entry.value {
            validate_text(text).map_err(|err| err.with_key(entry.key.clone()))?;
        }
    }
    let mut lines = document.header.serialize();
    if table.num_columns() == 0 {
        return Ok(lines);
    }

    let mut cells = Vec::with_capacity(table.num_rows());
    for row in table.rows() {
        let rendered = row
            .values()
            .iter()
            .zip(table.columns())
            .map(|(value, column)| {
                render_cell(value).map_err(|err| err.with_column(column.name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        cells.push(rendered);
    }

    let widths = table
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            cells
                .iter()
                .map(|row| row[idx].len())
                .chain([column.name.len(), column.type_code.as_str().len()])
                .max()
                .unwrap_or(0)
        })
        .collect::<Vec<_>>();

    lines.push(aligned_line("*", table.column_names(), &widths));
    lines.push(aligned_line(
        "$",
        table.columns().iter().map(|c| c.type_code.as_str()),
        &widths,
    ));
    for row in &cells {
        lines.push(aligned_line(" ", row.iter().map(String::as_str), &widths));
    }
    Ok(lines)
}

fn render_cell(value: &Value) -> Result<String, Error> {
    Ok(match value {
        Value::Int(v) => v.to_string(),
        Value::Float(v) => format_float(*v),
        Value::Text(v) => {
            validate_text(v)?;
            format!("\"{v}\"")
        }
    })
}

fn aligned_line<'a>(
    marker: &str,
    cells: impl Iterator<Item = &'a str>,
    widths: &[usize],
) -> String {
    let mut line = String::from(marker);
    for (cell, width) in cells.zip(widths) {
        line.push(' ');
        line.push_str(&format!("{cell:>width$}"));
    }
    line
}
