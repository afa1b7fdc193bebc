//! Purpose: Parse TFS text into a `Document`.
//! Exports: `read_str`, `read_from`, `read_path`.
//! Role: Line-category state machine over `@`, `*`, `$`, comment and data lines.
//! Invariants: The column-name line precedes the column-type line; both precede data.
//! Invariants: Errors carry the 1-based line number; no partial document is returned.
//! Invariants: Files are opened only for the duration of the read.
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use tracing::{debug, warn};

use crate::core::document::Document;
use crate::core::error::{Error, ErrorKind};
use crate::core::header::Header;
use crate::core::table::{ColumnSpec, Table};
use crate::core::value::{TypeCode, Value, infer_kind, parse_token, split_tokens};

const HEADER_MARKER: char = '@';
const NAMES_MARKER: char = '*';
const TYPES_MARKER: char = '$';
const COMMENT_MARKER: char = '#';

pub fn read_str(text: &str) -> Result<Document, Error> {
    let mut parser = Parser::default();
    for (idx, line) in text.lines().enumerate() {
        parser.feed(idx + 1, line)?;
    }
    parser.finish()
}

pub fn read_from<R: BufRead>(reader: R) -> Result<Document, Error> {
    let mut parser = Parser::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read tfs input")
                .with_line(idx + 1)
                .with_source(err)
        })?;
        parser.feed(idx + 1, &line)?;
    }
    parser.finish()
}

pub fn read_path(path: &Path) -> Result<Document, Error> {
    let file = File::open(path).map_err(|err| {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            _ => ErrorKind::Io,
        };
        Error::new(kind)
            .with_message("failed to open tfs file")
            .with_path(path)
            .with_source(err)
    })?;
    let document = read_from(BufReader::new(file)).map_err(|err| err.with_path(path))?;
    debug!(
        path = %path.display(),
        columns = document.table.num_columns(),
        rows = document.table.num_rows(),
        "loaded tfs file"
    );
    Ok(document)
}

enum Cell {
    Ready(Value),
    Raw(String),
}

struct Columns {
    names: Vec<String>,
    line: usize,
    codes: Option<Vec<TypeCode>>,
}

#[derive(Default)]
struct Parser {
    header: Header,
    columns: Option<Columns>,
    rows: Vec<Vec<Cell>>,
}

impl Parser {
    fn feed(&mut self, line_no: usize, line: &str) -> Result<(), Error> {
        let line = line.trim();
        let Some(marker) = line.chars().next() else {
            return Ok(());
        };
        match marker {
            COMMENT_MARKER => Ok(()),
            HEADER_MARKER => self.header_line(line_no, &line[1..]),
            NAMES_MARKER => self.names_line(line_no, &line[1..]),
            TYPES_MARKER => self.types_line(line_no, &line[1..]),
            _ => self.data_line(line_no, line),
        }
    }

    fn header_line(&mut self, line_no: usize, body: &str) -> Result<(), Error> {
        if self.columns.is_some() {
            return Err(malformed(line_no, "header entry after column declarations"));
        }
        let (key, rest) = split_word(body);
        let (code, rest) = split_word(rest);
        let raw_value = rest.trim();
        if key.is_empty() || code.is_empty() || raw_value.is_empty() {
            return Err(malformed(line_no, "header line needs a key, a type code and a value")
                .with_hint("Expected `@ KEY TYPE_CODE VALUE`."));
        }
        if self.header.contains(key) {
            return Err(malformed(line_no, format!("duplicate header key `{key}`")).with_key(key));
        }

        let type_code = TypeCode::new(code);
        let kind = type_code
            .kind()
            .unwrap_or_else(|| infer_kind([raw_value]));
        let value = parse_token(kind, raw_value)
            .map_err(|err| err.with_line(line_no).with_key(key))?;
        self.header
            .upsert(key.to_string(), value, type_code)
            .map_err(|err| err.with_line(line_no))
    }

    fn names_line(&mut self, line_no: usize, body: &str) -> Result<(), Error> {
        if self.columns.is_some() {
            return Err(malformed(line_no, "repeated column name line"));
        }
        let names = body
            .split_whitespace()
            .map(str::to_string)
            .collect::<Vec<_>>();
        if names.is_empty() {
            return Err(malformed(line_no, "column name line declares no columns"));
        }
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(malformed(line_no, format!("duplicate column `{name}`"))
                    .with_column(name.clone()));
            }
        }
        self.columns = Some(Columns {
            names,
            line: line_no,
            codes: None,
        });
        Ok(())
    }

    fn types_line(&mut self, line_no: usize, body: &str) -> Result<(), Error> {
        let Some(columns) = self.columns.as_mut() else {
            return Err(malformed(line_no, "column type line before column name line"));
        };
        if columns.codes.is_some() {
            return Err(malformed(line_no, "repeated column type line"));
        }
        let codes = body.split_whitespace().map(TypeCode::new).collect::<Vec<_>>();
        if codes.len() != columns.names.len() {
            return Err(malformed(
                line_no,
                format!(
                    "{} column types declared for {} column names",
                    codes.len(),
                    columns.names.len()
                ),
            ));
        }
        columns.codes = Some(codes);
        Ok(())
    }

    fn data_line(&mut self, line_no: usize, line: &str) -> Result<(), Error> {
        let Some(Columns {
            names,
            codes: Some(codes),
            ..
        }) = self.columns.as_ref()
        else {
            return Err(malformed(line_no, "data row before column declarations")
                .with_hint("Declare `*` column names and `$` column types before the data."));
        };
        let tokens = split_tokens(line).map_err(|err| err.with_line(line_no))?;
        if tokens.len() != names.len() {
            return Err(Error::new(ErrorKind::RowArity)
                .with_message(format!(
                    "row has {} values but {} columns are declared",
                    tokens.len(),
                    names.len()
                ))
                .with_line(line_no));
        }

        let mut row = Vec::with_capacity(tokens.len());
        for ((token, code), name) in tokens.into_iter().zip(codes).zip(names) {
            let cell = match code.kind() {
                Some(kind) => Cell::Ready(
                    parse_token(kind, token)
                        .map_err(|err| err.with_line(line_no).with_column(name.clone()))?,
                ),
                None => Cell::Raw(token.to_string()),
            };
            row.push(cell);
        }
        self.rows.push(row);
        Ok(())
    }

    fn finish(self) -> Result<Document, Error> {
        let Some(columns) = self.columns else {
            return Ok(Document::new(self.header, Table::default()));
        };
        let Some(codes) = columns.codes else {
            return Err(malformed(columns.line, "column names without a column type line"));
        };

        let mut specs = Vec::with_capacity(codes.len());
        for (idx, (name, code)) in columns.names.into_iter().zip(codes).enumerate() {
            let kind = match code.kind() {
                Some(kind) => kind,
                None => {
                    let kind = infer_kind(self.rows.iter().map(|row| match &row[idx] {
                        Cell::Raw(raw) => raw.as_str(),
                        Cell::Ready(_) => "",
                    }));
                    warn!(
                        column = %name,
                        code = %code,
                        kind = kind.label(),
                        "unknown type code; column typed by inference"
                    );
                    kind
                }
            };
            specs.push(ColumnSpec {
                name,
                type_code: code,
                kind,
            });
        }

        let mut rows = Vec::with_capacity(self.rows.len());
        for cells in self.rows {
            let mut row = Vec::with_capacity(cells.len());
            for (cell, spec) in cells.into_iter().zip(&specs) {
                let value = match cell {
                    Cell::Ready(value) => value,
                    Cell::Raw(raw) => parse_token(spec.kind, &raw)
                        .map_err(|err| err.with_column(spec.name.clone()))?,
                };
                row.push(value);
            }
            rows.push(row);
        }

        debug!(
            header_entries = self.header.len(),
            columns = specs.len(),
            rows = rows.len(),
            "parsed tfs document"
        );
        Ok(Document::new(self.header, Table::from_parts(specs, rows)))
    }
}

fn split_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    let end = text.find(char::is_whitespace).unwrap_or(text.len());
    (&text[..end], &text[end..])
}

fn malformed(line_no: usize, message: impl Into<String>) -> Error {
    Error::new(ErrorKind::MalformedDocument)
        .with_message(message)
        .with_line(line_no)
}

#[cfg(test)]
mod tests {
    use super::{read_from, read_path, read_str};
    use crate::core::error::ErrorKind;
    use crate::core::value::{Value, ValueKind};

    const TWISS: &str = r#"@ NAME             %s  "TWISS"
@ TYPE             %s  "TWISS"
@ Q1               %le 62.31
@ NPART            %d  2
# generated for tests
* NAME     S        BETX      TURN
$ %s       %le      %le       %d
 "IP1"     0.0      0.55      1
 "MQ.12R1" 12.5     171.2     1

 "IP 2"    3332.4   10.0      2
"#;

    #[test]
    fn reads_header_and_typed_table() {
        let doc = read_str(TWISS).unwrap();
        assert_eq!(doc.header.len(), 4);
        assert_eq!(doc.header.get("Q1").unwrap(), &Value::Float(62.31));
        assert_eq!(doc.header.get("NPART").unwrap(), &Value::Int(2));
        assert_eq!(
            doc.header.get("NAME").unwrap(),
            &Value::Text("TWISS".to_string())
        );

        let table = &doc.table;
        assert_eq!(
            table.column_names().collect::<Vec<_>>(),
            ["NAME", "S", "BETX", "TURN"]
        );
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.column_spec("TURN").unwrap().kind, ValueKind::Int);
        let names = table.column("NAME").unwrap();
        assert_eq!(names[2], &Value::Text("IP 2".to_string()));
    }

    #[test]
    fn single_quoted_values_read_as_text() {
        let text = "@ T %s 'say \"hi\"'\n* NAME S\n$ %s %le\n'IP 1' 0.0\n\"IP 2\" 1.0\n";
        let doc = read_str(text).unwrap();
        assert_eq!(doc.header.get("T").unwrap(), &Value::Text("say \"hi\"".into()));
        assert_eq!(
            doc.table.column("NAME").unwrap(),
            [&Value::Text("IP 1".into()), &Value::Text("IP 2".into())]
        );
    }

    #[test]
    fn row_arity_error_names_the_line() {
        let text = "* A B C\n$ %d %d %d\n1 2 3\n4 5\n";
        let err = read_str(text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RowArity);
        assert_eq!(err.line(), Some(4));
    }

    #[test]
    fn ordering_violations_are_malformed() {
        let cases = [
            ("$ %d\n* A\n1\n", 1),
            ("* A\n1\n", 2),
            ("1 2\n", 1),
            ("* A\n$ %d\n1\n@ LATE %d 1\n", 4),
            ("* A\n$ %d\n* B\n", 3),
            ("* A B\n$ %d\n", 2),
            ("* A A\n$ %d %d\n", 1),
            ("@ K %d 1\n@ K %d 2\n", 2),
            ("@ K %d\n", 1),
            ("* A\n", 1),
        ];
        for (text, line) in cases {
            let err = read_str(text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedDocument, "{text:?}");
            assert_eq!(err.line(), Some(line), "{text:?}");
        }
    }

    #[test]
    fn bad_token_is_parse_error_with_location() {
        let text = "* S TURN\n$ %le %d\n1.0 1\n2.0 two\n";
        let err = read_str(text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.line(), Some(4));
        assert_eq!(err.column(), Some("TURN"));

        let err = read_str("@ Q1 %le fast\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.key(), Some("Q1"));
    }

    #[test]
    fn unknown_codes_fall_back_per_column() {
        let text = "@ FLAG %b 1\n* A B C\n$ %x %x %x\n1 1 x\n2 2.5 \"3\"\n";
        let doc = read_str(text).unwrap();
        assert_eq!(doc.header.get("FLAG").unwrap(), &Value::Int(1));
        let kinds = doc
            .table
            .columns()
            .iter()
            .map(|c| c.kind)
            .collect::<Vec<_>>();
        assert_eq!(kinds, [ValueKind::Int, ValueKind::Float, ValueKind::Text]);
        assert_eq!(doc.table.column_spec("A").unwrap().type_code.as_str(), "%x");
        assert_eq!(
            doc.table.column("C").unwrap(),
            [&Value::Text("x".into()), &Value::Text("3".into())]
        );
    }

    #[test]
    fn header_only_document_has_empty_table() {
        let doc = read_str("@ TITLE %s \"only header\"\n\n# nothing else\n").unwrap();
        assert_eq!(
            doc.header.get("TITLE").unwrap(),
            &Value::Text("only header".into())
        );
        assert_eq!(doc.table.num_columns(), 0);
    }

    #[test]
    fn read_from_matches_read_str() {
        let from_reader = read_from(TWISS.as_bytes()).unwrap();
        assert_eq!(from_reader, read_str(TWISS).unwrap());
    }

    #[test]
    fn read_path_reports_missing_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("absent.tfs");
        let err = read_path(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.path(), Some(path.as_path()));
    }

    #[test]
    fn read_path_attaches_path_to_parse_errors() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("bad.tfs");
        std::fs::write(&path, "* A\n$ %d\nnope\n").unwrap();
        let err = read_path(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.line(), Some(3));
        assert_eq!(err.path(), Some(path.as_path()));
    }
}
