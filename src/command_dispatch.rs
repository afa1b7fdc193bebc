//! Purpose: Hold top-level CLI command dispatch for `tfsview`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Row filters run before column projection, projection before `--index` and `--limit`.
//! Invariants: Notices go to stderr and never change stdout payloads.

use super::*;

use std::fs;

use tfsview::api::{
    build_chart, compile_row_predicates, profile, read_from, read_path, write_path, write_to,
};
use tracing::debug;

pub(super) fn dispatch_command(command: Command, color_mode: ColorMode) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "tfsview", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output(color_mode);
            Ok(RunOutcome::ok())
        }
        Command::Headers { file, key, json } => {
            let document = load_document(&file, "headers", color_mode)?;
            if let Some(key) = key {
                let entry = document.header.entry(&key).ok_or_else(|| {
                    Error::new(ErrorKind::KeyNotFound)
                        .with_message(format!("no header parameter named `{key}`"))
                        .with_key(key.clone())
                })?;
                if json {
                    emit_json(
                        json!({
                            "key": entry.key,
                            "type": entry.type_code.as_str(),
                            "value": entry.value.to_json(),
                        }),
                        color_mode,
                    );
                } else {
                    println!("{}", entry.value);
                }
            } else if json {
                emit_json(json!({ "headers": document.header.to_json() }), color_mode);
            } else {
                let rows = document
                    .header
                    .entries()
                    .iter()
                    .map(|entry| {
                        vec![
                            entry.key.clone(),
                            entry.type_code.to_string(),
                            entry.value.to_string(),
                        ]
                    })
                    .collect::<Vec<_>>();
                emit_table(&["KEY", "TYPE", "VALUE"], &rows);
            }
            Ok(RunOutcome::ok())
        }
        Command::Columns { file, json } => {
            let document = load_document(&file, "columns", color_mode)?;
            let columns = document.table.columns();
            if json {
                let values = columns
                    .iter()
                    .map(|column| {
                        json!({
                            "name": column.name,
                            "type": column.type_code.as_str(),
                            "kind": column.kind.label(),
                        })
                    })
                    .collect::<Vec<_>>();
                emit_json(
                    json!({ "columns": values, "rows": document.table.num_rows() }),
                    color_mode,
                );
            } else {
                let rows = columns
                    .iter()
                    .map(|column| {
                        vec![
                            column.name.clone(),
                            column.type_code.to_string(),
                            column.kind.label().to_string(),
                        ]
                    })
                    .collect::<Vec<_>>();
                emit_table(&["NAME", "TYPE", "KIND"], &rows);
            }
            Ok(RunOutcome::ok())
        }
        Command::Show {
            file,
            mut view,
            index,
            limit,
            format,
        } => {
            if let Some(index) = &index {
                if !view.columns.is_empty() && !view.columns.contains(index) {
                    view.columns.push(index.clone());
                }
            }
            let mut document = load_view(&file, "show", &view, color_mode)?;
            if let Some(index) = &index {
                document = document.with_index_column(index)?;
            }
            if let Some(limit) = limit {
                document.table = document.table.head(limit);
            }
            match format {
                ShowFormat::Table => {
                    let headers = document.table.column_names().collect::<Vec<_>>();
                    let rows = document
                        .table
                        .rows()
                        .map(|row| row.values().iter().map(|v| v.to_string()).collect())
                        .collect::<Vec<Vec<String>>>();
                    emit_table(&headers, &rows);
                }
                ShowFormat::Json => {
                    let rows = document
                        .table
                        .rows()
                        .map(|row| row.values().iter().map(|v| v.to_json()).collect())
                        .collect::<Vec<Vec<Value>>>();
                    emit_json(
                        json!({
                            "columns": document.table.column_names().collect::<Vec<_>>(),
                            "rows": rows,
                        }),
                        color_mode,
                    );
                }
                ShowFormat::Tfs => write_to(&document, io::stdout().lock())?,
            }
            Ok(RunOutcome::ok())
        }
        Command::Profile { file, view, json } => {
            let document = load_view(&file, "profile", &view, color_mode)?;
            let report = profile(&document);
            if json {
                let value = serde_json::to_value(&report).map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to encode profile")
                        .with_source(err)
                })?;
                emit_json(value, color_mode);
            } else {
                emit_table(&PROFILE_HEADERS, &profile_rows(&report.columns));
            }
            Ok(RunOutcome::ok())
        }
        Command::Chart {
            file,
            kind,
            x,
            y,
            error_x,
            error_y,
            mode,
            bins,
            norm,
            coloring,
            marginal,
            colorscale,
            reverse_scale,
            height,
            where_expr,
        } => {
            let request = chart_request(ChartArgs {
                kind,
                x,
                y,
                error_x,
                error_y,
                mode,
                bins,
                norm,
                coloring,
                marginal,
                colorscale,
                reverse_scale,
                height,
            })?;
            let view = ViewArgs {
                columns: Vec::new(),
                where_expr,
            };
            let document = load_view(&file, "chart", &view, color_mode)?;
            let outcome = build_chart(&document.table, &request)?;
            for notice in outcome.notices {
                emit_notice(&notice.with_cmd("chart").with_source(&file), color_mode);
            }
            let value = serde_json::to_value(&outcome.spec).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode chart")
                    .with_source(err)
            })?;
            emit_json(value, color_mode);
            Ok(RunOutcome::ok())
        }
        Command::Write {
            file,
            view,
            set_header,
            output,
        } => {
            if let Some(path) = &output {
                reject_overwriting_input(&file, path)?;
            }
            let mut document = load_view(&file, "write", &view, color_mode)?;
            apply_header_overrides(&mut document, &set_header)?;
            match output {
                Some(path) => write_path(&document, &path)?,
                None => write_to(&document, io::stdout().lock())?,
            }
            Ok(RunOutcome::ok())
        }
    }
}

/// `write -o` must not replace the file it reads from.
fn reject_overwriting_input(file: &str, output: &Path) -> Result<(), Error> {
    if file == "-" {
        return Ok(());
    }
    let same = match (fs::canonicalize(file), fs::canonicalize(output)) {
        (Ok(input), Ok(output)) => input == output,
        _ => false,
    };
    if same {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("output path is the input file")
            .with_path(output)
            .with_hint("Write to a different path, then move it over the input if intended."));
    }
    Ok(())
}

/// Reads `file` (`-` is stdin) and reports columns whose type code had to be inferred.
fn load_document(file: &str, cmd: &str, color_mode: ColorMode) -> Result<Document, Error> {
    let document = if file == "-" {
        read_from(io::stdin().lock())?
    } else {
        read_path(Path::new(file))?
    };
    for column in document.table.columns() {
        if column.type_code.kind().is_some() {
            continue;
        }
        let notice = Notice::new(
            "inferred_type",
            format!(
                "column {} has unknown type code {}; typed as {}",
                column.name,
                column.type_code,
                column.kind.label()
            ),
        )
        .with_cmd(cmd)
        .with_source(file)
        .with_detail("column", column.name.clone())
        .with_detail("type", column.type_code.to_string())
        .with_detail("kind", column.kind.label());
        emit_notice(&notice, color_mode);
    }
    Ok(document)
}

fn load_view(
    file: &str,
    cmd: &str,
    view: &ViewArgs,
    color_mode: ColorMode,
) -> Result<Document, Error> {
    let predicates = compile_row_predicates(&view.where_expr)?;
    let document = load_document(file, cmd, color_mode)?.query(&predicates)?;
    let document = if view.columns.is_empty() {
        document
    } else {
        document.select_columns(&view.columns)?
    };
    debug!(
        cmd,
        rows = document.table.num_rows(),
        columns = document.table.num_columns(),
        "view ready"
    );
    Ok(document)
}
