//! Purpose: `tfsview` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits results on stdout.
//! Invariants: Commands emit stable stdout formats (human or JSON by command/flags).
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Input documents are never modified; `write -o` refuses the input path.
#![allow(clippy::result_large_err)]
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use clap::{
    ArgAction, Args, CommandFactory, Parser, Subcommand, ValueEnum, ValueHint,
    error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use tfsview::api::{
    ChartRequest, ColumnProfile, ColumnStats, ContourColoring, DENSITY_BINS, DensityRequest,
    Document, Error, ErrorKind, HISTOGRAM_BINS, HistNorm, HistogramRequest, Marginal,
    ScatterMode, ScatterRequest, TypeCode, to_exit_code,
};
use tfsview::core::value::format_float;
use tfsview::notice::{Notice, notice_json};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                let message = clap_error_summary(&err);
                let hint = clap_error_hint(&err);
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(message)
                        .with_hint(hint),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing();
    let color_mode = cli.color;

    command_dispatch::dispatch_command(cli.command, color_mode)
        .map_err(add_parse_hint)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let replacement = arg.to_str().and_then(|value| match value {
                "---help" => Some("--help"),
                "---version" => Some("--version"),
                _ => None,
            });
            replacement.map(OsString::from).unwrap_or_else(|| arg)
        })
        .collect()
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "tfsview",
    version,
    about = "Inspect, query and rewrite TFS tables",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"TFS files hold `@` header parameters followed by a typed, column-oriented table
(`*` names, `$` type codes, then whitespace-separated rows).

Mental model:
  - `headers` / `columns` describe a file
  - `show` / `profile` look at rows (optionally filtered with --where)
  - `chart` prepares plot data as JSON
  - `write` saves a filtered copy as TFS
"#,
    after_help = r#"EXAMPLES
  $ tfsview headers twiss.tfs
  $ tfsview show twiss.tfs --columns NAME,S,BETX --where '.BETX > 100'
  $ tfsview profile twiss.tfs --json
  $ cat twiss.tfs | tfsview columns -

LEARN MORE
  Log verbosity follows RUST_LOG (default: warn).

  $ tfsview <command> --help"#,
    arg_required_else_help = true,
    disable_help_subcommand = false
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        global = true,
        help = "Colorize stderr diagnostics and pretty JSON output: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

/// Row filtering and column projection shared by the row-oriented commands.
#[derive(Args, Debug, Default)]
struct ViewArgs {
    #[arg(
        long,
        value_delimiter = ',',
        value_name = "COLUMNS",
        help = "Keep only these columns (comma-separated, source order is kept)"
    )]
    columns: Vec<String>,
    #[arg(
        long = "where",
        value_name = "EXPR",
        help = "Keep rows where the jq expression is true (repeatable; AND)"
    )]
    where_expr: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Show header parameters",
        long_about = r#"List the `@` header parameters of a TFS file, in file order."#,
        after_help = r#"EXAMPLES
  $ tfsview headers twiss.tfs
  $ tfsview headers twiss.tfs --key Q1
  $ tfsview headers twiss.tfs --json

NOTES
  - With --key, prints just that value (exit 9 when the key is missing)."#
    )]
    Headers {
        #[arg(help = "TFS file, or - for stdin", value_hint = ValueHint::FilePath)]
        file: String,
        #[arg(long, help = "Print a single header value")]
        key: Option<String>,
        #[arg(long, help = "Emit JSON instead of a table")]
        json: bool,
    },
    #[command(
        arg_required_else_help = true,
        about = "Show column names and types",
        after_help = r#"EXAMPLES
  $ tfsview columns twiss.tfs
  $ tfsview columns twiss.tfs --json"#
    )]
    Columns {
        #[arg(help = "TFS file, or - for stdin", value_hint = ValueHint::FilePath)]
        file: String,
        #[arg(long, help = "Emit JSON instead of a table")]
        json: bool,
    },
    #[command(
        arg_required_else_help = true,
        about = "Print table rows",
        long_about = r#"Print table rows, optionally filtered and projected.

Filters run before projection, so --where may use columns that --columns drops."#,
        after_help = r#"EXAMPLES
  $ tfsview show twiss.tfs --limit 10
  $ tfsview show twiss.tfs --columns NAME,BETX --where '.KEYWORD == "QUAD"'
  $ tfsview show twiss.tfs --format json
  $ tfsview show twiss.tfs --index NAME --columns S,BETX

NOTES
  - Each row is a jq object keyed by column name: `.BETX > 100`.
  - --index keeps its column even when --columns leaves it out."#
    )]
    Show {
        #[arg(help = "TFS file, or - for stdin", value_hint = ValueHint::FilePath)]
        file: String,
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long, value_name = "COLUMN", help = "Show this column first, as the row index")]
        index: Option<String>,
        #[arg(long, help = "Print at most N rows")]
        limit: Option<usize>,
        #[arg(long, value_enum, default_value = "table", help = "Output format")]
        format: ShowFormat,
    },
    #[command(
        arg_required_else_help = true,
        about = "Summarize each column",
        long_about = r#"Per-column statistics.

Numeric columns: count, NaN count, mean, std, min, quartiles, max.
Text columns: count, unique values, most frequent value and its frequency."#,
        after_help = r#"EXAMPLES
  $ tfsview profile twiss.tfs
  $ tfsview profile twiss.tfs --columns BETX,BETY --json"#
    )]
    Profile {
        #[arg(help = "TFS file, or - for stdin", value_hint = ValueHint::FilePath)]
        file: String,
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long, help = "Emit JSON instead of a table")]
        json: bool,
    },
    #[command(
        arg_required_else_help = true,
        about = "Prepare chart data as JSON",
        long_about = r#"Compute a renderer-neutral chart description (series, bins, axis ranges).

  scatter    x against one or more --y columns, with optional error bars
  histogram  shared bins over --x and any --y columns
  density    2D binned counts of --x against a single --y"#,
        after_help = r#"EXAMPLES
  $ tfsview chart twiss.tfs --kind scatter --x S --y BETX --y BETY
  $ tfsview chart twiss.tfs --kind histogram --x BETX --bins 50 --norm percent
  $ tfsview chart twiss.tfs --kind density --x X --y Y --coloring heatmap --colorscale Viridis

NOTES
  - Error-bar columns pair with --y columns in order; a count mismatch is a notice.
  - --height, --marginal, --colorscale and --reverse-scale are passed through for the renderer."#
    )]
    Chart {
        #[arg(help = "TFS file, or - for stdin", value_hint = ValueHint::FilePath)]
        file: String,
        #[arg(long, value_enum, help = "Chart kind")]
        kind: ChartKindCli,
        #[arg(long, help = "X column")]
        x: String,
        #[arg(long, help = "Y column (repeatable)")]
        y: Vec<String>,
        #[arg(long = "error-x", value_name = "COLUMN", help = "Horizontal error column")]
        error_x: Vec<String>,
        #[arg(long = "error-y", value_name = "COLUMN", help = "Vertical error column")]
        error_y: Vec<String>,
        #[arg(long, value_enum, default_value = "markers", help = "Scatter mode")]
        mode: ModeCli,
        #[arg(long, help = "Bin count (histogram: 100, density: 20)")]
        bins: Option<usize>,
        #[arg(long, value_enum, default_value = "count", help = "Histogram normalization")]
        norm: NormCli,
        #[arg(long, value_enum, default_value = "fill", help = "Density coloring")]
        coloring: ColoringCli,
        #[arg(long, value_enum, help = "Histogram distribution plot on the upper axis")]
        marginal: Option<MarginalCli>,
        #[arg(long, value_name = "NAME", help = "Density colorscale (renderer default if unset)")]
        colorscale: Option<String>,
        #[arg(long = "reverse-scale", help = "Reverse the density colorscale")]
        reverse_scale: bool,
        #[arg(long, value_name = "PIXELS", help = "Figure height (200-1450)")]
        height: Option<u32>,
        #[arg(
            long = "where",
            value_name = "EXPR",
            help = "Keep rows where the jq expression is true (repeatable; AND)"
        )]
        where_expr: Vec<String>,
    },
    #[command(
        arg_required_else_help = true,
        about = "Write a filtered copy as TFS",
        long_about = r#"Serialize the (optionally filtered and projected) document as TFS.

Headers can be added or replaced with --set-header; the input is never modified."#,
        after_help = r#"EXAMPLES
  $ tfsview write twiss.tfs --columns NAME,S,BETX -o slim.tfs
  $ tfsview write twiss.tfs --where '.S < 100' --set-header ORIGIN %s twiss.tfs
  $ tfsview write - --set-header Q1 %le 62.31 < in.tfs > out.tfs"#
    )]
    Write {
        #[arg(help = "TFS file, or - for stdin", value_hint = ValueHint::FilePath)]
        file: String,
        #[command(flatten)]
        view: ViewArgs,
        #[arg(
            long = "set-header",
            num_args = 3,
            value_names = ["KEY", "TYPE", "VALUE"],
            action = ArgAction::Append,
            allow_hyphen_values = true,
            help = "Add or replace a header parameter (repeatable)"
        )]
        set_header: Vec<String>,
        #[arg(
            short = 'o',
            long,
            help = "Output path (default: stdout)",
            value_hint = ValueHint::FilePath
        )]
        output: Option<PathBuf>,
    },
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        long_about = r#"Generate shell completion scripts.

Prints a completion script for the given shell to stdout."#,
        after_help = r#"EXAMPLES
  $ tfsview completion bash > ~/.local/share/bash-completion/completions/tfsview
  $ tfsview completion zsh > ~/.zfunc/_tfsview
  $ tfsview completion fish > ~/.config/fish/completions/tfsview.fish"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
    #[command(
        about = "Print version info",
        long_about = r#"Print the version (JSON when stdout is not a terminal)."#,
        after_help = r#"EXAMPLES
  $ tfsview version"#
    )]
    Version,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ShowFormat {
    Table,
    Json,
    Tfs,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ChartKindCli {
    Scatter,
    Histogram,
    Density,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeCli {
    Lines,
    Markers,
    #[value(name = "lines+markers")]
    LinesMarkers,
}

impl From<ModeCli> for ScatterMode {
    fn from(value: ModeCli) -> Self {
        match value {
            ModeCli::Lines => ScatterMode::Lines,
            ModeCli::Markers => ScatterMode::Markers,
            ModeCli::LinesMarkers => ScatterMode::LinesMarkers,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum NormCli {
    Count,
    Percent,
    Probability,
    Density,
    ProbabilityDensity,
}

impl From<NormCli> for HistNorm {
    fn from(value: NormCli) -> Self {
        match value {
            NormCli::Count => HistNorm::Count,
            NormCli::Percent => HistNorm::Percent,
            NormCli::Probability => HistNorm::Probability,
            NormCli::Density => HistNorm::Density,
            NormCli::ProbabilityDensity => HistNorm::ProbabilityDensity,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColoringCli {
    Fill,
    Heatmap,
    Lines,
    None,
}

impl From<ColoringCli> for ContourColoring {
    fn from(value: ColoringCli) -> Self {
        match value {
            ColoringCli::Fill => ContourColoring::Fill,
            ColoringCli::Heatmap => ContourColoring::Heatmap,
            ColoringCli::Lines => ContourColoring::Lines,
            ColoringCli::None => ContourColoring::None,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MarginalCli {
    Box,
    Violin,
    Rug,
}

impl From<MarginalCli> for Marginal {
    fn from(value: MarginalCli) -> Self {
        match value {
            MarginalCli::Box => Marginal::Box,
            MarginalCli::Violin => Marginal::Violin,
            MarginalCli::Rug => Marginal::Rug,
        }
    }
}

/// Chart flags as parsed, before they are checked against the chart kind.
struct ChartArgs {
    kind: ChartKindCli,
    x: String,
    y: Vec<String>,
    error_x: Vec<String>,
    error_y: Vec<String>,
    mode: ModeCli,
    bins: Option<usize>,
    norm: NormCli,
    coloring: ColoringCli,
    marginal: Option<MarginalCli>,
    colorscale: Option<String>,
    reverse_scale: bool,
    height: Option<u32>,
}

fn chart_request(args: ChartArgs) -> Result<ChartRequest, Error> {
    match args.kind {
        ChartKindCli::Scatter => {
            if args.y.is_empty() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("scatter needs at least one --y column")
                    .with_hint("Example: `tfsview chart twiss.tfs --kind scatter --x S --y BETX`."));
            }
            if args.bins.is_some() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("--bins does not apply to scatter charts"));
            }
            reject_marginal(&args)?;
            reject_colorscale(&args)?;
            Ok(ChartRequest::Scatter(ScatterRequest {
                x: args.x,
                y: args.y,
                error_x: args.error_x,
                error_y: args.error_y,
                mode: args.mode.into(),
                height: args.height,
            }))
        }
        ChartKindCli::Histogram => {
            reject_error_bars(&args)?;
            reject_colorscale(&args)?;
            let mut columns = vec![args.x];
            columns.extend(args.y);
            Ok(ChartRequest::Histogram(HistogramRequest {
                columns,
                bins: args.bins.unwrap_or(HISTOGRAM_BINS),
                norm: args.norm.into(),
                marginal: args.marginal.map(Marginal::from),
                height: args.height,
            }))
        }
        ChartKindCli::Density => {
            reject_error_bars(&args)?;
            reject_marginal(&args)?;
            let [y] = <[String; 1]>::try_from(args.y).map_err(|_| {
                Error::new(ErrorKind::Usage)
                    .with_message("density needs exactly one --y column")
                    .with_hint("Example: `tfsview chart twiss.tfs --kind density --x X --y Y`.")
            })?;
            Ok(ChartRequest::Density(DensityRequest {
                x: args.x,
                y,
                bins: args.bins.unwrap_or(DENSITY_BINS),
                coloring: args.coloring.into(),
                colorscale: args.colorscale,
                reverse_scale: args.reverse_scale,
                height: args.height,
            }))
        }
    }
}

fn reject_error_bars(args: &ChartArgs) -> Result<(), Error> {
    if args.error_x.is_empty() && args.error_y.is_empty() {
        return Ok(());
    }
    Err(Error::new(ErrorKind::Usage)
        .with_message("error bars are only supported for scatter charts"))
}

fn reject_marginal(args: &ChartArgs) -> Result<(), Error> {
    if args.marginal.is_none() {
        return Ok(());
    }
    Err(Error::new(ErrorKind::Usage)
        .with_message("--marginal is only supported for histograms"))
}

fn reject_colorscale(args: &ChartArgs) -> Result<(), Error> {
    if args.colorscale.is_none() && !args.reverse_scale {
        return Ok(());
    }
    Err(Error::new(ErrorKind::Usage)
        .with_message("--colorscale and --reverse-scale are only supported for density charts"))
}

/// Splits repeated `--set-header KEY TYPE VALUE` triples and applies them in order.
fn apply_header_overrides(document: &mut Document, raw: &[String]) -> Result<(), Error> {
    for triple in raw.chunks(3) {
        let [key, code, value] = triple else {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("--set-header takes KEY TYPE VALUE"));
        };
        let type_code = TypeCode::new(code.as_str());
        let kind = type_code
            .kind()
            .unwrap_or_else(|| tfsview::core::value::infer_kind([value.as_str()]));
        let value = tfsview::core::value::parse_token(kind, value).map_err(|err| {
            err.with_key(key.clone())
                .with_hint("The value must match the header type code (e.g. %le 1.5, %d 3, %s text).")
        })?;
        document.header.set(key.clone(), value, type_code)?;
    }
    Ok(())
}

fn add_parse_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::RowArity => {
            err.with_hint("Every data row needs one token per `*` column; quote text containing spaces.")
        }
        ErrorKind::MalformedDocument => err.with_hint(
            "Expected `@` headers, then one `*` names line and one `$` types line, then rows.",
        ),
        ErrorKind::ColumnNotFound => {
            err.with_hint("List available columns with `tfsview columns <FILE>`.")
        }
        ErrorKind::KeyNotFound => {
            err.with_hint("List available header keys with `tfsview headers <FILE>`.")
        }
        _ => err,
    }
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::NotFound => err.with_hint("Check the file path, or pass - to read stdin."),
        ErrorKind::Io => err.with_hint("I/O error. Check the path, permissions, and disk space."),
        _ => err,
    }
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_LOG=debug and share command/context if it persists.",
    )
}

fn emit_version_output(color_mode: ColorMode) {
    if io::stdout().is_terminal() {
        println!("tfsview {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(
            json!({
                "name": "tfsview",
                "version": env!("CARGO_PKG_VERSION"),
            }),
            color_mode,
        );
    }
}

fn emit_table(headers: &[&str], rows: &[Vec<String>]) {
    println!("{}", render_table(headers, rows));
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let column_count = headers.len();
    let mut sanitized_rows = Vec::with_capacity(rows.len());
    let mut widths = headers
        .iter()
        .map(|header| header.chars().count())
        .collect::<Vec<_>>();

    for row in rows {
        let mut sanitized = Vec::with_capacity(column_count);
        for (idx, width) in widths.iter_mut().enumerate() {
            let value = row.get(idx).map(String::as_str).unwrap_or("");
            let cleaned = sanitize_table_cell(value);
            *width = (*width).max(cleaned.chars().count());
            sanitized.push(cleaned);
        }
        sanitized_rows.push(sanitized);
    }

    let mut lines = Vec::with_capacity(sanitized_rows.len() + 1);
    lines.push(format_table_line(
        &headers
            .iter()
            .map(|header| header.to_string())
            .collect::<Vec<_>>(),
        &widths,
    ));
    for row in sanitized_rows {
        lines.push(format_table_line(&row, &widths));
    }
    lines.join("\n")
}

fn sanitize_table_cell(value: &str) -> String {
    value.replace('\n', "\\n").replace('\r', "\\r")
}

fn format_table_line(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::new();
    for (idx, width) in widths.iter().enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        let cell = cells.get(idx).map(String::as_str).unwrap_or("");
        line.push_str(cell);
        let cell_len = cell.chars().count();
        if *width > cell_len {
            line.push_str(&" ".repeat(*width - cell_len));
        }
    }
    line.trim_end().to_string()
}

fn profile_rows(columns: &[ColumnProfile]) -> Vec<Vec<String>> {
    let stat = |value: &Option<f64>| value.map(format_float).unwrap_or_else(|| "-".to_string());
    columns
        .iter()
        .map(|column| {
            let mut row = vec![
                column.name.clone(),
                column.type_code.clone(),
                column.count.to_string(),
            ];
            match &column.stats {
                ColumnStats::Numeric {
                    nan_count,
                    mean,
                    std,
                    min,
                    q25,
                    median,
                    q75,
                    max,
                } => {
                    row.push(nan_count.to_string());
                    row.extend([mean, std, min, q25, median, q75, max].into_iter().map(stat));
                    row.extend(["-", "-", "-"].map(str::to_string));
                }
                ColumnStats::Text { unique, top, freq } => {
                    row.extend(std::iter::repeat_n("-".to_string(), 8));
                    row.push(unique.to_string());
                    row.push(top.clone().unwrap_or_else(|| "-".to_string()));
                    row.push(freq.to_string());
                }
            }
            row
        })
        .collect()
}

const PROFILE_HEADERS: [&str; 14] = [
    "NAME", "TYPE", "COUNT", "NAN", "MEAN", "STD", "MIN", "25%", "50%", "75%", "MAX", "UNIQUE",
    "TOP", "FREQ",
];

fn emit_json(value: serde_json::Value, color_mode: ColorMode) {
    let is_tty = io::stdout().is_terminal();
    let pretty = is_tty || color_mode.use_color(is_tty);
    let json = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn emit_notice(notice: &Notice, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        let label = colorize_label("notice:", color_mode.use_color(is_tty), AnsiColor::Yellow);
        if notice.source.is_empty() {
            eprintln!("{label} {}", notice.message);
        } else {
            eprintln!("{label} {} (file: {})", notice.message, notice.source);
        }
        return;
    }

    let value = notice_json(notice);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Parse => "invalid value".to_string(),
        ErrorKind::MalformedDocument => "malformed tfs document".to_string(),
        ErrorKind::RowArity => "row has the wrong number of fields".to_string(),
        ErrorKind::ColumnNotFound => "column not found".to_string(),
        ErrorKind::KeyNotFound => "header key not found".to_string(),
        ErrorKind::TypeMismatch => "type mismatch".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(line) = err.line() {
        inner.insert("line".to_string(), json!(line));
    }
    if let Some(column) = err.column() {
        inner.insert("column".to_string(), json!(column));
    }
    if let Some(key) = err.key() {
        inner.insert("key".to_string(), json!(key));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            display_path(path)
        ));
    }
    if let Some(line) = err.line() {
        lines.push(format!(
            "{} {line}",
            colorize_label("line:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(column) = err.column() {
        lines.push(format!(
            "{} {column}",
            colorize_label("column:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(key) = err.key() {
        lines.push(format!(
            "{} {key}",
            colorize_label("key:", use_color, AnsiColor::Yellow)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn display_path(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .filter(|relative| !relative.as_os_str().is_empty())
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);

    let Some(usage) = usage else {
        return "Try `tfsview --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "tfsview") else {
        return "Try `tfsview --help`.".to_string();
    };

    let mut parts = Vec::new();
    for token in tokens.iter().skip(pos + 1) {
        if token.starts_with('-') || token.starts_with('<') || token.starts_with('[') {
            break;
        }
        parts.push(*token);
    }

    if parts.is_empty() {
        return "Try `tfsview --help`.".to_string();
    }
    format!("Try `tfsview {} --help`.", parts.join(" "))
}
