//! Driver glue behind the `calibr` binary: module I/O, the import run and
//! table inspection. Every function returns errors; only `main` exits.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use calibr_annotate::{import_calibration_table, ImportError, ImportOptions, ImportReport};
use calibr_env::env::CalibrationTables;
use calibr_graph::{from_json, to_json, GraphError, Module};
use calibr_parser::parser::{parse_table_file, ParseStatus, ParsedTable, TableError};
use serde::Serialize;
use thiserror::Error;

/// Exit code for a calibration failure (bad table, missing record, wrong state).
pub const EXIT_CALIBRATION: i32 = 1;
/// Exit code for unreadable input, unwritable output or malformed JSON.
pub const EXIT_IO: i32 = 2;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("can't read `{}`: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("can't write `{}`: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Table(#[from] TableError),
}

impl DriverError {
    pub fn exit_code(&self) -> i32 {
        match self {
            DriverError::Read { .. } | DriverError::Write { .. } | DriverError::Graph(_) => EXIT_IO,
            DriverError::Import(ImportError::Table(TableError::Io { .. }))
            | DriverError::Table(TableError::Io { .. }) => EXIT_IO,
            DriverError::Import(_) | DriverError::Table(_) => EXIT_CALIBRATION,
        }
    }

    /// The text printed on stderr; table format errors get the annotated
    /// line and hint.
    pub fn render(&self) -> String {
        match self {
            DriverError::Import(ImportError::Table(err)) | DriverError::Table(err) => err.render(),
            other => format!("error: {other}"),
        }
    }
}

fn stdin_path() -> PathBuf {
    PathBuf::from("<stdin>")
}

/// Loads a JSON module from `input`, or from stdin when `None`.
pub fn read_module(input: Option<&Path>) -> Result<Module, DriverError> {
    let text = match input {
        Some(path) => fs::read_to_string(path).map_err(|source| DriverError::Read {
            path: path.to_path_buf(),
            source,
        })?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|source| DriverError::Read {
                    path: stdin_path(),
                    source,
                })?;
            buf
        }
    };
    Ok(from_json(&text)?)
}

/// Writes `module` as pretty JSON to `out`, or to stdout when `None`.
pub fn write_module(module: &Module, out: Option<&Path>) -> Result<(), DriverError> {
    let mut json = to_json(module)?;
    json.push('\n');
    match out {
        Some(path) => fs::write(path, json).map_err(|source| DriverError::Write {
            path: path.to_path_buf(),
            source,
        }),
        None => io::stdout()
            .lock()
            .write_all(json.as_bytes())
            .map_err(|source| DriverError::Write {
                path: PathBuf::from("<stdout>"),
                source,
            }),
    }
}

/// `calibr import`: read the module, calibrate it, write it back out.
///
/// Nothing is written when calibration fails.
pub fn run_import(
    graph: Option<&Path>,
    out: Option<&Path>,
    options: &ImportOptions,
) -> Result<ImportReport, DriverError> {
    let mut module = read_module(graph)?;
    let report = import_calibration_table(&mut module, options)?;
    if let ParseStatus::Truncated { line, .. } = &report.table_status {
        log::warn!(
            "{} was only read up to line {line}",
            options.table_file.display()
        );
    }
    write_module(&module, out)?;
    Ok(report)
}

/// What `calibr inspect --json` prints.
#[derive(Debug, Serialize)]
pub struct TableDump<'t> {
    pub status: String,
    pub tables: &'t CalibrationTables,
}

/// `calibr inspect`: parse a table on its own.
pub fn inspect_table(path: &Path) -> Result<ParsedTable, DriverError> {
    Ok(parse_table_file(path)?)
}

pub fn status_line(status: &ParseStatus) -> String {
    match status {
        ParseStatus::Complete => "complete".to_string(),
        ParseStatus::Truncated { line, content } => {
            format!("truncated at line {line}: `{content}`")
        }
    }
}

/// Human readable summary of a parsed table.
pub fn render_inspect(parsed: &ParsedTable) -> String {
    format!(
        "default records:       {}\nint4 records:          {}\nweight scale vectors:  {}\nstatus:                {}",
        parsed.tables.default_len(),
        parsed.tables.int4_len(),
        parsed.tables.channel_scales_len(),
        status_line(&parsed.status)
    )
}

pub fn render_inspect_json(parsed: &ParsedTable) -> Result<String, DriverError> {
    let dump = TableDump {
        status: status_line(&parsed.status),
        tables: &parsed.tables,
    };
    Ok(to_json(&dump)?)
}
