// Calibration table parser
// Reads the table line by line into a CalibrationTables store

mod diagnostics;
pub mod grammar;
mod state;

pub use diagnostics::TableError;
pub use state::{TableMode, INT4_MARKER, WEIGHT_SCALE_MARKER};

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use calibr_env::env::{CalibrationRecord, CalibrationTables};

use grammar::{data_line, is_comment, record_fields, weight_line};

/// How parsing ended.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ParseStatus {
    /// Every line was read.
    #[default]
    Complete,
    /// A data or weight line could not be extracted. Reading stopped there;
    /// records before it are kept and nothing after it was looked at.
    Truncated { line: usize, content: String },
}

impl ParseStatus {
    pub fn is_truncated(&self) -> bool {
        matches!(self, ParseStatus::Truncated { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTable {
    pub tables: CalibrationTables,
    pub status: ParseStatus,
}

/// Whether the caller should keep feeding lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop,
}

/// Incremental table parser; feed it lines in file order.
#[derive(Debug, Default)]
pub struct TableParser {
    mode: TableMode,
    line_no: usize,
    tables: CalibrationTables,
    status: ParseStatus,
}

impl TableParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> TableMode {
        self.mode
    }

    /// Consumes one line (without its `\n`).
    ///
    /// Returns [`Step::Stop`] once the table has been truncated; later lines
    /// must not be fed.
    pub fn feed_line(&mut self, raw: &str) -> Result<Step, TableError> {
        if self.status.is_truncated() {
            return Ok(Step::Stop);
        }
        self.line_no += 1;
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        if is_comment(line) {
            let next = self.mode.on_comment(line);
            if next != self.mode {
                log::debug!(
                    "line {}: table section {} -> {}",
                    self.line_no,
                    self.mode,
                    next
                );
            }
            self.mode = next;
            return Ok(Step::Continue);
        }

        match self.mode {
            TableMode::WeightScale => match weight_line(line) {
                Ok((_, weight)) => {
                    self.tables
                        .insert_channel_scales(weight.name, weight.scales);
                }
                Err(_) => return Ok(self.truncate(line)),
            },
            TableMode::Int4 => match record_fields(line) {
                Ok((_, f)) => {
                    self.tables
                        .insert_int4(f.name, CalibrationRecord::new(f.threshold, f.min, f.max));
                }
                Err(_) => return Ok(self.truncate(line)),
            },
            TableMode::Default => {
                if data_line(line).is_err() {
                    return Err(TableError::Format {
                        line: self.line_no,
                        content: line.to_string(),
                    });
                }
                match record_fields(line) {
                    Ok((_, f)) => {
                        self.tables.insert_default(
                            f.name,
                            CalibrationRecord::new(f.threshold, f.min, f.max),
                        );
                    }
                    Err(_) => return Ok(self.truncate(line)),
                }
            }
        }
        Ok(Step::Continue)
    }

    fn truncate(&mut self, line: &str) -> Step {
        log::warn!(
            "calibration table truncated at line {} ({} section): `{}`; later lines are ignored",
            self.line_no,
            self.mode,
            line
        );
        self.status = ParseStatus::Truncated {
            line: self.line_no,
            content: line.to_string(),
        };
        Step::Stop
    }

    pub fn finish(self) -> ParsedTable {
        log::info!(
            "calibration table: {} default, {} int4, {} channel-scale entries",
            self.tables.default_len(),
            self.tables.int4_len(),
            self.tables.channel_scales_len()
        );
        ParsedTable {
            tables: self.tables,
            status: self.status,
        }
    }
}

/// Parses a calibration table held in memory.
///
/// # Examples
///
/// ```
/// use calibr_parser::parser::parse_table_str;
///
/// let parsed = parse_table_str("t1 1.0 -0.5 0.8\n#weight_scale\nconv1_weight 3 0.1 0.2 0.3\n").unwrap();
/// assert_eq!(parsed.tables.get_default("t1").unwrap().min, -0.5);
/// assert_eq!(parsed.tables.channel_scales("conv1_weight").unwrap().scales, vec![0.1, 0.2, 0.3]);
/// ```
pub fn parse_table_str(text: &str) -> Result<ParsedTable, TableError> {
    let mut parser = TableParser::new();
    for line in text.lines() {
        if parser.feed_line(line)? == Step::Stop {
            break;
        }
    }
    Ok(parser.finish())
}

/// Parses the calibration table at `path`.
///
/// The file handle lives only for the duration of the call; read errors are
/// reported as [`TableError::Io`].
pub fn parse_table_file(path: impl AsRef<Path>) -> Result<ParsedTable, TableError> {
    let path = path.as_ref();
    let io_err = |source: std::io::Error| TableError::Io {
        path: path.to_path_buf(),
        source,
    };
    log::debug!("reading calibration table {}", path.display());
    let reader = BufReader::new(File::open(path).map_err(io_err)?);

    let mut parser = TableParser::new();
    for line in reader.lines() {
        let line = line.map_err(io_err)?;
        if parser.feed_line(&line)? == Step::Stop {
            break;
        }
    }
    Ok(parser.finish())
}
