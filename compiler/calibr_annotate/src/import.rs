// Full calibration import: state check, table parsing, annotation

use std::path::PathBuf;

use calibr_graph::Module;
use calibr_parser::parser::{parse_table_file, ParseStatus};

use crate::annotator::{check_state, AnnotateOptions, AnnotationSummary, Annotator, Precision};
use crate::error::ImportError;

/// Settings the driver passes to [`import_calibration_table`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    pub table_file: PathBuf,
    pub asymmetric: bool,
    pub precision: Precision,
}

impl ImportOptions {
    pub fn new(table_file: impl Into<PathBuf>) -> Self {
        Self {
            table_file: table_file.into(),
            asymmetric: false,
            precision: Precision::default(),
        }
    }

    pub fn asymmetric(mut self, asymmetric: bool) -> Self {
        self.asymmetric = asymmetric;
        self
    }

    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    fn annotate_options(&self) -> AnnotateOptions {
        AnnotateOptions {
            asymmetric: self.asymmetric,
            precision: self.precision,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub summary: AnnotationSummary,
    pub table_status: ParseStatus,
}

/// Reads `options.table_file` and calibrates `module` with it.
///
/// The module's state is checked before the table is opened. Any error
/// leaves the module exactly as it was.
pub fn import_calibration_table(
    module: &mut Module,
    options: &ImportOptions,
) -> Result<ImportReport, ImportError> {
    check_state(module)?;
    log::info!(
        "import calibration table {} (asymmetric: {})",
        options.table_file.display(),
        options.asymmetric
    );
    let parsed = parse_table_file(&options.table_file)?;
    let summary = Annotator::new(&parsed.tables, options.annotate_options()).annotate(module)?;
    Ok(ImportReport {
        summary,
        table_status: parsed.status,
    })
}
