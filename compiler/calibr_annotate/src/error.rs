use calibr_graph::{GraphError, ModuleState};
use calibr_parser::parser::TableError;
use thiserror::Error;

/// Fatal problems found while annotating a module. The module is left
/// untouched when any of these is returned.
#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("module is in state {found}, calibration import requires {expected}")]
    StateContract {
        expected: ModuleState,
        found: ModuleState,
    },

    #[error("no calibration record for `{tensor}` (result of {op})")]
    MissingCalibration { tensor: String, op: String },

    #[error("`{key}` lists {found} channel scales but the weight has {expected} output channels")]
    ChannelCountMismatch {
        key: String,
        expected: usize,
        found: usize,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Any failure of the full import: reading the table or annotating the module.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Annotate(#[from] AnnotateError),
}
