//! Calibration import for compute graphs.
//!
//! Resolves the float range of every graph value from a parsed calibration
//! table, replaces its element type with a calibrated quantized type, and
//! attaches per-channel weight scales and int4/int8 boundary attributes.

pub mod annotator;
pub mod error;
pub mod import;
pub mod range;

pub use annotator::{
    check_state, AnnotateOptions, AnnotationSummary, Annotator, Plan, Precision, IN_INT4_SCALE,
    IN_INT4_ZP, OUT_INT8_SCALE, OUT_INT8_ZP, SCALE,
};
pub use error::{AnnotateError, ImportError};
pub use import::{import_calibration_table, ImportOptions, ImportReport};
pub use range::resolve_range;
