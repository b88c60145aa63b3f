//! Calibration table reader.
//!
//! See [`parser::parse_table_file`] for the entry point and
//! [`parser::TableMode`] for how `#int4_th` / `#weight_scale` sections work.

pub mod parser;
