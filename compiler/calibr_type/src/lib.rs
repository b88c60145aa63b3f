//! Quantized type system for the calibr importer.
//!
//! Defines the element types carried by compute-graph values and the affine
//! scale / zero-point derivation shared by value types and the int4/int8
//! boundary attributes.

pub mod quant;
pub mod types;

pub use quant::*;
pub use types::*;
