// Calibration store for the calibr importer
pub mod env;
