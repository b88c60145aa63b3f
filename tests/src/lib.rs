//! Shared fixtures for the end-to-end tests.

use std::fs;
use std::path::PathBuf;
use std::sync::Once;

use tempfile::TempDir;

static INIT: Once = Once::new();

pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .is_test(true)
            .filter_level(log::LevelFilter::Debug)
            .try_init();
    });
}

/// A small detector head as the frontend would emit it:
/// images -> conv0 -> relu0 -> conv1 -> sigmoid, plus a matmul branch.
pub const DETECTOR_JSON: &str = r#"{
  "name": "detector",
  "state": "TOP_F32",
  "functions": [
    {
      "name": "main",
      "ops": [
        { "kind": "input",
          "results": [{ "name": "images", "ty": { "tensor": { "shape": [1, 3, 16, 16], "element": "f32" } } }] },
        { "kind": "weight",
          "results": [{ "name": "conv0_filter", "ty": { "tensor": { "shape": [4, 3, 3, 3], "element": "f32" } } }] },
        { "kind": "conv", "operands": ["images", "conv0_filter"],
          "results": [{ "name": "conv0", "ty": { "tensor": { "shape": [1, 4, 16, 16], "element": "f32" } } }],
          "attrs": { "kernel_shape": [3.0, 3.0] } },
        { "kind": { "inferable": "Relu" }, "operands": ["conv0"],
          "results": [{ "name": "relu0", "ty": { "tensor": { "shape": [1, 4, 16, 16], "element": "f32" } } }] },
        { "kind": "weight",
          "results": [{ "name": "conv1_filter", "ty": { "tensor": { "shape": [2, 4, 1, 1], "element": "f32" } } }] },
        { "kind": "conv", "operands": ["relu0", "conv1_filter"],
          "results": [{ "name": "conv1", "ty": { "tensor": { "shape": [1, 2, 16, 16], "element": "f32" } } }] },
        { "kind": "sigmoid", "operands": ["conv1"],
          "results": [{ "name": "scores", "ty": { "tensor": { "shape": [1, 2, 16, 16], "element": "f32" } } }] },
        { "kind": { "inferable": "Reshape" }, "operands": ["relu0"],
          "results": [{ "name": "flat", "ty": { "tensor": { "shape": [1, 1024], "element": "f32" } } }] },
        { "kind": "mat_mul", "operands": ["flat"],
          "results": [{ "name": "fc", "ty": { "tensor": { "shape": [1, 8], "element": "f32" } } }] },
        { "kind": { "inferable": "ArgMax" }, "operands": ["fc"],
          "results": [{ "name": "label", "ty": { "tensor": { "shape": [1], "element": "i64" } } }] },
        { "kind": { "opaque": "None" },
          "results": [{ "name": "no_bias", "ty": "none" }] }
      ],
      "outputs": ["scores", "label"]
    }
  ]
}"#;

/// Calibration table for [`DETECTOR_JSON`], written the way calibration runs
/// dump it: default records, an int4 section, then per-channel weight scales.
pub const DETECTOR_TABLE: &str = "\
# generated by calibration, 100 samples
images 1.0 -1.0 1.0
conv0 6.0 -5.5 6.0
relu0 6.0 0.0 6.0
conv1 8.0 -8.0 7.5
scores 1.0 0.01 0.99
flat 6.0 0.0 6.0
fc 12.0 -10.0 12.0
#int4_th
relu0 4.0 0.0 4.0
conv1 8.0 -8.0 8.0
#weight_scale
conv0_weight 4 0.01 0.02 0.03 0.04
conv1_weight 2 0.5 0.25
";

/// A scratch directory holding one table file.
pub struct TableDir {
    pub dir: TempDir,
    pub path: PathBuf,
}

pub fn write_table(text: &str) -> TableDir {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
    let path = dir.path().join("model.table");
    fs::write(&path, text).unwrap_or_else(|e| panic!("write {}: {e}", path.display()));
    TableDir { dir, path }
}
