// Operator-specific range policy

use calibr_env::env::CalibrationRecord;
use calibr_graph::OpKind;

/// Effective float range `(min, max)` of a value produced by an op of `kind`.
///
/// Abs is always symmetric around zero and Sigmoid is pinned to `(0, 1)`.
/// Everything else follows the global mode: symmetric mode keeps the
/// threshold and only uses `min` to pick between `-threshold` and `0`,
/// asymmetric mode takes the recorded min and max verbatim.
///
/// # Examples
///
/// ```
/// use calibr_annotate::range::resolve_range;
/// use calibr_env::env::CalibrationRecord;
/// use calibr_graph::OpKind;
///
/// let record = CalibrationRecord::new(4.0, 0.5, 3.0);
/// assert_eq!(resolve_range(&OpKind::Conv, &record, false), (0.0, 4.0));
/// assert_eq!(resolve_range(&OpKind::Conv, &record, true), (0.5, 3.0));
/// assert_eq!(resolve_range(&OpKind::Abs, &record, true), (-4.0, 4.0));
/// ```
pub fn resolve_range(kind: &OpKind, record: &CalibrationRecord, asymmetric: bool) -> (f64, f64) {
    match kind {
        OpKind::Abs => (-record.threshold, record.threshold),
        OpKind::Sigmoid => (0.0, 1.0),
        _ if !asymmetric => {
            let min = if record.min < 0.0 {
                -record.threshold
            } else {
                0.0
            };
            (min, record.threshold)
        }
        _ => (record.min, record.max),
    }
}
