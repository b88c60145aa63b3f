// Scale and zero-point derivation shared by value types and boundary attributes

use crate::types::QuantParams;

/// Target integer grid `[qmin, qmax]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantRange {
    pub qmin: i64,
    pub qmax: i64,
}

impl QuantRange {
    pub const INT8: QuantRange = QuantRange {
        qmin: -128,
        qmax: 127,
    };
    pub const INT4: QuantRange = QuantRange { qmin: -8, qmax: 7 };
    pub const INT4_NARROW: QuantRange = QuantRange { qmin: -7, qmax: 7 };

    /// Picks the signed grid for a bit width.
    ///
    /// 8-bit always uses the full `[-128, 127]` grid. 4-bit uses the full
    /// `[-8, 7]` grid in asymmetric mode and the narrow `[-7, 7]` grid in
    /// symmetric mode. Other widths get the full signed grid.
    pub fn for_bits(bits: u32, asymmetric: bool) -> Self {
        match (bits, asymmetric) {
            (8, _) => Self::INT8,
            (4, true) => Self::INT4,
            (4, false) => Self::INT4_NARROW,
            (bits, _) => {
                let half = 1i64 << (bits.clamp(2, 32) - 1);
                QuantRange {
                    qmin: -half,
                    qmax: half - 1,
                }
            }
        }
    }

    pub fn span(&self) -> i64 {
        self.qmax - self.qmin
    }
}

/// Maps the float range `[min, max]` onto `range`.
///
/// `scale = (max - min) / (qmax - qmin)` and
/// `zero_point = qmin + round(-min / scale)`, clamped into the grid. A range
/// centered on zero always gets `zero_point = 0`; an empty or inverted range
/// gets `scale = 1, zero_point = 0`.
///
/// # Examples
///
/// ```
/// use calibr_type::{derive_params, QuantRange};
///
/// let p = derive_params(-1.0, 1.0, QuantRange::INT8);
/// assert_eq!(p.zero_point, 0);
/// assert!((p.scale - 2.0 / 255.0).abs() < 1e-12);
/// ```
pub fn derive_params(min: f64, max: f64, range: QuantRange) -> QuantParams {
    let QuantRange { qmin, qmax } = range;
    if max <= min || max.is_nan() || min.is_nan() {
        return QuantParams {
            scale: 1.0,
            zero_point: 0,
            qmin,
            qmax,
        };
    }
    let span = range.span() as f64;
    let scale = (max - min) / span;
    let zero_point = if min == -max {
        0
    } else {
        // -min / scale, without the extra rounding step of dividing by scale
        let offset = (-min * span / (max - min)).round() as i64;
        (qmin + offset).clamp(qmin, qmax)
    };
    QuantParams {
        scale,
        zero_point,
        qmin,
        qmax,
    }
}
