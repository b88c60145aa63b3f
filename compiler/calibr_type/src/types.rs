// Element types carried by graph values before and after calibration

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::quant::{derive_params, QuantRange};

/// Storage kind of a calibrated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Int8,
    Int4,
    BF16,
    F32,
}

impl ElementKind {
    /// Bit width of integer kinds, `None` for float pass-through kinds.
    pub fn bits(self) -> Option<u32> {
        match self {
            ElementKind::Int8 => Some(8),
            ElementKind::Int4 => Some(4),
            ElementKind::BF16 | ElementKind::F32 => None,
        }
    }

    pub fn is_integer(self) -> bool {
        self.bits().is_some()
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ElementKind::Int8 => "int8",
            ElementKind::Int4 => "int4",
            ElementKind::BF16 => "bf16",
            ElementKind::F32 => "f32",
        };
        f.write_str(s)
    }
}

/// Affine quantization parameters for an integer element kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
    pub scale: f64,
    pub zero_point: i64,
    pub qmin: i64,
    pub qmax: i64,
}

/// A calibrated element type: the float range observed for a value plus, for
/// integer kinds, the parameters that map that range onto the integer grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedType {
    pub element: ElementKind,
    pub min: f64,
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<QuantParams>,
}

impl QuantizedType {
    /// Builds the calibrated type for `element` over `[min, max]`.
    ///
    /// Integer kinds get their parameters from [`QuantRange::for_bits`]; bf16
    /// and f32 only record the range.
    ///
    /// # Examples
    ///
    /// ```
    /// use calibr_type::{ElementKind, QuantizedType};
    ///
    /// let ty = QuantizedType::new(ElementKind::Int8, -1.0, 1.0, false);
    /// let params = ty.params.unwrap();
    /// assert_eq!(params.zero_point, 0);
    /// assert!((params.scale - 2.0 / 255.0).abs() < 1e-12);
    /// ```
    pub fn new(element: ElementKind, min: f64, max: f64, asymmetric: bool) -> Self {
        let params = element
            .bits()
            .map(|bits| derive_params(min, max, QuantRange::for_bits(bits, asymmetric)));
        Self {
            element,
            min,
            max,
            params,
        }
    }
}

impl fmt::Display for QuantizedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.params {
            Some(p) => write!(
                f,
                "!quant.{}<{}:{}, [{}, {}]>",
                self.element, p.scale, p.zero_point, self.min, self.max
            ),
            None => write!(f, "!calibrated.{}<{}:{}>", self.element, self.min, self.max),
        }
    }
}

/// Element type of a tensor value in the compute graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Element {
    F32,
    F16,
    BF16,
    I8,
    I16,
    I32,
    I64,
    Index,
    Quant(QuantizedType),
}

impl Element {
    /// Checks whether the element is integer or index typed.
    ///
    /// Already-quantized elements count as integer: they are discrete and must
    /// not be calibrated a second time.
    pub fn is_int_or_index(&self) -> bool {
        matches!(
            self,
            Element::I8 | Element::I16 | Element::I32 | Element::I64 | Element::Index
        ) || matches!(self, Element::Quant(q) if q.element.is_integer())
    }

    pub fn as_quantized(&self) -> Option<&QuantizedType> {
        match self {
            Element::Quant(q) => Some(q),
            _ => None,
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::F32 => f.write_str("f32"),
            Element::F16 => f.write_str("f16"),
            Element::BF16 => f.write_str("bf16"),
            Element::I8 => f.write_str("i8"),
            Element::I16 => f.write_str("i16"),
            Element::I32 => f.write_str("i32"),
            Element::I64 => f.write_str("i64"),
            Element::Index => f.write_str("index"),
            Element::Quant(q) => write!(f, "{q}"),
        }
    }
}
