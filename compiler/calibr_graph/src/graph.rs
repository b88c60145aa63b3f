// Compute-graph IR consumed and annotated by the calibration importer

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use calibr_type::Element;
use serde::{Deserialize, Serialize};

use crate::GraphError;

/// Lifecycle marker carried by a [`Module`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleState {
    /// Float graph straight out of the frontend.
    TopF32,
    /// Every eligible value carries a calibrated type.
    TopCalibrated,
    /// Lowered to target ops; calibration no longer applies.
    TpuLowered,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleState::TopF32 => "TOP_F32",
            ModuleState::TopCalibrated => "TOP_CALIBRATED",
            ModuleState::TpuLowered => "TPU_LOWERED",
        };
        f.write_str(s)
    }
}

/// Closed set of operator tags the importer dispatches on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Input,
    Weight,
    Abs,
    Sigmoid,
    Conv,
    MatMul,
    /// Any other operator that participates in inference (Relu, Add, ...).
    Inferable(String),
    /// Plumbing that never carries a calibrated range (None, Return, ...).
    Opaque(String),
}

impl OpKind {
    /// Convolution and matmul, the compute-heavy ops that may run in int4.
    pub fn is_conv_or_matmul(&self) -> bool {
        matches!(self, OpKind::Conv | OpKind::MatMul)
    }

    /// Whether the op's results take part in calibration.
    pub fn is_calibrated(&self) -> bool {
        !matches!(self, OpKind::Weight | OpKind::Opaque(_))
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Input => f.write_str("top.Input"),
            OpKind::Weight => f.write_str("top.Weight"),
            OpKind::Abs => f.write_str("top.Abs"),
            OpKind::Sigmoid => f.write_str("top.Sigmoid"),
            OpKind::Conv => f.write_str("top.Conv"),
            OpKind::MatMul => f.write_str("top.MatMul"),
            OpKind::Inferable(name) | OpKind::Opaque(name) => write!(f, "top.{name}"),
        }
    }
}

/// Side-channel attribute attached to an operation.
///
/// Untagged, so variant order decides how JSON loads: `[0, 0]` is an
/// `IntArray`, `[0.5]` a `FloatArray`, and `[]` an `IntArray`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attribute {
    Bool(bool),
    Int(i64),
    Float(f64),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    Str(String),
}

impl Attribute {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Attribute::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Attribute::Float(v) => Some(*v),
            Attribute::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Attribute::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64_array(&self) -> Option<&[i64]> {
        match self {
            Attribute::IntArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64_array(&self) -> Option<&[f64]> {
        match self {
            Attribute::FloatArray(v) => Some(v),
            Attribute::IntArray(v) if v.is_empty() => Some(&[]),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorType {
    pub shape: Vec<i64>,
    pub element: Element,
}

impl TensorType {
    pub fn new(shape: &[i64], element: Element) -> Self {
        Self {
            shape: shape.to_vec(),
            element,
        }
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("tensor<")?;
        for dim in &self.shape {
            write!(f, "{dim}x")?;
        }
        write!(f, "{}>", self.element)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Placeholder for an absent optional result.
    None,
    Tensor(TensorType),
}

impl ValueType {
    pub fn as_tensor(&self) -> Option<&TensorType> {
        match self {
            ValueType::Tensor(t) => Some(t),
            ValueType::None => None,
        }
    }
}

/// A named SSA value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub name: String,
    pub ty: ValueType,
}

impl Value {
    pub fn tensor(name: impl Into<String>, shape: &[i64], element: Element) -> Self {
        Self {
            name: name.into(),
            ty: ValueType::Tensor(TensorType::new(shape, element)),
        }
    }

    pub fn none(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ValueType::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OpKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operands: Vec<String>,
    pub results: Vec<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, Attribute>,
}

impl Operation {
    pub fn new(kind: OpKind) -> Self {
        Self {
            kind,
            operands: Vec::new(),
            results: Vec::new(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_operand(mut self, name: impl Into<String>) -> Self {
        self.operands.push(name.into());
        self
    }

    pub fn with_result(mut self, value: Value) -> Self {
        self.results.push(value);
        self
    }

    /// The op is named after its first result.
    pub fn name(&self) -> Option<&str> {
        self.results.first().map(|v| v.name.as_str())
    }

    pub fn attr(&self, key: &str) -> Option<&Attribute> {
        self.attrs.get(key)
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: Attribute) {
        self.attrs.insert(key.into(), value);
    }

    pub fn uses(&self, value: &str) -> bool {
        self.operands.iter().any(|o| o == value)
    }
}

/// A function body: ops in program order plus the values it returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub ops: Vec<Operation>,
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Derived from `outputs`; refreshed by [`Function::refresh_output_types`].
    #[serde(default)]
    pub output_types: Vec<ValueType>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ops: Vec::new(),
            outputs: Vec::new(),
            output_types: Vec::new(),
        }
    }

    pub fn push(&mut self, op: Operation) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn returns(&mut self, name: impl Into<String>) -> &mut Self {
        self.outputs.push(name.into());
        self
    }

    /// The op that defines `value`, if any.
    pub fn producer_of(&self, value: &str) -> Option<&Operation> {
        self.ops
            .iter()
            .find(|op| op.results.iter().any(|r| r.name == value))
    }

    /// Every op that consumes `value`, in program order.
    pub fn users_of<'f>(&'f self, value: &'f str) -> impl Iterator<Item = &'f Operation> + 'f {
        self.ops.iter().filter(move |op| op.uses(value))
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.ops
            .iter()
            .flat_map(|op| op.results.iter())
            .find(|v| v.name == name)
    }

    /// Recomputes `output_types` from the current types of the returned values.
    pub fn refresh_output_types(&mut self) -> Result<(), GraphError> {
        let mut types = Vec::with_capacity(self.outputs.len());
        for name in &self.outputs {
            let value = self
                .value(name)
                .ok_or_else(|| GraphError::UnknownValue(name.clone()))?;
            types.push(value.ty.clone());
        }
        self.output_types = types;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub state: ModuleState,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ModuleState::TopF32,
            functions: Vec::new(),
        }
    }

    pub fn is_state(&self, state: ModuleState) -> bool {
        self.state == state
    }

    pub fn set_state(&mut self, state: ModuleState) {
        self.state = state;
    }

    /// Refreshes the derived signature metadata of every function.
    pub fn update_module_types(&mut self) -> Result<(), GraphError> {
        for func in &mut self.functions {
            func.refresh_output_types()?;
        }
        Ok(())
    }

    /// Checks that value names are unique module-wide and that every operand
    /// and returned name is defined in its function.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut seen = HashSet::new();
        for func in &self.functions {
            for op in &func.ops {
                for result in &op.results {
                    if !seen.insert(result.name.as_str()) {
                        return Err(GraphError::DuplicateValue(result.name.clone()));
                    }
                }
            }
        }
        for func in &self.functions {
            let mut defined = HashSet::new();
            for op in &func.ops {
                for operand in &op.operands {
                    if !defined.contains(operand.as_str()) {
                        return Err(GraphError::UndefinedOperand {
                            operand: operand.clone(),
                            op: op.name().unwrap_or("<anonymous>").to_string(),
                        });
                    }
                }
                defined.extend(op.results.iter().map(|r| r.name.as_str()));
            }
            if let Some(missing) = func.outputs.iter().find(|o| !defined.contains(o.as_str())) {
                return Err(GraphError::UnknownValue(missing.clone()));
            }
        }
        Ok(())
    }

    /// Finds a value by name in any function.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.functions.iter().find_map(|f| f.value(name))
    }

    /// Finds the op named `name` in any function.
    pub fn op(&self, name: &str) -> Option<&Operation> {
        self.functions
            .iter()
            .flat_map(|f| f.ops.iter())
            .find(|op| op.name() == Some(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Function {
        let mut f = Function::new("main");
        f.push(Operation::new(OpKind::Input).with_result(Value::tensor("in", &[1, 3], Element::F32)))
            .push(
                Operation::new(OpKind::Inferable("Relu".into()))
                    .with_operand("in")
                    .with_result(Value::tensor("relu", &[1, 3], Element::F32)),
            )
            .push(
                Operation::new(OpKind::Abs)
                    .with_operand("relu")
                    .with_result(Value::tensor("abs", &[1, 3], Element::F32)),
            )
            .push(
                Operation::new(OpKind::Sigmoid)
                    .with_operand("relu")
                    .with_result(Value::tensor("sig", &[1, 3], Element::F32)),
            )
            .returns("sig");
        f
    }

    #[test]
    fn attributes_load_with_their_json_shape() {
        let json = r#"{"do_relu": false, "pads": [0, 0], "scale": [0.5, 0.25], "group": 1, "mode": "nearest"}"#;
        let attrs: BTreeMap<String, Attribute> = crate::from_json(json).unwrap();
        assert_eq!(attrs["do_relu"], Attribute::Bool(false));
        assert_eq!(attrs["do_relu"].as_bool(), Some(false));
        assert_eq!(attrs["pads"], Attribute::IntArray(vec![0, 0]));
        assert_eq!(attrs["pads"].as_i64_array(), Some(&[0, 0][..]));
        assert_eq!(attrs["scale"], Attribute::FloatArray(vec![0.5, 0.25]));
        assert_eq!(attrs["group"].as_i64(), Some(1));
        assert_eq!(attrs["mode"], Attribute::Str("nearest".into()));

        let reloaded: BTreeMap<String, Attribute> =
            crate::from_json(&crate::to_json(&attrs).unwrap()).unwrap();
        assert_eq!(reloaded, attrs);
    }

    #[test]
    fn whole_float_scales_stay_float_arrays() {
        let mut op = Operation::new(OpKind::Weight);
        op.set_attr("scale", Attribute::FloatArray(vec![1.0, 2.0]));
        let reloaded: Operation = crate::from_json(&crate::to_json(&op).unwrap()).unwrap();
        assert_eq!(reloaded.attr("scale").and_then(Attribute::as_f64_array), Some(&[1.0, 2.0][..]));

        assert_eq!(Attribute::IntArray(Vec::new()).as_f64_array(), Some(&[][..]));
    }

    #[test]
    fn use_def_queries_follow_program_order() {
        let f = chain();
        assert_eq!(f.producer_of("relu").and_then(Operation::name), Some("relu"));
        let users: Vec<_> = f.users_of("relu").filter_map(Operation::name).collect();
        assert_eq!(users, vec!["abs", "sig"]);
        assert!(f.producer_of("missing").is_none());
    }

    #[test]
    fn validate_rejects_duplicate_names() {
        let mut m = Module::new("net");
        let mut f = chain();
        f.push(Operation::new(OpKind::Input).with_result(Value::tensor("in", &[1], Element::F32)));
        m.functions.push(f);
        assert!(matches!(m.validate(), Err(GraphError::DuplicateValue(n)) if n == "in"));
    }

    #[test]
    fn validate_rejects_use_before_definition() {
        let mut m = Module::new("net");
        let mut f = Function::new("main");
        f.push(
            Operation::new(OpKind::Abs)
                .with_operand("later")
                .with_result(Value::tensor("abs", &[1], Element::F32)),
        );
        m.functions.push(f);
        assert!(matches!(
            m.validate(),
            Err(GraphError::UndefinedOperand { operand, .. }) if operand == "later"
        ));
    }

    #[test]
    fn refresh_output_types_reads_current_value_types() {
        let mut m = Module::new("net");
        m.functions.push(chain());
        m.update_module_types().unwrap();
        assert_eq!(
            m.functions[0].output_types,
            vec![ValueType::Tensor(TensorType::new(&[1, 3], Element::F32))]
        );
    }

    #[test]
    fn conv_and_matmul_are_the_only_compute_heavy_kinds() {
        assert!(OpKind::Conv.is_conv_or_matmul());
        assert!(OpKind::MatMul.is_conv_or_matmul());
        assert!(!OpKind::Inferable("Conv".into()).is_conv_or_matmul());
        assert!(!OpKind::Weight.is_calibrated());
        assert!(OpKind::Input.is_calibrated());
    }
}
