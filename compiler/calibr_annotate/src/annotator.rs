// Graph annotator: assigns calibrated types and boundary attributes
//
// Work is split into a read-only planning walk and an apply step. Every
// failure surfaces while planning, so an error never leaves the module half
// calibrated.

use calibr_env::env::{weight_key, CalibrationTables, RecordSource};
use calibr_graph::{Attribute, Function, Module, ModuleState, OpKind, Operation, ValueType};
use calibr_type::{derive_params, Element, ElementKind, QuantParams, QuantRange, QuantizedType};

use crate::error::AnnotateError;
use crate::range::resolve_range;

pub const OUT_INT8_SCALE: &str = "out_int8_scale";
pub const OUT_INT8_ZP: &str = "out_int8_zp";
pub const IN_INT4_SCALE: &str = "in_int4_scale";
pub const IN_INT4_ZP: &str = "in_int4_zp";
pub const SCALE: &str = "scale";

/// Storage used for values calibrated from the default table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    #[default]
    Int8,
    BF16,
    F32,
}

impl Precision {
    pub fn element_kind(self) -> ElementKind {
        match self {
            Precision::Int8 => ElementKind::Int8,
            Precision::BF16 => ElementKind::BF16,
            Precision::F32 => ElementKind::F32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnnotateOptions {
    pub asymmetric: bool,
    pub precision: Precision,
}

/// Counts of what an annotation run changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnnotationSummary {
    pub typed_values: usize,
    pub weight_scales: usize,
    pub output_boundaries: usize,
    pub input_boundaries: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Mutation {
    SetType {
        func: usize,
        op: usize,
        result: usize,
        ty: QuantizedType,
    },
    SetAttr {
        func: usize,
        op: usize,
        key: &'static str,
        value: Attribute,
    },
}

/// The mutations an annotation run will make, computed without touching the module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    mutations: Vec<Mutation>,
    summary: AnnotationSummary,
}

impl Plan {
    pub fn summary(&self) -> AnnotationSummary {
        self.summary
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Writes the planned types and attributes into `module`.
    ///
    /// Must be applied to the module the plan was computed from.
    pub fn apply(self, module: &mut Module) {
        for mutation in self.mutations {
            match mutation {
                Mutation::SetType {
                    func,
                    op,
                    result,
                    ty,
                } => {
                    let value = &mut module.functions[func].ops[op].results[result];
                    if let ValueType::Tensor(tensor) = &mut value.ty {
                        tensor.element = Element::Quant(ty);
                    }
                }
                Mutation::SetAttr {
                    func,
                    op,
                    key,
                    value,
                } => module.functions[func].ops[op].set_attr(key, value),
            }
        }
    }
}

pub struct Annotator<'t> {
    tables: &'t CalibrationTables,
    options: AnnotateOptions,
}

impl<'t> Annotator<'t> {
    pub fn new(tables: &'t CalibrationTables, options: AnnotateOptions) -> Self {
        Annotator { tables, options }
    }

    /// Calibrates `module` in place and moves it to [`ModuleState::TopCalibrated`].
    ///
    /// The module must be in [`ModuleState::TopF32`]. On error nothing is
    /// modified.
    pub fn annotate(&self, module: &mut Module) -> Result<AnnotationSummary, AnnotateError> {
        check_state(module)?;
        module.validate()?;
        let plan = self.plan(module)?;
        let summary = plan.summary();
        plan.apply(module);
        module.update_module_types()?;
        module.set_state(ModuleState::TopCalibrated);
        log::info!(
            "calibrated {} values, {} weight scale vectors, {} int8 output boundaries, {} int4 input boundaries",
            summary.typed_values,
            summary.weight_scales,
            summary.output_boundaries,
            summary.input_boundaries
        );
        Ok(summary)
    }

    /// Walks every function and op in program order and records what
    /// [`Annotator::annotate`] would change.
    pub fn plan(&self, module: &Module) -> Result<Plan, AnnotateError> {
        let mut plan = Plan::default();
        for (fi, func) in module.functions.iter().enumerate() {
            for (oi, op) in func.ops.iter().enumerate() {
                match &op.kind {
                    OpKind::Weight => self.plan_weight(func, fi, oi, op, &mut plan)?,
                    kind if kind.is_calibrated() => {
                        self.plan_values(fi, oi, op, &mut plan)?;
                        if kind.is_conv_or_matmul() {
                            self.plan_boundaries(func, fi, oi, op, &mut plan);
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(plan)
    }

    fn plan_values(
        &self,
        fi: usize,
        oi: usize,
        op: &Operation,
        plan: &mut Plan,
    ) -> Result<(), AnnotateError> {
        let int4_fallback = op.kind.is_conv_or_matmul();
        for (ri, value) in op.results.iter().enumerate() {
            let tensor = match &value.ty {
                ValueType::None => continue,
                ValueType::Tensor(t) if t.element.is_int_or_index() => continue,
                ValueType::Tensor(t) => t,
            };
            let (source, record) = self
                .tables
                .lookup(&value.name, int4_fallback)
                .ok_or_else(|| AnnotateError::MissingCalibration {
                    tensor: value.name.clone(),
                    op: op.kind.to_string(),
                })?;
            let (min, max) = resolve_range(&op.kind, record, self.options.asymmetric);
            let element = match source {
                RecordSource::Int4 => ElementKind::Int4,
                RecordSource::Default => self.options.precision.element_kind(),
            };
            let ty = QuantizedType::new(element, min, max, self.options.asymmetric);
            log::debug!("{}: {} -> {}", value.name, tensor.element, ty);
            plan.mutations.push(Mutation::SetType {
                func: fi,
                op: oi,
                result: ri,
                ty,
            });
            plan.summary.typed_values += 1;
        }
        Ok(())
    }

    fn plan_weight(
        &self,
        func: &Function,
        fi: usize,
        oi: usize,
        op: &Operation,
        plan: &mut Plan,
    ) -> Result<(), AnnotateError> {
        let Some(name) = op.name() else {
            return Ok(());
        };
        let mut users = func.users_of(name);
        let Some(consumer) = users.next().and_then(Operation::name) else {
            log::debug!("weight {name} has no named user, no channel scales attached");
            return Ok(());
        };
        if users.next().is_some() {
            log::warn!("weight {name} has several users, taking channel scales of `{consumer}`");
        }
        let Some(scales) = self.tables.weight_scales(consumer) else {
            return Ok(());
        };

        let channels = op.results[0]
            .ty
            .as_tensor()
            .and_then(|t| t.shape.first().copied())
            .filter(|dim| *dim >= 0);
        if let Some(channels) = channels {
            if channels as usize != scales.scales.len() {
                return Err(AnnotateError::ChannelCountMismatch {
                    key: weight_key(consumer),
                    expected: channels as usize,
                    found: scales.scales.len(),
                });
            }
        }
        log::debug!("{name}: {} channel scales from {}", scales.scales.len(), scales.name);
        plan.mutations.push(Mutation::SetAttr {
            func: fi,
            op: oi,
            key: SCALE,
            value: Attribute::FloatArray(scales.scales.clone()),
        });
        plan.summary.weight_scales += 1;
        Ok(())
    }

    fn plan_boundaries(
        &self,
        func: &Function,
        fi: usize,
        oi: usize,
        op: &Operation,
        plan: &mut Plan,
    ) {
        let asymmetric = self.options.asymmetric;
        let Some(name) = op.name() else {
            return;
        };

        // int8 leaves this op towards a non conv/matmul consumer
        let feeds_other = func.users_of(name).any(|u| !u.kind.is_conv_or_matmul());
        if let Some(record) = self.tables.get_default(name).filter(|_| feeds_other) {
            let (min, max) = resolve_range(&op.kind, record, asymmetric);
            let params = derive_params(min, max, QuantRange::for_bits(8, asymmetric));
            log::debug!("{name}: {OUT_INT8_SCALE}={} {OUT_INT8_ZP}={}", params.scale, params.zero_point);
            push_boundary(plan, fi, oi, OUT_INT8_SCALE, OUT_INT8_ZP, params);
            plan.summary.output_boundaries += 1;
        }

        // int4 enters this op from a non conv/matmul, non input producer
        let Some(operand) = op.operands.first() else {
            return;
        };
        let Some(producer) = func.producer_of(operand) else {
            return;
        };
        if producer.kind == OpKind::Input || producer.kind.is_conv_or_matmul() {
            return;
        }
        if let Some(record) = self.tables.get_int4(operand) {
            let (min, max) = resolve_range(&producer.kind, record, asymmetric);
            let params = derive_params(min, max, QuantRange::for_bits(4, asymmetric));
            log::debug!("{name}: {IN_INT4_SCALE}={} {IN_INT4_ZP}={}", params.scale, params.zero_point);
            push_boundary(plan, fi, oi, IN_INT4_SCALE, IN_INT4_ZP, params);
            plan.summary.input_boundaries += 1;
        }
    }
}

fn push_boundary(
    plan: &mut Plan,
    func: usize,
    op: usize,
    scale_key: &'static str,
    zp_key: &'static str,
    params: QuantParams,
) {
    plan.mutations.push(Mutation::SetAttr {
        func,
        op,
        key: scale_key,
        value: Attribute::Float(params.scale),
    });
    plan.mutations.push(Mutation::SetAttr {
        func,
        op,
        key: zp_key,
        value: Attribute::Int(params.zero_point),
    });
}

/// Fails unless `module` is still an uncalibrated float graph.
pub fn check_state(module: &Module) -> Result<(), AnnotateError> {
    if module.is_state(ModuleState::TopF32) {
        Ok(())
    } else {
        Err(AnnotateError::StateContract {
            expected: ModuleState::TopF32,
            found: module.state,
        })
    }
}
