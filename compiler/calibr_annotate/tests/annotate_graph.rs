use calibr_annotate::{
    AnnotateError, AnnotateOptions, Annotator, IN_INT4_SCALE, IN_INT4_ZP, OUT_INT8_SCALE,
    OUT_INT8_ZP, SCALE,
};
use calibr_env::env::{CalibrationRecord, CalibrationTables};
use calibr_graph::{Function, Module, ModuleState, OpKind, Operation, Value, ValueType};
use calibr_type::{Element, ElementKind, QuantizedType};
use pretty_assertions::assert_eq;

fn init_test_logger() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

/// in -> relu -> conv1 -> conv2 -> add, with one weight per conv.
fn conv_chain() -> Module {
    let mut f = Function::new("main");
    f.push(Operation::new(OpKind::Input).with_result(Value::tensor("in", &[1, 3, 8, 8], Element::F32)))
        .push(
            Operation::new(OpKind::Inferable("Relu".into()))
                .with_operand("in")
                .with_result(Value::tensor("relu", &[1, 3, 8, 8], Element::F32)),
        )
        .push(Operation::new(OpKind::Weight).with_result(Value::tensor(
            "conv1_w",
            &[8, 3, 3, 3],
            Element::F32,
        )))
        .push(
            Operation::new(OpKind::Conv)
                .with_operand("relu")
                .with_operand("conv1_w")
                .with_result(Value::tensor("conv1", &[1, 8, 8, 8], Element::F32)),
        )
        .push(Operation::new(OpKind::Weight).with_result(Value::tensor(
            "conv2_w",
            &[4, 8, 1, 1],
            Element::F32,
        )))
        .push(
            Operation::new(OpKind::Conv)
                .with_operand("conv1")
                .with_operand("conv2_w")
                .with_result(Value::tensor("conv2", &[1, 4, 8, 8], Element::F32)),
        )
        .push(
            Operation::new(OpKind::Inferable("Add".into()))
                .with_operand("conv2")
                .with_operand("conv2")
                .with_result(Value::tensor("add", &[1, 4, 8, 8], Element::F32)),
        )
        .returns("add");
    let mut module = Module::new("resnet_stub");
    module.functions.push(f);
    module
}

fn conv_chain_tables() -> CalibrationTables {
    let mut tables = CalibrationTables::new();
    tables.insert_default("in", CalibrationRecord::new(1.0, -1.0, 1.0));
    tables.insert_default("relu", CalibrationRecord::new(2.0, 0.0, 2.0));
    tables.insert_default("conv2", CalibrationRecord::new(1.0, -1.0, 1.0));
    tables.insert_default("add", CalibrationRecord::new(3.0, -2.0, 3.0));
    tables.insert_int4("relu", CalibrationRecord::new(2.0, 0.0, 2.0));
    tables.insert_int4("conv1", CalibrationRecord::new(4.0, -4.0, 4.0));
    tables.insert_channel_scales("conv1_weight", vec![0.01; 8]);
    tables
}

fn quant_of<'m>(module: &'m Module, name: &str) -> &'m QuantizedType {
    module
        .value(name)
        .and_then(|v| v.ty.as_tensor())
        .and_then(|t| t.element.as_quantized())
        .unwrap_or_else(|| panic!("`{name}` is not quantized"))
}

fn annotate(module: &mut Module, tables: &CalibrationTables) -> Result<(), AnnotateError> {
    Annotator::new(tables, AnnotateOptions::default())
        .annotate(module)
        .map(|_| ())
}

#[test]
fn conv_output_boundary_for_unit_range() {
    init_test_logger();
    let mut module = conv_chain();
    let tables = conv_chain_tables();
    annotate(&mut module, &tables).unwrap();

    let conv2 = module.op("conv2").unwrap();
    let scale = conv2.attr(OUT_INT8_SCALE).and_then(|a| a.as_f64()).unwrap();
    assert!((scale - 2.0 / 255.0).abs() < 1e-12);
    assert_eq!(conv2.attr(OUT_INT8_ZP).and_then(|a| a.as_i64()), Some(0));
}

#[test]
fn conv_feeding_only_conv_gets_no_output_boundary() {
    let mut module = conv_chain();
    let mut tables = conv_chain_tables();
    // even with a default record, conv1 only feeds conv2
    tables.insert_default("conv1", CalibrationRecord::new(4.0, -4.0, 4.0));
    annotate(&mut module, &tables).unwrap();

    let conv1 = module.op("conv1").unwrap();
    assert!(conv1.attr(OUT_INT8_SCALE).is_none());
    assert!(conv1.attr(OUT_INT8_ZP).is_none());
}

#[test]
fn int4_input_boundary_from_non_conv_producer() {
    let mut module = conv_chain();
    annotate(&mut module, &conv_chain_tables()).unwrap();

    // relu int4 record (2, 0, 2) in symmetric mode resolves to (0, 2) on [-7, 7]
    let conv1 = module.op("conv1").unwrap();
    let scale = conv1.attr(IN_INT4_SCALE).and_then(|a| a.as_f64()).unwrap();
    assert!((scale - 2.0 / 14.0).abs() < 1e-12);
    assert_eq!(conv1.attr(IN_INT4_ZP).and_then(|a| a.as_i64()), Some(-7));

    // conv2's operand comes from a conv
    let conv2 = module.op("conv2").unwrap();
    assert!(conv2.attr(IN_INT4_SCALE).is_none());
}

#[test]
fn int4_input_boundary_skipped_after_input_op() {
    let mut f = Function::new("main");
    f.push(Operation::new(OpKind::Input).with_result(Value::tensor("in", &[1, 16], Element::F32)))
        .push(
            Operation::new(OpKind::MatMul)
                .with_operand("in")
                .with_result(Value::tensor("fc", &[1, 4], Element::F32)),
        )
        .returns("fc");
    let mut module = Module::new("mlp");
    module.functions.push(f);
    let mut tables = CalibrationTables::new();
    tables.insert_default("in", CalibrationRecord::new(1.0, -1.0, 1.0));
    tables.insert_int4("in", CalibrationRecord::new(1.0, -1.0, 1.0));
    tables.insert_default("fc", CalibrationRecord::new(1.0, -1.0, 1.0));

    annotate(&mut module, &tables).unwrap();
    let fc = module.op("fc").unwrap();
    assert!(fc.attr(IN_INT4_SCALE).is_none());
    // no users at all, so no output boundary either
    assert!(fc.attr(OUT_INT8_SCALE).is_none());
}

#[test]
fn conv_falls_back_to_int4_table() {
    let mut module = conv_chain();
    annotate(&mut module, &conv_chain_tables()).unwrap();

    let conv1 = quant_of(&module, "conv1");
    assert_eq!(conv1.element, ElementKind::Int4);
    assert_eq!((conv1.min, conv1.max), (-4.0, 4.0));
    assert_eq!(conv1.params.map(|p| (p.qmin, p.qmax, p.zero_point)), Some((-7, 7, 0)));

    // relu is in both tables; the default table wins for non-conv ops
    assert_eq!(quant_of(&module, "relu").element, ElementKind::Int8);
    assert_eq!(quant_of(&module, "add").element, ElementKind::Int8);
}

#[test]
fn weight_scales_are_attached_to_the_weight_op() {
    let mut module = conv_chain();
    annotate(&mut module, &conv_chain_tables()).unwrap();

    let w1 = module.op("conv1_w").unwrap();
    assert_eq!(w1.attr(SCALE).and_then(|a| a.as_f64_array()), Some(&[0.01; 8][..]));
    let w2 = module.op("conv2_w").unwrap();
    assert!(w2.attr(SCALE).is_none());
    // weights keep their float type
    assert_eq!(
        module.value("conv1_w").and_then(|v| v.ty.as_tensor()).map(|t| &t.element),
        Some(&Element::F32)
    );
}

#[test]
fn channel_count_mismatch_is_rejected() {
    let mut module = conv_chain();
    let mut tables = conv_chain_tables();
    tables.insert_channel_scales("conv1_weight", vec![0.1, 0.2, 0.3]);
    let before = module.clone();

    let err = annotate(&mut module, &tables).unwrap_err();
    match err {
        AnnotateError::ChannelCountMismatch {
            key,
            expected,
            found,
        } => {
            assert_eq!(key, "conv1_weight");
            assert_eq!((expected, found), (8, 3));
        }
        other => panic!("expected ChannelCountMismatch, got {other:?}"),
    }
    assert_eq!(module, before);
}

#[test]
fn conv_without_any_record_is_missing_calibration() {
    let mut module = conv_chain();
    let mut tables = CalibrationTables::new();
    tables.insert_default("in", CalibrationRecord::new(1.0, -1.0, 1.0));
    tables.insert_default("relu", CalibrationRecord::new(2.0, 0.0, 2.0));
    let before = module.clone();

    let err = annotate(&mut module, &tables).unwrap_err();
    assert!(
        matches!(&err, AnnotateError::MissingCalibration { tensor, op } if tensor == "conv1" && op == "top.Conv"),
        "unexpected error: {err:?}"
    );
    assert_eq!(module, before, "no mutation may survive a failed run");
    assert!(module.is_state(ModuleState::TopF32));
}

#[test]
fn any_uncalibrated_float_value_is_missing_calibration() {
    let mut module = conv_chain();
    let full = conv_chain_tables();
    let mut tables = CalibrationTables::new();
    for name in ["in", "conv2", "add"] {
        tables.insert_default(name, full.get_default(name).cloned().unwrap());
    }
    tables.insert_int4("conv1", full.get_int4("conv1").cloned().unwrap());

    let err = annotate(&mut module, &tables).unwrap_err();
    assert!(matches!(err, AnnotateError::MissingCalibration { tensor, .. } if tensor == "relu"));
}

#[test]
fn second_run_is_rejected_by_state_check() {
    let mut module = conv_chain();
    let tables = conv_chain_tables();
    annotate(&mut module, &tables).unwrap();
    assert!(module.is_state(ModuleState::TopCalibrated));

    let err = annotate(&mut module, &tables).unwrap_err();
    assert!(matches!(
        err,
        AnnotateError::StateContract {
            expected: ModuleState::TopF32,
            found: ModuleState::TopCalibrated
        }
    ));
}

#[test]
fn abs_and_sigmoid_override_the_table() {
    let mut f = Function::new("main");
    f.push(Operation::new(OpKind::Input).with_result(Value::tensor("in", &[4], Element::F32)))
        .push(
            Operation::new(OpKind::Abs)
                .with_operand("in")
                .with_result(Value::tensor("abs", &[4], Element::F32)),
        )
        .push(
            Operation::new(OpKind::Sigmoid)
                .with_operand("abs")
                .with_result(Value::tensor("sig", &[4], Element::F32)),
        )
        .returns("sig");
    let mut module = Module::new("act");
    module.functions.push(f);
    let mut tables = CalibrationTables::new();
    tables.insert_default("in", CalibrationRecord::new(5.0, -3.0, 5.0));
    tables.insert_default("abs", CalibrationRecord::new(5.0, 0.0, 5.0));
    tables.insert_default("sig", CalibrationRecord::new(0.9, 0.1, 0.9));

    let options = AnnotateOptions {
        asymmetric: true,
        ..AnnotateOptions::default()
    };
    Annotator::new(&tables, options).annotate(&mut module).unwrap();

    let input = quant_of(&module, "in");
    assert_eq!((input.min, input.max), (-3.0, 5.0));
    let abs = quant_of(&module, "abs");
    assert_eq!((abs.min, abs.max), (-5.0, 5.0));
    let sig = quant_of(&module, "sig");
    assert_eq!((sig.min, sig.max), (0.0, 1.0));
}

#[test]
fn finalize_refreshes_function_output_types() {
    let mut module = conv_chain();
    annotate(&mut module, &conv_chain_tables()).unwrap();

    let returned = &module.functions[0].output_types;
    assert_eq!(returned.len(), 1);
    match &returned[0] {
        ValueType::Tensor(t) => {
            assert_eq!(t.shape, vec![1, 4, 8, 8]);
            assert_eq!(t.element.as_quantized().map(|q| q.element), Some(ElementKind::Int8));
        }
        other => panic!("expected a tensor output, got {other:?}"),
    }
}
