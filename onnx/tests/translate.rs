use lightnet_onnx::pb;
use lightnet_onnx::pb::attribute_proto::AttributeType;
use lightnet_onnx::pb::tensor_proto::DataType;

fn setup_test_logger() {
    let _ = env_logger::Builder::from_env("LN_LOG").try_init();
}

fn float_init(name: &str, dims: &[i64], data: &[f32]) -> pb::TensorProto {
    pb::TensorProto {
        name: name.to_string(),
        dims: dims.to_vec(),
        data_type: DataType::Float as i32,
        float_data: data.to_vec(),
        ..pb::TensorProto::default()
    }
}

fn int64_init(name: &str, dims: &[i64], data: &[i64]) -> pb::TensorProto {
    pb::TensorProto {
        name: name.to_string(),
        dims: dims.to_vec(),
        data_type: DataType::Int64 as i32,
        int64_data: data.to_vec(),
        ..pb::TensorProto::default()
    }
}

fn value_info(name: &str, dt: DataType, dims: &[i64]) -> pb::ValueInfoProto {
    let shape = pb::TensorShapeProto {
        dim: dims
            .iter()
            .map(|&d| pb::tensor_shape_proto::Dimension {
                denotation: String::new(),
                value: Some(pb::tensor_shape_proto::dimension::Value::DimValue(d)),
            })
            .collect(),
    };
    pb::ValueInfoProto {
        name: name.to_string(),
        r#type: Some(pb::TypeProto {
            denotation: String::new(),
            value: Some(pb::type_proto::Value::TensorType(pb::type_proto::Tensor {
                elem_type: dt as i32,
                shape: Some(shape),
            })),
        }),
    }
}

fn node(op_type: &str, inputs: &[&str], outputs: &[&str]) -> pb::NodeProto {
    pb::NodeProto {
        op_type: op_type.to_string(),
        input: inputs.iter().map(|s| s.to_string()).collect(),
        output: outputs.iter().map(|s| s.to_string()).collect(),
        ..pb::NodeProto::default()
    }
}

fn attr_ints(name: &str, vals: &[i64]) -> pb::AttributeProto {
    pb::AttributeProto {
        name: name.to_string(),
        r#type: AttributeType::Ints as i32,
        ints: vals.to_vec(),
        ..pb::AttributeProto::default()
    }
}

fn graph(
    initializer: Vec<pb::TensorProto>,
    input: Vec<pb::ValueInfoProto>,
    node: Vec<pb::NodeProto>,
) -> pb::GraphProto {
    pb::GraphProto { initializer, input, node, ..pb::GraphProto::default() }
}

fn model(graph: pb::GraphProto) -> pb::ModelProto {
    pb::ModelProto { graph: Some(graph), ..pb::ModelProto::default() }
}

#[test]
fn initializer_becomes_one_create_op_with_its_payload() {
    setup_test_logger();
    let proto = model(graph(
        vec![float_init("W", &[2, 2], &[1.0, 2.0, 3.0, 4.0])],
        vec![],
        vec![],
    ));
    let translated = lightnet_onnx::onnx().model_for_proto(&proto).unwrap();
    let value = serde_json::from_str::<serde_json::Value>(&translated.to_json().unwrap()).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "ops": [{
                "name": "create0",
                "optype": "create",
                "tensors_in": [],
                "tensors_out": [{ "arg_name": "dst", "name": "W" }],
                "params": [
                    { "arg_name": "dtype", "value": "TL_FLOAT" },
                    { "arg_name": "dims", "value": [2, 2] },
                    { "arg_name": "data", "value": [1.0, 2.0, 3.0, 4.0] },
                    { "arg_name": "ran", "value": [0, 0] },
                    { "arg_name": "from_file", "value": false },
                ],
            }]
        })
    );
}

#[test]
fn add_preserves_input_order_and_tags_the_elew() {
    let proto = model(graph(
        vec![float_init("W", &[2], &[1.0, 1.0])],
        vec![value_info("X", DataType::Float, &[2])],
        vec![node("Add", &["X", "W"], &["Y"])],
    ));
    let translated = lightnet_onnx::onnx().model_for_proto(&proto).unwrap();
    assert_eq!(translated.ops.len(), 2);
    let add = &translated.ops[1];
    assert_eq!(add.name, "elew0");
    let value = serde_json::to_value(add).unwrap();
    assert_eq!(
        value["tensors_in"],
        serde_json::json!([
            { "arg_name": "src1", "name": "X" },
            { "arg_name": "src2", "name": "W" },
        ])
    );
    assert_eq!(value["params"][0]["value"], "TL_ADD");
}

#[test]
fn conv_without_bias_still_emits_three_inputs() {
    let mut conv = node("Conv", &["X", "W"], &["Y"]);
    conv.attribute = vec![
        attr_ints("kernel_shape", &[3, 3]),
        attr_ints("strides", &[1, 1]),
        attr_ints("pads", &[1, 1, 1, 1]),
    ];
    let proto = model(graph(
        vec![float_init("W", &[4, 3, 3, 3], &[0.5; 108])],
        vec![value_info("X", DataType::Float, &[1, 3, 8, 8])],
        vec![conv],
    ));
    let translated = lightnet_onnx::onnx().model_for_proto(&proto).unwrap();
    // weight create, synthesized bias create, then the conv
    assert_eq!(translated.ops.len(), 3);
    let bias = &translated.ops[1];
    assert_eq!(bias.optype, "create");
    let bias_value = serde_json::to_value(bias).unwrap();
    assert_eq!(bias_value["tensors_out"][0]["name"], "conv2d0_bias_ln_");
    assert_eq!(bias_value["params"][2]["value"], serde_json::json!([0.0, 0.0, 0.0, 0.0]));
    let conv = serde_json::to_value(&translated.ops[2]).unwrap();
    assert_eq!(conv["tensors_in"].as_array().unwrap().len(), 3);
    assert_eq!(conv["tensors_in"][2]["name"], "conv2d0_bias_ln_");
}

#[test]
fn resize_with_runtime_scales_is_rejected() {
    let proto = model(graph(
        vec![],
        vec![
            value_info("X", DataType::Float, &[1, 3, 8, 8]),
            value_info("scales", DataType::Float, &[4]),
        ],
        vec![node("Resize", &["X", "scales"], &["Y"])],
    ));
    let err = lightnet_onnx::onnx().model_for_proto(&proto).unwrap_err();
    assert!(err.to_string().contains("scales"), "{err}");
}

#[test]
fn slice_reads_its_literal_range_arguments() {
    let proto = model(graph(
        vec![
            int64_init("starts", &[1], &[2]),
            int64_init("ends", &[1], &[6]),
            int64_init("axes", &[1], &[1]),
            int64_init("steps", &[1], &[1]),
        ],
        vec![value_info("X", DataType::Float, &[1, 8])],
        vec![node("Slice", &["X", "starts", "ends", "axes", "steps"], &["Y"])],
    ));
    let translated = lightnet_onnx::onnx().model_for_proto(&proto).unwrap();
    let slice = serde_json::to_value(translated.ops.last().unwrap()).unwrap();
    assert_eq!(slice["optype"], "slice");
    assert_eq!(
        slice["params"],
        serde_json::json!([
            { "arg_name": "start", "value": 2 },
            { "arg_name": "axis", "value": 1 },
            { "arg_name": "len", "value": 4 },
        ])
    );
}

#[test]
fn unknown_operator_kind_aborts_in_strict_mode() {
    let proto = model(graph(
        vec![],
        vec![value_info("X", DataType::Float, &[2])],
        vec![node("Gemm", &["X"], &["Y"])],
    ));
    let err = lightnet_onnx::onnx().model_for_proto(&proto).unwrap_err();
    assert!(err.to_string().contains("Gemm"), "{err}");
}

#[test]
fn lenient_mode_collects_errors_and_keeps_walking() {
    let proto = model(graph(
        vec![],
        vec![value_info("X", DataType::Float, &[2])],
        vec![
            node("Gemm", &["X"], &["T"]),
            node("Relu", &["X"], &["Y"]),
            node("Foo", &["Y"], &["Z"]),
        ],
    ));
    let result = lightnet_onnx::onnx().with_lenient(true).parse(&proto).unwrap();
    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.errors[0].op_type, "Gemm");
    assert_eq!(result.errors[1].op_type, "Foo");
    assert_eq!(result.model.ops.len(), 1);
    assert_eq!(result.model.ops[0].optype, "relu");
}

#[test]
fn identity_output_reads_through_to_its_source() {
    let proto = model(graph(
        vec![],
        vec![value_info("X", DataType::Float, &[2])],
        vec![node("Identity", &["X"], &["X_alias"]), node("Relu", &["X_alias"], &["Y"])],
    ));
    let translated = lightnet_onnx::onnx().model_for_proto(&proto).unwrap();
    assert_eq!(translated.ops.len(), 1);
    let relu = serde_json::to_value(&translated.ops[0]).unwrap();
    assert_eq!(relu["tensors_in"][0]["name"], "X");
    assert_eq!(relu["tensors_out"][0]["name"], "Y");
}

#[test]
fn consuming_a_half_precision_tensor_is_the_hard_half_of_the_type_policy() {
    setup_test_logger();
    // seeding only warns; the Relu consuming the poisoned dtype fails
    let proto = model(graph(
        vec![],
        vec![value_info("X", DataType::Float16, &[2])],
        vec![node("Relu", &["X"], &["Y"])],
    ));
    let err = lightnet_onnx::onnx().model_for_proto(&proto).unwrap_err();
    assert!(err.to_string().contains("dtype"), "{err}");
}

#[test]
fn unmappable_initializer_seeds_without_a_create_op() {
    setup_test_logger();
    let init = pb::TensorProto {
        name: "W".to_string(),
        dims: vec![2],
        data_type: DataType::Float16 as i32,
        raw_data: vec![0; 4],
        ..pb::TensorProto::default()
    };
    let proto = model(graph(
        vec![init],
        vec![value_info("X", DataType::Float, &[2])],
        vec![node("Add", &["X", "W"], &["Y"])],
    ));
    let result = lightnet_onnx::onnx().with_lenient(true).parse(&proto).unwrap();
    assert_eq!(result.model.ops.len(), 0);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].message.contains("dtype"), "{}", result.errors[0].message);
}

#[test]
fn placeholder_inputs_emit_creates_with_null_dims() {
    let proto = model(graph(
        vec![],
        vec![value_info("X", DataType::Float, &[-1, 3])],
        vec![],
    ));
    let translated =
        lightnet_onnx::onnx().with_placeholder_inputs(true).model_for_proto(&proto).unwrap();
    assert_eq!(translated.ops.len(), 1);
    let create = serde_json::to_value(&translated.ops[0]).unwrap();
    assert_eq!(create["params"][1], serde_json::json!({ "arg_name": "dims", "value": [null, 3] }));
    assert_eq!(create["params"][2]["value"], serde_json::json!([0]));
}

#[test]
fn naming_restarts_from_zero_for_each_translation() {
    let proto = model(graph(
        vec![float_init("W", &[2], &[1.0, 2.0])],
        vec![value_info("X", DataType::Float, &[2])],
        vec![node("Add", &["X", "W"], &["S"]), node("Relu", &["S"], &["Y"])],
    ));
    let onnx = lightnet_onnx::onnx();
    let first = onnx.model_for_proto(&proto).unwrap();
    let second = onnx.model_for_proto(&proto).unwrap();
    assert_eq!(first, second);
    let names: Vec<&str> = first.ops.iter().map(|op| op.name.as_str()).collect();
    assert_eq!(names, vec!["create0", "elew0", "relu0"]);
}

#[test]
fn unnamed_nodes_fall_back_to_their_first_output_name() {
    let proto = model(graph(
        vec![],
        vec![value_info("X", DataType::Float, &[2])],
        vec![node("Foo", &["X"], &["Y"])],
    ));
    let err = lightnet_onnx::onnx().model_for_proto(&proto).unwrap_err();
    assert!(err.to_string().contains("'Y'"), "{err}");
}

mod naming_idempotence {
    use super::*;
    use proptest::prelude::*;

    // unary activation chains of arbitrary makeup keep deterministic names
    fn chain(kinds: &[usize]) -> pb::ModelProto {
        const KINDS: [&str; 3] = ["Relu", "Sigmoid", "Softmax"];
        let mut nodes = vec![];
        let mut prev = "X".to_string();
        for (ix, &k) in kinds.iter().enumerate() {
            let out = format!("t{ix}");
            nodes.push(node(KINDS[k % KINDS.len()], &[prev.as_str()], &[out.as_str()]));
            prev = out;
        }
        model(graph(vec![], vec![value_info("X", DataType::Float, &[1, 10])], nodes))
    }

    proptest! {
        #[test]
        fn two_fresh_translations_agree(kinds in proptest::collection::vec(0usize..3, 0..20)) {
            let proto = chain(&kinds);
            let onnx = lightnet_onnx::onnx();
            let first = onnx.model_for_proto(&proto).unwrap();
            let second = onnx.model_for_proto(&proto).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
