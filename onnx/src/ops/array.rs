use lightnet_ir::internal::*;

use crate::model::{GraphCtx, TensorInfo};
use crate::ops::{self, OnnxOpRegister};
use crate::pb_helpers::{AttrValue, ParsedNode};
use crate::tensor::{self, Literal, LiteralData};

pub fn register(reg: &mut OnnxOpRegister) {
    reg.insert("Concat", concat);
    reg.insert("Constant", constant);
    reg.insert("Identity", identity);
    reg.insert("Reshape", reshape);
    reg.insert("Slice", slice);
    reg.insert("Transpose", transpose);
}

fn concat(node: &ParsedNode, ctx: &mut GraphCtx) -> LnResult<TVec<Op>> {
    node.expect(node.inputs.len() == 2, "exactly 2 input tensors")?;
    let axis = node.get_attr_int("axis")?;
    let src1 = ops::input(node, ctx, 0)?.name.clone();
    let src2 = ops::input(node, ctx, 1)?.name.clone();
    let dtype = ops::input(node, ctx, 0)?.dtype;
    ops::register_output(node, ctx, 0, dtype)?;
    Ok(tvec![Op::new(
        ctx.namer.fresh("concat"),
        "concat".to_string(),
        vec![TensorArg::new("src1", src1), TensorArg::new("src2", src2)],
        vec![TensorArg::new("dst", &node.outputs[0])],
        vec![Param::new("axis", axis)],
    )])
}

/// The target shape comes from declared output metadata when the graph
/// carries it, else from the literal shape argument. Both absent is an
/// error: a runtime-computed shape is not representable.
fn reshape(node: &ParsedNode, ctx: &mut GraphCtx) -> LnResult<TVec<Op>> {
    node.expect(!node.outputs.is_empty(), "an output tensor name")?;
    let dims: Vec<i64> = match ctx.tensors.declared_shape(&node.outputs[0]) {
        Some(declared) => declared.to_vec(),
        None => ops::literal_input(node, ctx, 1, "shape")?.as_ints()?.to_vec(),
    };
    let src = ops::input(node, ctx, 0)?;
    let (src_name, dtype) = (src.name.clone(), src.dtype);
    ops::register_output(node, ctx, 0, dtype)?;
    Ok(tvec![Op::new(
        ctx.namer.fresh("reshape"),
        "reshape".to_string(),
        vec![TensorArg::new("src", src_name)],
        vec![TensorArg::new("dst", &node.outputs[0])],
        vec![Param::new("dims", dims)],
    )])
}

fn slice(node: &ParsedNode, ctx: &mut GraphCtx) -> LnResult<TVec<Op>> {
    node.expect(node.inputs.len() == 5, "5 inputs (data, starts, ends, axes, steps)")?;
    let starts = ops::literal_input(node, ctx, 1, "starts")?.as_ints()?.to_vec();
    let ends = ops::literal_input(node, ctx, 2, "ends")?.as_ints()?.to_vec();
    let axes = ops::literal_input(node, ctx, 3, "axes")?.as_ints()?.to_vec();
    let steps = ops::literal_input(node, ctx, 4, "steps")?.as_ints()?.to_vec();
    node.expect(
        starts.len() == 1 && ends.len() == 1 && axes.len() == 1 && steps.len() == 1,
        "slicing on exactly one axis",
    )?;
    node.expect(steps[0] == 1, "a unit slicing step")?;
    let src = ops::input(node, ctx, 0)?;
    let (src_name, dtype) = (src.name.clone(), src.dtype);
    ops::register_output(node, ctx, 0, dtype)?;
    Ok(tvec![Op::new(
        ctx.namer.fresh("slice"),
        "slice".to_string(),
        vec![TensorArg::new("src", src_name)],
        vec![TensorArg::new("dst", &node.outputs[0])],
        vec![
            Param::new("start", starts[0]),
            Param::new("axis", axes[0]),
            Param::new("len", ends[0] - starts[0]),
        ],
    )])
}

fn transpose(node: &ParsedNode, ctx: &mut GraphCtx) -> LnResult<TVec<Op>> {
    let axes = node.get_attr_ints("perm")?.to_vec();
    let src = ops::input(node, ctx, 0)?;
    let (src_name, dtype) = (src.name.clone(), src.dtype);
    ops::register_output(node, ctx, 0, dtype)?;
    Ok(tvec![Op::new(
        ctx.namer.fresh("transpose"),
        "transpose".to_string(),
        vec![TensorArg::new("src", src_name)],
        vec![TensorArg::new("dst", &node.outputs[0])],
        vec![Param::new("axes", axes)],
    )])
}

/// A constant node is normalized into the same literal-plus-create form as
/// an initializer.
fn constant(node: &ParsedNode, ctx: &mut GraphCtx) -> LnResult<TVec<Op>> {
    node.expect(!node.outputs.is_empty(), "an output tensor name")?;
    let literal = if let Some(t) = node.get_attr_opt_tensor("value")? {
        tensor::literal_of(t)?
    } else if let Some(AttrValue::F32(f)) = node.attrs.get("value_float") {
        Literal::new(DType::Float, tvec![1], LiteralData::Floats(vec![*f as f64]))
    } else if let Some(AttrValue::F32s(fs)) = node.attrs.get("value_floats") {
        Literal::new(
            DType::Float,
            tvec![fs.len() as i64],
            LiteralData::Floats(fs.iter().map(|&f| f as f64).collect()),
        )
    } else if let Some(AttrValue::I64(i)) = node.attrs.get("value_int") {
        Literal::new(DType::Int32, tvec![1], LiteralData::Ints(vec![*i]))
    } else if let Some(AttrValue::I64s(is)) = node.attrs.get("value_ints") {
        Literal::new(DType::Int32, tvec![is.len() as i64], LiteralData::Ints(is.clone()))
    } else {
        return node.bail(
            "expected one of the 'value', 'value_float(s)' or 'value_int(s)' attributes",
        );
    };
    let mut info = TensorInfo::from(&literal);
    info.name = node.outputs[0].clone();
    let op = ctx.new_create_op(&info)?;
    ctx.tensors.produce(&node.outputs[0], info)?;
    Ok(tvec![op])
}

/// Pure aliasing: the output name resolves to its source's emitted name and
/// no op is emitted, so downstream consumers read through the alias.
fn identity(node: &ParsedNode, ctx: &mut GraphCtx) -> LnResult<TVec<Op>> {
    node.expect(node.inputs.len() == 1 && node.outputs.len() == 1, "1 input and 1 output")?;
    let alias = ctx.tensors.lookup(&node.inputs[0])?.clone();
    ctx.tensors.produce(&node.outputs[0], alias)?;
    Ok(tvec![])
}
