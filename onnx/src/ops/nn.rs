use lightnet_ir::internal::*;

use crate::model::{GraphCtx, TensorInfo};
use crate::ops::{self, OnnxOpRegister};
use crate::pb_helpers::ParsedNode;
use crate::tensor::Literal;

pub fn register(reg: &mut OnnxOpRegister) {
    reg.insert("ArgMax", arg_max);
    reg.insert("AveragePool", |n, c| pool(n, c, "avgpool2d"));
    reg.insert("BatchNormalization", batch_normalization);
    reg.insert("Conv", conv);
    reg.insert("LeakyRelu", leaky_relu);
    reg.insert("MaxPool", |n, c| pool(n, c, "maxpool2d"));
    reg.insert("ReduceMax", reduce_max);
    reg.insert("Relu", |n, c| activation(n, c, "relu"));
    reg.insert("Sigmoid", |n, c| activation(n, c, "sigmoid"));
    reg.insert("Softmax", softmax);
}

fn activation(node: &ParsedNode, ctx: &mut GraphCtx, optype: &str) -> LnResult<TVec<Op>> {
    let src = ops::input(node, ctx, 0)?;
    let (src_name, dtype) = (src.name.clone(), src.dtype);
    ops::register_output(node, ctx, 0, dtype)?;
    Ok(tvec![Op::new(
        ctx.namer.fresh(optype),
        optype.to_string(),
        vec![TensorArg::new("src", src_name)],
        vec![TensorArg::new("dst", &node.outputs[0])],
        vec![],
    )])
}

fn leaky_relu(node: &ParsedNode, ctx: &mut GraphCtx) -> LnResult<TVec<Op>> {
    // widen the attribute but keep the default an exact 0.01 in the output
    let negslope = node.get_attr_opt_float("alpha")?.map(|a| a as f64).unwrap_or(0.01);
    let src = ops::input(node, ctx, 0)?;
    let (src_name, dtype) = (src.name.clone(), src.dtype);
    ops::register_output(node, ctx, 0, dtype)?;
    Ok(tvec![Op::new(
        ctx.namer.fresh("lrelu"),
        "lrelu".to_string(),
        vec![TensorArg::new("src", src_name)],
        vec![TensorArg::new("dst", &node.outputs[0])],
        vec![Param::new("negslope", negslope)],
    )])
}

fn softmax(node: &ParsedNode, ctx: &mut GraphCtx) -> LnResult<TVec<Op>> {
    let axis = node.get_attr_opt_int("axis")?.unwrap_or(1);
    let src = ops::input(node, ctx, 0)?;
    let (src_name, dtype) = (src.name.clone(), src.dtype);
    ops::register_output(node, ctx, 0, dtype)?;
    Ok(tvec![Op::new(
        ctx.namer.fresh("softmax"),
        "softmax".to_string(),
        vec![TensorArg::new("src", src_name)],
        vec![TensorArg::new("dst", &node.outputs[0])],
        vec![Param::new("axis", axis)],
    )])
}

fn batch_normalization(node: &ParsedNode, ctx: &mut GraphCtx) -> LnResult<TVec<Op>> {
    let epsilon = node.get_attr_opt_float("epsilon")?.map(|e| e as f64).unwrap_or(1e-5);
    node.expect(node.inputs.len() == 5, "5 inputs (src, scale, offset, mean, var)")?;
    let mut names = TVec::<String>::new();
    for ix in 0..5 {
        names.push(ops::input(node, ctx, ix)?.name.clone());
    }
    let dtype = ops::input(node, ctx, 0)?.dtype;
    ops::register_output(node, ctx, 0, dtype)?;
    let tensors_in = ["src", "scale", "offset", "mean", "var"]
        .iter()
        .zip(&names)
        .map(|(arg, name)| TensorArg::new(arg, name))
        .collect();
    Ok(tvec![Op::new(
        ctx.namer.fresh("batchnorm"),
        "batchnorm".to_string(),
        tensors_in,
        vec![TensorArg::new("dst", &node.outputs[0])],
        vec![Param::new("epsilon", epsilon)],
    )])
}

/// Index-producing reduction. The value output is internal-only and gets a
/// synthetic discard name; the index output keeps the source name but is
/// forced to an integer dtype whatever the input carries.
fn arg_max(node: &ParsedNode, ctx: &mut GraphCtx) -> LnResult<TVec<Op>> {
    if node.get_attr_opt_bool("keepdims")? == Some(false) {
        return node.bail_attr("keepdims", "collapsing the reduced axis is unsupported");
    }
    let axis = node.get_attr_opt_int("axis")?.unwrap_or(0);
    let src = ops::input(node, ctx, 0)?.name.clone();
    let opname = ctx.namer.fresh("maxreduce_arg");
    let dst_name = format!("{opname}_dst_ln_");
    ops::register_output(node, ctx, 0, DType::Int32)?;
    Ok(tvec![Op::new(
        opname,
        "maxreduce_arg".to_string(),
        vec![TensorArg::new("src", src)],
        vec![TensorArg::new("dst", dst_name), TensorArg::new("arg", &node.outputs[0])],
        vec![Param::new("axis", axis)],
    )])
}

fn reduce_max(node: &ParsedNode, ctx: &mut GraphCtx) -> LnResult<TVec<Op>> {
    let axes = node.get_attr_ints("axes")?;
    node.expect_attr("axes", axes.len() == 1, "exactly one reduction axis")?;
    if node.get_attr_opt_bool("keepdims")? == Some(false) {
        return node.bail_attr("keepdims", "collapsing the reduced axis is unsupported");
    }
    let axis = axes[0];
    let src = ops::input(node, ctx, 0)?;
    let (src_name, dtype) = (src.name.clone(), src.dtype);
    ops::register_output(node, ctx, 0, dtype)?;
    Ok(tvec![Op::new(
        ctx.namer.fresh("maxreduce"),
        "maxreduce".to_string(),
        vec![TensorArg::new("src", src_name)],
        vec![TensorArg::new("dst", &node.outputs[0])],
        vec![Param::new("axes", axis)],
    )])
}

fn pool(node: &ParsedNode, ctx: &mut GraphCtx, optype: &str) -> LnResult<TVec<Op>> {
    let size = node.get_attr_ints("kernel_shape")?.to_vec();
    node.expect_attr("kernel_shape", size.len() == 2, "a 2-d pooling kernel")?;
    let stride =
        node.get_attr_opt_ints("strides")?.map(|s| s.to_vec()).unwrap_or_else(|| vec![1; 2]);
    let padding = ops::resolve_padding(node, 2)?;
    let autopad = node.get_attr_opt_str("auto_pad")?.unwrap_or("NOTSET").to_string();
    let src = ops::input(node, ctx, 0)?;
    let (src_name, dtype) = (src.name.clone(), src.dtype);
    ops::register_output(node, ctx, 0, dtype)?;
    Ok(tvec![Op::new(
        ctx.namer.fresh(optype),
        optype.to_string(),
        vec![TensorArg::new("src", src_name)],
        vec![TensorArg::new("dst", &node.outputs[0])],
        vec![
            Param::new("size", size),
            Param::new("stride", stride),
            Param::new("padding", padding),
            Param::new("autopad", autopad),
        ],
    )])
}

fn conv(node: &ParsedNode, ctx: &mut GraphCtx) -> LnResult<TVec<Op>> {
    let Some(size) = node.get_attr_opt_ints("kernel_shape")?.map(|s| s.to_vec()) else {
        return node.bail_attr("kernel_shape", "expected attribute to be present");
    };
    node.expect_attr("kernel_shape", size.len() == 2, "a 2-d convolution kernel")?;
    let group = node.get_attr_opt_int("group")?.unwrap_or(1);
    let stride =
        node.get_attr_opt_ints("strides")?.map(|s| s.to_vec()).unwrap_or_else(|| vec![1; 2]);
    let dilation =
        node.get_attr_opt_ints("dilations")?.map(|s| s.to_vec()).unwrap_or_else(|| vec![1; 2]);
    let padding = ops::resolve_padding(node, 2)?;
    let autopad = node.get_attr_opt_str("auto_pad")?.unwrap_or("NOTSET").to_string();

    let src = ops::input(node, ctx, 0)?;
    let (src_name, dtype) = (src.name.clone(), src.dtype);
    let weight = ops::input(node, ctx, 1)?;
    let weight_name = weight.name.clone();
    let weight_dims = weight.known_dims();

    let mut ops_out = tvec![];
    let opname = ctx.namer.fresh("conv2d");
    let bias_name = if node.inputs.len() > 2 {
        ops::input(node, ctx, 2)?.name.clone()
    } else {
        // the target operator requires a bias, so a missing one becomes a
        // zero literal with one entry per output channel
        let Some(channels) = weight_dims.as_ref().and_then(|d| d.first().copied()) else {
            return node.bail(
                "cannot synthesize a zero bias, the weight tensor's shape is unknown",
            );
        };
        let bias_name = format!("{opname}_bias_ln_");
        let bias = Literal::zeros(dtype, tvec![channels])?;
        let info = TensorInfo::new(
            bias_name.clone(),
            dtype,
            Some(tvec![Some(channels)]),
            Some(bias),
        );
        ops_out.push(ctx.new_create_op(&info)?);
        ctx.tensors.produce(&bias_name, info)?;
        bias_name
    };

    ops::register_output(node, ctx, 0, dtype)?;
    ops_out.push(Op::new(
        opname,
        "conv2d".to_string(),
        vec![
            TensorArg::new("src", src_name),
            TensorArg::new("weight", weight_name),
            TensorArg::new("bias", bias_name),
        ],
        vec![TensorArg::new("dst", &node.outputs[0])],
        vec![
            Param::new("group", group),
            Param::new("size", size),
            Param::new("stride", stride),
            Param::new("padding", padding),
            Param::new("autopad", autopad),
            Param::new("dilation", dilation),
        ],
    ));
    Ok(ops_out)
}
