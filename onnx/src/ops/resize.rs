use lightnet_ir::internal::*;

use crate::model::GraphCtx;
use crate::ops::{self, OnnxOpRegister};
use crate::pb_helpers::ParsedNode;

pub fn register(reg: &mut OnnxOpRegister) {
    reg.insert("Resize", resize);
    reg.insert("Upsample", resize);
}

/// Both source kinds map to the one `resize` target operator; they differ
/// only in opset provenance, not in the information carried.
fn resize(node: &ParsedNode, ctx: &mut GraphCtx) -> LnResult<TVec<Op>> {
    let mode = match node.get_attr_opt_str("mode")? {
        None | Some("nearest") => "TL_NEAREST",
        Some("linear") => "TL_LINEAR",
        Some(other) => {
            return node.bail_attr("mode", &format!("'{other}' is not supported"));
        }
    };
    let scales = ops::literal_input(node, ctx, 1, "scales")?.as_floats();
    let src = ops::input(node, ctx, 0)?;
    let (src_name, dtype) = (src.name.clone(), src.dtype);
    ops::register_output(node, ctx, 0, dtype)?;
    Ok(tvec![Op::new(
        ctx.namer.fresh("resize"),
        "resize".to_string(),
        vec![TensorArg::new("src", src_name)],
        vec![TensorArg::new("dst", &node.outputs[0])],
        vec![Param::new("mode", mode), Param::new("scales", scales)],
    )])
}
