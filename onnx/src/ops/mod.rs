use std::collections::HashMap;

use lightnet_ir::internal::*;

use crate::model::GraphCtx;
use crate::pb_helpers::ParsedNode;

mod array;
mod math;
mod nn;
mod resize;

/// Translates one source node into zero or more emitted ops.
pub type ConvertFn = fn(&ParsedNode, &mut GraphCtx) -> LnResult<TVec<Op>>;

#[derive(Clone, Default)]
pub struct OnnxOpRegister(HashMap<&'static str, ConvertFn>);

impl OnnxOpRegister {
    pub fn insert(&mut self, op_type: &'static str, convert: ConvertFn) {
        self.0.insert(op_type, convert);
    }

    pub fn get(&self, op_type: &str) -> ConvertFn {
        self.0.get(op_type).copied().unwrap_or(unsupported)
    }
}

fn unsupported(node: &ParsedNode, _ctx: &mut GraphCtx) -> LnResult<TVec<Op>> {
    bail!(
        "Unsupported operator type '{}' for node '{}'",
        node.op_type,
        node.name
    )
}

pub fn register_all_ops(reg: &mut OnnxOpRegister) {
    array::register(reg);
    math::register(reg);
    nn::register(reg);
    resize::register(reg);
}

/// Resolves the consumed input at slot `ix`, failing if the node is missing
/// that input or if the tensor's dtype is the no-runtime-equivalent sentinel
/// (the deferred half of the type mapper's two-stage failure policy).
pub fn input<'a>(
    node: &ParsedNode,
    ctx: &'a GraphCtx,
    ix: usize,
) -> LnResult<&'a crate::model::TensorInfo> {
    let name = node
        .inputs
        .get(ix)
        .ok_or_else(|| format_err!(
            "Node '{}' ({}): missing input #{}",
            node.name,
            node.op_type,
            ix
        ))?;
    let info = ctx.tensors.lookup(name)?;
    if info.dtype == DType::Invalid {
        return node.bail(&format!("input '{name}' has no usable runtime dtype"));
    }
    Ok(info)
}

/// Like [`input`], but additionally requires the tensor to carry a literal
/// payload known at translation time.
pub fn literal_input<'a>(
    node: &ParsedNode,
    ctx: &'a GraphCtx,
    ix: usize,
    what: &str,
) -> LnResult<&'a crate::tensor::Literal> {
    let info = input(node, ctx, ix)?;
    match &info.data {
        Some(literal) => Ok(literal),
        None => node.bail(&format!(
            "dynamically supplied '{what}' tensor '{}' is not supported, \
             a literal value is required",
            info.name
        )),
    }
}

/// Registers the node's output at `slot`, inheriting `dtype` and backfilling
/// the shape from declared value metadata when one exists for that name.
pub fn register_output(
    node: &ParsedNode,
    ctx: &mut GraphCtx,
    slot: usize,
    dtype: DType,
) -> LnResult<()> {
    let name = node
        .outputs
        .get(slot)
        .ok_or_else(|| format_err!(
            "Node '{}' ({}): missing output #{}",
            node.name,
            node.op_type,
            slot
        ))?
        .clone();
    let dims = ctx.tensors.declared_dims(&name);
    let info = crate::model::TensorInfo::new(name.clone(), dtype, dims, None);
    ctx.tensors.produce(&name, info)
}

/// Resolves explicit `pads` against `auto_pad`, the two mutually exclusive
/// ways a source node can spell its spatial padding. When only an automatic
/// mode is requested the numeric padding stays zero and the mode is carried
/// through the `autopad` parameter for the runtime to resolve. `rank` is the
/// number of spatial axes, so the result always has `2 * rank` entries.
pub fn resolve_padding(node: &ParsedNode, rank: usize) -> LnResult<Vec<i64>> {
    let pads = node.get_attr_opt_ints("pads")?;
    let auto_pad = node.get_attr_opt_str("auto_pad")?.unwrap_or("NOTSET");
    match (pads, auto_pad) {
        (Some(pads), "NOTSET") => {
            node.expect_attr(
                "pads",
                pads.len() == 2 * rank,
                format!("{} padding entries for {rank} spatial axes", 2 * rank),
            )?;
            Ok(pads.to_vec())
        }
        (None, "NOTSET") => node.bail(
            "must have a 'pads' attribute or a non-NOTSET 'auto_pad'",
        ),
        (None, _) => Ok(vec![0; 2 * rank]),
        (Some(_), _) => {
            node.bail("cannot use 'pads' and a non-NOTSET 'auto_pad' simultaneously")
        }
    }
}

#[cfg(test)]
pub(crate) fn test_node(
    op_type: &str,
    inputs: &[&str],
    outputs: &[&str],
    attrs: Vec<(&str, crate::pb_helpers::AttrValue)>,
) -> ParsedNode {
    ParsedNode {
        name: format!("{}_test", op_type.to_lowercase()),
        op_type: op_type.to_string(),
        inputs: inputs.iter().map(|s| s.to_string()).collect(),
        outputs: outputs.iter().map(|s| s.to_string()).collect(),
        attrs: attrs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
    }
}
