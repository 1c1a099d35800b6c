use lightnet_ir::internal::*;

use crate::model::GraphCtx;
use crate::ops::{self, OnnxOpRegister};
use crate::pb_helpers::ParsedNode;

pub fn register(reg: &mut OnnxOpRegister) {
    reg.insert("Add", |n, c| elew(n, c, "TL_ADD"));
    reg.insert("Sub", |n, c| elew(n, c, "TL_SUB"));
    reg.insert("Mul", |n, c| elew(n, c, "TL_MUL"));
    reg.insert("Div", |n, c| elew(n, c, "TL_DIV"));
    reg.insert("Pow", |n, c| elew(n, c, "TL_POW"));
}

/// All binary elementwise kinds share the `elew` target operator, tagged
/// with the arithmetic operation to perform.
fn elew(node: &ParsedNode, ctx: &mut GraphCtx, elew_op: &str) -> LnResult<TVec<Op>> {
    let src1 = ops::input(node, ctx, 0)?.name.clone();
    let src2 = ops::input(node, ctx, 1)?.name.clone();
    let dtype = ops::input(node, ctx, 0)?.dtype;
    ops::register_output(node, ctx, 0, dtype)?;
    Ok(tvec![Op::new(
        ctx.namer.fresh("elew"),
        "elew".to_string(),
        vec![TensorArg::new("src1", src1), TensorArg::new("src2", src2)],
        vec![TensorArg::new("dst", &node.outputs[0])],
        vec![Param::new("elew_op", elew_op)],
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TensorInfo;
    use crate::ops::test_node;

    fn ctx_with(names: &[&str]) -> GraphCtx {
        let mut ctx = GraphCtx::default();
        for name in names {
            ctx.tensors.seed(TensorInfo::new(name.to_string(), DType::Float, None, None));
        }
        ctx
    }

    #[test]
    fn add_emits_a_tagged_elew() {
        let mut ctx = ctx_with(&["X", "W"]);
        let node = test_node("Add", &["X", "W"], &["Y"], vec![]);
        let ops = super::elew(&node, &mut ctx, "TL_ADD").unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].name, "elew0");
        assert_eq!(ops[0].optype, "elew");
        assert_eq!(
            ops[0].tensors_in,
            vec![TensorArg::new("src1", "X"), TensorArg::new("src2", "W")]
        );
        assert_eq!(ops[0].tensors_out, vec![TensorArg::new("dst", "Y")]);
        assert_eq!(ops[0].params, vec![Param::new("elew_op", "TL_ADD")]);
        assert_eq!(ctx.tensors.lookup("Y").unwrap().dtype, DType::Float);
    }

    #[test]
    fn each_kind_gets_its_own_tag() {
        let mut reg = OnnxOpRegister::default();
        register(&mut reg);
        for (kind, tag) in
            [("Add", "TL_ADD"), ("Sub", "TL_SUB"), ("Mul", "TL_MUL"), ("Div", "TL_DIV"), ("Pow", "TL_POW")]
        {
            let mut ctx = ctx_with(&["X", "W"]);
            let node = test_node(kind, &["X", "W"], &["Y"], vec![]);
            let ops = reg.get(kind)(&node, &mut ctx).unwrap();
            assert_eq!(ops[0].params, vec![Param::new("elew_op", tag)]);
        }
    }

    #[test]
    fn inputs_must_be_registered_first() {
        let mut ctx = ctx_with(&["X"]);
        let node = test_node("Div", &["X", "W"], &["Y"], vec![]);
        let err = super::elew(&node, &mut ctx, "TL_DIV").unwrap_err();
        assert!(err.to_string().contains("'W'"), "{err}");
    }
}
