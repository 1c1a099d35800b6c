use std::collections::HashMap;
use std::fs;
use std::path::Path;

use derive_new::new;
use lightnet_ir::internal::*;
use prost::Message;

use crate::ops::OnnxOpRegister;
use crate::pb;
use crate::pb::tensor_shape_proto::dimension;
use crate::pb_helpers::ParsedNode;
use crate::tensor::{self, Literal};

/// Metadata for one named tensor flowing through the graph.
///
/// `name` is the emitted name of the tensor, which is the registry key for
/// every tensor except aliases (an Identity output resolves to its source's
/// emitted name). `dims` entries are `None` for dynamic or unknown
/// dimensions; the whole shape may be unknown. `data` is present only when
/// the full payload is known at translation time.
#[derive(Debug, Clone, PartialEq, new)]
pub struct TensorInfo {
    pub name: String,
    pub dtype: DType,
    pub dims: Option<TVec<Option<i64>>>,
    pub data: Option<Literal>,
}

impl TensorInfo {
    /// The shape, if every dimension of it is statically known.
    pub fn known_dims(&self) -> Option<TVec<i64>> {
        self.dims.as_ref().and_then(|dims| dims.iter().copied().collect())
    }
}

/// The tensor metadata table threaded through the whole translation.
///
/// Single static assignment: each name is registered by at most one
/// producing step. Consuming a name before its producer registered it means
/// the source graph is not topologically ordered, which is an invariant
/// violation rather than a recoverable condition.
#[derive(Debug, Default)]
pub struct TensorRegistry {
    tensors: HashMap<String, TensorInfo>,
    value_infos: HashMap<String, TVec<Option<i64>>>,
}

impl TensorRegistry {
    pub fn lookup(&self, name: &str) -> LnResult<&TensorInfo> {
        self.tensors.get(name).ok_or_else(|| {
            format_err!(
                "Tensor '{name}' consumed before any producer registered it \
                 (graph violates topological ordering)"
            )
        })
    }

    /// Registers an initializer or declared graph input.
    pub fn seed(&mut self, info: TensorInfo) {
        trace!("Seeding tensor '{}' ({})", info.name, info.dtype);
        self.tensors.insert(info.name.clone(), info);
    }

    /// Registers a converter-produced output under `key`, enforcing the
    /// write-once discipline.
    pub fn produce(&mut self, key: &str, info: TensorInfo) -> LnResult<()> {
        if self.tensors.contains_key(key) {
            bail!("Tensor '{key}' already has a producer (graph violates single assignment)");
        }
        self.tensors.insert(key.to_string(), info);
        Ok(())
    }

    /// Records a declared shape from the graph's value_info side table.
    pub fn declare_shape(&mut self, name: &str, dims: TVec<Option<i64>>) {
        self.value_infos.insert(name.to_string(), dims);
    }

    /// The declared shape for `name`, if present in upstream metadata.
    pub fn declared_dims(&self, name: &str) -> Option<TVec<Option<i64>>> {
        self.value_infos.get(name).cloned()
    }

    /// The declared shape for `name`, only if every dimension is known.
    pub fn declared_shape(&self, name: &str) -> Option<TVec<i64>> {
        let dims = self.value_infos.get(name)?;
        if dims.is_empty() { None } else { dims.iter().copied().collect() }
    }
}

/// Generates emitted operator names as `optype` + per-kind sequence number.
///
/// Owned by one translation invocation: counters start at zero for every
/// pass, so translating the same graph twice yields identical names.
#[derive(Debug, Default)]
pub struct OpNamer(HashMap<String, usize>);

impl OpNamer {
    pub fn fresh(&mut self, optype: &str) -> String {
        let n = self.0.entry(optype.to_string()).or_insert(0);
        let name = format!("{optype}{n}");
        *n += 1;
        name
    }
}

/// Mutable state owned by one translation pass: the registry and the naming
/// counters. Never shared across invocations.
#[derive(Debug, Default)]
pub struct GraphCtx {
    pub tensors: TensorRegistry,
    pub namer: OpNamer,
}

impl GraphCtx {
    /// Emits the constant-creation op for a tensor carrying literal data, so
    /// the translated graph is self-contained.
    pub fn new_create_op(&mut self, info: &TensorInfo) -> LnResult<Op> {
        let dims_param = match (&info.data, &info.dims) {
            (Some(literal), _) => ParamValue::Ints(literal.dims.to_vec()),
            (None, Some(dims)) => ParamValue::Dims(dims.to_vec()),
            (None, None) => bail!("Tensor '{}' has neither data nor a shape", info.name),
        };
        let data_param = match &info.data {
            Some(literal) => ParamValue::from(&literal.data),
            // placeholder payload for a runtime-supplied input
            None => ParamValue::Ints(vec![0]),
        };
        Ok(Op::new(
            self.namer.fresh("create"),
            "create".to_string(),
            vec![],
            vec![TensorArg::new("dst", &info.name)],
            vec![
                Param::new("dtype", info.dtype),
                Param::new("dims", dims_param),
                Param::new("data", data_param),
                Param::new("ran", ParamValue::Ints(vec![0, 0])),
                Param::new("from_file", false),
            ],
        ))
    }
}

/// One recorded (non-aborting) conversion failure, in lenient mode.
#[derive(Debug, Clone, new)]
pub struct TranslationError {
    pub node: String,
    pub op_type: String,
    pub message: String,
}

impl std::fmt::Display for TranslationError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Node '{}' ({}): {}", self.node, self.op_type, self.message)
    }
}

#[derive(Debug, Default)]
pub struct ParseResult {
    pub model: Model,
    pub errors: Vec<TranslationError>,
}

/// The translation framework: the converter registry plus the abort policy.
#[derive(Clone, Default)]
pub struct Onnx {
    pub op_register: OnnxOpRegister,
    lenient: bool,
    placeholder_inputs: bool,
}

impl Onnx {
    /// Collect converter errors and keep walking instead of aborting on the
    /// first one. Strict abort is the default.
    pub fn with_lenient(mut self, lenient: bool) -> Onnx {
        self.lenient = lenient;
        self
    }

    /// Also emit zero-payload `create` ops for declared graph inputs, making
    /// the emitted graph loadable without feeding inputs first.
    pub fn with_placeholder_inputs(mut self, enable: bool) -> Onnx {
        self.placeholder_inputs = enable;
        self
    }

    pub fn proto_model_for_read(&self, r: &mut dyn std::io::Read) -> LnResult<pb::ModelProto> {
        let mut buf = vec![];
        r.read_to_end(&mut buf)?;
        Ok(pb::ModelProto::decode(&*buf)?)
    }

    pub fn proto_model_for_path(&self, p: impl AsRef<Path>) -> LnResult<pb::ModelProto> {
        let buf = fs::read(&p)
            .with_context(|| format!("Reading ONNX model {:?}", p.as_ref()))?;
        Ok(pb::ModelProto::decode(&*buf)?)
    }

    pub fn model_for_path(&self, p: impl AsRef<Path>) -> LnResult<Model> {
        let proto = self.proto_model_for_path(p)?;
        self.model_for_proto(&proto)
    }

    pub fn model_for_read(&self, r: &mut dyn std::io::Read) -> LnResult<Model> {
        let proto = self.proto_model_for_read(r)?;
        self.model_for_proto(&proto)
    }

    pub fn model_for_proto(&self, proto: &pb::ModelProto) -> LnResult<Model> {
        let ParseResult { model, errors } = self.parse(proto)?;
        if !errors.is_empty() {
            bail!(
                "Could not translate {} node(s), first failure: {}",
                errors.len(),
                errors[0]
            );
        }
        Ok(model)
    }

    pub fn parse(&self, proto: &pb::ModelProto) -> LnResult<ParseResult> {
        let graph =
            proto.graph.as_ref().ok_or_else(|| format_err!("ONNX model carries no graph"))?;
        self.parse_graph(graph)
    }

    /// The whole pass: seed the registry, emit `create` ops for constants,
    /// then fold over the node list in source order.
    pub fn parse_graph(&self, graph: &pb::GraphProto) -> LnResult<ParseResult> {
        let mut ctx = GraphCtx::default();
        let mut model = Model::default();
        let mut errors = vec![];

        for init in &graph.initializer {
            let dtype = tensor::dtype_of_i32(&init.name, init.data_type)?;
            let dims: Option<TVec<Option<i64>>> =
                Some(init.dims.iter().map(|&d| Some(d)).collect());
            let info = if !dtype.is_valid() {
                // the mapper already warned; keep the record around so
                // consumption fails with a precise error later
                TensorInfo::new(init.name.clone(), dtype, dims, None)
            } else {
                match tensor::literal_of(init) {
                    Ok(literal) => {
                        TensorInfo::new(init.name.clone(), dtype, dims, Some(literal))
                    }
                    Err(e) => {
                        warn!("Initializer '{}' not materialized: {:#}", init.name, e);
                        TensorInfo::new(init.name.clone(), dtype, dims, None)
                    }
                }
            };
            if info.data.is_some() {
                let op = ctx.new_create_op(&info)?;
                model.ops.push(op);
            }
            ctx.tensors.seed(info);
        }

        for input in &graph.input {
            if graph.initializer.iter().any(|i| i.name == input.name) {
                continue;
            }
            let info = input_info(input)?;
            trace!("Input '{}' is a source ({:?})", info.name, info.dims);
            if self.placeholder_inputs {
                let op = ctx.new_create_op(&info)?;
                model.ops.push(op);
            }
            ctx.tensors.seed(info);
        }

        for vi in graph.value_info.iter().chain(graph.output.iter()) {
            if let Some(dims) = declared_dims(vi) {
                ctx.tensors.declare_shape(&vi.name, dims);
            }
        }

        for (ix, pbnode) in graph.node.iter().enumerate() {
            let name = if !pbnode.name.is_empty() {
                pbnode.name.clone()
            } else if pbnode.output.first().is_some_and(|o| !o.is_empty()) {
                pbnode.output[0].clone()
            } else {
                format!("{}-{}", ix, pbnode.op_type)
            };
            trace!("Translating node '{}' ({})", name, pbnode.op_type);
            let node = ParsedNode::wrap(pbnode, name);
            let converter = self.op_register.get(&node.op_type);
            match converter(&node, &mut ctx) {
                Ok(ops) => model.ops.extend(ops),
                Err(e) if self.lenient => {
                    error!("{:#}", e);
                    errors.push(TranslationError::new(
                        node.name.clone(),
                        node.op_type.clone(),
                        format!("{e:#}"),
                    ));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(ParseResult { model, errors })
    }
}

fn input_info(input: &pb::ValueInfoProto) -> LnResult<TensorInfo> {
    let Some(pb::type_proto::Value::TensorType(tt)) =
        input.r#type.as_ref().and_then(|t| t.value.as_ref())
    else {
        bail!("Graph input '{}' carries no tensor type", input.name)
    };
    let dtype = tensor::dtype_of_i32(&input.name, tt.elem_type)?;
    let dims = tt.shape.as_ref().map(shape_dims);
    Ok(TensorInfo::new(input.name.clone(), dtype, dims, None))
}

fn declared_dims(vi: &pb::ValueInfoProto) -> Option<TVec<Option<i64>>> {
    match vi.r#type.as_ref()?.value.as_ref()? {
        pb::type_proto::Value::TensorType(tt) => tt.shape.as_ref().map(shape_dims),
    }
}

// symbolic or non-positive dimensions are recorded as unknown
fn shape_dims(shape: &pb::TensorShapeProto) -> TVec<Option<i64>> {
    shape
        .dim
        .iter()
        .map(|d| match &d.value {
            Some(dimension::Value::DimValue(v)) if *v > 0 => Some(*v),
            _ => None,
        })
        .collect()
}

impl From<&Literal> for TensorInfo {
    fn from(literal: &Literal) -> TensorInfo {
        TensorInfo::new(
            String::new(),
            literal.dtype,
            Some(literal.dims.iter().map(|&d| Some(d)).collect()),
            Some(literal.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::LiteralData;

    #[test]
    fn namer_counts_per_kind() {
        let mut namer = OpNamer::default();
        assert_eq!(namer.fresh("elew"), "elew0");
        assert_eq!(namer.fresh("create"), "create0");
        assert_eq!(namer.fresh("elew"), "elew1");
    }

    #[test]
    fn registry_lookup_of_unregistered_name_fails() {
        let reg = TensorRegistry::default();
        let err = reg.lookup("nope").unwrap_err().to_string();
        assert!(err.contains("topological"), "{err}");
    }

    #[test]
    fn registry_rejects_a_second_producer() {
        let mut reg = TensorRegistry::default();
        let info = TensorInfo::new("t".to_string(), DType::Float, None, None);
        reg.produce("t", info.clone()).unwrap();
        assert!(reg.produce("t", info).is_err());
    }

    #[test]
    fn declared_shape_requires_all_dims_known() {
        let mut reg = TensorRegistry::default();
        reg.declare_shape("partial", tvec![Some(1), None]);
        reg.declare_shape("full", tvec![Some(1), Some(2)]);
        assert_eq!(reg.declared_shape("partial"), None);
        assert_eq!(reg.declared_shape("full"), Some(tvec![1, 2]));
    }

    #[test]
    fn create_op_for_literal_payload() {
        let mut ctx = GraphCtx::default();
        let literal =
            Literal::new(DType::Float, tvec![2], LiteralData::Floats(vec![1.0, 2.0]));
        let info = TensorInfo::new(
            "W".to_string(),
            DType::Float,
            Some(tvec![Some(2)]),
            Some(literal),
        );
        let op = ctx.new_create_op(&info).unwrap();
        assert_eq!(op.name, "create0");
        assert_eq!(op.optype, "create");
        assert_eq!(op.tensors_out, vec![TensorArg::new("dst", "W")]);
        assert_eq!(op.params[0], Param::new("dtype", DType::Float));
        assert_eq!(op.params[1], Param::new("dims", ParamValue::Ints(vec![2])));
        assert_eq!(op.params[2], Param::new("data", ParamValue::Floats(vec![1.0, 2.0])));
        assert_eq!(op.params[3], Param::new("ran", ParamValue::Ints(vec![0, 0])));
        assert_eq!(op.params[4], Param::new("from_file", false));
    }

    #[test]
    fn create_op_for_placeholder_input_renders_unknown_dims_as_null() {
        let mut ctx = GraphCtx::default();
        let info =
            TensorInfo::new("X".to_string(), DType::Float, Some(tvec![None, Some(3)]), None);
        let op = ctx.new_create_op(&info).unwrap();
        assert_eq!(op.params[1], Param::new("dims", ParamValue::Dims(vec![None, Some(3)])));
        assert_eq!(op.params[2], Param::new("data", ParamValue::Ints(vec![0])));
    }
}
