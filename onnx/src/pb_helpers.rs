use std::collections::HashMap;
use std::fmt;
use std::str;

use lightnet_ir::internal::*;

use crate::pb::attribute_proto::AttributeType;
use crate::pb::{AttributeProto, NodeProto, TensorProto};
use crate::tensor;

/// A decoded attribute value.
///
/// Closed union so converters can pattern-match exhaustively instead of
/// probing protobuf presence flags. `Tensor` keeps the embedded proto as
/// structural data; it is only materialized when a converter asks for it.
/// `Bool` and `DType` never come straight from the wire: they are produced
/// by the per-key translation pass (`keepdims`, `dtype`/`to`).
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    F32(f32),
    I64(i64),
    Str(String),
    Tensor(TensorProto),
    F32s(Vec<f32>),
    I64s(Vec<i64>),
    Strs(Vec<String>),
    Bool(bool),
    DType(DType),
}

impl AttrValue {
    pub fn decode(attr: &AttributeProto) -> LnResult<AttrValue> {
        let ty = AttributeType::from_i32(attr.r#type).unwrap_or(AttributeType::Undefined);
        Ok(match ty {
            AttributeType::Float => AttrValue::F32(attr.f),
            AttributeType::Int => AttrValue::I64(attr.i),
            AttributeType::String => AttrValue::Str(str::from_utf8(&attr.s)?.to_string()),
            AttributeType::Tensor => AttrValue::Tensor(
                attr.t.clone().ok_or_else(|| format_err!("TENSOR attribute without a tensor"))?,
            ),
            AttributeType::Floats => AttrValue::F32s(attr.floats.clone()),
            AttributeType::Ints => AttrValue::I64s(attr.ints.clone()),
            AttributeType::Strings => AttrValue::Strs(
                attr.strings
                    .iter()
                    .map(|s| Ok(str::from_utf8(s)?.to_string()))
                    .collect::<LnResult<_>>()?,
            ),
            // pre-IRv3 attributes have no discriminator: probe the fields with presence
            AttributeType::Undefined => {
                if let Some(t) = &attr.t {
                    AttrValue::Tensor(t.clone())
                } else if !attr.floats.is_empty() {
                    AttrValue::F32s(attr.floats.clone())
                } else if !attr.ints.is_empty() {
                    AttrValue::I64s(attr.ints.clone())
                } else if !attr.strings.is_empty() {
                    AttrValue::Strs(
                        attr.strings
                            .iter()
                            .map(|s| Ok(str::from_utf8(s)?.to_string()))
                            .collect::<LnResult<_>>()?,
                    )
                } else if !attr.s.is_empty() {
                    AttrValue::Str(str::from_utf8(&attr.s)?.to_string())
                } else {
                    bail!("Unsupported ONNX attribute: no recognized value field populated")
                }
            }
            _ => bail!("Unsupported ONNX attribute of type {}", ty.as_str_name()),
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::F32(_) => "float",
            AttrValue::I64(_) => "int",
            AttrValue::Str(_) => "string",
            AttrValue::Tensor(_) => "tensor",
            AttrValue::F32s(_) => "list of floats",
            AttrValue::I64s(_) => "list of ints",
            AttrValue::Strs(_) => "list of strings",
            AttrValue::Bool(_) => "boolean",
            AttrValue::DType(_) => "dtype",
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Per-key overrides applied on top of the generic decode: axis values are
/// forced to integers, `keepdims` to a boolean, dtype-valued keys go through
/// the type mapper. Unknown keys pass through unchanged.
pub fn translate(key: &str, value: AttrValue) -> LnResult<AttrValue> {
    Ok(match (key, value) {
        ("axis", AttrValue::F32(f)) => AttrValue::I64(f as i64),
        ("axes", AttrValue::F32s(fs)) => AttrValue::I64s(fs.iter().map(|&f| f as i64).collect()),
        ("keepdims", AttrValue::I64(i)) => AttrValue::Bool(i != 0),
        ("dtype" | "to", AttrValue::I64(i)) => {
            AttrValue::DType(tensor::dtype_of_i32(key, i as i32)?)
        }
        (_, value) => value,
    })
}

/// Reimplementation of NodeProto in a form more convenient to work with:
/// attributes arrive fully decoded, inputs/outputs as plain name lists.
#[derive(Debug, Clone)]
pub struct ParsedNode {
    pub name: String,
    pub op_type: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub attrs: HashMap<String, AttrValue>,
}

impl ParsedNode {
    /// An attribute that decodes to none of the recognized value shapes is
    /// reported and dropped; decoding continues for the remaining ones, and
    /// downstream default-value logic takes over for the missing key.
    pub fn wrap(node: &NodeProto, name: String) -> ParsedNode {
        let mut attrs = HashMap::new();
        for attr in &node.attribute {
            match AttrValue::decode(attr).and_then(|v| translate(&attr.name, v)) {
                Ok(value) => {
                    attrs.insert(attr.name.clone(), value);
                }
                Err(e) => error!(
                    "Node '{}' ({}): dropping attribute '{}': {:#}",
                    name, node.op_type, attr.name, e
                ),
            }
        }
        ParsedNode {
            name,
            op_type: node.op_type.clone(),
            inputs: node.input.clone(),
            outputs: node.output.clone(),
            attrs,
        }
    }

    pub fn bail<T>(&self, msg: &str) -> LnResult<T> {
        bail!("Node '{}' ({}): {}", self.name, self.op_type, msg)
    }

    pub fn bail_attr<T>(&self, attr: &str, msg: &str) -> LnResult<T> {
        bail!("Node '{}' ({}), attribute '{}': {}", self.name, self.op_type, attr, msg)
    }

    pub fn expect(&self, cond: bool, what: impl fmt::Display) -> LnResult<()> {
        if !cond { self.bail(&format!("expected {what}")) } else { Ok(()) }
    }

    pub fn expect_attr(&self, attr: &str, cond: bool, what: impl fmt::Display) -> LnResult<()> {
        if !cond { self.bail_attr(attr, &format!("expected {what}")) } else { Ok(()) }
    }

    pub fn get_attr_opt_int(&self, name: &str) -> LnResult<Option<i64>> {
        match self.attrs.get(name) {
            None => Ok(None),
            Some(AttrValue::I64(i)) => Ok(Some(*i)),
            Some(other) => self.bail_attr(name, &format!("expected int, got {other}")),
        }
    }

    pub fn get_attr_int(&self, name: &str) -> LnResult<i64> {
        match self.get_attr_opt_int(name)? {
            Some(i) => Ok(i),
            None => self.bail_attr(name, "expected attribute to be present"),
        }
    }

    pub fn get_attr_opt_float(&self, name: &str) -> LnResult<Option<f32>> {
        match self.attrs.get(name) {
            None => Ok(None),
            Some(AttrValue::F32(f)) => Ok(Some(*f)),
            Some(other) => self.bail_attr(name, &format!("expected float, got {other}")),
        }
    }

    pub fn get_attr_opt_str(&self, name: &str) -> LnResult<Option<&str>> {
        match self.attrs.get(name) {
            None => Ok(None),
            Some(AttrValue::Str(s)) => Ok(Some(s)),
            Some(other) => self.bail_attr(name, &format!("expected string, got {other}")),
        }
    }

    pub fn get_attr_opt_ints(&self, name: &str) -> LnResult<Option<&[i64]>> {
        match self.attrs.get(name) {
            None => Ok(None),
            Some(AttrValue::I64s(v)) => Ok(Some(v)),
            Some(other) => self.bail_attr(name, &format!("expected list of ints, got {other}")),
        }
    }

    pub fn get_attr_ints(&self, name: &str) -> LnResult<&[i64]> {
        match self.get_attr_opt_ints(name)? {
            Some(v) => Ok(v),
            None => self.bail_attr(name, "expected attribute to be present"),
        }
    }

    pub fn get_attr_opt_floats(&self, name: &str) -> LnResult<Option<&[f32]>> {
        match self.attrs.get(name) {
            None => Ok(None),
            Some(AttrValue::F32s(v)) => Ok(Some(v)),
            Some(other) => self.bail_attr(name, &format!("expected list of floats, got {other}")),
        }
    }

    pub fn get_attr_opt_bool(&self, name: &str) -> LnResult<Option<bool>> {
        match self.attrs.get(name) {
            None => Ok(None),
            Some(AttrValue::Bool(b)) => Ok(Some(*b)),
            Some(AttrValue::I64(i)) => Ok(Some(*i != 0)),
            Some(other) => self.bail_attr(name, &format!("expected boolean, got {other}")),
        }
    }

    pub fn get_attr_opt_tensor(&self, name: &str) -> LnResult<Option<&TensorProto>> {
        match self.attrs.get(name) {
            None => Ok(None),
            Some(AttrValue::Tensor(t)) => Ok(Some(t)),
            Some(other) => self.bail_attr(name, &format!("expected tensor, got {other}")),
        }
    }
}
