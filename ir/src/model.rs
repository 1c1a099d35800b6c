use derive_new::new;
use serde::Serialize;

use crate::LnResult;
use crate::dtype::DType;

/// A complete translated model: the op list, in emission order.
///
/// Emission order is execution order for the downstream compiler, so the
/// sequence must stay a valid topological ordering of the data dependencies.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Model {
    pub ops: Vec<Op>,
}

impl Model {
    pub fn to_json(&self) -> LnResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json<W: std::io::Write>(&self, w: W) -> LnResult<()> {
        Ok(serde_json::to_writer_pretty(w, self)?)
    }
}

/// One emitted operator record.
#[derive(Debug, Clone, PartialEq, Serialize, new)]
pub struct Op {
    pub name: String,
    pub optype: String,
    pub tensors_in: Vec<TensorArg>,
    pub tensors_out: Vec<TensorArg>,
    pub params: Vec<Param>,
}

/// Binds a tensor name to one of the operator's formal arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TensorArg {
    pub arg_name: String,
    pub name: String,
}

impl TensorArg {
    pub fn new(arg_name: &str, name: impl Into<String>) -> TensorArg {
        TensorArg { arg_name: arg_name.to_string(), name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub arg_name: String,
    pub value: ParamValue,
}

impl Param {
    pub fn new(arg_name: &str, value: impl Into<ParamValue>) -> Param {
        Param { arg_name: arg_name.to_string(), value: value.into() }
    }
}

/// Closed union of the value shapes the textual IR parser accepts.
///
/// `Dims` is an array of dimension sizes where an unknown dimension renders
/// as `null`; it only ever appears on `create` ops describing placeholder
/// inputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Strs(Vec<String>),
    Dims(Vec<Option<i64>>),
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> ParamValue {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> ParamValue {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> ParamValue {
        ParamValue::Float(v)
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> ParamValue {
        ParamValue::Float(v as f64)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> ParamValue {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> ParamValue {
        ParamValue::Str(v)
    }
}

impl From<Vec<i64>> for ParamValue {
    fn from(v: Vec<i64>) -> ParamValue {
        ParamValue::Ints(v)
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(v: Vec<f64>) -> ParamValue {
        ParamValue::Floats(v)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(v: Vec<String>) -> ParamValue {
        ParamValue::Strs(v)
    }
}

impl From<DType> for ParamValue {
    fn from(v: DType) -> ParamValue {
        ParamValue::Str(v.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adder() -> Op {
        Op::new(
            "elew0".to_string(),
            "elew".to_string(),
            vec![TensorArg::new("src1", "X"), TensorArg::new("src2", "W")],
            vec![TensorArg::new("dst", "Y")],
            vec![Param::new("elew_op", "TL_ADD")],
        )
    }

    #[test]
    fn op_json_shape() {
        let value = serde_json::to_value(adder()).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "elew0",
                "optype": "elew",
                "tensors_in": [
                    { "arg_name": "src1", "name": "X" },
                    { "arg_name": "src2", "name": "W" },
                ],
                "tensors_out": [ { "arg_name": "dst", "name": "Y" } ],
                "params": [ { "arg_name": "elew_op", "value": "TL_ADD" } ],
            })
        );
    }

    #[test]
    fn param_value_typing() {
        assert_eq!(serde_json::to_value(ParamValue::from(false)).unwrap(), json!(false));
        assert_eq!(serde_json::to_value(ParamValue::from(2i64)).unwrap(), json!(2));
        assert_eq!(serde_json::to_value(ParamValue::from(1.5f64)).unwrap(), json!(1.5));
        assert_eq!(serde_json::to_value(ParamValue::from(vec![1i64, 2])).unwrap(), json!([1, 2]));
        assert_eq!(serde_json::to_value(ParamValue::from(DType::Float)).unwrap(), json!("TL_FLOAT"));
        assert_eq!(
            serde_json::to_value(ParamValue::Dims(vec![None, Some(3)])).unwrap(),
            json!([null, 3])
        );
    }

    #[test]
    fn model_json_has_ops_key() {
        let model = Model { ops: vec![adder()] };
        let value: serde_json::Value = serde_json::from_str(&model.to_json().unwrap()).unwrap();
        assert_eq!(value["ops"][0]["name"], "elew0");
    }
}
