use derive_new::new;
use lightnet_ir::internal::*;

use crate::pb::TensorProto;
use crate::pb::tensor_proto::DataType;

/// Maps an ONNX element type onto the target type enumeration.
///
/// Total over declared ONNX types: anything without a faithful target
/// counterpart maps to the `Invalid` sentinel with a warning. Mapping never
/// aborts the pass; only a converter that later needs to act on an `Invalid`
/// tensor turns this into a hard error.
pub fn dtype_of(name: &str, onnx_dtype: DataType) -> DType {
    let dt = match onnx_dtype {
        DataType::Float => DType::Float,
        DataType::Double => DType::Double,
        DataType::Int8 => DType::Int8,
        DataType::Int16 => DType::Int16,
        DataType::Int32 => DType::Int32,
        DataType::Int64 => DType::Int64,
        DataType::Uint8 => DType::Uint8,
        DataType::Uint16 => DType::Uint16,
        DataType::Uint32 => DType::Uint32,
        DataType::Bool => DType::Bool,
        DataType::Undefined
        | DataType::String
        | DataType::Float16
        | DataType::Bfloat16
        | DataType::Uint64
        | DataType::Complex64
        | DataType::Complex128 => DType::Invalid,
    };
    if dt == DType::Invalid {
        warn!(
            "Can't convert ONNX dtype {} of tensor '{}', returning {}",
            onnx_dtype.as_str_name(),
            name,
            dt
        );
    }
    dt
}

pub fn dtype_of_i32(name: &str, raw: i32) -> LnResult<DType> {
    let dt = DataType::from_i32(raw)
        .ok_or_else(|| format_err!("Integer {raw} is not a TensorProto.DataType"))?;
    Ok(dtype_of(name, dt))
}

/// A fully materialized literal tensor: dtype, shape and flat payload all
/// known at translation time.
#[derive(Debug, Clone, PartialEq, new)]
pub struct Literal {
    pub dtype: DType,
    pub dims: TVec<i64>,
    pub data: LiteralData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralData {
    Floats(Vec<f64>),
    Ints(Vec<i64>),
}

impl Literal {
    pub fn zeros(dtype: DType, dims: TVec<i64>) -> LnResult<Literal> {
        let len = dims.iter().product::<i64>().max(1) as usize;
        let data = if dtype.is_float() {
            LiteralData::Floats(vec![0.0; len])
        } else if dtype.is_integer() {
            LiteralData::Ints(vec![0; len])
        } else {
            bail!("Can't make a zero-filled tensor of dtype {dtype}")
        };
        Ok(Literal { dtype, dims, data })
    }

    pub fn len(&self) -> usize {
        match &self.data {
            LiteralData::Floats(v) => v.len(),
            LiteralData::Ints(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_ints(&self) -> LnResult<&[i64]> {
        match &self.data {
            LiteralData::Ints(v) => Ok(v),
            LiteralData::Floats(_) => bail!("Expected an integer literal, got a float one"),
        }
    }

    pub fn as_floats(&self) -> Vec<f64> {
        match &self.data {
            LiteralData::Floats(v) => v.clone(),
            LiteralData::Ints(v) => v.iter().map(|&i| i as f64).collect(),
        }
    }
}

impl From<&LiteralData> for ParamValue {
    fn from(data: &LiteralData) -> ParamValue {
        match data {
            LiteralData::Floats(v) => ParamValue::Floats(v.clone()),
            LiteralData::Ints(v) => ParamValue::Ints(v.clone()),
        }
    }
}

fn raw_chunks<const W: usize>(raw: &[u8]) -> LnResult<impl Iterator<Item = [u8; W]> + '_> {
    ensure!(
        raw.len() % W == 0,
        "Raw tensor data length {} is not a multiple of the element width {W}",
        raw.len()
    );
    Ok(raw.chunks_exact(W).map(|c| c.try_into().unwrap()))
}

/// Materializes a TensorProto payload, flattening it to a numeric vector.
///
/// ONNX stores values either in the per-type packed fields or in little
/// endian `raw_data`; both forms are accepted.
pub fn literal_of(t: &TensorProto) -> LnResult<Literal> {
    let onnx_dtype = DataType::from_i32(t.data_type)
        .ok_or_else(|| format_err!("Integer {} is not a TensorProto.DataType", t.data_type))?;
    let dtype = dtype_of(&t.name, onnx_dtype);
    if !dtype.is_valid() {
        bail!(
            "Can't materialize tensor '{}' of unsupported ONNX dtype {}",
            t.name,
            onnx_dtype.as_str_name()
        );
    }
    let data = match onnx_dtype {
        DataType::Float => {
            if t.float_data.is_empty() && !t.raw_data.is_empty() {
                LiteralData::Floats(
                    raw_chunks::<4>(&t.raw_data)?.map(|c| f32::from_le_bytes(c) as f64).collect(),
                )
            } else {
                LiteralData::Floats(t.float_data.iter().map(|&f| f as f64).collect())
            }
        }
        DataType::Double => {
            if t.double_data.is_empty() && !t.raw_data.is_empty() {
                LiteralData::Floats(raw_chunks::<8>(&t.raw_data)?.map(f64::from_le_bytes).collect())
            } else {
                LiteralData::Floats(t.double_data.clone())
            }
        }
        DataType::Int64 => {
            if t.int64_data.is_empty() && !t.raw_data.is_empty() {
                LiteralData::Ints(raw_chunks::<8>(&t.raw_data)?.map(i64::from_le_bytes).collect())
            } else {
                LiteralData::Ints(t.int64_data.clone())
            }
        }
        DataType::Int32 => {
            if t.int32_data.is_empty() && !t.raw_data.is_empty() {
                LiteralData::Ints(
                    raw_chunks::<4>(&t.raw_data)?.map(|c| i32::from_le_bytes(c) as i64).collect(),
                )
            } else {
                LiteralData::Ints(t.int32_data.iter().map(|&i| i as i64).collect())
            }
        }
        DataType::Int16 => ints_from_narrow(t, 2, |c| i16::from_le_bytes([c[0], c[1]]) as i64)?,
        DataType::Int8 => ints_from_narrow(t, 1, |c| c[0] as i8 as i64)?,
        DataType::Uint16 => ints_from_narrow(t, 2, |c| u16::from_le_bytes([c[0], c[1]]) as i64)?,
        DataType::Uint8 => ints_from_narrow(t, 1, |c| c[0] as i64)?,
        DataType::Bool => ints_from_narrow(t, 1, |c| (c[0] != 0) as i64)?,
        DataType::Uint32 => {
            if t.uint64_data.is_empty() && !t.raw_data.is_empty() {
                LiteralData::Ints(
                    raw_chunks::<4>(&t.raw_data)?.map(|c| u32::from_le_bytes(c) as i64).collect(),
                )
            } else {
                LiteralData::Ints(t.uint64_data.iter().map(|&i| i as i64).collect())
            }
        }
        _ => unreachable!("dtype validity checked above"),
    };
    let literal = Literal { dtype, dims: t.dims.iter().copied().collect(), data };
    let expected = literal.dims.iter().product::<i64>().max(1) as usize;
    ensure!(
        literal.len() == expected,
        "Tensor '{}' claims {:?} dims ({} elements) but carries {} values",
        t.name,
        literal.dims,
        expected,
        literal.len()
    );
    Ok(literal)
}

// int32_data doubles as the storage field for every sub-32-bit integer type
fn ints_from_narrow(
    t: &TensorProto,
    width: usize,
    decode: impl Fn(&[u8]) -> i64,
) -> LnResult<LiteralData> {
    if t.int32_data.is_empty() && !t.raw_data.is_empty() {
        ensure!(
            t.raw_data.len() % width == 0,
            "Raw tensor data length {} is not a multiple of the element width {width}",
            t.raw_data.len()
        );
        Ok(LiteralData::Ints(t.raw_data.chunks_exact(width).map(decode).collect()))
    } else {
        Ok(LiteralData::Ints(t.int32_data.iter().map(|&i| i as i64).collect()))
    }
}
