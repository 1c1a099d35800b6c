use std::fmt;
use std::str::FromStr;

use crate::{LnError, LnResult};

/// Element types of the target runtime.
///
/// `Invalid` is the "no target equivalent" sentinel: mapping into it is a
/// warning, not an error. A tensor typed `Invalid` only becomes a hard error
/// when a converter actually needs to act on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Float,
    Double,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Bool,
    Invalid,
}

impl DType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DType::Float => "TL_FLOAT",
            DType::Double => "TL_DOUBLE",
            DType::Int8 => "TL_INT8",
            DType::Int16 => "TL_INT16",
            DType::Int32 => "TL_INT32",
            DType::Int64 => "TL_INT64",
            DType::Uint8 => "TL_UINT8",
            DType::Uint16 => "TL_UINT16",
            DType::Uint32 => "TL_UINT32",
            DType::Bool => "TL_BOOL",
            DType::Invalid => "TL_DTYPE_INVALID",
        }
    }

    pub fn is_valid(&self) -> bool {
        *self != DType::Invalid
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DType::Int8
                | DType::Int16
                | DType::Int32
                | DType::Int64
                | DType::Uint8
                | DType::Uint16
                | DType::Uint32
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DType::Float | DType::Double)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DType {
    type Err = LnError;
    fn from_str(s: &str) -> LnResult<DType> {
        match s {
            "TL_FLOAT" => Ok(DType::Float),
            "TL_DOUBLE" => Ok(DType::Double),
            "TL_INT8" => Ok(DType::Int8),
            "TL_INT16" => Ok(DType::Int16),
            "TL_INT32" => Ok(DType::Int32),
            "TL_INT64" => Ok(DType::Int64),
            "TL_UINT8" => Ok(DType::Uint8),
            "TL_UINT16" => Ok(DType::Uint16),
            "TL_UINT32" => Ok(DType::Uint32),
            "TL_BOOL" => Ok(DType::Bool),
            "TL_DTYPE_INVALID" => Ok(DType::Invalid),
            _ => anyhow::bail!("Unknown dtype name {s:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_name() {
        for dt in [DType::Float, DType::Int64, DType::Bool, DType::Invalid] {
            assert_eq!(dt.as_str().parse::<DType>().unwrap(), dt);
        }
    }

    #[test]
    fn sentinel_is_not_valid() {
        assert!(DType::Float.is_valid());
        assert!(!DType::Invalid.is_valid());
    }
}
