//! Data model for the LightNet operator-list IR.
//!
//! A translated model is a flat, topologically ordered sequence of operator
//! records. Each record names its formal tensor arguments and carries a list
//! of scalar/array parameters. The JSON rendering of this structure is the
//! textual IR consumed by the LightNet compiler, so its field names and value
//! typing are a compatibility contract, not a style choice.

#[macro_use]
mod macros;

/// A Smallvec instantiation with 4 embeddable values.
///
/// Used for dimension lists and op argument lists, which are almost always
/// short.
pub type TVec<T> = smallvec::SmallVec<[T; 4]>;

pub type LnError = anyhow::Error;
pub type LnResult<T> = anyhow::Result<T>;

pub mod dtype;
pub mod model;

pub mod internal {
    pub use crate::dtype::DType;
    pub use crate::model::{Model, Op, Param, ParamValue, TensorArg};
    pub use crate::{LnError, LnResult, TVec, tvec};
    pub use anyhow::{Context, anyhow, bail, ensure, format_err};
}

pub use anyhow;
