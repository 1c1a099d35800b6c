//! ONNX → LightNet IR translation.
//!
//! The translator walks an ONNX graph in its given (topological) order and
//! re-expresses every node in the LightNet operator vocabulary, threading a
//! tensor metadata registry through the pass so converters can resolve dtypes
//! and statically known payloads of their inputs. The result is a flat
//! [`lightnet_ir::model::Model`] ready to be serialized to the textual IR.
//!
//! ```
//! let onnx = lightnet_onnx::onnx();
//! // let model = onnx.model_for_path("squeezenet.onnx")?;
//! // println!("{}", model.to_json()?);
//! ```

#[allow(unused_imports)]
#[macro_use]
extern crate log;

pub mod model;
pub mod ops;
pub mod pb {
    include!("prost/onnx.rs");
}
pub mod pb_helpers;
pub mod tensor;

pub use self::model::{Onnx, ParseResult};

/// Builds a translator with every supported operator registered.
pub fn onnx() -> Onnx {
    let mut onnx = Onnx::default();
    ops::register_all_ops(&mut onnx.op_register);
    onnx
}
