//! Inference backend implementations.

#[cfg(feature = "native")]
pub mod ort;

use crate::{InputTensor, OutputTensor, Result};

/// Trait for ONNX inference backends.
///
/// Model adapters in invio-core are generic over this trait; production code
/// plugs in [`crate::OrtBackend`], tests plug in canned-output stubs.
pub trait InferenceBackend: Send + Sync {
    /// Run inference with the given named input tensors, returning named
    /// output tensors in the model's declared output order.
    fn run(&self, inputs: &[(&str, InputTensor)]) -> Result<Vec<(String, OutputTensor)>>;

    /// Get the input names expected by the model.
    fn input_names(&self) -> &[String];

    /// Get the output names produced by the model.
    fn output_names(&self) -> &[String];
}
