//! ONNX inference abstraction for invio.
//!
//! Every model the pipeline consumes (region detector, line detector, text
//! recognizer, invoice scorer) is driven through the [`InferenceBackend`]
//! trait, so the core stays testable with stub backends and the concrete
//! runtime lives in one place.

mod backend;
mod error;
mod tensor;

pub use backend::InferenceBackend;
pub use error::InferenceError;
pub use tensor::{InputTensor, OutputTensor};

#[cfg(feature = "native")]
pub use backend::ort::OrtBackend;

/// Result type for inference operations.
pub type Result<T> = std::result::Result<T, InferenceError>;
