//! Error types for the invio-core library.

use thiserror::Error;

/// Main error type for the invio library.
#[derive(Error, Debug)]
pub enum InvioError {
    /// The request contained no image files.
    #[error("no image files in request")]
    NoInput,

    /// Document classification error.
    #[error("classification error: {0}")]
    Classify(#[from] ClassifyError),

    /// Region detection error.
    #[error("detection error: {0}")]
    Detect(#[from] DetectError),

    /// Text recognition error.
    #[error("recognition error: {0}")]
    Recognize(#[from] RecognizeError),

    /// Inference error from the inference layer.
    #[error("inference error: {0}")]
    Inference(#[from] invio_inference::InferenceError),

    /// Image decoding or encoding error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised while classifying a document.
#[derive(Error, Debug)]
pub enum ClassifyError {
    /// Full-page transcript pass failed.
    #[error("transcript failed: {0}")]
    Transcript(String),

    /// Embedding the transcript failed.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Scoring the embedding failed.
    #[error("scoring failed: {0}")]
    Scoring(String),
}

/// Errors raised while detecting field regions.
#[derive(Error, Debug)]
pub enum DetectError {
    /// Failed to load the detection model.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Detection inference failed.
    #[error("detection failed: {0}")]
    Inference(String),

    /// The model produced an output the adapter cannot interpret.
    #[error("invalid detector output: {0}")]
    InvalidOutput(String),
}

/// Errors raised while recognizing text in a crop.
#[derive(Error, Debug)]
pub enum RecognizeError {
    /// Failed to load the recognition model or its dictionary.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Crop preprocessing failed.
    #[error("preprocessing failed: {0}")]
    Preprocessing(String),

    /// Recognition inference failed.
    #[error("recognition failed: {0}")]
    Inference(String),

    /// The model produced an output the decoder cannot interpret.
    #[error("invalid recognizer output: {0}")]
    InvalidOutput(String),
}

/// Result type for the invio library.
pub type Result<T> = std::result::Result<T, InvioError>;
