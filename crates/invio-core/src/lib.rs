//! Invoice understanding pipeline.
//!
//! Takes uploaded document images through classification (invoice or not),
//! field region detection, text recognition and value normalization, and
//! stores display-sized originals plus annotated prediction images.
//!
//! Model inference runs through the [`invio_inference`] backend abstraction;
//! every model-backed stage also has a trait seam so callers and tests can
//! swap implementations.

pub mod classify;
pub mod config;
pub mod detect;
pub mod error;
pub mod fields;
pub mod lines;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod recognize;

pub use classify::{
    ClassificationResult, Classifier, DocumentClassifier, InvoiceScorer, TextEmbedder,
    TranscriptReader, INVOICE_THRESHOLD,
};
pub use config::PipelineConfig;
pub use detect::{retain_best, BoundingBox, DetectedRegion, RegionDetector};
pub use error::{InvioError, Result};
pub use fields::{ExtractedField, FieldLabel, FieldMap};
pub use normalize::TextNormalizer;
pub use orchestrator::{
    BatchOutcome, PredictionOutcome, Rejection, RequestOrchestrator, UploadedImage,
    REJECTION_MESSAGE,
};
pub use pipeline::FieldExtractionPipeline;
pub use recognize::{RegionTextReader, TextRecognizer};

#[cfg(feature = "native")]
pub use orchestrator::{load_orchestrator, NativeOrchestrator};
