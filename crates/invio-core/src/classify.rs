//! Whole-document invoice classification.
//!
//! A full-page OCR transcript is embedded into a fixed-length vector and fed
//! to a pre-trained probabilistic scorer; the probability is compared against
//! a deliberately high threshold. Field extraction is expensive, so the
//! classifier is biased toward precision on "invoice" and accepts false
//! negatives.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ClassifyError;
use invio_inference::{InferenceBackend, InputTensor, OutputTensor};

/// Probability cutoff above which a document is treated as an invoice.
pub const INVOICE_THRESHOLD: f32 = 0.96;

/// Binary classification outcome; gates whether field extraction runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationResult {
    Invoice,
    Other,
}

/// Produces the full-page transcript used for classification.
pub trait TranscriptReader: Send + Sync {
    fn transcript(&self, image: &DynamicImage) -> Result<String, ClassifyError>;
}

/// Embeds a transcript into a fixed-length vector.
pub trait TextEmbedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ClassifyError>;
}

/// Scores an embedding, returning P(invoice) in `[0, 1]`.
pub trait InvoiceScorer: Send + Sync {
    fn score(&self, embedding: &[f32]) -> Result<f32, ClassifyError>;
}

/// Umbrella trait the orchestrator consumes.
pub trait Classifier: Send + Sync {
    fn classify(&self, image: &DynamicImage) -> Result<ClassificationResult, ClassifyError>;
}

/// Threshold-gated document classifier chaining transcript, embedding and
/// scoring. All three services are injected; tests run with stubs.
pub struct DocumentClassifier<T, E, S> {
    reader: T,
    embedder: E,
    scorer: S,
    threshold: f32,
}

impl<T, E, S> DocumentClassifier<T, E, S>
where
    T: TranscriptReader,
    E: TextEmbedder,
    S: InvoiceScorer,
{
    pub fn new(reader: T, embedder: E, scorer: S) -> Self {
        Self {
            reader,
            embedder,
            scorer,
            threshold: INVOICE_THRESHOLD,
        }
    }

    /// Override the decision threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }
}

impl<T, E, S> Classifier for DocumentClassifier<T, E, S>
where
    T: TranscriptReader,
    E: TextEmbedder,
    S: InvoiceScorer,
{
    fn classify(&self, image: &DynamicImage) -> Result<ClassificationResult, ClassifyError> {
        let transcript = self.reader.transcript(image)?;
        debug!("Transcript length: {} chars", transcript.len());

        let embedding = self.embedder.embed(&transcript)?;
        let probability = self.scorer.score(&embedding)?;

        debug!("P(invoice) = {:.4} (threshold {})", probability, self.threshold);

        // Boundary is inclusive: exactly at the threshold classifies as invoice.
        if probability >= self.threshold {
            Ok(ClassificationResult::Invoice)
        } else {
            Ok(ClassificationResult::Other)
        }
    }
}

/// Scorer over an ONNX gradient-boosted classifier exported with two output
/// classes, index 0 being "invoice".
pub struct OnnxInvoiceScorer<B: InferenceBackend> {
    backend: B,
}

impl<B: InferenceBackend> OnnxInvoiceScorer<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

impl<B: InferenceBackend> InvoiceScorer for OnnxInvoiceScorer<B> {
    fn score(&self, embedding: &[f32]) -> Result<f32, ClassifyError> {
        let input = InputTensor::from_f32(embedding.to_vec(), &[1, embedding.len()])
            .ok_or_else(|| ClassifyError::Scoring("empty embedding".to_string()))?;

        let outputs = self
            .backend
            .run(&[("input", input)])
            .map_err(|e| ClassifyError::Scoring(e.to_string()))?;

        // Exported classifiers emit (label, probabilities); take the first
        // float output and read the invoice-class probability from it.
        let probs = outputs
            .iter()
            .find_map(|(_, tensor)| match tensor {
                OutputTensor::Float32(arr) => Some(arr),
                _ => None,
            })
            .ok_or_else(|| ClassifyError::Scoring("no probability output".to_string()))?;

        let values: Vec<f32> = probs.iter().cloned().collect();
        match values.as_slice() {
            [] => Err(ClassifyError::Scoring("empty probability output".to_string())),
            [p] => Ok(*p),
            [p_invoice, ..] => Ok(*p_invoice),
        }
    }
}

/// Sentence embedder backed by fastembed.
///
/// Stands in for the original transformer + mean-pooling embedding stage; the
/// model is loaded once and shared, with interior mutability because
/// fastembed's embed call takes `&mut self`.
#[cfg(feature = "native")]
pub struct FastembedEmbedder {
    model: std::sync::Mutex<fastembed::TextEmbedding>,
}

#[cfg(feature = "native")]
impl FastembedEmbedder {
    /// Load the default embedding model.
    pub fn new() -> Result<Self, ClassifyError> {
        Self::with_model(fastembed::EmbeddingModel::AllMiniLML6V2)
    }

    /// Load a specific fastembed model.
    pub fn with_model(model: fastembed::EmbeddingModel) -> Result<Self, ClassifyError> {
        let model = fastembed::TextEmbedding::try_new(fastembed::InitOptions::new(model))
            .map_err(|e| ClassifyError::Embedding(e.to_string()))?;

        Ok(Self {
            model: std::sync::Mutex::new(model),
        })
    }
}

#[cfg(feature = "native")]
impl TextEmbedder for FastembedEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ClassifyError> {
        let mut model = self
            .model
            .lock()
            .map_err(|e| ClassifyError::Embedding(format!("failed to lock model: {e}")))?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| ClassifyError::Embedding(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ClassifyError::Embedding("no embedding produced".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct FixedTranscript(&'static str);

    impl TranscriptReader for FixedTranscript {
        fn transcript(&self, _image: &DynamicImage) -> Result<String, ClassifyError> {
            Ok(self.0.to_string())
        }
    }

    struct HashEmbedder;

    impl TextEmbedder for HashEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, ClassifyError> {
            Ok(vec![text.len() as f32])
        }
    }

    struct FixedScorer(f32);

    impl InvoiceScorer for FixedScorer {
        fn score(&self, _embedding: &[f32]) -> Result<f32, ClassifyError> {
            Ok(self.0)
        }
    }

    fn classify_with_probability(p: f32) -> ClassificationResult {
        let classifier =
            DocumentClassifier::new(FixedTranscript("INVOICE #42"), HashEmbedder, FixedScorer(p));
        classifier.classify(&DynamicImage::new_rgb8(4, 4)).unwrap()
    }

    #[test]
    fn test_above_threshold_is_invoice() {
        assert_eq!(classify_with_probability(0.99), ClassificationResult::Invoice);
    }

    #[test]
    fn test_exact_threshold_is_invoice() {
        assert_eq!(classify_with_probability(0.96), ClassificationResult::Invoice);
    }

    #[test]
    fn test_below_threshold_is_other() {
        assert_eq!(classify_with_probability(0.9599), ClassificationResult::Other);
    }

    struct ProbsBackend {
        probs: Vec<f32>,
        names: Vec<String>,
    }

    impl InferenceBackend for ProbsBackend {
        fn run(
            &self,
            _inputs: &[(&str, InputTensor)],
        ) -> invio_inference::Result<Vec<(String, OutputTensor)>> {
            let arr = ndarray::ArrayD::from_shape_vec(
                ndarray::IxDyn(&[1, self.probs.len()]),
                self.probs.clone(),
            )
            .unwrap();
            Ok(vec![("probabilities".to_string(), OutputTensor::Float32(arr))])
        }

        fn input_names(&self) -> &[String] {
            &self.names
        }

        fn output_names(&self) -> &[String] {
            &self.names
        }
    }

    #[test]
    fn test_scorer_reads_invoice_class_probability() {
        let scorer = OnnxInvoiceScorer::new(ProbsBackend {
            probs: vec![0.97, 0.03],
            names: vec!["input".to_string()],
        });
        let p = scorer.score(&[0.1, 0.2, 0.3]).unwrap();
        assert!((p - 0.97).abs() < 1e-6);
    }
}
