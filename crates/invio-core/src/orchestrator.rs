//! Request-level orchestration: classify, detect, extract, store.

use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, Rgb};
use serde::Serialize;
use tracing::{debug, info};

use crate::classify::{ClassificationResult, Classifier};
use crate::config::{DisplaySize, StorageConfig};
use crate::detect::{retain_best, DetectedRegion, RegionDetector};
use crate::error::{InvioError, Result};
use crate::fields::{FieldLabel, FieldMap};
use crate::pipeline::FieldExtractionPipeline;
use crate::recognize::TextRecognizer;

/// Message returned for documents scored below the invoice threshold.
pub const REJECTION_MESSAGE: &str = "This is not an Invoice!!";

/// One file received in a prediction request.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    /// Non-image uploads are silently dropped from a request.
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

/// Outcome of processing one upload.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PredictionOutcome {
    Invoice { image_id: String, fields: FieldMap },
    Other { filename: String, message: String },
}

/// Rejected upload within a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub filename: String,
    pub message: String,
}

/// Aggregated batch result, accepted and rejected uploads kept in request
/// order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub image_ids: Vec<String>,
    pub fields: Vec<FieldMap>,
    pub rejected: Vec<Rejection>,
}

impl BatchOutcome {
    pub fn from_outcomes(outcomes: Vec<PredictionOutcome>) -> Self {
        let mut batch = Self::default();
        for outcome in outcomes {
            match outcome {
                PredictionOutcome::Invoice { image_id, fields } => {
                    batch.image_ids.push(image_id);
                    batch.fields.push(fields);
                }
                PredictionOutcome::Other { filename, message } => {
                    batch.rejected.push(Rejection { filename, message });
                }
            }
        }
        batch
    }
}

/// End-to-end processor for prediction requests.
///
/// Generic over the three model-backed services so tests can substitute
/// stubs for each seam independently.
pub struct RequestOrchestrator<C, D, R>
where
    C: Classifier,
    D: RegionDetector,
    R: TextRecognizer,
{
    classifier: C,
    detector: D,
    pipeline: FieldExtractionPipeline<R>,
    storage: StorageConfig,
    display: DisplaySize,
}

impl<C, D, R> RequestOrchestrator<C, D, R>
where
    C: Classifier,
    D: RegionDetector,
    R: TextRecognizer,
{
    pub fn new(classifier: C, detector: D, recognizer: R, storage: StorageConfig) -> Self {
        Self {
            classifier,
            detector,
            pipeline: FieldExtractionPipeline::new(recognizer),
            storage,
            display: DisplaySize::default(),
        }
    }

    pub fn with_display(mut self, display: DisplaySize) -> Self {
        self.display = display;
        self
    }

    /// Process one upload end to end.
    ///
    /// The original is stored under the upload directory. Accepted invoices
    /// additionally get an annotated copy under the prediction directory;
    /// both stored images end up resized to the display size.
    pub fn process(&self, upload: &UploadedImage) -> Result<PredictionOutcome> {
        let image = image::load_from_memory(&upload.bytes)?;

        std::fs::create_dir_all(&self.storage.upload_dir)?;
        let upload_path = self.storage.upload_dir.join(&upload.filename);
        std::fs::write(&upload_path, &upload.bytes)?;

        let classification = self.classifier.classify(&image)?;
        debug!("Classified '{}' as {:?}", upload.filename, classification);

        if classification == ClassificationResult::Other {
            self.save_resized(&image, &upload_path)?;
            return Ok(PredictionOutcome::Other {
                filename: upload.filename.clone(),
                message: REJECTION_MESSAGE.to_string(),
            });
        }

        let regions = retain_best(self.detector.detect(&image)?);
        info!(
            "Detected {} field region(s) in '{}'",
            regions.len(),
            upload.filename
        );

        let image_id = self.save_annotated(&image, &regions, &upload.filename)?;
        let fields = self.pipeline.extract(&image, &regions)?;
        self.save_resized(&image, &upload_path)?;

        Ok(PredictionOutcome::Invoice { image_id, fields })
    }

    /// Process a whole request worth of uploads.
    ///
    /// Non-image files are skipped; a request with no image files at all is
    /// an error. Any single failing image fails the whole batch.
    pub fn process_batch(&self, uploads: &[UploadedImage]) -> Result<BatchOutcome> {
        let images: Vec<&UploadedImage> = uploads.iter().filter(|u| u.is_image()).collect();
        if images.is_empty() {
            return Err(InvioError::NoInput);
        }

        let mut outcomes = Vec::with_capacity(images.len());
        for upload in images {
            outcomes.push(self.process(upload)?);
        }

        Ok(BatchOutcome::from_outcomes(outcomes))
    }

    fn save_resized(&self, image: &DynamicImage, path: &Path) -> Result<()> {
        let resized = image.resize_exact(self.display.width, self.display.height, FilterType::Triangle);
        resized.save(path)?;
        Ok(())
    }

    /// Draw retained regions onto a copy of the image and store it as the
    /// prediction artifact. Returns the stored file name.
    fn save_annotated(
        &self,
        image: &DynamicImage,
        regions: &std::collections::BTreeMap<FieldLabel, DetectedRegion>,
        filename: &str,
    ) -> Result<String> {
        let mut canvas = image.to_rgb8();
        let (canvas_w, canvas_h) = (canvas.width() as f32, canvas.height() as f32);
        for (label, region) in regions {
            draw_outline(&mut canvas, &region.bbox.clamp(canvas_w, canvas_h), label_color(*label));
        }

        std::fs::create_dir_all(&self.storage.predict_dir)?;
        let stem = Path::new(filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename);
        let image_id = format!("{stem}.jpg");

        let annotated = DynamicImage::ImageRgb8(canvas).resize_exact(
            self.display.width,
            self.display.height,
            FilterType::Triangle,
        );
        annotated.save(self.storage.predict_dir.join(&image_id))?;

        Ok(image_id)
    }
}

fn label_color(label: FieldLabel) -> Rgb<u8> {
    match label {
        FieldLabel::Merchant => Rgb([220, 40, 40]),
        FieldLabel::Date => Rgb([40, 160, 40]),
        FieldLabel::Amount => Rgb([40, 60, 220]),
    }
}

/// Draw a 2px rectangle outline, clipped to the image.
fn draw_outline(canvas: &mut image::RgbImage, bbox: &crate::detect::BoundingBox, color: Rgb<u8>) {
    let (w, h) = canvas.dimensions();
    let x1 = bbox.x1 as u32;
    let y1 = bbox.y1 as u32;
    let x2 = (bbox.x2 as u32).min(w.saturating_sub(1));
    let y2 = (bbox.y2 as u32).min(h.saturating_sub(1));

    for t in 0..2u32 {
        for x in x1..=x2 {
            if y1 + t <= y2 {
                canvas.put_pixel(x, y1 + t, color);
            }
            if y2 >= t && y2 - t >= y1 {
                canvas.put_pixel(x, y2 - t, color);
            }
        }
        for y in y1..=y2 {
            if x1 + t <= x2 {
                canvas.put_pixel(x1 + t, y, color);
            }
            if x2 >= t && x2 - t >= x1 {
                canvas.put_pixel(x2 - t, y, color);
            }
        }
    }
}

#[cfg(feature = "native")]
mod native {
    use super::*;
    use crate::classify::{DocumentClassifier, FastembedEmbedder, OnnxInvoiceScorer};
    use crate::config::PipelineConfig;
    use crate::detect::OnnxRegionDetector;
    use crate::lines::{LineDetector, PageTranscriber};
    use crate::recognize::CtcRecognizer;
    use invio_inference::OrtBackend;

    /// Fully wired orchestrator running every model through ONNX Runtime.
    pub type NativeOrchestrator = RequestOrchestrator<
        DocumentClassifier<
            PageTranscriber<OrtBackend, CtcRecognizer<OrtBackend>>,
            FastembedEmbedder,
            OnnxInvoiceScorer<OrtBackend>,
        >,
        OnnxRegionDetector<OrtBackend>,
        CtcRecognizer<OrtBackend>,
    >;

    /// Load every model named in the configuration and wire the full
    /// pipeline.
    pub fn load_orchestrator(config: &PipelineConfig) -> Result<NativeOrchestrator> {
        let models = &config.models;

        let dictionary = CtcRecognizer::<OrtBackend>::load_dictionary(&models.dictionary_path())
            .map_err(InvioError::Recognize)?;

        let line_recognizer = CtcRecognizer::new(
            OrtBackend::from_file(&models.recognizer_path())?,
            dictionary.clone(),
        );
        let transcriber = PageTranscriber::new(
            LineDetector::new(OrtBackend::from_file(&models.line_path())?),
            line_recognizer,
        );

        let classifier = DocumentClassifier::new(
            transcriber,
            FastembedEmbedder::new().map_err(InvioError::Classify)?,
            OnnxInvoiceScorer::new(OrtBackend::from_file(&models.scorer_path())?),
        )
        .with_threshold(config.classify.threshold);

        let detector = OnnxRegionDetector::new(OrtBackend::from_file(&models.detector_path())?)
            .with_input_size(config.detect.input_size)
            .with_confidence_threshold(config.detect.confidence_threshold);

        let field_recognizer =
            CtcRecognizer::new(OrtBackend::from_file(&models.recognizer_path())?, dictionary);

        Ok(
            RequestOrchestrator::new(classifier, detector, field_recognizer, config.storage.clone())
                .with_display(config.display),
        )
    }
}

#[cfg(feature = "native")]
pub use native::{load_orchestrator, NativeOrchestrator};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use crate::error::{ClassifyError, DetectError, RecognizeError};
    use image::GenericImageView;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;
    use std::result::Result;

    /// Accepts wide images as invoices, rejects narrow ones.
    struct WidthClassifier;

    impl Classifier for WidthClassifier {
        fn classify(&self, image: &DynamicImage) -> Result<ClassificationResult, ClassifyError> {
            if image.width() >= 100 {
                Ok(ClassificationResult::Invoice)
            } else {
                Ok(ClassificationResult::Other)
            }
        }
    }

    struct FixedDetector;

    impl RegionDetector for FixedDetector {
        fn detect(&self, _image: &DynamicImage) -> Result<Vec<DetectedRegion>, DetectError> {
            Ok(vec![DetectedRegion {
                bbox: BoundingBox::new(10.0, 10.0, 60.0, 30.0),
                label: FieldLabel::Merchant,
                confidence: 0.9,
            }])
        }
    }

    struct FixedRecognizer(&'static str);

    impl TextRecognizer for FixedRecognizer {
        fn recognize(&self, _crop: &DynamicImage) -> Result<String, RecognizeError> {
            Ok(self.0.to_string())
        }
    }

    fn png_upload(filename: &str, width: u32, height: u32) -> UploadedImage {
        let image = DynamicImage::new_rgb8(width, height);
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        UploadedImage {
            filename: filename.to_string(),
            content_type: "image/png".to_string(),
            bytes,
        }
    }

    fn orchestrator(
        dir: &Path,
    ) -> RequestOrchestrator<WidthClassifier, FixedDetector, FixedRecognizer> {
        let storage = StorageConfig {
            upload_dir: dir.join("uploads"),
            predict_dir: dir.join("predictions"),
        };
        RequestOrchestrator::new(WidthClassifier, FixedDetector, FixedRecognizer("ACME"), storage)
    }

    #[test]
    fn test_batch_partitions_in_request_order() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());

        let uploads = vec![
            png_upload("a.png", 200, 300),
            png_upload("b.png", 40, 40),
            png_upload("c.png", 200, 300),
        ];

        let batch = orchestrator.process_batch(&uploads).unwrap();
        assert_eq!(batch.image_ids, vec!["a.jpg", "c.jpg"]);
        assert_eq!(batch.fields.len(), 2);
        assert_eq!(
            batch.rejected,
            vec![Rejection {
                filename: "b.png".to_string(),
                message: REJECTION_MESSAGE.to_string(),
            }]
        );
    }

    #[test]
    fn test_batch_skips_non_images_and_errors_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());

        let uploads = vec![UploadedImage {
            filename: "notes.txt".to_string(),
            content_type: "text/plain".to_string(),
            bytes: b"hello".to_vec(),
        }];

        let err = orchestrator.process_batch(&uploads).unwrap_err();
        assert!(matches!(err, InvioError::NoInput));
    }

    #[test]
    fn test_accepted_invoice_stores_annotated_copy() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());

        let outcome = orchestrator.process(&png_upload("inv.png", 200, 300)).unwrap();
        let PredictionOutcome::Invoice { image_id, fields } = outcome else {
            panic!("expected invoice outcome");
        };

        assert_eq!(image_id, "inv.jpg");
        assert_eq!(fields[&FieldLabel::Merchant].value.as_deref(), Some("ACME"));

        let annotated = image::open(dir.path().join("predictions/inv.jpg")).unwrap();
        assert_eq!(annotated.dimensions(), (500, 700));
    }

    #[test]
    fn test_rejected_upload_resized_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());

        let outcome = orchestrator.process(&png_upload("doc.png", 40, 40)).unwrap();
        let PredictionOutcome::Other { filename, message } = outcome else {
            panic!("expected rejection");
        };

        assert_eq!(filename, "doc.png");
        assert_eq!(message, REJECTION_MESSAGE);

        let stored = image::open(dir.path().join("uploads/doc.png")).unwrap();
        assert_eq!(stored.dimensions(), (500, 700));
        assert!(!dir.path().join("predictions").exists());
    }
}
