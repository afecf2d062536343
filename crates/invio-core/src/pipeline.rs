//! Per-field extraction pipeline: crop expansion, recognition, normalization.

use std::collections::BTreeMap;

use image::{DynamicImage, GenericImageView};
use tracing::debug;

use crate::detect::DetectedRegion;
use crate::error::RecognizeError;
use crate::fields::{ExtractedField, FieldLabel, FieldMap};
use crate::normalize::TextNormalizer;
use crate::recognize::{RegionTextReader, TextRecognizer};

/// Orchestrates region → crop → recognize → normalize for one image.
///
/// Regions are independent of each other; processing order never affects the
/// result.
pub struct FieldExtractionPipeline<R: TextRecognizer> {
    reader: RegionTextReader<R>,
    normalizer: TextNormalizer,
}

impl<R: TextRecognizer> FieldExtractionPipeline<R> {
    pub fn new(recognizer: R) -> Self {
        Self {
            reader: RegionTextReader::new(recognizer),
            normalizer: TextNormalizer::new(),
        }
    }

    /// Extract all fields from the retained (one-per-label) regions.
    ///
    /// Each box is expanded by its label's margin and clamped to the image
    /// before cropping. Field confidence is the detector's region confidence
    /// rounded to two decimals.
    pub fn extract(
        &self,
        image: &DynamicImage,
        regions: &BTreeMap<FieldLabel, DetectedRegion>,
    ) -> Result<FieldMap, RecognizeError> {
        let (width, height) = image.dimensions();
        let mut fields = FieldMap::new();

        for (label, region) in regions {
            let bbox = region
                .bbox
                .expand(label.crop_margin())
                .clamp(width as f32, height as f32);

            let crop = image.crop_imm(
                bbox.x1 as u32,
                bbox.y1 as u32,
                (bbox.width() as u32).max(1),
                (bbox.height() as u32).max(1),
            );

            let raw = self.reader.read(&crop)?;
            let value = self.normalizer.normalize(&raw, *label);

            debug!(
                "Field {}: '{}' -> {:?} (confidence {:.2})",
                label, raw, value, region.confidence
            );

            fields.insert(
                *label,
                ExtractedField {
                    value,
                    confidence: round2(region.confidence),
                },
            );
        }

        Ok(fields)
    }
}

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    /// Recognizer stub returning canned text while recording crop sizes.
    struct ScriptedRecognizer {
        text: &'static str,
        crops: Arc<Mutex<Vec<(u32, u32)>>>,
    }

    impl ScriptedRecognizer {
        fn new(text: &'static str) -> (Self, Arc<Mutex<Vec<(u32, u32)>>>) {
            let crops = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    text,
                    crops: Arc::clone(&crops),
                },
                crops,
            )
        }
    }

    impl TextRecognizer for ScriptedRecognizer {
        fn recognize(&self, crop: &DynamicImage) -> Result<String, RecognizeError> {
            self.crops.lock().unwrap().push(crop.dimensions());
            Ok(self.text.to_string())
        }
    }

    fn region(label: FieldLabel, bbox: BoundingBox, confidence: f32) -> (FieldLabel, DetectedRegion) {
        (label, DetectedRegion { bbox, label, confidence })
    }

    #[test]
    fn test_margin_applied_per_label() {
        let (recognizer, crops) = ScriptedRecognizer::new("ACME");
        let pipeline = FieldExtractionPipeline::new(recognizer);

        let image = DynamicImage::new_rgb8(200, 100);
        let regions: BTreeMap<_, _> = [region(
            FieldLabel::Merchant,
            BoundingBox::new(20.0, 20.0, 60.0, 40.0),
            0.9,
        )]
        .into_iter()
        .collect();

        pipeline.extract(&image, &regions).unwrap();

        // Merchant margin is 5px on every side: 40x20 grows to 50x30.
        assert_eq!(*crops.lock().unwrap(), vec![(50, 30)]);
    }

    #[test]
    fn test_confidence_rounded_to_two_decimals() {
        let (recognizer, _crops) = ScriptedRecognizer::new("ACME");
        let pipeline = FieldExtractionPipeline::new(recognizer);

        let image = DynamicImage::new_rgb8(200, 100);
        let regions: BTreeMap<_, _> = [region(
            FieldLabel::Merchant,
            BoundingBox::new(20.0, 20.0, 60.0, 40.0),
            0.956,
        )]
        .into_iter()
        .collect();

        let fields = pipeline.extract(&image, &regions).unwrap();
        assert_eq!(fields[&FieldLabel::Merchant].confidence, 0.96);
    }

    #[test]
    fn test_unresolved_field_maps_to_null() {
        let (recognizer, _crops) = ScriptedRecognizer::new("no digits here");
        let pipeline = FieldExtractionPipeline::new(recognizer);

        let image = DynamicImage::new_rgb8(200, 100);
        let regions: BTreeMap<_, _> = [region(
            FieldLabel::Amount,
            BoundingBox::new(20.0, 20.0, 60.0, 40.0),
            0.8,
        )]
        .into_iter()
        .collect();

        let fields = pipeline.extract(&image, &regions).unwrap();
        assert_eq!(fields[&FieldLabel::Amount].value, None);
        assert_eq!(fields[&FieldLabel::Amount].confidence, 0.8);
    }

    #[test]
    fn test_absent_label_absent_from_map() {
        let (recognizer, _crops) = ScriptedRecognizer::new("ACME");
        let pipeline = FieldExtractionPipeline::new(recognizer);

        let image = DynamicImage::new_rgb8(200, 100);
        let regions: BTreeMap<_, _> = [region(
            FieldLabel::Merchant,
            BoundingBox::new(20.0, 20.0, 60.0, 40.0),
            0.9,
        )]
        .into_iter()
        .collect();

        let fields = pipeline.extract(&image, &regions).unwrap();
        assert!(fields.contains_key(&FieldLabel::Merchant));
        assert!(!fields.contains_key(&FieldLabel::Date));
        assert!(!fields.contains_key(&FieldLabel::Amount));
    }
}
