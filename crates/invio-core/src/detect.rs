//! Field region detection.
//!
//! The detection model itself is a black box behind [`RegionDetector`]; the
//! consumption discipline lives here: per label only the highest-confidence
//! detection survives, and boxes are expanded and clamped before cropping.

use std::collections::BTreeMap;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DetectError;
use crate::fields::FieldLabel;

/// Axis-aligned bounding box in image pixel coordinates.
///
/// Invariant: `x1 < x2` and `y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        debug_assert!(x1 < x2 && y1 < y2, "degenerate box {x1},{y1},{x2},{y2}");
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Grow the box by `margin` pixels on every side.
    pub fn expand(&self, margin: f32) -> Self {
        Self {
            x1: self.x1 - margin,
            y1: self.y1 - margin,
            x2: self.x2 + margin,
            y2: self.y2 + margin,
        }
    }

    /// Clip the box to the image extents.
    pub fn clamp(&self, width: f32, height: f32) -> Self {
        Self {
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
            x2: self.x2.clamp(0.0, width),
            y2: self.y2.clamp(0.0, height),
        }
    }
}

/// One detection: a box, its semantic label and the model's confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedRegion {
    pub bbox: BoundingBox,
    pub label: FieldLabel,
    pub confidence: f32,
}

/// Trait for field region detectors.
///
/// Implementations wrap an object-detection model; tests use stubs.
pub trait RegionDetector: Send + Sync {
    /// Detect candidate field regions in a full document image.
    fn detect(&self, image: &DynamicImage) -> Result<Vec<DetectedRegion>, DetectError>;
}

/// Collapse duplicate labels to their max-confidence detection.
///
/// Labels with no detection are simply absent from the result; extraction for
/// those fields is skipped.
pub fn retain_best(regions: Vec<DetectedRegion>) -> BTreeMap<FieldLabel, DetectedRegion> {
    let mut best: BTreeMap<FieldLabel, DetectedRegion> = BTreeMap::new();

    for region in regions {
        match best.get(&region.label) {
            Some(kept) if kept.confidence >= region.confidence => {}
            _ => {
                best.insert(region.label, region);
            }
        }
    }

    best
}

/// Region detector backed by a single-shot ONNX detection model.
///
/// The model takes a `[1, 3, S, S]` RGB tensor (values scaled to `[0, 1]`)
/// and emits rows of `(x1, y1, x2, y2, confidence, class_id)` in input-image
/// scale relative to the square input.
pub struct OnnxRegionDetector<B: invio_inference::InferenceBackend> {
    backend: B,
    input_size: u32,
    confidence_threshold: f32,
}

impl<B: invio_inference::InferenceBackend> OnnxRegionDetector<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            input_size: 640,
            confidence_threshold: 0.25,
        }
    }

    /// Set the square model input size.
    pub fn with_input_size(mut self, size: u32) -> Self {
        self.input_size = size;
        self
    }

    /// Set the minimum confidence for a detection to be kept.
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn preprocess(&self, image: &DynamicImage) -> invio_inference::InputTensor {
        let size = self.input_size;
        let resized = image
            .resize_exact(size, size, image::imageops::FilterType::Triangle)
            .to_rgb8();

        let mut tensor =
            ndarray::Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }

        invio_inference::InputTensor::Float32(tensor.into_dyn())
    }
}

impl<B: invio_inference::InferenceBackend> RegionDetector for OnnxRegionDetector<B> {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<DetectedRegion>, DetectError> {
        let input = self.preprocess(image);

        let outputs = self
            .backend
            .run(&[("images", input)])
            .map_err(|e| DetectError::Inference(e.to_string()))?;

        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| DetectError::InvalidOutput("no output from model".to_string()))?
            .1;

        let rows = match output {
            invio_inference::OutputTensor::Float32(arr) => arr,
            _ => return Err(DetectError::InvalidOutput("unexpected output type".to_string())),
        };

        // Accept [N, 6] or batched [1, N, 6].
        let shape = rows.shape().to_vec();
        let (count, stride_ok) = match shape.as_slice() {
            [n, 6] => (*n, true),
            [1, n, 6] => (*n, true),
            _ => (0, false),
        };
        if !stride_ok {
            return Err(DetectError::InvalidOutput(format!(
                "unexpected output shape: {shape:?}"
            )));
        }

        let flat = rows
            .as_slice()
            .ok_or_else(|| DetectError::InvalidOutput("non-contiguous output".to_string()))?;

        let scale_x = image.width() as f32 / self.input_size as f32;
        let scale_y = image.height() as f32 / self.input_size as f32;

        let mut regions = Vec::new();
        for i in 0..count {
            let row = &flat[i * 6..i * 6 + 6];
            let confidence = row[4];
            if confidence < self.confidence_threshold {
                continue;
            }

            let Some(label) = FieldLabel::from_class_id(row[5] as usize) else {
                continue;
            };

            let (x1, x2) = (row[0] * scale_x, row[2] * scale_x);
            let (y1, y2) = (row[1] * scale_y, row[3] * scale_y);
            if x1 >= x2 || y1 >= y2 {
                continue;
            }

            regions.push(DetectedRegion {
                bbox: BoundingBox::new(x1, y1, x2, y2)
                    .clamp(image.width() as f32, image.height() as f32),
                label,
                confidence,
            });
        }

        debug!("Detected {} field regions", regions.len());
        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invio_inference::{InferenceBackend, InputTensor, OutputTensor};
    use pretty_assertions::assert_eq;

    fn region(label: FieldLabel, confidence: f32) -> DetectedRegion {
        DetectedRegion {
            bbox: BoundingBox::new(10.0, 10.0, 50.0, 30.0),
            label,
            confidence,
        }
    }

    #[test]
    fn test_expand_box() {
        let bbox = BoundingBox::new(10.0, 20.0, 50.0, 60.0);
        let expanded = bbox.expand(6.0);
        assert_eq!(expanded, BoundingBox::new(4.0, 14.0, 56.0, 66.0));
    }

    #[test]
    fn test_clamp_to_image() {
        let bbox = BoundingBox::new(2.0, 3.0, 90.0, 70.0).expand(5.0);
        let clamped = bbox.clamp(92.0, 72.0);
        assert_eq!(clamped, BoundingBox { x1: 0.0, y1: 0.0, x2: 92.0, y2: 72.0 });
    }

    #[test]
    fn test_retain_best_collapses_duplicates() {
        let regions = vec![
            region(FieldLabel::Date, 0.81),
            region(FieldLabel::Date, 0.95),
            region(FieldLabel::Merchant, 0.60),
        ];

        let best = retain_best(regions);
        assert_eq!(best.len(), 2);
        assert_eq!(best[&FieldLabel::Date].confidence, 0.95);
        assert_eq!(best[&FieldLabel::Merchant].confidence, 0.60);
        assert!(!best.contains_key(&FieldLabel::Amount));
    }

    #[test]
    fn test_retain_best_empty() {
        assert!(retain_best(Vec::new()).is_empty());
    }

    struct RowsBackend {
        rows: Vec<f32>,
        names: Vec<String>,
    }

    impl InferenceBackend for RowsBackend {
        fn run(
            &self,
            _inputs: &[(&str, InputTensor)],
        ) -> invio_inference::Result<Vec<(String, OutputTensor)>> {
            let n = self.rows.len() / 6;
            let arr =
                ndarray::ArrayD::from_shape_vec(ndarray::IxDyn(&[n, 6]), self.rows.clone())
                    .unwrap();
            Ok(vec![("output0".to_string(), OutputTensor::Float32(arr))])
        }

        fn input_names(&self) -> &[String] {
            &self.names
        }

        fn output_names(&self) -> &[String] {
            &self.names
        }
    }

    #[test]
    fn test_onnx_detector_maps_rows() {
        // One confident date box, one low-confidence row, one unknown class.
        let backend = RowsBackend {
            rows: vec![
                32.0, 64.0, 320.0, 128.0, 0.91, 0.0, //
                10.0, 10.0, 20.0, 20.0, 0.05, 1.0, //
                10.0, 10.0, 20.0, 20.0, 0.90, 7.0,
            ],
            names: vec!["images".to_string()],
        };

        let detector = OnnxRegionDetector::new(backend);
        let image = DynamicImage::new_rgb8(640, 640);
        let regions = detector.detect(&image).unwrap();

        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].label, FieldLabel::Date);
        assert_eq!(regions[0].bbox, BoundingBox::new(32.0, 64.0, 320.0, 128.0));
    }
}
