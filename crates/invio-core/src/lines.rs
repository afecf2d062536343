//! Text-line detection for the full-page transcript pass.

use image::{DynamicImage, GenericImageView};
use ndarray::{Array4, ArrayD};
use tracing::debug;

use crate::error::{ClassifyError, RecognizeError};
use crate::classify::TranscriptReader;
use crate::recognize::{RegionTextReader, TextRecognizer};
use invio_inference::{InferenceBackend, InputTensor, OutputTensor};

/// Text-line detector over a DB-style segmentation model.
///
/// The model emits a `[1, 1, H, W]` probability map; connected high-probability
/// components become axis-aligned line boxes.
pub struct LineDetector<B: InferenceBackend> {
    backend: B,
    threshold: f32,
    box_threshold: f32,
    unclip_ratio: f32,
    target_size: u32,
}

/// A detected text line in original image coordinates.
#[derive(Debug, Clone, Copy)]
pub struct LineBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl<B: InferenceBackend> LineDetector<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            threshold: 0.3,
            box_threshold: 0.6,
            unclip_ratio: 1.5,
            target_size: 960,
        }
    }

    /// Set the binarization threshold for the probability map.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Detect text lines, sorted in reading order (top-to-bottom, then
    /// left-to-right within a row).
    pub fn detect_lines(&self, image: &DynamicImage) -> Result<Vec<LineBox>, RecognizeError> {
        let (tensor, scale_x, scale_y) = self.preprocess(image)?;

        let outputs = self
            .backend
            .run(&[("x", tensor)])
            .map_err(|e| RecognizeError::Inference(e.to_string()))?;

        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| RecognizeError::InvalidOutput("no output from model".to_string()))?
            .1;

        let prob_map = match output {
            OutputTensor::Float32(arr) => arr,
            _ => return Err(RecognizeError::InvalidOutput("unexpected output type".to_string())),
        };

        let mut boxes = self.boxes_from_map(&prob_map, scale_x, scale_y, image.dimensions())?;

        // Reading order: bucket rows by 20px of vertical position.
        boxes.sort_by(|a, b| {
            let row_a = (a.y1 / 20.0) as i32;
            let row_b = (b.y1 / 20.0) as i32;
            row_a
                .cmp(&row_b)
                .then(a.x1.partial_cmp(&b.x1).unwrap_or(std::cmp::Ordering::Equal))
        });

        debug!("Detected {} text lines", boxes.len());
        Ok(boxes)
    }

    fn preprocess(
        &self,
        image: &DynamicImage,
    ) -> Result<(InputTensor, f32, f32), RecognizeError> {
        let (orig_w, orig_h) = image.dimensions();
        if orig_w == 0 || orig_h == 0 {
            return Err(RecognizeError::Preprocessing("empty image".to_string()));
        }

        let max_dim = orig_w.max(orig_h);
        let (new_w, new_h) = if max_dim <= self.target_size {
            (orig_w, orig_h)
        } else {
            let scale = self.target_size as f32 / max_dim as f32;
            (
                ((orig_w as f32 * scale) as u32).max(1),
                ((orig_h as f32 * scale) as u32).max(1),
            )
        };

        // Model input must be divisible by 32.
        let pad_w = new_w.div_ceil(32) * 32;
        let pad_h = new_h.div_ceil(32) * 32;

        let rgb = image
            .resize_exact(new_w, new_h, image::imageops::FilterType::Lanczos3)
            .to_rgb8();

        let mean = [0.485f32, 0.456, 0.406];
        let std = [0.229f32, 0.224, 0.225];

        let mut tensor = Array4::<f32>::zeros((1, 3, pad_h as usize, pad_w as usize));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                tensor[[0, c, y as usize, x as usize]] = (value - mean[c]) / std[c];
            }
        }

        let scale_x = new_w as f32 / orig_w as f32;
        let scale_y = new_h as f32 / orig_h as f32;

        Ok((InputTensor::Float32(tensor.into_dyn()), scale_x, scale_y))
    }

    fn boxes_from_map(
        &self,
        output: &ArrayD<f32>,
        scale_x: f32,
        scale_y: f32,
        orig_size: (u32, u32),
    ) -> Result<Vec<LineBox>, RecognizeError> {
        let shape = output.shape();
        if shape.len() < 4 {
            return Err(RecognizeError::InvalidOutput(format!(
                "unexpected map shape: {shape:?}"
            )));
        }

        let height = shape[2];
        let width = shape[3];

        let mut visited = vec![false; width * height];
        let mut boxes = Vec::new();

        for start_y in 0..height {
            for start_x in 0..width {
                let idx = start_y * width + start_x;
                if visited[idx] || output[[0, 0, start_y, start_x]] <= self.threshold {
                    continue;
                }

                // Flood-fill one connected component.
                let mut stack = vec![(start_x, start_y)];
                let (mut min_x, mut max_x) = (start_x, start_x);
                let (mut min_y, mut max_y) = (start_y, start_y);
                let mut score_sum = 0.0f32;
                let mut count = 0usize;

                while let Some((x, y)) = stack.pop() {
                    let idx = y * width + x;
                    if visited[idx] || output[[0, 0, y, x]] <= self.threshold {
                        continue;
                    }
                    visited[idx] = true;

                    min_x = min_x.min(x);
                    max_x = max_x.max(x);
                    min_y = min_y.min(y);
                    max_y = max_y.max(y);
                    score_sum += output[[0, 0, y, x]];
                    count += 1;

                    if x > 0 {
                        stack.push((x - 1, y));
                    }
                    if x + 1 < width {
                        stack.push((x + 1, y));
                    }
                    if y > 0 {
                        stack.push((x, y - 1));
                    }
                    if y + 1 < height {
                        stack.push((x, y + 1));
                    }
                }

                if count < 10 {
                    continue;
                }
                let avg_score = score_sum / count as f32;
                if avg_score < self.box_threshold {
                    continue;
                }

                // Unclip: segmentation shrinks text, expand back out.
                let w = (max_x - min_x) as f32;
                let h = (max_y - min_y) as f32;
                let dx = w * (self.unclip_ratio - 1.0) / 2.0;
                let dy = h * (self.unclip_ratio - 1.0) / 2.0;

                let x1 = ((min_x as f32 - dx) / scale_x).max(0.0);
                let y1 = ((min_y as f32 - dy) / scale_y).max(0.0);
                let x2 = ((max_x as f32 + dx) / scale_x).min(orig_size.0 as f32);
                let y2 = ((max_y as f32 + dy) / scale_y).min(orig_size.1 as f32);

                if x2 > x1 && y2 > y1 {
                    boxes.push(LineBox { x1, y1, x2, y2 });
                }
            }
        }

        Ok(boxes)
    }
}

/// Transcript reader combining line detection with region recognition.
///
/// The transcript is all recognized lines space-joined in reading order; it
/// feeds whole-document classification only and is never shown to users.
pub struct PageTranscriber<B: InferenceBackend, R: TextRecognizer> {
    lines: LineDetector<B>,
    reader: RegionTextReader<R>,
}

impl<B: InferenceBackend, R: TextRecognizer> PageTranscriber<B, R> {
    pub fn new(lines: LineDetector<B>, recognizer: R) -> Self {
        Self {
            lines,
            reader: RegionTextReader::new(recognizer),
        }
    }
}

impl<B: InferenceBackend, R: TextRecognizer> TranscriptReader for PageTranscriber<B, R> {
    fn transcript(&self, image: &DynamicImage) -> Result<String, ClassifyError> {
        let boxes = self
            .lines
            .detect_lines(image)
            .map_err(|e| ClassifyError::Transcript(e.to_string()))?;

        let mut parts = Vec::with_capacity(boxes.len());
        for line in boxes {
            let width = ((line.x2 - line.x1) as u32).max(1);
            let height = ((line.y2 - line.y1) as u32).max(1);
            let crop = image.crop_imm(line.x1 as u32, line.y1 as u32, width, height);

            let text = self
                .reader
                .read(&crop)
                .map_err(|e| ClassifyError::Transcript(e.to_string()))?;
            if !text.is_empty() {
                parts.push(text);
            }
        }

        Ok(parts.join(" "))
    }
}
