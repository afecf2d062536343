//! Localized text recognition.

use std::path::Path;

use image::DynamicImage;
use ndarray::{Array4, ArrayD};
use tracing::trace;

use crate::error::RecognizeError;
use invio_inference::{InferenceBackend, InputTensor, OutputTensor};

/// Trait for text recognition models operating on a single crop.
pub trait TextRecognizer: Send + Sync {
    /// Recognize the text content of one cropped region.
    fn recognize(&self, crop: &DynamicImage) -> Result<String, RecognizeError>;
}

/// Reader for one detected region crop.
///
/// Owns the color discipline the recognition model requires: grayscale crops
/// are expanded to three channels and alpha-bearing crops have their alpha
/// channel dropped before recognition.
pub struct RegionTextReader<R: TextRecognizer> {
    recognizer: R,
}

impl<R: TextRecognizer> RegionTextReader<R> {
    pub fn new(recognizer: R) -> Self {
        Self { recognizer }
    }

    /// Read the raw text of an image crop.
    pub fn read(&self, crop: &DynamicImage) -> Result<String, RecognizeError> {
        let crop = normalize_channels(crop);
        self.recognizer.recognize(&crop)
    }
}

/// Convert a crop to 3-channel RGB.
///
/// The recognition model takes a fixed 3-channel input; single-channel and
/// 4-channel crops show up whenever the upload was grayscale or carried
/// transparency.
pub fn normalize_channels(image: &DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgb8(_) => image.clone(),
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

/// CTC text recognizer over an ONNX CRNN-style model.
///
/// Input is a `[1, 3, 48, W]` tensor normalized to `[-1, 1]`; output is a
/// `[1, T, num_classes]` logit sequence decoded greedily against the
/// character dictionary (index 0 is the CTC blank).
pub struct CtcRecognizer<B: InferenceBackend> {
    backend: B,
    dictionary: Vec<char>,
    target_height: u32,
    max_width: u32,
}

impl<B: InferenceBackend> CtcRecognizer<B> {
    pub fn new(backend: B, dictionary: Vec<char>) -> Self {
        Self {
            backend,
            dictionary,
            target_height: 48,
            max_width: 320,
        }
    }

    /// Load a character dictionary, one character per line.
    pub fn load_dictionary(path: &Path) -> Result<Vec<char>, RecognizeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RecognizeError::ModelLoad(format!("failed to load dictionary: {e}")))?;

        // First slot is the CTC blank token.
        let mut chars: Vec<char> = vec![' '];
        for line in content.lines() {
            if let Some(c) = line.chars().next() {
                chars.push(c);
            }
        }

        Ok(chars)
    }

    /// Built-in dictionary covering printed English invoices: digits, Latin
    /// letters, punctuation and currency symbols.
    pub fn default_dictionary() -> Vec<char> {
        let mut chars = vec![' ']; // CTC blank
        chars.extend('0'..='9');
        chars.extend('A'..='Z');
        chars.extend('a'..='z');
        chars.extend([
            '.', ',', ';', ':', '!', '?', '-', '_', '/', '\\', '(', ')', '#', '%', '&', '*', '+',
            '=', '\'', '"', ' ',
        ]);
        chars.extend(['$', '€', '£', '¥']);
        chars
    }

    fn preprocess(&self, crop: &DynamicImage) -> Result<InputTensor, RecognizeError> {
        let rgb = crop.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(RecognizeError::Preprocessing("empty crop".to_string()));
        }

        let aspect = width as f32 / height as f32;
        let target_width = ((self.target_height as f32 * aspect) as u32)
            .clamp(1, self.max_width);

        let resized = image::imageops::resize(
            &rgb,
            target_width,
            self.target_height,
            image::imageops::FilterType::Lanczos3,
        );

        let mut tensor = Array4::<f32>::zeros((
            1,
            3,
            self.target_height as usize,
            self.max_width as usize,
        ));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                tensor[[0, c, y as usize, x as usize]] = (value - 0.5) / 0.5;
            }
        }

        Ok(InputTensor::Float32(tensor.into_dyn()))
    }

    fn decode(&self, output: &ArrayD<f32>) -> Result<String, RecognizeError> {
        let shape = output.shape();
        if shape.len() != 3 {
            return Err(RecognizeError::InvalidOutput(format!(
                "unexpected output shape: {shape:?}"
            )));
        }

        let seq_len = shape[1];
        let num_classes = shape[2];

        let mut text = String::new();
        let mut prev_idx = 0usize;

        // Greedy CTC: argmax per timestep, drop blanks and repeats.
        for t in 0..seq_len {
            let mut max_idx = 0;
            let mut max_val = f32::NEG_INFINITY;
            for c in 0..num_classes {
                let val = output[[0, t, c]];
                if val > max_val {
                    max_val = val;
                    max_idx = c;
                }
            }

            if max_idx != 0 && max_idx != prev_idx {
                if let Some(&c) = self.dictionary.get(max_idx) {
                    text.push(c);
                }
            }
            prev_idx = max_idx;
        }

        trace!("Recognized: '{}'", text);
        Ok(text)
    }
}

impl<B: InferenceBackend> TextRecognizer for CtcRecognizer<B> {
    fn recognize(&self, crop: &DynamicImage) -> Result<String, RecognizeError> {
        let input = self.preprocess(crop)?;

        let outputs = self
            .backend
            .run(&[("x", input)])
            .map_err(|e| RecognizeError::Inference(e.to_string()))?;

        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| RecognizeError::InvalidOutput("no output from model".to_string()))?
            .1;

        match output {
            OutputTensor::Float32(arr) => self.decode(&arr),
            _ => Err(RecognizeError::InvalidOutput("unexpected output type".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct LogitsBackend {
        logits: Vec<f32>,
        shape: Vec<usize>,
        names: Vec<String>,
    }

    impl InferenceBackend for LogitsBackend {
        fn run(
            &self,
            _inputs: &[(&str, InputTensor)],
        ) -> invio_inference::Result<Vec<(String, OutputTensor)>> {
            let arr = ArrayD::from_shape_vec(ndarray::IxDyn(&self.shape), self.logits.clone())
                .unwrap();
            Ok(vec![("rec".to_string(), OutputTensor::Float32(arr))])
        }

        fn input_names(&self) -> &[String] {
            &self.names
        }

        fn output_names(&self) -> &[String] {
            &self.names
        }
    }

    #[test]
    fn test_normalize_channels_grayscale() {
        let gray = DynamicImage::new_luma8(8, 8);
        let rgb = normalize_channels(&gray);
        assert!(matches!(rgb, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn test_normalize_channels_drops_alpha() {
        let rgba = DynamicImage::new_rgba8(8, 8);
        let rgb = normalize_channels(&rgba);
        assert!(matches!(rgb, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn test_ctc_decode_drops_blanks_and_repeats() {
        // Dictionary: blank, 'a', 'b'. Timesteps argmax: a, a, blank, b.
        let backend = LogitsBackend {
            logits: vec![
                0.1, 0.8, 0.1, //
                0.1, 0.9, 0.0, //
                0.9, 0.0, 0.1, //
                0.0, 0.2, 0.8,
            ],
            shape: vec![1, 4, 3],
            names: vec!["x".to_string()],
        };

        let recognizer = CtcRecognizer::new(backend, vec![' ', 'a', 'b']);
        let crop = DynamicImage::new_rgb8(32, 16);
        assert_eq!(recognizer.recognize(&crop).unwrap(), "ab");
    }

    #[test]
    fn test_default_dictionary_contents() {
        let dict = CtcRecognizer::<LogitsBackend>::default_dictionary();
        assert!(dict.contains(&'0'));
        assert!(dict.contains(&'z'));
        assert!(dict.contains(&'$'));
        assert_eq!(dict[0], ' ');
    }
}
