//! Pipeline configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{InvioError, Result};

/// Top-level configuration for the whole prediction pipeline.
///
/// Every section has defaults, so a partial JSON file only needs to name the
/// values it overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub classify: ClassifyConfig,
    pub detect: DetectConfig,
    pub display: DisplaySize,
    pub storage: StorageConfig,
    pub models: ModelConfig,
}

/// Invoice classification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    /// Minimum invoice probability required to accept a document.
    pub threshold: f32,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            threshold: crate::classify::INVOICE_THRESHOLD,
        }
    }
}

/// Field region detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    /// Detections below this confidence are discarded.
    pub confidence_threshold: f32,
    /// Square side length the detector model expects.
    pub input_size: u32,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            input_size: 640,
        }
    }
}

/// Size stored images are resized to for display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

impl Default for DisplaySize {
    fn default() -> Self {
        Self {
            width: 500,
            height: 700,
        }
    }
}

/// Directories processed images are written to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Original uploads, resized after processing.
    pub upload_dir: PathBuf,
    /// Annotated copies of accepted invoices.
    pub predict_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("static/uploads"),
            predict_dir: PathBuf::from("static/predictions"),
        }
    }
}

/// Model file locations, all relative to `model_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model_dir: PathBuf,
    pub detector_model: String,
    pub line_model: String,
    pub recognizer_model: String,
    pub dictionary: String,
    pub scorer_model: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            detector_model: "detector.onnx".to_string(),
            line_model: "line_detector.onnx".to_string(),
            recognizer_model: "recognizer.onnx".to_string(),
            dictionary: "dictionary.txt".to_string(),
            scorer_model: "scorer.onnx".to_string(),
        }
    }
}

impl ModelConfig {
    pub fn detector_path(&self) -> PathBuf {
        self.model_dir.join(&self.detector_model)
    }

    pub fn line_path(&self) -> PathBuf {
        self.model_dir.join(&self.line_model)
    }

    pub fn recognizer_path(&self) -> PathBuf {
        self.model_dir.join(&self.recognizer_model)
    }

    pub fn dictionary_path(&self) -> PathBuf {
        self.model_dir.join(&self.dictionary)
    }

    pub fn scorer_path(&self) -> PathBuf {
        self.model_dir.join(&self.scorer_model)
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| InvioError::Config(format!("invalid config {}: {e}", path.display())))
    }

    /// Write configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| InvioError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.classify.threshold, 0.96);
        assert_eq!(config.detect.input_size, 640);
        assert_eq!(config.display.width, 500);
        assert_eq!(config.display.height, 700);
        assert_eq!(config.models.detector_model, "detector.onnx");
    }

    #[test]
    fn test_partial_override() {
        let json = r#"{"classify": {"threshold": 0.9}}"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.classify.threshold, 0.9);
        assert_eq!(config.detect.confidence_threshold, 0.25);
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = PipelineConfig::default();
        config.detect.confidence_threshold = 0.5;
        config.save(&path).unwrap();

        let loaded = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(loaded.detect.confidence_threshold, 0.5);
    }

    #[test]
    fn test_model_paths_join_model_dir() {
        let config = ModelConfig::default();
        assert_eq!(config.scorer_path(), PathBuf::from("models/scorer.onnx"));
    }
}
