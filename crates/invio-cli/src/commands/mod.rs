//! CLI subcommands.

pub mod batch;
pub mod config;
pub mod predict;

use std::path::{Path, PathBuf};

use invio_core::{PipelineConfig, UploadedImage};

/// Default config file location under the platform config directory.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("invio")
        .join("config.json")
}

/// Load configuration from an explicit path, the default location, or
/// defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<PipelineConfig> {
    if let Some(path) = config_path {
        return Ok(PipelineConfig::from_file(Path::new(path))?);
    }

    let default_path = default_config_path();
    if default_path.exists() {
        Ok(PipelineConfig::from_file(&default_path)?)
    } else {
        Ok(PipelineConfig::default())
    }
}

/// Read a file into an upload, deriving the MIME type from the extension.
pub fn read_upload(path: &Path) -> anyhow::Result<UploadedImage> {
    let filename = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", path.display()))?
        .to_string();

    Ok(UploadedImage {
        filename,
        content_type: content_type_for(path).to_string(),
        bytes: std::fs::read(path)?,
    })
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}
