//! Model directory loading
//!
//! A model directory follows the HuggingFace ONNX export layout:
//!
//! ```text
//! segformer_b2_clothes/
//! ├── config.json               (optional, provides id2label)
//! ├── preprocessor_config.json  (optional, provides size/mean/std)
//! └── onnx/
//!     ├── model.onnx            (fp32)
//!     └── model_fp16.onnx       (fp16, optional)
//! ```
//!
//! A bare `model.onnx` at the directory root is accepted as an fp32 variant.

use crate::error::{Result, SegLabelError};
use crate::taxonomy::LabelTaxonomy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Location and variant of the segmentation model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub path: PathBuf,
    pub variant: Option<String>,
}

impl ModelSpec {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            variant: None,
        }
    }

    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        let name = self
            .path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        match &self.variant {
            Some(variant) => format!("{name}:{variant}"),
            None => name,
        }
    }
}

/// Model information and metadata
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub precision: String,
    pub size_bytes: usize,
    pub input_shape: (usize, usize, usize, usize), // NCHW format
    pub num_labels: usize,
}

/// Image preprocessing parameters expected by the model
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Target size as [height, width]
    pub target_size: [u32; 2],
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        // SegformerImageProcessor defaults
        Self {
            target_size: [512, 512],
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
        }
    }
}

impl PreprocessingConfig {
    /// Read `size`, `image_mean` and `image_std` from a HuggingFace
    /// `preprocessor_config.json`, keeping defaults for absent keys
    ///
    /// # Errors
    /// - Present keys with the wrong shape or non-positive values
    pub fn from_hf_preprocessor(config: &serde_json::Value) -> Result<Self> {
        let mut result = Self::default();

        match config.get("size") {
            Some(serde_json::Value::Object(size)) => {
                let dim = |key: &str| -> Result<u32> {
                    size.get(key)
                        .and_then(serde_json::Value::as_u64)
                        .and_then(|v| u32::try_from(v).ok())
                        .filter(|v| *v > 0)
                        .ok_or_else(|| {
                            SegLabelError::model(format!("invalid size.{key} in preprocessor_config.json"))
                        })
                };
                result.target_size = [dim("height")?, dim("width")?];
            },
            Some(value) => {
                let edge = value
                    .as_u64()
                    .and_then(|v| u32::try_from(v).ok())
                    .filter(|v| *v > 0)
                    .ok_or_else(|| SegLabelError::model("invalid size in preprocessor_config.json"))?;
                result.target_size = [edge, edge];
            },
            None => {},
        }

        if let Some(mean) = config.get("image_mean") {
            result.normalization_mean = Self::parse_triplet(mean, "image_mean")?;
        }
        if let Some(std) = config.get("image_std") {
            result.normalization_std = Self::parse_triplet(std, "image_std")?;
            if result.normalization_std.iter().any(|s| *s <= 0.0) {
                return Err(SegLabelError::model("image_std values must be positive"));
            }
        }

        Ok(result)
    }

    fn parse_triplet(value: &serde_json::Value, key: &str) -> Result<[f32; 3]> {
        let values: Vec<f32> = value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(serde_json::Value::as_f64)
                    .map(|v| v as f32)
                    .collect()
            })
            .unwrap_or_default();
        <[f32; 3]>::try_from(values.as_slice())
            .map_err(|_| SegLabelError::model(format!("{key} must hold three numbers")))
    }
}

/// Model manager for a local model directory
#[derive(Debug)]
pub struct ModelManager {
    model_path: PathBuf,
    model_file: PathBuf,
    variant: String,
    model_config: Option<serde_json::Value>,
    preprocessor_config: Option<serde_json::Value>,
}

impl ModelManager {
    /// Create a model manager from a model specification
    ///
    /// # Errors
    /// - Model path does not exist or is not a directory
    /// - No ONNX file for the requested (or any) variant
    /// - Unreadable or unparsable JSON configuration files
    pub fn from_spec(spec: &ModelSpec) -> Result<Self> {
        let model_path = spec.path.clone();

        if !model_path.exists() {
            return Err(SegLabelError::invalid_config(format!(
                "Model path does not exist: {}",
                model_path.display()
            )));
        }

        if !model_path.is_dir() {
            return Err(SegLabelError::invalid_config(format!(
                "Model path must be a directory: {}",
                model_path.display()
            )));
        }

        let (variant, model_file) = Self::resolve_variant(&model_path, spec.variant.as_deref())?;
        let model_config = Self::read_optional_json(&model_path.join("config.json"))?;
        let preprocessor_config =
            Self::read_optional_json(&model_path.join("preprocessor_config.json"))?;

        tracing::debug!(
            model = %model_path.display(),
            variant = %variant,
            has_config = model_config.is_some(),
            has_preprocessor = preprocessor_config.is_some(),
            "Resolved model directory"
        );

        Ok(Self {
            model_path,
            model_file,
            variant,
            model_config,
            preprocessor_config,
        })
    }

    /// Pick the ONNX file for a variant
    fn resolve_variant(model_path: &Path, requested: Option<&str>) -> Result<(String, PathBuf)> {
        let onnx_dir = model_path.join("onnx");
        let candidates = [
            ("fp32", onnx_dir.join("model.onnx")),
            ("fp16", onnx_dir.join("model_fp16.onnx")),
            ("fp32", model_path.join("model.onnx")),
        ];

        let available: Vec<(&str, PathBuf)> = candidates
            .into_iter()
            .filter(|(_, path)| path.is_file())
            .collect();

        if available.is_empty() {
            return Err(SegLabelError::model_error_with_context(
                "load",
                model_path,
                "no ONNX model file found",
                &["place the export at onnx/model.onnx", "check the model path"],
            ));
        }

        let chosen = match requested {
            Some(variant) => available.iter().find(|(name, _)| *name == variant).ok_or_else(|| {
                let names: Vec<&str> = available.iter().map(|(name, _)| *name).collect();
                SegLabelError::invalid_config(format!(
                    "Requested variant '{variant}' not available. Available variants: {names:?}"
                ))
            })?,
            // fp32 is listed first, so it wins when both exist
            None => available.first().ok_or_else(|| SegLabelError::internal("no variants"))?,
        };

        Ok((chosen.0.to_string(), chosen.1.clone()))
    }

    fn read_optional_json(path: &Path) -> Result<Option<serde_json::Value>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).map_err(|e| {
            SegLabelError::invalid_config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let value = serde_json::from_str(&content).map_err(|e| {
            SegLabelError::invalid_config(format!("Failed to parse {}: {e}", path.display()))
        })?;
        Ok(Some(value))
    }

    /// Load model data
    ///
    /// # Errors
    /// - Model file not readable
    pub fn load_model(&self) -> Result<Vec<u8>> {
        fs::read(&self.model_file).map_err(|e| {
            SegLabelError::model_error_with_context(
                "read",
                &self.model_file,
                &e.to_string(),
                &["verify file permissions"],
            )
        })
    }

    /// Path to the ONNX file in use
    #[must_use]
    pub fn model_file(&self) -> &Path {
        &self.model_file
    }

    #[must_use]
    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Get preprocessing configuration
    ///
    /// # Errors
    /// - Malformed `preprocessor_config.json` values
    pub fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        match &self.preprocessor_config {
            Some(config) => PreprocessingConfig::from_hf_preprocessor(config),
            None => Ok(PreprocessingConfig::default()),
        }
    }

    /// Label taxonomy declared by the model, or the built-in clothes table
    ///
    /// # Errors
    /// - `config.json` present with a malformed `id2label`
    pub fn taxonomy(&self) -> Result<LabelTaxonomy> {
        match &self.model_config {
            Some(config) if config.get("id2label").is_some() => {
                LabelTaxonomy::from_hf_config(config)
            },
            _ => Ok(LabelTaxonomy::clothes()),
        }
    }

    /// Get model information
    ///
    /// # Errors
    /// - Model file metadata unavailable
    /// - Malformed configuration files
    pub fn get_info(&self) -> Result<ModelInfo> {
        let size_bytes = fs::metadata(&self.model_file)?.len() as usize;
        let preprocessing = self.get_preprocessing_config()?;
        let name = self
            .model_config
            .as_ref()
            .and_then(|c| c.get("_name_or_path").and_then(serde_json::Value::as_str))
            .map_or_else(
                || {
                    self.model_path
                        .file_name()
                        .unwrap_or_default()
                        .to_string_lossy()
                        .into_owned()
                },
                str::to_string,
            );

        Ok(ModelInfo {
            name,
            precision: self.variant.clone(),
            size_bytes,
            input_shape: (
                1,
                3,
                preprocessing.target_size[0] as usize,
                preprocessing.target_size[1] as usize,
            ),
            num_labels: self.taxonomy()?.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn model_dir(with_configs: bool) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("onnx")).unwrap();
        fs::write(dir.path().join("onnx/model.onnx"), b"fake-onnx").unwrap();
        if with_configs {
            fs::write(
                dir.path().join("config.json"),
                json!({
                    "_name_or_path": "mattmdjaga/segformer_b2_clothes",
                    "id2label": { "0": "Background", "1": "Hat", "2": "Hair" }
                })
                .to_string(),
            )
            .unwrap();
            fs::write(
                dir.path().join("preprocessor_config.json"),
                json!({
                    "size": { "height": 256, "width": 384 },
                    "image_mean": [0.5, 0.5, 0.5],
                    "image_std": [0.25, 0.25, 0.25]
                })
                .to_string(),
            )
            .unwrap();
        }
        dir
    }

    #[test]
    fn test_missing_directory() {
        let err = ModelManager::from_spec(&ModelSpec::new("/nonexistent/model")).unwrap_err();
        assert!(matches!(err, SegLabelError::InvalidConfig(_)));
    }

    #[test]
    fn test_directory_without_onnx() {
        let dir = TempDir::new().unwrap();
        let err = ModelManager::from_spec(&ModelSpec::new(dir.path())).unwrap_err();
        assert!(matches!(err, SegLabelError::Model(_)));
    }

    #[test]
    fn test_defaults_without_configs() {
        let dir = model_dir(false);
        let manager = ModelManager::from_spec(&ModelSpec::new(dir.path())).unwrap();

        assert_eq!(manager.variant(), "fp32");
        assert_eq!(manager.get_preprocessing_config().unwrap(), PreprocessingConfig::default());
        assert_eq!(manager.taxonomy().unwrap().len(), 18);
        assert_eq!(manager.load_model().unwrap(), b"fake-onnx");
    }

    #[test]
    fn test_hf_configs() {
        let dir = model_dir(true);
        let manager = ModelManager::from_spec(&ModelSpec::new(dir.path())).unwrap();

        let preprocessing = manager.get_preprocessing_config().unwrap();
        assert_eq!(preprocessing.target_size, [256, 384]);
        assert_eq!(preprocessing.normalization_std, [0.25, 0.25, 0.25]);

        let info = manager.get_info().unwrap();
        assert_eq!(info.name, "mattmdjaga/segformer_b2_clothes");
        assert_eq!(info.input_shape, (1, 3, 256, 384));
        assert_eq!(info.num_labels, 3);
        assert_eq!(info.size_bytes, 9);
    }

    #[test]
    fn test_variant_selection() {
        let dir = model_dir(false);
        fs::write(dir.path().join("onnx/model_fp16.onnx"), b"half").unwrap();

        let mut spec = ModelSpec::new(dir.path());
        spec.variant = Some("fp16".to_string());
        let manager = ModelManager::from_spec(&spec).unwrap();
        assert_eq!(manager.variant(), "fp16");
        assert!(manager.model_file().ends_with("model_fp16.onnx"));

        spec.variant = Some("int8".to_string());
        assert!(ModelManager::from_spec(&spec).is_err());
    }

    #[test]
    fn test_preprocessor_size_forms() {
        let config = PreprocessingConfig::from_hf_preprocessor(&json!({ "size": 640 })).unwrap();
        assert_eq!(config.target_size, [640, 640]);

        assert!(PreprocessingConfig::from_hf_preprocessor(&json!({ "size": 0 })).is_err());
        assert!(PreprocessingConfig::from_hf_preprocessor(&json!({ "image_mean": [0.5] })).is_err());
        assert!(
            PreprocessingConfig::from_hf_preprocessor(&json!({ "image_std": [0.0, 1.0, 1.0] }))
                .is_err()
        );
    }

    #[test]
    fn test_display_name() {
        let mut spec = ModelSpec::new("/models/segformer_b2_clothes");
        assert_eq!(spec.display_name(), "segformer_b2_clothes");
        spec.variant = Some("fp16".into());
        assert_eq!(spec.display_name(), "segformer_b2_clothes:fp16");
    }
}
