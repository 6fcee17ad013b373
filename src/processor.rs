//! Label detection processor
//!
//! Ties model loading, ingestion, segmentation and aggregation together. The
//! HTTP layer and tests both drive detection through
//! [`LabelDetectionProcessor::detect`].

use crate::{
    aggregate::LabelAggregator,
    config::ExecutionProvider,
    error::{Result, SegLabelError},
    inference::{BackendSegmenter, InferenceBackend, SegmentationModel},
    models::{ModelInfo, ModelManager, ModelSpec},
    services::ImageIngestion,
    taxonomy::LabelTaxonomy,
    tracing_config::spans,
    types::{DetectionResult, UploadedFile},
    utils::ExecutionProviderManager,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Backend type enumeration for runtime selection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    #[default]
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl BackendType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Onnx => "onnx",
            Self::Tract => "tract",
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create a backend instance of the specified type with the given model manager
    ///
    /// # Errors
    /// - Backend type not compiled into this build
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Backend factory for the ONNX Runtime and Tract backends enabled at build time
#[derive(Debug, Default)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::with_model_manager(
                model_manager,
            ))),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(
                crate::backends::TractBackend::with_model_manager(model_manager),
            )),
            #[allow(unreachable_patterns)]
            other => {
                drop(model_manager);
                Err(SegLabelError::invalid_config(format!(
                    "Backend '{other}' is not enabled in this build"
                )))
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        if cfg!(feature = "onnx") {
            backends.push(BackendType::Onnx);
        }
        if cfg!(feature = "tract") {
            backends.push(BackendType::Tract);
        }
        backends
    }
}

/// Model and backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Model directory and variant
    pub model_spec: ModelSpec,
    /// Backend type to use for inference
    pub backend_type: BackendType,
    /// Execution provider for the backend
    pub execution_provider: ExecutionProvider,
    /// Number of intra-op threads (0 = auto)
    pub intra_threads: usize,
    /// Number of inter-op threads (0 = auto)
    pub inter_threads: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            model_spec: ModelSpec::new("models/segformer_b2_clothes"),
            backend_type: BackendType::Onnx,
            execution_provider: ExecutionProvider::Auto,
            intra_threads: 0,
            inter_threads: 0,
        }
    }
}

impl ProcessorConfig {
    #[must_use]
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::new()
    }

    /// Thread counts with `0` replaced by values derived from the core count
    #[must_use]
    pub fn resolved_threads(&self) -> (usize, usize) {
        let cores = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(8);
        let intra = if self.intra_threads > 0 {
            self.intra_threads
        } else {
            cores
        };
        let inter = if self.inter_threads > 0 {
            self.inter_threads
        } else {
            (cores / 4).max(1)
        };
        (intra, inter)
    }

    /// Check the model directory and backend/provider pairing
    ///
    /// # Errors
    /// - Model directory missing or not a directory
    /// - Execution provider unsupported by the backend
    pub fn validate(&self) -> Result<()> {
        let path = &self.model_spec.path;
        if !path.is_dir() {
            return Err(SegLabelError::invalid_config(format!(
                "Model directory does not exist: {}",
                path.display()
            )));
        }
        ExecutionProviderManager::check_compatibility(self.backend_type, self.execution_provider)
    }
}

/// Builder for `ProcessorConfig`
#[derive(Debug, Default)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = model_spec;
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    /// Build the processor configuration
    ///
    /// The model directory is checked later by [`ProcessorConfig::validate`].
    ///
    /// # Errors
    /// - Execution provider unsupported by the backend
    pub fn build(self) -> Result<ProcessorConfig> {
        ExecutionProviderManager::check_compatibility(
            self.config.backend_type,
            self.config.execution_provider,
        )?;
        Ok(self.config)
    }
}

/// Turns an optional upload into the dominant garment label
#[derive(Clone)]
pub struct LabelDetectionProcessor {
    model: Arc<dyn SegmentationModel>,
    aggregator: LabelAggregator,
    model_info: Option<ModelInfo>,
}

impl std::fmt::Debug for LabelDetectionProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelDetectionProcessor")
            .field("labels", &self.aggregator.taxonomy().len())
            .field("model", &self.model_info.as_ref().map(|info| info.name.as_str()))
            .finish_non_exhaustive()
    }
}

impl LabelDetectionProcessor {
    /// Create a processor around an already loaded segmentation model
    #[must_use]
    pub fn new(model: Arc<dyn SegmentationModel>, taxonomy: LabelTaxonomy) -> Self {
        Self {
            model,
            aggregator: LabelAggregator::new(taxonomy),
            model_info: None,
        }
    }

    /// Wrap an inference backend, initializing it if needed
    ///
    /// # Errors
    /// - Backend initialization failures
    pub fn with_backend(
        mut backend: Box<dyn InferenceBackend>,
        taxonomy: LabelTaxonomy,
        config: &ProcessorConfig,
    ) -> Result<Self> {
        if let Some(load_time) = backend.initialize(config)? {
            info!(
                load_ms = load_time.as_millis() as u64,
                "Segmentation model loaded"
            );
        }

        let model_info = match backend.get_model_info() {
            Ok(info) => {
                info!(
                    name = %info.name,
                    precision = %info.precision,
                    size_mb = %format!("{:.1}", info.size_bytes as f64 / (1024.0 * 1024.0)),
                    input_shape = ?info.input_shape,
                    num_labels = info.num_labels,
                    "Model metadata"
                );
                if info.num_labels != taxonomy.len() {
                    warn!(
                        model_labels = info.num_labels,
                        taxonomy_labels = taxonomy.len(),
                        "Model label count differs from the label taxonomy"
                    );
                }
                Some(info)
            },
            Err(e) => {
                warn!(error = %e, "Model metadata unavailable");
                None
            },
        };

        let segmenter = BackendSegmenter::new(backend)?;
        let mut processor = Self::new(Arc::new(segmenter), taxonomy);
        processor.model_info = model_info;
        Ok(processor)
    }

    /// Validate the configuration, load the model once and build the processor
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Model directory, taxonomy or backend initialization failures
    pub fn from_config(config: &ProcessorConfig, factory: &dyn BackendFactory) -> Result<Self> {
        let _span = spans::model_loading(
            &config.model_spec.display_name(),
            config.backend_type.as_str(),
        )
        .entered();

        config.validate()?;
        let available = factory.available_backends();
        if !available.contains(&config.backend_type) {
            let names: Vec<&str> = available.iter().map(|b| b.as_str()).collect();
            return Err(SegLabelError::invalid_config(format!(
                "Backend '{}' is not enabled in this build. Available backends: {names:?}",
                config.backend_type
            )));
        }
        let model_manager = ModelManager::from_spec(&config.model_spec)?;
        let taxonomy = model_manager.taxonomy()?;
        let backend = factory.create_backend(config.backend_type, model_manager)?;

        let processor = Self::with_backend(backend, taxonomy, config)?;
        info!(
            model = %config.model_spec.display_name(),
            backend = %config.backend_type,
            provider = %config.execution_provider,
            labels = processor.taxonomy().len(),
            "Label detection processor ready"
        );
        Ok(processor)
    }

    /// Metadata reported by the backend at load time
    #[must_use]
    pub fn model_info(&self) -> Option<&ModelInfo> {
        self.model_info.as_ref()
    }

    #[must_use]
    pub fn taxonomy(&self) -> &LabelTaxonomy {
        self.aggregator.taxonomy()
    }

    /// Run one upload through validation, decoding, segmentation and aggregation
    ///
    /// # Errors
    /// - `MissingInput` when no file or an empty filename was sent
    /// - `Decode` when the payload is not an image
    /// - `Inference` when the model fails
    pub fn detect(&self, upload: Option<UploadedFile>) -> Result<DetectionResult> {
        let filename = upload.as_ref().and_then(|u| u.filename.clone());
        let _span = spans::predict(filename.as_deref()).entered();
        debug!("Received request for prediction");

        let image = ImageIngestion::ingest(upload).map_err(|e| {
            if matches!(e, SegLabelError::Decode(_)) {
                error!(error = %e, "Could not process image");
            }
            e
        })?;

        let map = self.model.infer(&image)?;
        debug!(dimensions = ?map.dimensions(), "Segmentation map ready");

        Ok(self.aggregator.aggregate(&map))
    }
}
