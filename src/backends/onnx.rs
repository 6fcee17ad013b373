//! ONNX Runtime backend for segmentation models
//!
//! Supports CPU, CUDA and `CoreML` execution providers. Provider availability
//! is probed at session creation; an unavailable provider falls back to CPU.

use crate::config::ExecutionProvider;
use crate::error::{Result, SegLabelError};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use crate::processor::ProcessorConfig;
use ndarray::{Array4, Ix4};
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// ONNX Runtime backend
#[derive(Debug)]
pub struct OnnxBackend {
    session: Option<Session>,
    model_manager: Option<ModelManager>,
    initialized: bool,
}

impl OnnxBackend {
    /// List ONNX Runtime execution providers as `(name, available, description)`
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        debug!(
            platform = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            "Probing ONNX Runtime execution providers"
        );

        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    /// Create a new ONNX backend with specific model manager
    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            session: None,
            model_manager: Some(model_manager),
            initialized: false,
        }
    }

    fn model_manager(&self) -> Result<&ModelManager> {
        self.model_manager
            .as_ref()
            .ok_or_else(|| SegLabelError::internal("Model manager not initialized"))
    }

    /// Providers to register for a requested execution provider
    fn select_providers(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let cuda = CUDAExecutionProvider::default();
        let cuda_available = OrtExecutionProvider::is_available(&cuda).unwrap_or(false);
        let coreml = CoreMLExecutionProvider::default().with_subgraphs(true);
        let coreml_available = OrtExecutionProvider::is_available(&coreml).unwrap_or(false);

        let mut providers = Vec::new();
        match requested {
            ExecutionProvider::Auto => {
                if cuda_available {
                    info!("🚀 CUDA execution provider is available and will be used");
                    providers.push(cuda.build());
                }
                if coreml_available {
                    info!("🍎 CoreML execution provider is available and will be used");
                    providers.push(coreml.build());
                }
                if providers.is_empty() {
                    info!("No hardware acceleration available, using CPU");
                }
            },
            ExecutionProvider::Cpu => info!("Using CPU execution provider"),
            ExecutionProvider::Cuda => {
                if cuda_available {
                    info!("Using CUDA execution provider");
                    providers.push(cuda.build());
                } else {
                    warn!("CUDA execution provider requested but not available, falling back to CPU");
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available {
                    info!("🍎 Using CoreML execution provider");
                    providers.push(coreml.build());
                } else {
                    warn!("CoreML execution provider requested but not available, falling back to CPU");
                }
            },
        }
        providers
    }

    /// Load and initialize the ONNX model
    fn load_model(&mut self, config: &ProcessorConfig) -> Result<Duration> {
        let model_load_start = Instant::now();
        let model_manager = self.model_manager()?;
        let model_data = model_manager.load_model()?;
        let model_info = model_manager.get_info()?;

        let mut session_builder = Session::builder()
            .map_err(|e| SegLabelError::model(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| SegLabelError::model(format!("Failed to set optimization level: {e}")))?;

        let providers = Self::select_providers(config.execution_provider);
        if !providers.is_empty() {
            session_builder = session_builder
                .with_execution_providers(providers)
                .map_err(|e| {
                    SegLabelError::model(format!("Failed to set execution providers: {e}"))
                })?;
        }

        let (intra_threads, inter_threads) = config.resolved_threads();

        let session = session_builder
            .with_intra_threads(intra_threads)
            .map_err(|e| SegLabelError::model(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| SegLabelError::model(format!("Failed to set inter threads: {e}")))?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                SegLabelError::model_error_with_context(
                    "load",
                    model_manager.model_file(),
                    &e.to_string(),
                    &["check that the file is a valid ONNX export"],
                )
            })?;

        #[allow(clippy::cast_precision_loss)] // Precision loss acceptable for logging display
        let size_mb = model_info.size_bytes as f64 / (1024.0 * 1024.0);
        debug!(
            model = %model_info.name,
            precision = %model_info.precision,
            size_mb = %format!("{size_mb:.2}"),
            provider = %config.execution_provider,
            intra_threads,
            inter_threads,
            "ONNX Runtime session created"
        );

        self.session = Some(session);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        info!(
            "📊 Model loading complete: {:.0}ms",
            model_load_time.as_secs_f64() * 1000.0
        );

        Ok(model_load_time)
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &ProcessorConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.initialized {
            return Err(SegLabelError::inference("Backend not initialized"));
        }

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| SegLabelError::inference("ONNX session not initialized"))?;

        let inference_start = Instant::now();

        let input_value = Value::from_array(input.clone())
            .map_err(|e| SegLabelError::inference(format!("Failed to convert input tensor: {e}")))?;

        // Positional inputs: exports name the input `pixel_values`, but not all do
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| SegLabelError::inference(format!("ONNX inference failed: {e}")))?;

        let keys: Vec<_> = outputs.keys().collect();
        let first_key = keys
            .first()
            .ok_or_else(|| SegLabelError::inference("No output tensors found"))?;
        let logits = outputs
            .get(first_key)
            .ok_or_else(|| SegLabelError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| SegLabelError::inference(format!("Failed to extract output tensor: {e}")))?
            .to_owned()
            .into_dimensionality::<Ix4>()
            .map_err(|e| SegLabelError::inference(format!("Expected 4D logits tensor: {e}")))?;

        debug!(
            output = %first_key,
            shape = ?logits.shape(),
            elapsed_ms = %format!("{:.2}", inference_start.elapsed().as_secs_f64() * 1000.0),
            "ONNX inference complete"
        );

        Ok(logits)
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.model_manager
            .as_ref()
            .and_then(|manager| manager.get_info().ok())
            .map_or((1, 3, 512, 512), |info| info.input_shape)
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        self.model_manager()?.get_preprocessing_config()
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        self.model_manager()?.get_info()
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
