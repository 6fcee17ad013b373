//! Tract backend for segmentation models
//!
//! Pure Rust CPU inference with no native runtime to install. SegFormer
//! exports declare dynamic spatial axes, so the input fact is pinned to the
//! preprocessing size before optimization.

use crate::error::{Result, SegLabelError};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use crate::processor::ProcessorConfig;
use ndarray::Array4;
use std::time::{Duration, Instant};
use tract_onnx::prelude::*;
use tracing::{debug, info};

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend for running segmentation models using pure Rust inference
#[derive(Debug)]
pub struct TractBackend {
    model: Option<TractModel>,
    model_manager: Option<ModelManager>,
    initialized: bool,
}

impl TractBackend {
    /// List Tract execution providers as `(name, available, description)`
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        vec![(
            "CPU".to_string(),
            true,
            "Pure Rust CPU inference with no external dependencies".to_string(),
        )]
    }

    /// Create a Tract backend with a pre-configured model manager
    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            model: None,
            model_manager: Some(model_manager),
            initialized: false,
        }
    }

    fn model_manager(&self) -> Result<&ModelManager> {
        self.model_manager
            .as_ref()
            .ok_or_else(|| SegLabelError::model("No model manager available for Tract backend"))
    }

    /// Load and initialize the model using Tract
    fn load_model(&mut self) -> Result<Duration> {
        let model_load_start = Instant::now();
        let model_manager = self.model_manager()?;
        let model_data = model_manager.load_model()?;
        let model_info = model_manager.get_info()?;
        let [height, width] = model_manager.get_preprocessing_config()?.target_size;

        info!(
            model = %model_info.name,
            precision = %model_info.precision,
            "🚀 Initializing Tract backend (pure Rust, CPU)"
        );

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| SegLabelError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([1, 3, height as usize, width as usize]).into())
            .map_err(|e| SegLabelError::model(format!("Failed to set input shape: {e}")))?
            .into_optimized()
            .map_err(|e| SegLabelError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| SegLabelError::model(format!("Failed to create runnable model: {e}")))?;

        self.model = Some(model);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        info!(
            "✅ Tract backend initialized in {}ms",
            model_load_time.as_millis()
        );

        Ok(model_load_time)
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, _config: &ProcessorConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model()?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| SegLabelError::inference("Tract model not initialized"))?;

        let inference_start = Instant::now();

        // Going through a flat slice keeps us independent of tract's ndarray version
        let data: Vec<f32> = input.iter().copied().collect();
        let input_tensor = Tensor::from_shape(input.shape(), &data)
            .map_err(|e| SegLabelError::inference(format!("Failed to build input tensor: {e}")))?;

        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| SegLabelError::inference(format!("Tract inference failed: {e}")))?;

        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| SegLabelError::inference("No output tensor found"))?;

        let shape = output.shape().to_vec();
        let [batch, classes, out_height, out_width] = <[usize; 4]>::try_from(shape.as_slice())
            .map_err(|_| {
                SegLabelError::inference(format!("Expected 4D output tensor, got {}D", shape.len()))
            })?;
        let values = output
            .as_slice::<f32>()
            .map_err(|e| SegLabelError::inference(format!("Failed to read output tensor: {e}")))?
            .to_vec();
        let logits = Array4::from_shape_vec((batch, classes, out_height, out_width), values)
            .map_err(|e| SegLabelError::inference(format!("Failed to reshape output tensor: {e}")))?;

        debug!(
            shape = ?logits.shape(),
            elapsed_ms = inference_start.elapsed().as_millis() as u64,
            "Tract inference complete"
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
