//! Inference backend abstraction and the segmentation adapter
//!
//! [`InferenceBackend`] is the tensor-level seam implemented by ONNX Runtime,
//! Tract and the mock backend. [`SegmentationModel`] is what request handling
//! depends on: image in, per-pixel class map out.

use crate::{
    error::{Result, SegLabelError},
    models::{ModelInfo, PreprocessingConfig},
    processor::ProcessorConfig,
    tracing_config::spans,
    types::{CanonicalImage, ClassId, SegmentationMap},
    utils::ImagePreprocessor,
};
use ndarray::{Array4, Axis};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Trait for inference backends
pub trait InferenceBackend: Send {
    /// Initialize the backend with the given configuration
    ///
    /// Returns the model load time, or `None` when already initialized.
    ///
    /// # Errors
    /// - Model loading or session creation failures
    fn initialize(&mut self, config: &ProcessorConfig) -> Result<Option<Duration>>;

    /// Run the model on an NCHW input tensor and return raw logits `[1, C, h, w]`
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Output tensor is not 4D
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Get the expected input shape for this backend
    fn input_shape(&self) -> (usize, usize, usize, usize);

    /// Get preprocessing configuration for this backend
    ///
    /// # Errors
    /// - Invalid or missing preprocessing configuration
    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig>;

    /// Get model information for this backend
    ///
    /// # Errors
    /// - Model metadata unavailable
    fn get_model_info(&self) -> Result<ModelInfo>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}

/// Produces a per-pixel class map for an image
pub trait SegmentationModel: Send + Sync {
    /// Segment one image
    ///
    /// # Errors
    /// - `Inference` for any failure behind the model boundary
    fn infer(&self, image: &CanonicalImage) -> Result<SegmentationMap>;
}

/// Segmentation adapter over an [`InferenceBackend`]
///
/// The backend needs `&mut` access, so concurrent requests are serialized
/// behind a mutex.
pub struct BackendSegmenter {
    backend: Mutex<Box<dyn InferenceBackend>>,
    preprocessing: PreprocessingConfig,
}

impl BackendSegmenter {
    /// Wrap a backend, reading its preprocessing configuration once
    ///
    /// # Errors
    /// - Backend preprocessing configuration unavailable
    /// - Backend input shape disagrees with the preprocessing target size
    pub fn new(backend: Box<dyn InferenceBackend>) -> Result<Self> {
        let preprocessing = backend.get_preprocessing_config()?;
        let [height, width] = preprocessing.target_size;
        let expected = (1, 3, height as usize, width as usize);
        let actual = backend.input_shape();
        if actual != expected {
            return Err(SegLabelError::model(format!(
                "Backend expects input {actual:?} but preprocessing produces {expected:?}"
            )));
        }
        Ok(Self {
            backend: Mutex::new(backend),
            preprocessing,
        })
    }

    #[must_use]
    pub fn preprocessing_config(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }

    fn run(&self, image: &CanonicalImage) -> Result<SegmentationMap> {
        let [target_height, target_width] = self.preprocessing.target_size;
        let input = {
            let _span =
                spans::preprocessing(image.dimensions(), (target_width, target_height)).entered();
            ImagePreprocessor::preprocess_for_inference(image, &self.preprocessing)?
        };
        debug!(shape = ?input.shape(), "Input shape for model");

        let start = Instant::now();
        let logits = {
            // Keep serving after a panicked inference
            let mut backend = self.backend.lock().unwrap_or_else(PoisonError::into_inner);
            if !backend.is_initialized() {
                return Err(SegLabelError::inference("Backend not initialized"));
            }
            backend.infer(&input)?
        };
        debug!(
            logits_shape = ?logits.shape(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model outputs"
        );

        argmax_logits(&logits)
    }
}

impl SegmentationModel for BackendSegmenter {
    fn infer(&self, image: &CanonicalImage) -> Result<SegmentationMap> {
        let _span = spans::inference(image.dimensions()).entered();
        self.run(image).map_err(|e| {
            error!(error = %e, "Inference failed");
            e.into_inference()
        })
    }
}

/// Reduce logits `[1, C, h, w]` to a `w x h` class map
///
/// Ties resolve to the lowest class index; NaN never wins against a number.
///
/// # Errors
/// - Batch size other than 1, zero classes or empty spatial dimensions
pub fn argmax_logits(logits: &Array4<f32>) -> Result<SegmentationMap> {
    let (batch, classes, height, width) = logits.dim();
    if batch != 1 {
        return Err(SegLabelError::inference(format!(
            "Expected batch size 1 in model output, got {batch}"
        )));
    }
    if classes == 0 || height == 0 || width == 0 {
        return Err(SegLabelError::inference(format!(
            "Degenerate model output shape {:?}",
            logits.shape()
        )));
    }

    let scores = logits.index_axis(Axis(0), 0);
    let mut best_class = vec![0 as ClassId; height * width];
    let mut best_score = vec![f32::NEG_INFINITY; height * width];

    for (class, plane) in scores.outer_iter().enumerate() {
        for (score, (best_id, best)) in plane
            .iter()
            .zip(best_class.iter_mut().zip(best_score.iter_mut()))
        {
            if class == 0 || *score > *best || best.is_nan() {
                *best = *score;
                *best_id = class as ClassId;
            }
        }
    }

    SegmentationMap::new(best_class, (width, height))
}
