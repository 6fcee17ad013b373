//! Deterministic backend emitting prescribed logits
//!
//! Lets the detection pipeline and the HTTP surface be exercised without
//! model files or a native runtime.

use crate::{
    error::{Result, SegLabelError},
    inference::InferenceBackend,
    models::{ModelInfo, PreprocessingConfig},
    processor::ProcessorConfig,
    types::ClassId,
};
use ndarray::Array4;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

/// Mock backend for tests and local development
#[derive(Debug, Clone)]
pub struct MockBackend {
    initialized: bool,
    should_fail_inference: bool,
    logits: Array4<f32>,
    preprocessing_config: PreprocessingConfig,
    calls: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Backend whose output map holds `count` pixels of each listed class,
    /// laid out row-major, with every other pixel background
    ///
    /// Counts beyond the map area are truncated.
    #[must_use]
    pub fn with_class_counts(
        num_classes: usize,
        dimensions: (usize, usize),
        counts: &[(ClassId, usize)],
    ) -> Self {
        let (width, height) = dimensions;
        let num_classes = num_classes.max(1);
        let mut logits = Array4::<f32>::zeros((1, num_classes, height, width));

        let area = width * height;
        let mut classes = vec![0 as ClassId; area];
        let mut cursor = 0;
        for &(class, count) in counts {
            for slot in classes.iter_mut().skip(cursor).take(count) {
                *slot = class;
            }
            cursor = (cursor + count).min(area);
        }

        for (index, class) in classes.iter().enumerate() {
            let class = *class as usize;
            if class < num_classes {
                logits[[0, class, index / width, index % width]] = 1.0;
            }
        }

        Self::from_logits(logits)
    }

    /// Backend returning fixed logits `[1, C, h, w]`
    #[must_use]
    pub fn from_logits(logits: Array4<f32>) -> Self {
        Self {
            initialized: true,
            should_fail_inference: false,
            logits,
            preprocessing_config: PreprocessingConfig {
                target_size: [32, 32],
                ..PreprocessingConfig::default()
            },
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Backend whose every inference fails
    #[must_use]
    pub fn failing() -> Self {
        let mut backend = Self::with_class_counts(18, (4, 4), &[]);
        backend.should_fail_inference = true;
        backend
    }

    /// Backend that still needs `initialize`
    #[must_use]
    pub fn uninitialized() -> Self {
        let mut backend = Self::with_class_counts(18, (4, 4), &[]);
        backend.initialized = false;
        backend
    }

    /// Shared counter of `infer` calls, readable after the backend is boxed
    #[must_use]
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &ProcessorConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::ZERO))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.initialized {
            return Err(SegLabelError::inference("Backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(SegLabelError::inference("Mock inference failure"));
        }

        let [height, width] = self.preprocessing_config.target_size;
        let expected = [1, 3, height as usize, width as usize];
        if input.shape() != expected {
            return Err(SegLabelError::inference(format!(
                "Mock backend expected input {expected:?}, got {:?}",
                input.shape()
            )));
        }

        Ok(self.logits.clone())
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        let [height, width] = self.preprocessing_config.target_size;
        (1, 3, height as usize, width as usize)
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(self.preprocessing_config.clone())
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "mock-segformer".to_string(),
            precision: "fp32".to_string(),
            size_bytes: 0,
            input_shape: self.input_shape(),
            num_labels: self.logits.dim().1,
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_count_layout() {
        let backend = MockBackend::with_class_counts(8, (4, 2), &[(3, 2), (5, 1)]);
        let logits = backend.logits;

        assert_eq!(logits.dim(), (1, 8, 2, 4));
        assert_eq!(logits[[0, 3, 0, 0]], 1.0);
        assert_eq!(logits[[0, 3, 0, 1]], 1.0);
        assert_eq!(logits[[0, 5, 0, 2]], 1.0);
        assert_eq!(logits[[0, 0, 1, 3]], 1.0);
    }

    #[test]
    fn test_counts_truncate_to_area() {
        let backend = MockBackend::with_class_counts(3, (2, 2), &[(1, 10), (2, 4)]);
        let ones: f32 = backend.logits.index_axis(ndarray::Axis(1), 1).sum();
        assert_eq!(ones, 4.0);
    }

    #[test]
    fn test_failing_and_counter() {
        let mut backend = MockBackend::failing();
        let counter = backend.call_counter();
        let input = Array4::<f32>::zeros((1, 3, 32, 32));

        assert!(backend.infer(&input).is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_initialize() {
        let mut backend = MockBackend::uninitialized();
        assert!(!backend.is_initialized());
        let config = ProcessorConfig::default();
        assert!(backend.initialize(&config).unwrap().is_some());
        assert!(backend.initialize(&config).unwrap().is_none());
        assert!(backend.is_initialized());
    }

    #[test]
    fn test_rejects_wrong_input_shape() {
        let mut backend = MockBackend::with_class_counts(2, (2, 2), &[]);
        assert!(backend.infer(&Array4::<f32>::zeros((1, 3, 8, 8))).is_err());
    }
}
