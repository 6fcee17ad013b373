#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Garment Label API
//!
//! An HTTP service that reports the dominant clothing label of an uploaded
//! image, using a SegFormer clothes segmentation model on ONNX Runtime or Tract.
//!
//! A request flows through four stages:
//!
//! - **Ingestion**: the multipart `file` part is validated and decoded to RGB
//! - **Segmentation**: the image is resized, normalized and run through the
//!   model; per-pixel logits are reduced to class ids with argmax
//! - **Aggregation**: pixel counts per class, background excluded, the most
//!   frequent class wins (ties go to the smallest id)
//! - **Response**: `{"detected_label": "<name>"}` or `"None"` when only
//!   background was found
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use garment_label_api::{
//!     server, DefaultBackendFactory, LabelDetectionProcessor, ModelSpec, ProcessorConfig,
//!     ServerConfig,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let processor_config = ProcessorConfig::builder()
//!     .model_spec(ModelSpec::new("models/segformer_b2_clothes"))
//!     .build()?;
//! let config = ServerConfig::builder()
//!     .port(5000)
//!     .processor(processor_config.clone())
//!     .build()?;
//!
//! let processor = LabelDetectionProcessor::from_config(&processor_config, &DefaultBackendFactory)?;
//! server::serve(processor, &config).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with CUDA and `CoreML` providers
//! - `tract` (default): Pure Rust backend
//! - `cli` (default): Server binary, argument parsing and subscriber setup
//! - `webp-support` (default): WebP uploads
//! - `tracing-json`: JSON log output

pub mod aggregate;
pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod server;
pub mod services;
pub mod taxonomy;
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use aggregate::{LabelAggregator, LabelCountTable};
pub use backends::*;
pub use config::{ExecutionProvider, ServerConfig, ServerConfigBuilder};
pub use error::{Result, SegLabelError};
pub use inference::{argmax_logits, BackendSegmenter, InferenceBackend, SegmentationModel};
pub use models::{ModelInfo, ModelManager, ModelSpec, PreprocessingConfig};
pub use processor::{
    BackendFactory, BackendType, DefaultBackendFactory, LabelDetectionProcessor, ProcessorConfig,
    ProcessorConfigBuilder,
};
pub use services::ImageIngestion;
pub use taxonomy::{LabelTaxonomy, BACKGROUND_ID, CLOTHES_LABELS};
pub use tracing_config::{spans, TracingConfig, TracingFormat};
pub use types::{CanonicalImage, ClassId, DetectionResult, SegmentationMap, UploadedFile};
pub use utils::{ExecutionProviderManager, ImagePreprocessor, ProviderInfo};

/// Detect the dominant garment label of an encoded image
///
/// Runs the full pipeline on the blocking pool, the same way `POST /predict`
/// does, for callers that hold raw bytes instead of a multipart upload.
///
/// ```rust,no_run
/// use garment_label_api::{detect_label_from_bytes, LabelDetectionProcessor};
///
/// # async fn example(processor: LabelDetectionProcessor, upload: Vec<u8>) -> anyhow::Result<()> {
/// let label = detect_label_from_bytes(&processor, upload).await?;
/// println!("{label}");
/// # Ok(())
/// # }
/// ```
pub async fn detect_label_from_bytes(
    processor: &LabelDetectionProcessor,
    image_bytes: Vec<u8>,
) -> Result<DetectionResult> {
    let processor = processor.clone();
    tokio::task::spawn_blocking(move || {
        processor.detect(Some(UploadedFile::new(Some("upload".to_string()), image_bytes)))
    })
    .await
    .map_err(|e| SegLabelError::internal(format!("Detection task failed: {e}")))?
}
