//! Inference backend implementations
//!
//! - ONNX Runtime backend (GPU acceleration via CUDA or `CoreML`)
//! - Tract backend (pure Rust, no native dependencies)
//! - Mock backend (prescribed logits, always available)

pub mod mock;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

pub use self::mock::MockBackend;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;
