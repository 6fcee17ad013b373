//! Server and execution provider configuration

use crate::error::{Result, SegLabelError};
use crate::processor::ProcessorConfig;
use serde::{Deserialize, Serialize};

/// Default bind address
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default bind port
pub const DEFAULT_PORT: u16 = 5000;

/// Default request body limit (16 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl ExecutionProvider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::CoreMl => "coreml",
        }
    }
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of the HTTP server and the model behind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Maximum accepted request body size in bytes
    pub max_upload_bytes: usize,
    /// Model and backend configuration
    pub processor: ProcessorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            processor: ProcessorConfig::default(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// `host:port` string suitable for `TcpListener::bind`
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate the configuration before any model is loaded
    ///
    /// # Errors
    /// - Empty host, zero port or zero upload limit
    /// - Invalid processor configuration (see [`ProcessorConfig::validate`])
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(SegLabelError::invalid_config("host must not be empty"));
        }
        if self.port == 0 {
            return Err(SegLabelError::config_value_error("port", self.port, "1-65535"));
        }
        if self.max_upload_bytes == 0 {
            return Err(SegLabelError::config_value_error(
                "max upload size",
                self.max_upload_bytes,
                "at least 1 byte",
            ));
        }
        self.processor.validate()
    }
}

/// Builder for [`ServerConfig`]
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    #[must_use]
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = host.into();
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    #[must_use]
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    /// Set the limit in whole MiB
    #[must_use]
    pub fn max_upload_mb(mut self, megabytes: usize) -> Self {
        self.config.max_upload_bytes = megabytes.saturating_mul(1024 * 1024);
        self
    }

    #[must_use]
    pub fn processor(mut self, processor: ProcessorConfig) -> Self {
        self.config.processor = processor;
        self
    }

    /// Build and validate the server configuration
    ///
    /// # Errors
    /// - See [`ServerConfig::validate`]
    pub fn build(self) -> Result<ServerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
