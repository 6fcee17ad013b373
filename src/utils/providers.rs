//! Execution provider discovery and compatibility checks

use crate::{
    config::ExecutionProvider,
    error::{Result, SegLabelError},
    processor::BackendType,
};

/// Information about an execution provider
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub execution_provider: ExecutionProvider,
    pub available: bool,
    pub description: String,
}

impl ProviderInfo {
    fn new(
        backend_type: BackendType,
        execution_provider: ExecutionProvider,
        available: bool,
        description: &str,
    ) -> Self {
        Self {
            name: ExecutionProviderManager::provider_to_string(backend_type, execution_provider),
            backend_type,
            execution_provider,
            available,
            description: description.to_string(),
        }
    }
}

/// Utility for listing and validating execution providers
pub struct ExecutionProviderManager;

impl ExecutionProviderManager {
    /// List every backend/provider pair with its availability on this machine
    #[must_use]
    pub fn list_all_providers() -> Vec<ProviderInfo> {
        let mut providers = Vec::new();

        #[cfg(feature = "onnx")]
        {
            use crate::backends::OnnxBackend;
            let availability: std::collections::HashMap<String, bool> =
                OnnxBackend::list_providers()
                    .into_iter()
                    .map(|(name, available, _)| (name.to_lowercase(), available))
                    .collect();
            let lookup = |name: &str| availability.get(name).copied().unwrap_or(false);

            providers.push(ProviderInfo::new(
                BackendType::Onnx,
                ExecutionProvider::Auto,
                availability.values().any(|available| *available),
                "ONNX Runtime with auto-selected provider",
            ));
            providers.push(ProviderInfo::new(
                BackendType::Onnx,
                ExecutionProvider::Cpu,
                lookup("cpu"),
                "ONNX Runtime CPU execution",
            ));
            providers.push(ProviderInfo::new(
                BackendType::Onnx,
                ExecutionProvider::Cuda,
                lookup("cuda"),
                "ONNX Runtime CUDA GPU acceleration",
            ));
            providers.push(ProviderInfo::new(
                BackendType::Onnx,
                ExecutionProvider::CoreMl,
                lookup("coreml"),
                "ONNX Runtime CoreML (Apple Silicon) acceleration",
            ));
        }

        #[cfg(not(feature = "onnx"))]
        providers.push(ProviderInfo::new(
            BackendType::Onnx,
            ExecutionProvider::Auto,
            false,
            "ONNX Runtime (feature disabled)",
        ));

        providers.push(ProviderInfo::new(
            BackendType::Tract,
            ExecutionProvider::Cpu,
            cfg!(feature = "tract"),
            if cfg!(feature = "tract") {
                "Pure Rust CPU inference via Tract"
            } else {
                "Pure Rust CPU inference via Tract (feature disabled)"
            },
        ));

        providers
    }

    /// Check that a provider can be used with a backend
    ///
    /// # Errors
    /// - Tract paired with a GPU provider
    pub fn check_compatibility(
        backend_type: BackendType,
        provider: ExecutionProvider,
    ) -> Result<()> {
        match (backend_type, provider) {
            (BackendType::Tract, ExecutionProvider::Cuda | ExecutionProvider::CoreMl) => {
                Err(SegLabelError::invalid_config(format!(
                    "Tract backend only supports CPU execution, got '{}'",
                    Self::provider_to_string(backend_type, provider)
                )))
            },
            _ => Ok(()),
        }
    }

    /// Format a backend/provider pair as `backend:provider`
    #[must_use]
    pub fn provider_to_string(backend_type: BackendType, provider: ExecutionProvider) -> String {
        format!("{}:{}", backend_type.as_str(), provider.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_compatibility() {
        assert!(ExecutionProviderManager::check_compatibility(
            BackendType::Onnx,
            ExecutionProvider::Cuda
        )
        .is_ok());
        assert!(ExecutionProviderManager::check_compatibility(
            BackendType::Tract,
            ExecutionProvider::Auto
        )
        .is_ok());
        assert!(ExecutionProviderManager::check_compatibility(
            BackendType::Tract,
            ExecutionProvider::Cuda
        )
        .is_err());
    }

    #[test]
    fn test_provider_to_string() {
        assert_eq!(
            ExecutionProviderManager::provider_to_string(BackendType::Onnx, ExecutionProvider::Auto),
            "onnx:auto"
        );
        assert_eq!(
            ExecutionProviderManager::provider_to_string(BackendType::Tract, ExecutionProvider::Cpu),
            "tract:cpu"
        );
    }

    #[test]
    fn test_list_all_providers() {
        let providers = ExecutionProviderManager::list_all_providers();
        let names: Vec<&str> = providers.iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"onnx:auto"));
        assert!(names.contains(&"tract:cpu"));
    }
}
