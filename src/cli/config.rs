//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliBackend, CliExecutionProvider};
use crate::{
    config::{ExecutionProvider, ServerConfig},
    models::ModelSpec,
    processor::{BackendType, ProcessorConfig},
};
use anyhow::{Context, Result};

/// Convert CLI arguments to a validated `ServerConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    pub(crate) fn from_cli(cli: &Cli) -> Result<ServerConfig> {
        let model_path = cli
            .model
            .clone()
            .context("--model is required to start the server")?;

        let backend_type = match cli.backend {
            CliBackend::Onnx => BackendType::Onnx,
            CliBackend::Tract => BackendType::Tract,
        };
        let execution_provider = match cli.execution_provider {
            CliExecutionProvider::Auto => ExecutionProvider::Auto,
            CliExecutionProvider::Cpu => ExecutionProvider::Cpu,
            CliExecutionProvider::Cuda => ExecutionProvider::Cuda,
            CliExecutionProvider::CoreMl => ExecutionProvider::CoreMl,
        };

        let processor = ProcessorConfig::builder()
            .model_spec(ModelSpec {
                path: model_path,
                variant: cli.variant.clone(),
            })
            .backend_type(backend_type)
            .execution_provider(execution_provider)
            .intra_threads(cli.threads)
            .inter_threads(cli.threads)
            .build()
            .context("Invalid backend configuration")?;

        let config = ServerConfig::builder()
            .host(cli.host.clone())
            .port(cli.port)
            .max_upload_mb(cli.max_upload_mb)
            .processor(processor)
            .build()?;

        Ok(config)
    }
}
