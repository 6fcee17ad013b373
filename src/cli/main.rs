//! Garment label API server
//!
//! Loads the segmentation model once, then serves `GET /` and `POST /predict`.

use super::config::CliConfigBuilder;
use crate::{
    config::{DEFAULT_HOST, DEFAULT_PORT},
    processor::{BackendFactory, DefaultBackendFactory, LabelDetectionProcessor},
    server,
    tracing_config::{TracingConfig, TracingFormat},
    utils::ExecutionProviderManager,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;

/// Garment label detection HTTP server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "garment-label-api")]
pub struct Cli {
    /// Model directory (onnx/model.onnx, optional config.json and preprocessor_config.json)
    #[arg(short, long, value_name = "DIR", required_unless_present = "show_providers")]
    pub model: Option<PathBuf>,

    /// Model variant (fp32, fp16) [default: fp32 when present]
    #[arg(long)]
    pub variant: Option<String>,

    /// Inference backend
    #[arg(short, long, value_enum, default_value_t = CliBackend::Onnx)]
    pub backend: CliBackend,

    /// ONNX Runtime execution provider
    #[arg(short, long, value_enum, default_value_t = CliExecutionProvider::Auto)]
    pub execution_provider: CliExecutionProvider,

    /// Bind address
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Bind port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Number of inference threads (0 = auto-detect optimal threading)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Maximum request body size in MiB
    #[arg(long, default_value_t = 16)]
    pub max_upload_mb: usize,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output style
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliBackend {
    Onnx,
    Tract,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliExecutionProvider {
    Auto,
    Cpu,
    Cuda,
    #[value(name = "coreml")]
    CoreMl,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli).context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    let config = CliConfigBuilder::from_cli(&cli).context("Invalid configuration")?;
    info!(
        model = %config.processor.model_spec.path.display(),
        backend = %config.processor.backend_type,
        provider = %config.processor.execution_provider,
        address = %config.bind_address(),
        "Starting garment label API"
    );

    let processor_config = config.processor.clone();
    let processor = tokio::task::spawn_blocking(move || {
        LabelDetectionProcessor::from_config(&processor_config, &DefaultBackendFactory)
    })
    .await
    .context("Model loading task failed")?
    .context("Failed to load segmentation model")?;

    server::serve(processor, &config)
        .await
        .context("Server terminated with an error")
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let format = match cli.log_format {
        CliLogFormat::Console => TracingFormat::Console,
        CliLogFormat::Compact => TracingFormat::Compact,
        #[cfg(feature = "tracing-json")]
        CliLogFormat::Json => TracingFormat::Json,
    };

    let mut config = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(format)
        .with_session_id(uuid::Uuid::new_v4().to_string());

    // RUST_LOG wins over -v when set
    if let Ok(filter) = std::env::var("RUST_LOG") {
        if !filter.trim().is_empty() {
            config = config.with_env_filter(filter);
        }
    }

    config.init()
}

fn show_provider_diagnostics() {
    println!("🔍 Backend and Execution Provider Diagnostics");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    println!("💻 System: {cpu_count} CPU cores detected");

    let backends: Vec<&str> = DefaultBackendFactory
        .available_backends()
        .into_iter()
        .map(|backend| backend.as_str())
        .collect();
    println!("🧩 Backends compiled in: {}", backends.join(", "));

    println!("\n🚀 Execution Providers:");
    for provider_info in ExecutionProviderManager::list_all_providers() {
        let status = if provider_info.available {
            "✅ Available"
        } else {
            "❌ Not Available"
        };
        println!(
            "  • {}: {} - {}",
            provider_info.name, status, provider_info.description
        );
    }

    println!("\n💡 Usage Examples:");
    println!("  --backend onnx --execution-provider auto    # Best available ONNX provider (default)");
    println!("  --backend onnx --execution-provider cuda    # NVIDIA CUDA");
    println!("  --backend tract                             # Pure Rust CPU inference");
}
