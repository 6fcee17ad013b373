//! Garment label detection server
//!
//! Serves the dominant clothing label of uploaded images using a SegFormer
//! clothes segmentation model, on ONNX Runtime or Tract.

#[cfg(feature = "cli")]
use garment_label_api::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
