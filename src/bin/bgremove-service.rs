//! Background removal service command-line entry point
//!
//! Loads the segmentation model once and serves one upload, URL, base64,
//! retrieval or health request per invocation.

#[cfg(feature = "cli")]
use bgremove_service::cli;

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
