//! Command-line front end
//!
//! Loads configuration, builds the shared engine once and dispatches a single
//! request, printing the JSON body a web route would answer with.

use crate::{
    config::{BackendType, ExecutionProvider, OutputActivation, ServiceConfig, StorageConfig},
    handlers::{get_artifact, HandlerResult, RequestHandlers},
    inference::{BackendFactory, DefaultBackendFactory, InferenceEngine},
    store::ArtifactStore,
    tracing_config::init_cli_tracing,
};
use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Remove image backgrounds with a shared segmentation model
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// JSON configuration file (missing fields take their defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the ONNX segmentation model
    #[arg(short, long, global = true)]
    pub model: Option<PathBuf>,

    /// Inference backend: onnx or tract
    #[arg(short, long, global = true)]
    pub backend: Option<BackendType>,

    /// Execution provider: auto, cpu, cuda or coreml
    #[arg(short, long, global = true)]
    pub execution_provider: Option<ExecutionProvider>,

    /// Number of threads (0 = auto-detect)
    #[arg(short, long, global = true)]
    pub threads: Option<usize>,

    /// Treat raw model output as probabilities instead of logits
    #[arg(long, global = true)]
    pub probabilities: bool,

    /// Root directory for `uploads/` and `outputs/`
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Remote fetch timeout in seconds
    #[arg(long, global = true)]
    pub fetch_timeout: Option<u64>,

    /// Run one inference on a blank tensor before serving the request
    #[arg(long, global = true)]
    pub warm_up: bool,

    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Remove the background from a local image file
    Upload {
        file: PathBuf,

        /// Declared content type (guessed from the extension when omitted)
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Remove the background from a remote http(s) image
    Url { url: String },

    /// Remove the background from a base64 payload or `data:` URI
    Base64 {
        /// Payload; read from stdin when omitted or `-`
        payload: Option<String>,

        /// Read the payload from a file instead
        #[arg(long, conflicts_with = "payload")]
        from_file: Option<PathBuf>,
    },

    /// Copy a stored result out of the artifact store
    Fetch {
        /// `{uuid}` or `{uuid}.png`
        filename: String,

        /// Destination (defaults to the artifact name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load the model and report service health
    Status,

    /// Show available backends and execution providers
    Providers,
}

/// Written to stdout after `fetch`
#[derive(Debug, Serialize)]
struct FetchResponse {
    success: bool,
    filename: String,
    path: PathBuf,
    size_bytes: usize,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _tracing_guard = init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    if matches!(cli.command, Command::Providers) {
        show_provider_diagnostics();
        return Ok(());
    }

    let config = build_config(&cli).context("Invalid configuration")?;
    debug!(config = ?config, "Configuration resolved");

    match &cli.command {
        Command::Fetch { filename, output } => fetch_artifact(&config, filename, output.as_deref()).await,
        Command::Providers => Ok(()),
        command => {
            let handlers = start_handlers(&config, &DefaultBackendFactory, cli.warm_up).await?;
            dispatch(&handlers, command).await
        },
    }
}

/// File (or defaults), then `BGREMOVE_*` variables, then flags
fn build_config(cli: &Cli) -> Result<ServiceConfig> {
    let base = match &cli.config {
        Some(path) => ServiceConfig::from_json_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ServiceConfig::default(),
    };

    let mut config = base
        .with_env_overrides()
        .context("Invalid BGREMOVE_* environment override")?;

    if let Some(model) = &cli.model {
        config.model.model_path.clone_from(model);
    }
    if let Some(backend) = cli.backend {
        config.model.backend = backend;
    }
    if let Some(provider) = cli.execution_provider {
        config.model.execution_provider = provider;
    }
    if let Some(threads) = cli.threads {
        config.model.intra_threads = threads;
        config.model.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
    }
    if cli.probabilities {
        config.model.activation = OutputActivation::Identity;
    }
    if let Some(data_dir) = &cli.data_dir {
        config.storage = StorageConfig::under(data_dir);
    }
    if let Some(timeout) = cli.fetch_timeout {
        config.fetch_timeout_secs = timeout;
    }

    config.validate()?;
    Ok(config)
}

async fn start_handlers(
    config: &ServiceConfig,
    factory: &dyn BackendFactory,
    warm_up: bool,
) -> Result<RequestHandlers> {
    info!(
        backend = %config.model.backend,
        provider = %config.model.execution_provider,
        model = %config.model.model_path.display(),
        "Starting background removal service"
    );

    let engine = Arc::new(
        InferenceEngine::from_config(config, factory).context("Failed to load segmentation model")?,
    );
    if warm_up {
        engine.warm_up().context("Warm-up inference failed")?;
    }

    RequestHandlers::with_engine(config, engine)
        .await
        .context("Failed to start request handlers")
}

async fn dispatch(handlers: &RequestHandlers, command: &Command) -> Result<()> {
    match command {
        Command::Upload { file, content_type } => {
            let bytes = tokio::fs::read(file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let content_type = content_type.clone().or_else(|| guess_content_type(file));
            emit(handlers.upload(content_type.as_deref(), &bytes).await)
        },
        Command::Url { url } => emit(handlers.from_url(url).await),
        Command::Base64 { payload, from_file } => {
            let payload = read_payload(payload.as_deref(), from_file.as_deref())?;
            emit(handlers.from_base64(&payload).await)
        },
        Command::Status => emit(Ok(handlers.status())),
        Command::Fetch { .. } | Command::Providers => Ok(()),
    }
}

async fn fetch_artifact(config: &ServiceConfig, filename: &str, output: Option<&Path>) -> Result<()> {
    let store = ArtifactStore::open(config.storage.clone())
        .await
        .context("Failed to open artifact store")?;

    let result = match get_artifact(&store, filename).await {
        Ok(bytes) => {
            let name = Path::new(filename)
                .file_name()
                .map_or_else(|| filename.to_string(), |n| n.to_string_lossy().into_owned());
            let name = if name.ends_with(".png") { name } else { format!("{name}.png") };
            let path = output.map_or_else(|| PathBuf::from(&name), Path::to_path_buf);

            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;

            Ok(FetchResponse {
                success: true,
                filename: name,
                path,
                size_bytes: bytes.len(),
            })
        },
        Err(e) => Err(e),
    };

    emit(result)
}

fn read_payload(payload: Option<&str>, from_file: Option<&Path>) -> Result<String> {
    if let Some(path) = from_file {
        return std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()));
    }

    match payload {
        Some(payload) if payload != "-" => Ok(payload.to_string()),
        _ => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read payload from stdin")?;
            Ok(buffer)
        },
    }
}

fn guess_content_type(path: &Path) -> Option<String> {
    image::ImageFormat::from_path(path)
        .ok()
        .map(|format| format.to_mime_type().to_string())
}

/// Print the response body; a failed request prints its error body and exits non-zero
fn emit<T: Serialize>(result: HandlerResult<T>) -> Result<()> {
    match result {
        Ok(body) => {
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        },
        Err(error) => {
            println!("{}", serde_json::to_string_pretty(&error)?);
            anyhow::bail!("request failed with status {}: {}", error.status, error.detail)
        },
    }
}

/// Display backend and execution provider availability
fn show_provider_diagnostics() {
    println!("🔍 Backend and Execution Provider Diagnostics");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    println!("💻 System: {cpu_count} CPU cores detected");

    let factory = DefaultBackendFactory;
    println!("\n🔧 Compiled backends:");
    for backend in factory.available_backends() {
        println!("  • {backend}");
    }

    #[cfg(feature = "onnx")]
    print_providers("onnx", crate::backends::OnnxBackend::list_providers());
    #[cfg(feature = "tract")]
    print_providers("tract", crate::backends::TractBackend::list_providers());

    println!("\n💡 Select with --backend <onnx|tract> --execution-provider <auto|cpu|cuda|coreml>");
}

#[cfg(any(feature = "onnx", feature = "tract"))]
fn print_providers(backend: &str, providers: Vec<(String, bool, String)>) {
    println!("\n🚀 {backend} execution providers:");
    for (name, available, description) in providers {
        let status = if available { "✅ Available" } else { "❌ Not Available" };
        println!("  • {name}: {status} - {description}");
    }
}
