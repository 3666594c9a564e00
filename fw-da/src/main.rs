//! fw-da - Deforestation Analysis service
//!
//! Serves the analysis job API: submit two dates, poll progress, fetch
//! metrics, images and the narrative explanation once the job completes.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fw_common::config::{
    default_config_path, resolve_root_folder, LoggingConfig, RootFolder, TomlConfig,
};
use fw_common::events::EventBus;
use fw_da::collaborators::{
    GeminiNarrator, NarrativeGenerator, SyntheticImagery, TemplateNarrator, VegetationIndexModel,
};
use fw_da::models::Boundary;
use fw_da::services::{AnalysisPipeline, JobManager, MetricsParams, OutputStore};
use fw_da::AppState;

/// CRS assumed when the boundary file does not name one
const DEFAULT_CRS: &str = "EPSG:32643";

/// Command-line arguments for fw-da
#[derive(Parser, Debug)]
#[command(name = "fw-da")]
#[command(about = "Deforestation analysis service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "FW_PORT")]
    port: Option<u16>,

    /// Root folder for outputs and the default boundary file
    #[arg(short, long, env = "FW_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "FW_CONFIG")]
    config: Option<PathBuf>,

    /// Boundary polygon JSON file
    #[arg(short, long, env = "FW_BOUNDARY")]
    boundary: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Step 1: configuration (file, then env, then CLI)
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let mut config = TomlConfig::load(&config_path).context("Failed to load configuration")?;
    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    config
        .analysis
        .validate()
        .context("Invalid analysis configuration")?;

    init_tracing(&config.logging)?;

    info!("Starting fw-da (Deforestation Analysis) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", config_path.display());

    // Step 2: root folder
    let root = RootFolder::new(resolve_root_folder(args.root_folder.as_deref(), &config));
    root.ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", root.path().display());

    // Step 3: area of interest
    let (boundary, demo_boundary) = load_boundary(&args, &config, &root)?;
    info!(
        name = boundary.name.as_deref().unwrap_or("unnamed"),
        area_m2 = boundary.area(),
        "Boundary loaded"
    );

    // Step 4: collaborators
    let crs = boundary
        .crs
        .clone()
        .unwrap_or_else(|| DEFAULT_CRS.to_string());
    let imagery = SyntheticImagery::new(
        boundary.bbox(),
        config.analysis.image_resolution,
        crs,
        config.analysis.max_cloud_cover,
    )
    .context("Failed to set up imagery source")?;
    let (width, height) = imagery.dimensions();
    info!("Imagery grid: {}x{} at {} m", width, height, config.analysis.image_resolution);

    let narrator: Arc<dyn NarrativeGenerator> = match config.narrative.api_key.as_deref() {
        Some(key) => {
            info!("Narratives: Gemini ({})", config.narrative.model);
            Arc::new(
                GeminiNarrator::new(key, &config.narrative.model, &config.narrative.endpoint)
                    .context("Failed to set up Gemini client")?,
            )
        }
        None => {
            info!("Narratives: offline template (no API key configured)");
            Arc::new(TemplateNarrator)
        }
    };

    let pipeline = AnalysisPipeline::new(
        Arc::new(imagery),
        Arc::new(VegetationIndexModel::new()),
        narrator,
        Arc::new(boundary),
        MetricsParams::from(&config.analysis),
        OutputStore::new(root.outputs_dir()),
    );

    // Step 5: job manager and HTTP
    let event_bus = EventBus::new(100);
    let job_manager = JobManager::new(Arc::new(pipeline), event_bus.clone());
    let state = AppState::new(job_manager, event_bus).with_demo_boundary(demo_boundary);
    let app = fw_da::build_router(state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/api/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// `RUST_LOG` wins over the configured level; optional file output
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fw_da={0},fw_common={0},tower_http=info", logging.level)));

    let file_layer = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

/// Boundary from `--boundary`, the config file, or `<root>/boundary.json`
///
/// Falls back to the built-in demo polygon when none of them is present; the
/// flag in the return value records that.
fn load_boundary(args: &Args, config: &TomlConfig, root: &RootFolder) -> Result<(Boundary, bool)> {
    if let Some(path) = args.boundary.as_ref().or(config.boundary_path.as_ref()) {
        let boundary = Boundary::load(path)
            .with_context(|| format!("Failed to load boundary {}", path.display()))?;
        return Ok((boundary, false));
    }

    let default_path = root.default_boundary_path();
    if default_path.exists() {
        let boundary = Boundary::load(&default_path)
            .with_context(|| format!("Failed to load boundary {}", default_path.display()))?;
        return Ok((boundary, false));
    }

    warn!(
        "No boundary file at {}; using the built-in demo boundary",
        default_path.display()
    );
    Ok((demo_boundary()?, true))
}

/// Irregular forest block of roughly 1500 ha with one excluded enclave
fn demo_boundary() -> Result<Boundary> {
    let mut boundary = Boundary::new(vec![
        [500_000.0, 1_500_000.0],
        [504_000.0, 1_500_400.0],
        [504_600.0, 1_503_000.0],
        [501_800.0, 1_504_200.0],
        [499_600.0, 1_502_600.0],
    ])?
    .with_hole(vec![
        [501_500.0, 1_501_500.0],
        [502_000.0, 1_501_500.0],
        [502_000.0, 1_502_000.0],
        [501_500.0, 1_502_000.0],
    ])?;
    boundary.name = Some("Demo forest block".to_string());
    boundary.crs = Some(DEFAULT_CRS.to_string());
    Ok(boundary)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
