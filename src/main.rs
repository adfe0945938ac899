use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tempo_compositor::{
    audio::{MusicAnalysis, SoundtrackAnalyzer},
    composition::{CompositionEngine, CompositionRequest},
    config::{seconds, Config},
    pacing::PacingPlanner,
    probe::MetadataProber,
    render::{HttpRenderBackend, InMemoryJobRepository, RenderOrchestrator},
    server::{self, AppState},
};

#[derive(Parser)]
#[command(
    name = "tempo-compositor",
    version,
    about = "Cut media to the beat of a soundtrack and render the result",
    long_about = "Tempo-Compositor analyzes a soundtrack for tempo, beats and energy, plans beat-aligned segments, fills them with your media and submits the edit to an external renderer."
)]
struct Cli {
    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a soundtrack (URL or local file) and print the result as JSON
    Analyze {
        source: String,
    },

    /// Probe a remote media file and print its metadata
    Probe {
        url: String,
    },

    /// Print the pacing plan for a soundtrack
    Plan {
        source: String,

        /// Edit length in seconds (defaults to the soundtrack length)
        #[arg(short, long)]
        duration: Option<f64>,
    },

    /// Build an edit from a JSON composition request
    Compose {
        request: PathBuf,

        /// Submit the edit for rendering
        #[arg(long)]
        submit: bool,

        /// Owner recorded on the render job
        #[arg(long, default_value = "cli")]
        owner: String,

        /// Poll until the render finishes
        #[arg(long, requires = "submit")]
        wait: bool,
    },

    /// Run the HTTP server
    Serve,

    /// Write the default configuration to a file
    InitConfig {
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    info!("Starting Tempo-Compositor v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Analyze { source } => {
            let analysis = analyze(&config, &source).await?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Command::Probe { url } => {
            let prober = MetadataProber::new(config.probe.clone(), reqwest::Client::new());
            let output = prober.probe(&url).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Plan { source, duration } => {
            let analysis = analyze(&config, &source).await?;
            let planner = PacingPlanner::new(config.pacing.clone());
            let pacing = planner.plan(&analysis, duration.unwrap_or(analysis.duration))?;
            println!("{}", serde_json::to_string_pretty(&pacing)?);
        }
        Command::Compose { request, submit, owner, wait } => {
            compose(config, &request, submit.then_some(owner), wait).await?;
        }
        Command::Serve => serve(config).await?,
        Command::InitConfig { path } => {
            Config::default().save_to_file(&path)?;
            info!("Default configuration written to {:?}", path);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

async fn analyze(config: &Config, source: &str) -> Result<MusicAnalysis> {
    let analyzer = SoundtrackAnalyzer::new(config.analysis.clone(), reqwest::Client::new());
    if source.starts_with("http://") || source.starts_with("https://") {
        Ok((*analyzer.analyze_url(source).await?).clone())
    } else {
        Ok(analyzer.analyze_file(source).await?)
    }
}

async fn compose(config: Config, request_path: &Path, owner: Option<String>, wait: bool) -> Result<()> {
    let content = tokio::fs::read_to_string(request_path)
        .await
        .with_context(|| format!("reading {:?}", request_path))?;
    let request: CompositionRequest = serde_json::from_str(&content)
        .with_context(|| format!("parsing {:?}", request_path))?;

    let client = reqwest::Client::new();
    let engine = CompositionEngine::with_client(config.clone(), client.clone());

    let Some(owner) = owner else {
        let plan = engine.compose(request).await?;
        for failure in &plan.probe_failures {
            warn!("Asset {} used defaults: {}", failure.asset_id, failure.message);
        }
        println!("{}", serde_json::to_string_pretty(&plan.edit)?);
        return Ok(());
    };

    let mut render = config.render.clone();
    // The CLI polls itself when waiting
    render.poll_enabled = false;
    let orchestrator = RenderOrchestrator::new(
        HttpRenderBackend::new(config.render.clone(), client),
        InMemoryJobRepository::new(),
        render,
    );

    let (_, mut job) = engine.compose_and_submit(&orchestrator, &owner, request).await?;
    info!("🚀 Render job {} submitted as {}", job.id, job.external_id);

    if wait {
        let interval = seconds(config.render.poll_interval_sec);
        for _ in 0..config.render.max_poll_attempts {
            tokio::time::sleep(interval).await;
            match orchestrator.poll_once(&job.external_id).await {
                Ok(_) => {}
                Err(e) if e.is_recoverable() => {
                    warn!("Status poll failed: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
            job = orchestrator.get_job(job.id).await?;
            info!("   Status: {}", job.status);
            if job.status.is_terminal() {
                break;
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let client = reqwest::Client::new();
    let state = AppState {
        orchestrator: RenderOrchestrator::new(
            HttpRenderBackend::new(config.render.clone(), client.clone()),
            InMemoryJobRepository::new(),
            config.render.clone(),
        ),
        prober: MetadataProber::new(config.probe.clone(), client),
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;

    server::serve(listener, state, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
        }
    })
    .await?;

    Ok(())
}
