// Vigil Command Line Interface
// Offline tools for the proctoring violation pipeline

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vigil_core::config::{render, ConfigFormat};
use vigil_core::{DetectionResult, Frame};
use vigil_eye::{
    DetectionModel, FrameSource, ImageFrameSource, MonitorConfig, MonitoringSession, ReplayModel,
    SyntheticFrameSource, ViolationClassifier,
};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Vigil - exam proctoring violation pipeline", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one detection result (JSON) and print the violation events
    Classify {
        /// Detection result file
        detection: PathBuf,

        /// Configuration file (toml, yaml or json)
        #[arg(long, short)]
        config: Option<PathBuf>,
    },

    /// Validate a configuration file
    CheckConfig {
        /// Configuration file path
        path: PathBuf,
    },

    /// Print the default configuration
    PrintConfig {
        #[arg(long, short, value_enum, default_value = "toml")]
        format: OutputFormat,
    },

    /// Replay recorded detections through a full monitoring session
    Replay {
        /// Recorded detections, one JSON object per line
        #[arg(long, short)]
        detections: PathBuf,

        /// Directory of png/jpeg frames; blank frames are used when omitted
        #[arg(long)]
        frames: Option<PathBuf>,

        /// Width of blank frames
        #[arg(long, default_value = "640")]
        width: u32,

        /// Height of blank frames
        #[arg(long, default_value = "480")]
        height: u32,

        /// Configuration file (toml, yaml or json)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Print every violation event as it is merged
        #[arg(long)]
        follow: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Toml,
    Yaml,
    Json,
}

impl From<OutputFormat> for ConfigFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Toml => ConfigFormat::Toml,
            OutputFormat::Yaml => ConfigFormat::Yaml,
            OutputFormat::Json => ConfigFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Classify { detection, config } => {
            classify(&detection, config.as_deref())?;
        }
        Commands::CheckConfig { path } => {
            check_config(&path)?;
        }
        Commands::PrintConfig { format } => {
            print_config(format)?;
        }
        Commands::Replay {
            detections,
            frames,
            width,
            height,
            config,
            follow,
        } => {
            replay(&detections, frames.as_deref(), (width, height), config.as_deref(), follow).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<MonitorConfig> {
    match path {
        Some(path) => MonitorConfig::load(path).with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(MonitorConfig::default()),
    }
}

fn classify(path: &Path, config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let detection: DetectionResult =
        serde_json::from_str(&raw).with_context(|| format!("Invalid detection result in {}", path.display()))?;

    let classifier = ViolationClassifier::from_config(&config);
    let events = classifier.classify(&detection, &config.thresholds, &Frame::blank(1, 1));

    let output: Vec<_> = events
        .iter()
        .map(|event| {
            json!({
                "type": event.violation_type.to_string(),
                "confidence": event.confidence,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = MonitorConfig::load(path).with_context(|| format!("{} is not a valid config", path.display()))?;
    println!(
        "✅ {} is valid ({} prohibited labels, sample every {} ticks)",
        path.display(),
        config.prohibited_objects.len(),
        config.thresholds.frame_sample_interval
    );
    Ok(())
}

fn print_config(format: OutputFormat) -> anyhow::Result<()> {
    let rendered = render(&MonitorConfig::default(), format.into())?;
    println!("{}", rendered);
    Ok(())
}

async fn replay(
    detections: &Path,
    frames: Option<&Path>,
    resolution: (u32, u32),
    config: Option<&Path>,
    follow: bool,
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let thresholds = config.thresholds;

    let model = Arc::new(
        ReplayModel::from_path(detections)
            .with_context(|| format!("Failed to read recording {}", detections.display()))?,
    );
    if model.total() == 0 {
        bail!("Recording {} has no detections", detections.display());
    }

    let source: Arc<dyn FrameSource> = match frames {
        Some(dir) => Arc::new(
            ImageFrameSource::from_directory(dir)
                .with_context(|| format!("Failed to list frames in {}", dir.display()))?,
        ),
        None => Arc::new(SyntheticFrameSource::new(resolution.0, resolution.1)?),
    };

    let session = MonitoringSession::new(config)?;
    if follow {
        session.on_violation(|event| {
            println!(
                "{} {} ({:.2})",
                event.occurred_at.to_rfc3339(),
                event.violation_type,
                event.confidence
            );
        });
    }

    let models: Vec<Arc<dyn DetectionModel>> = vec![model.clone()];
    session
        .initialize(source, models, thresholds)
        .await
        .context("Failed to initialize session")?;
    session.start()?;
    info!("Replaying {} detections in session {}", model.total(), session.id());

    tokio::select! {
        _ = model.wait_exhausted() => {
            info!("Recording exhausted");
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping session");
        }
    }
    session.stop().await;

    let report = json!({
        "session": session.id().to_string(),
        "stats": session.stats(),
        "violations": session.violations(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
