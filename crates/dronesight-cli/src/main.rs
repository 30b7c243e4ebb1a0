use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dronesight_core::{status_line, FaceClient, FacePipeline, TrainingStatus};
use dronesight_hw::{BindOutcome, Camera, StillImageLink, UvcLink, VideoLink};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;
mod engine;

use config::Config;
use engine::{spawn_engine, CaptureSettings, EngineHandle};

#[derive(Parser)]
#[command(name = "dronesight", about = "Identify faces in a drone's live video feed")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct SourceArgs {
    /// V4L2 capture device (defaults to the configured camera_device)
    #[arg(short, long, conflicts_with = "image")]
    device: Option<String>,
    /// Analyse an image file instead of a live device
    #[arg(short, long)]
    image: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture one frame and identify the first face in it
    Analyze {
        #[command(flatten)]
        source: SourceArgs,
        /// Print the full analysis as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep the feed open; press Enter to analyse, `q` to quit
    Live {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// List V4L2 capture devices
    Devices,
    /// Person group management
    Group {
        #[command(subcommand)]
        command: GroupCommands,
    },
    /// Person management
    Person {
        #[command(subcommand)]
        command: PersonCommands,
    },
    /// Start training the configured person group
    Train,
    /// Show training status of the configured person group
    TrainingStatus,
}

#[derive(Subcommand)]
enum GroupCommands {
    /// Create the configured person group (no-op if it exists)
    Create {
        /// Display name for the group
        #[arg(short, long)]
        name: String,
        #[arg(long)]
        user_data: Option<String>,
    },
}

#[derive(Subcommand)]
enum PersonCommands {
    /// Create a person in the configured group and print its id
    Create {
        name: String,
        #[arg(long)]
        user_data: Option<String>,
    },
    /// Upload a face image for a person
    AddFace {
        person_id: Uuid,
        image: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No capture devices found");
            }
            for d in devices {
                println!("{}\t{}\t{} ({})", d.path, d.name, d.driver, d.bus);
            }
        }
        Commands::Analyze { source, json } => {
            let engine = start_engine(&config, &source)?;
            let report = engine.analyze().await?;
            if json {
                println!("{}", report_json(&report));
            } else {
                println!("{}", status_line(&report.analysis));
            }
        }
        Commands::Live { source } => {
            let engine = start_engine(&config, &source)?;
            run_live(&engine).await?;
        }
        Commands::Group { command } => {
            let client = client(&config)?;
            match command {
                GroupCommands::Create { name, user_data } => {
                    client
                        .create_person_group(&config.person_group_id, &name, user_data.as_deref())
                        .await?;
                    println!("Person group {} ready", config.person_group_id);
                }
            }
        }
        Commands::Person { command } => {
            let client = client(&config)?;
            match command {
                PersonCommands::Create { name, user_data } => {
                    let id = client
                        .create_person(&config.person_group_id, &name, user_data.as_deref())
                        .await?;
                    println!("{id}");
                }
                PersonCommands::AddFace { person_id, image } => {
                    let bytes = tokio::fs::read(&image)
                        .await
                        .with_context(|| format!("reading {}", image.display()))?;
                    let face = client
                        .add_person_face(&config.person_group_id, person_id, bytes)
                        .await?;
                    println!("{face}");
                }
            }
        }
        Commands::Train => {
            client(&config)?.train(&config.person_group_id).await?;
            println!("Training queued for {}", config.person_group_id);
        }
        Commands::TrainingStatus => {
            let status = client(&config)?
                .training_status(&config.person_group_id)
                .await?;
            print!("{}", training_report(&status));
        }
    }

    Ok(())
}

fn client(config: &Config) -> Result<FaceClient> {
    config.require_service()?;
    Ok(FaceClient::new(config.client_config())?)
}

fn open_link(config: &Config, source: &SourceArgs) -> Result<Arc<dyn VideoLink>> {
    if let Some(path) = &source.image {
        return Ok(Arc::new(StillImageLink::open(path)?));
    }
    let device = source.device.as_deref().unwrap_or(&config.camera_device);
    Ok(Arc::new(UvcLink::open(device)))
}

fn start_engine(config: &Config, source: &SourceArgs) -> Result<EngineHandle> {
    let client = client(config)?;
    let pipeline = FacePipeline::new(Arc::new(client), config.identify_options())
        .with_stage_timeout(config.stage_timeout());
    let link = open_link(config, source)?;
    let settings = CaptureSettings {
        frame_timeout: config.frame_timeout(),
        jpeg_quality: config.jpeg_quality,
    };

    let (engine, outcome) = spawn_engine(link, pipeline, settings, tokio::runtime::Handle::current());
    match outcome {
        BindOutcome::Bound => Ok(engine),
        BindOutcome::Disconnected => bail!("video source disconnected"),
        BindOutcome::UnknownModel => bail!("video source reports an unknown model"),
        BindOutcome::NoFeed => bail!("video source exposes no feed"),
    }
}

/// Interactive loop: each Enter is one capture trigger.
async fn run_live(engine: &EngineHandle) -> Result<()> {
    println!("Press Enter to analyse, `r` to rebind, `q` to quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "q" | "quit" => break,
            "r" => println!("{:?}", engine.rebind().await?),
            _ => match engine.analyze().await {
                Ok(report) => println!("{}", status_line(&report.analysis)),
                Err(e) => println!("Capture failed: {e}"),
            },
        }
    }
    Ok(())
}

fn report_json(report: &engine::AnalysisReport) -> serde_json::Value {
    use dronesight_core::Analysis;

    let (outcome, person, confidence, error) = match &report.analysis {
        Analysis::NoFaceDetected { cause } => {
            ("no_face", None, None, cause.as_ref().map(|e| e.to_string()))
        }
        Analysis::Unidentified { .. } => ("unidentified", None, None, None),
        Analysis::Identified { person, confidence, .. } => {
            ("identified", Some(person), Some(*confidence), None)
        }
        Analysis::Failed { error, .. } => ("failed", None, None, Some(error.to_string())),
    };

    serde_json::json!({
        "status": status_line(&report.analysis),
        "outcome": outcome,
        "faces": report.analysis.faces(),
        "person": person,
        "confidence": confidence,
        "error": error,
        "frame": {
            "sequence": report.frame_sequence,
            "width": report.frame_size.0,
            "height": report.frame_size.1,
            "jpeg_bytes": report.jpeg_bytes,
        },
        "elapsed_ms": report.elapsed.as_millis() as u64,
    })
}

fn training_report(status: &TrainingStatus) -> String {
    let mut out = format!("Status:      {}\n", status.status);
    if let Some(at) = status.created_at() {
        out.push_str(&format!("Created:     {}\n", at.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    if let Some(at) = status.last_action_at() {
        out.push_str(&format!("Last action: {}\n", at.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    if let Some(message) = &status.message {
        out.push_str(&format!("Message:     {message}\n"));
    }
    out
}
