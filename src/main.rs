//! agentic-call CLI
//!
//! Usage:
//!   agentic-call demo --seconds 5
//!   agentic-call demo --json
//!   agentic-call id
//!   agentic-call config

use agentic_call::media::{MediaBackend, MediaPipeline, SyntheticMedia};
use agentic_call::transport::LocalMesh;
use agentic_call::{init_logging, AgentId, AppConfig, Command, SessionController, Status, StatusKind};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Wie lange die Demo auf einen Statuswechsel wartet
const STEP_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// CLI DEFINITION
// ============================================================================

#[derive(Parser)]
#[command(
    name = "agentic-call",
    version,
    about = "Peer-to-peer voice calls between agents"
)]
struct Cli {
    /// Konfigurationsdatei (Standard: App-Konfigurationsverzeichnis)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Two agents call each other over the in-process mesh
    Demo {
        /// How long the call stays up
        #[arg(long, default_value_t = 3)]
        seconds: u64,

        /// Print status changes as JSON lines
        #[arg(long)]
        json: bool,

        /// Use the default microphone and speaker for agent A
        #[cfg(feature = "device-audio")]
        #[arg(long)]
        device: bool,
    },
    /// Print a freshly generated agent ID
    Id,
    /// Print the effective configuration
    Config,
}

// ============================================================================
// ENTRY POINT
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) if !path.exists() => bail!("Config file {:?} does not exist", path),
        Some(path) => AppConfig::load_from(Some(path)),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;

    init_logging(&config.log_filter);

    match cli.command {
        #[cfg(feature = "device-audio")]
        Commands::Demo {
            seconds,
            json,
            device,
        } => run_demo(&config, seconds, json, device).await,
        #[cfg(not(feature = "device-audio"))]
        Commands::Demo { seconds, json } => run_demo(&config, seconds, json, false).await,
        Commands::Id => {
            let id = AgentId::generate(&config.id_prefix)?;
            println!("{}", id);
            Ok(())
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

// ============================================================================
// DEMO
// ============================================================================

struct DemoAgent {
    name: &'static str,
    id: AgentId,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<Status>,
    level: watch::Receiver<f32>,
    task: JoinHandle<()>,
}

impl DemoAgent {
    async fn spawn(
        name: &'static str,
        mesh: &LocalMesh,
        config: &AppConfig,
        backend: Arc<dyn MediaBackend>,
        json: bool,
    ) -> anyhow::Result<Self> {
        let media = MediaPipeline::new(backend, config.media.clone());
        let mut controller = SessionController::new(config.session_config(), mesh.clone(), media);

        let id = controller
            .initialize()
            .await
            .with_context(|| format!("Agent {} failed to initialize", name))?;

        let status = controller.subscribe_status();
        let level = controller.subscribe_mic_level();
        let (commands, rx) = mpsc::unbounded_channel();

        tokio::spawn(print_status(name, status.clone(), json));
        let task = tokio::spawn(controller.run(rx));

        Ok(Self {
            name,
            id,
            commands,
            status,
            level,
            task,
        })
    }

    fn send(&self, command: Command) -> anyhow::Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow::anyhow!("Agent {} has stopped", self.name))
    }

    async fn wait_for(&mut self, kind: StatusKind) -> anyhow::Result<()> {
        let reached = tokio::time::timeout(STEP_TIMEOUT, self.status.wait_for(|s| s.kind == kind))
            .await
            .map(|result| result.is_ok());

        match reached {
            Ok(true) => Ok(()),
            Ok(false) => bail!("Agent {} stopped before reaching {}", self.name, kind),
            Err(_) => bail!(
                "Agent {} did not reach {} (last status: {})",
                self.name,
                kind,
                *self.status.borrow()
            ),
        }
    }

    fn level(&self) -> f32 {
        *self.level.borrow()
    }
}

async fn print_status(name: &'static str, mut status: watch::Receiver<Status>, json: bool) {
    while status.changed().await.is_ok() {
        let current = status.borrow_and_update().clone();
        if json {
            println!(
                "{}",
                serde_json::json!({ "agent": name, "status": current })
            );
        } else {
            println!("{} {}", name, current);
        }
    }
}

async fn run_demo(config: &AppConfig, seconds: u64, json: bool, device: bool) -> anyhow::Result<()> {
    let mesh = LocalMesh::new();

    let backend_a: Arc<dyn MediaBackend> = if device {
        device_backend()?
    } else {
        Arc::new(SyntheticMedia::tone(440.0, 0.3))
    };
    let backend_b: Arc<dyn MediaBackend> = Arc::new(SyntheticMedia::tone(660.0, 0.2));

    let mut a = DemoAgent::spawn("A", &mesh, config, backend_a, json).await?;
    let mut b = DemoAgent::spawn("B", &mesh, config, backend_b, json).await?;

    a.wait_for(StatusKind::Ready).await?;
    b.wait_for(StatusKind::Ready).await?;
    tracing::info!("Agents ready: A={} B={}", a.id, b.id);

    b.send(Command::PlaceCall(a.id.to_string()))?;
    a.wait_for(StatusKind::InCall).await?;
    b.wait_for(StatusKind::InCall).await?;

    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    for _ in 0..seconds * 2 {
        ticker.tick().await;
        if json {
            println!(
                "{}",
                serde_json::json!({ "levels": { "A": a.level(), "B": b.level() } })
            );
        } else {
            println!("mic level  A: {:6.1}  B: {:6.1}", a.level(), b.level());
        }
    }

    b.send(Command::EndCall)?;
    a.wait_for(StatusKind::Ready).await?;
    b.wait_for(StatusKind::Ready).await?;

    a.send(Command::Shutdown)?;
    b.send(Command::Shutdown)?;

    for result in futures::future::join_all([a.task, b.task]).await {
        result.context("Agent task failed")?;
    }

    tracing::info!(
        "Demo finished: {} call(s) placed, {} still open",
        mesh.calls_placed(),
        mesh.active_calls()
    );
    Ok(())
}

#[cfg(feature = "device-audio")]
fn device_backend() -> anyhow::Result<Arc<dyn MediaBackend>> {
    Ok(Arc::new(agentic_call::media::DeviceMedia::new()))
}

#[cfg(not(feature = "device-audio"))]
fn device_backend() -> anyhow::Result<Arc<dyn MediaBackend>> {
    bail!("Built without the `device-audio` feature")
}
