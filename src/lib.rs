//! Agentic Call - P2P Voice Calls zwischen Agents
//!
//! Ein serverloser Sprach-Anruf zwischen zwei Agents mit:
//! - Mesh-Transport hinter Traits (Signaling, NAT-Traversal, SDP/ICE extern)
//! - Zustandsmaschine für den Anruf (`session`)
//! - Mikrofon-Pegel per FFT-Analyse (`media`)
//!
//! ## Verwendung
//! ```rust,no_run
//! use agentic_call::media::{MediaPipeline, MediaSettings, SyntheticMedia};
//! use agentic_call::session::{SessionConfig, SessionController};
//! use agentic_call::transport::LocalMesh;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), agentic_call::session::SessionError> {
//! let mesh = LocalMesh::new();
//! let media = MediaPipeline::new(Arc::new(SyntheticMedia::tone(440.0, 0.3)), MediaSettings::default());
//! let mut agent = SessionController::new(SessionConfig::default(), mesh, media);
//!
//! agent.initialize().await?;
//! agent.process_next_event().await; // Open -> ready
//! agent.place_call("agentic-ab12-cd34").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod identity;
pub mod media;
pub mod session;
pub mod transport;

pub use config::{AppConfig, ConfigError};
pub use identity::AgentId;
pub use session::{Command, SessionController, SessionError, Status, StatusKind};

use tracing_subscriber::EnvFilter;

// ============================================================================
// LOGGING
// ============================================================================

/// Initialisiert das Logging (mehrfacher Aufruf ist erlaubt)
///
/// `RUST_LOG` wird zuerst gelesen, die übergebenen Direktiven kommen dazu.
/// Ungültige Direktiven werden übersprungen. Ausgabe auf stderr, damit
/// stdout für die Demo-Ausgabe frei bleibt.
pub fn init_logging(directives: &str) {
    let mut filter = EnvFilter::from_default_env();
    for directive in directives.split(',').map(str::trim).filter(|d| !d.is_empty()) {
        match directive.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring log directive {:?}: {}", directive, e),
        }
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
