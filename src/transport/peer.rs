//! Schnittstelle zum Transport-Kollaborateur
//!
//! NAT-Traversal, SDP/ICE und Verschlüsselung liegen komplett hinter
//! diesen Traits. Der Session Controller sieht nur Verbindung, Anruf
//! und deren Events.

use super::events::{CallLink, PeerEvents};
use super::options::PeerOptions;
use crate::identity::AgentId;
use crate::media::MediaStream;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("ID \"{0}\" is taken")]
    IdTaken(String),

    #[error("Could not connect to peer {0}")]
    PeerUnavailable(String),

    #[error("Cannot connect to new peer after disconnecting from server")]
    Disconnected,

    #[error("Peer has been destroyed")]
    Destroyed,

    #[error("Call with {0} is already closed")]
    CallClosed(String),

    #[error("Network error: {0}")]
    Network(String),
}

// ============================================================================
// TRAITS
// ============================================================================

/// Call-Typ einer Verbindung
pub type CallOf<P> = <P as PeerHandle>::Call;

/// Öffnet Verbindungen zum Mesh
#[async_trait]
pub trait Transport: Send + Sync {
    type Peer: PeerHandle + 'static;

    /// Öffnet eine Verbindung unter der gegebenen ID
    ///
    /// Das `Open`-Event kommt über den Receiver, sobald die Verbindung
    /// adressierbar ist.
    async fn open(
        &self,
        id: &AgentId,
        options: &PeerOptions,
    ) -> Result<(Self::Peer, PeerEvents<CallOf<Self::Peer>>), TransportError>;
}

/// Offene Verbindung zum Mesh
#[async_trait]
pub trait PeerHandle: Send + Sync {
    type Call: CallHandle + 'static;

    /// Eigene ID auf dem Mesh
    fn id(&self) -> &str;

    /// Ruft einen anderen Peer an und überträgt den lokalen Stream
    async fn call(
        &self,
        remote_id: &str,
        stream: &MediaStream,
    ) -> Result<CallLink<Self::Call>, TransportError>;

    /// Stellt die Verbindung zum Signaling-Server wieder her
    fn reconnect(&self) -> Result<(), TransportError>;

    /// Schließt alle Anrufe und die Verbindung
    fn destroy(&self);
}

/// Einzelner Anruf
#[async_trait]
pub trait CallHandle: Send + Sync + fmt::Debug {
    /// ID der Gegenseite
    fn remote_id(&self) -> &str;

    /// Nimmt einen eingehenden Anruf mit dem lokalen Stream an
    async fn answer(&self, stream: &MediaStream) -> Result<(), TransportError>;

    /// Beendet den Anruf (mehrfacher Aufruf ist erlaubt)
    fn close(&self);
}
