//! Fehler des Session Controllers
//!
//! Jeder Fehler wird zusätzlich als `error`-Status mit seiner Meldung
//! veröffentlicht.

use crate::identity::AgentIdError;
use crate::media::{ClipboardError, MediaError};
use crate::transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Microphone access failed: {0}")]
    PermissionDenied(MediaError),

    #[error("Microphone access failed: {0}")]
    UnsupportedEnvironment(MediaError),

    #[error("Media error: {0}")]
    Media(MediaError),

    #[error("Failed to connect to the mesh: {0}")]
    TransportInit(TransportError),

    #[error("Connection lost. Reconnecting...")]
    TransportDisconnected,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Call failed: {0}")]
    Call(String),

    #[error("Please enter a remote agent ID")]
    InvalidInput,

    #[error("Not connected to the mesh yet")]
    NotInitialized,

    #[error("Failed to copy ID: {0}")]
    Clipboard(#[from] ClipboardError),

    #[error("Identity error: {0}")]
    Identity(#[from] AgentIdError),

    #[error("Session has been shut down")]
    ShutDown,
}

impl From<MediaError> for SessionError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::PermissionDenied => SessionError::PermissionDenied(err),
            MediaError::NotFound | MediaError::Unsupported => {
                SessionError::UnsupportedEnvironment(err)
            }
            other => SessionError::Media(other),
        }
    }
}

impl SessionError {
    /// Kann der Benutzer die Aktion einfach wiederholen?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::PermissionDenied(_)
                | SessionError::TransportDisconnected
                | SessionError::Call(_)
                | SessionError::InvalidInput
                | SessionError::Clipboard(_)
        )
    }
}
