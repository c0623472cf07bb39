//! Status-Modell für die Darstellung

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Meldung nach einem beendeten Anruf
pub const CALL_ENDED: &str = "Call ended";

/// Art des aktuellen Status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusKind {
    Initializing,
    Ready,
    Calling,
    InCall,
    Incoming,
    Error,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Initializing => "initializing",
            StatusKind::Ready => "ready",
            StatusKind::Calling => "calling",
            StatusKind::InCall => "in-call",
            StatusKind::Incoming => "incoming",
            StatusKind::Error => "error",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aktueller Status mit lesbarer Meldung
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub kind: StatusKind,
    pub message: String,
    pub since: DateTime<Utc>,
}

impl Status {
    fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            since: Utc::now(),
        }
    }

    pub fn initializing() -> Self {
        Self::new(StatusKind::Initializing, "Initializing...")
    }

    pub fn ready(id: &str) -> Self {
        Self::new(StatusKind::Ready, format!("Ready. Your ID is {}", id))
    }

    pub fn reconnected() -> Self {
        Self::new(StatusKind::Ready, "Reconnected")
    }

    pub fn call_ended() -> Self {
        Self::new(StatusKind::Ready, CALL_ENDED)
    }

    pub fn calling(remote_id: &str) -> Self {
        Self::new(StatusKind::Calling, format!("Calling {}...", remote_id))
    }

    pub fn incoming(remote_id: &str) -> Self {
        Self::new(
            StatusKind::Incoming,
            format!("Incoming call from {}...", remote_id),
        )
    }

    pub fn in_call(remote_id: &str) -> Self {
        Self::new(StatusKind::InCall, format!("In call with {}", remote_id))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Error, message)
    }

    pub fn is_error(&self) -> bool {
        self.kind == StatusKind::Error
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}
