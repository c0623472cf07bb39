//! Zwischenablage (best effort)

use parking_lot::Mutex;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClipboardError {
    #[error("Clipboard unavailable: {0}")]
    Unavailable(String),
}

/// Schreibzugriff auf die Zwischenablage
pub trait Clipboard: Send + Sync {
    fn write_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// Prozess-lokale Zwischenablage
#[derive(Debug)]
pub struct MemoryClipboard {
    content: Mutex<Option<String>>,
    available: bool,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self {
            content: Mutex::new(None),
            available: true,
        }
    }

    /// Jeder Schreibversuch schlägt fehl
    pub fn unavailable() -> Self {
        Self {
            content: Mutex::new(None),
            available: false,
        }
    }

    /// Zuletzt geschriebener Text
    pub fn contents(&self) -> Option<String> {
        self.content.lock().clone()
    }
}

impl Default for MemoryClipboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Clipboard for MemoryClipboard {
    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        if !self.available {
            return Err(ClipboardError::Unavailable(
                "write permission not granted".to_string(),
            ));
        }
        *self.content.lock() = Some(text.to_string());
        Ok(())
    }
}
