//! Media Backend - Schnittstelle zur Host-Umgebung
//!
//! Mikrofon-Zugriff, Audio-Kontext und Wiedergabe des Remote-Streams.

use super::analyser::AudioContext;
use super::stream::{AudioConstraints, MediaStream, SAMPLE_RATE};
use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Permission denied by the user or the environment")]
    PermissionDenied,

    #[error("Requested audio device not found")]
    NotFound,

    #[error("Audio processing is not supported in this environment")]
    Unsupported,

    #[error("Stream has no audio track")]
    NoAudioTrack,

    #[error("Invalid FFT size {0}: must be a power of two between 32 and 32768")]
    InvalidFftSize(usize),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Audio device error: {0}")]
    Device(String),
}

// ============================================================================
// BACKEND TRAIT
// ============================================================================

/// Media-Fähigkeiten der Umgebung
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Fordert das Mikrofon an
    async fn get_user_media(
        &self,
        constraints: AudioConstraints,
    ) -> Result<MediaStream, MediaError>;

    /// Erstellt einen Audio-Kontext (schlägt synchron fehl, wenn nicht unterstützt)
    fn create_audio_context(&self) -> Result<AudioContext, MediaError> {
        Ok(AudioContext::new(SAMPLE_RATE))
    }

    /// Spielt den Remote-Stream ab
    fn attach_remote(&self, stream: &MediaStream) -> Result<(), MediaError>;

    /// Beendet die Wiedergabe des Remote-Streams
    fn detach_remote(&self);
}
