//! Media Pipeline
//!
//! Hält den lokalen Mikrofon-Stream, den Audio-Kontext und den Analyser
//! einer Session und veröffentlicht den aktuellen Mikrofon-Pegel.
//!
//! Es läuft höchstens eine Sampling-Schleife: ein Neustart bricht die
//! vorherige Schleife ab, `teardown()` beendet alles und setzt den Pegel
//! auf 0.

use super::analyser::{AnalyserNode, AudioContext, DEFAULT_FFT_SIZE};
use super::backend::{MediaBackend, MediaError};
use super::frames::{FrameScheduler, IntervalFrames, DEFAULT_FRAME_INTERVAL};
use super::stream::{AudioConstraints, MediaStream};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

// ============================================================================
// SETTINGS
// ============================================================================

/// Einstellungen der Media Pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub fft_size: usize,
    pub frame_interval_ms: u64,
}

impl MediaSettings {
    pub fn constraints(&self) -> AudioConstraints {
        AudioConstraints {
            echo_cancellation: self.echo_cancellation,
            noise_suppression: self.noise_suppression,
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            fft_size: DEFAULT_FFT_SIZE,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL.as_millis() as u64,
        }
    }
}

// ============================================================================
// SAMPLER
// ============================================================================

/// Laufende Sampling-Schleife
struct Sampler {
    task: JoinHandle<()>,
    active: Arc<AtomicBool>,
}

impl Sampler {
    fn cancel(self) {
        self.active.store(false, Ordering::SeqCst);
        self.task.abort();
    }
}

// ============================================================================
// MEDIA PIPELINE
// ============================================================================

pub struct MediaPipeline {
    backend: Arc<dyn MediaBackend>,
    scheduler: Arc<dyn FrameScheduler>,
    settings: MediaSettings,
    stream: Option<MediaStream>,
    context: Option<AudioContext>,
    analyser: Option<Arc<Mutex<AnalyserNode>>>,
    sampler: Option<Sampler>,
    remote: Option<MediaStream>,
    level_tx: Arc<watch::Sender<f32>>,
}

impl MediaPipeline {
    /// Erstellt eine Pipeline mit `IntervalFrames` aus den Einstellungen
    pub fn new(backend: Arc<dyn MediaBackend>, settings: MediaSettings) -> Self {
        let scheduler = Arc::new(IntervalFrames::new(settings.frame_interval()));
        let (level_tx, _) = watch::channel(0.0);

        Self {
            backend,
            scheduler,
            settings,
            stream: None,
            context: None,
            analyser: None,
            sampler: None,
            remote: None,
            level_tx: Arc::new(level_tx),
        }
    }

    /// Ersetzt den Frame Scheduler
    pub fn with_scheduler(mut self, scheduler: Arc<dyn FrameScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn settings(&self) -> &MediaSettings {
        &self.settings
    }

    /// Gehaltener lokaler Stream
    pub fn local_stream(&self) -> Option<&MediaStream> {
        self.stream.as_ref()
    }

    /// Angehängter Remote-Stream
    pub fn remote_stream(&self) -> Option<&MediaStream> {
        self.remote.as_ref()
    }

    pub fn has_audio_context(&self) -> bool {
        self.context.is_some()
    }

    pub fn is_sampling(&self) -> bool {
        self.sampler.is_some()
    }

    /// Aktueller Mikrofon-Pegel
    pub fn mic_level(&self) -> f32 {
        *self.level_tx.borrow()
    }

    /// Receiver für den Mikrofon-Pegel (nur der letzte Wert zählt)
    pub fn subscribe_mic_level(&self) -> watch::Receiver<f32> {
        self.level_tx.subscribe()
    }

    /// Liefert den lokalen Stream, fordert das Mikrofon nur beim ersten Mal an
    pub async fn ensure_local_stream(&mut self) -> Result<MediaStream, MediaError> {
        if let Some(stream) = &self.stream {
            return Ok(stream.clone());
        }

        let constraints = self.settings.constraints();
        tracing::info!(
            "Requesting microphone (echo cancellation: {}, noise suppression: {})",
            constraints.echo_cancellation,
            constraints.noise_suppression
        );

        let stream = self.backend.get_user_media(constraints).await?;

        if let Err(e) = self.build_analysis(&stream) {
            tracing::warn!("Audio analysis unavailable: {}", e);
            stream.stop_all();
            self.close_context();
            return Err(e);
        }

        tracing::info!("Microphone stream {} acquired", stream.id());
        self.stream = Some(stream.clone());
        Ok(stream)
    }

    /// Startet die Sampling-Schleife (bricht eine laufende vorher ab)
    ///
    /// Gibt `false` zurück, wenn noch kein Analyser existiert.
    pub fn observe_mic_level(&mut self) -> bool {
        self.stop_mic_level();

        let Some(analyser) = self.analyser.as_ref().map(Arc::clone) else {
            tracing::debug!("No analyser, mic level not observed");
            return false;
        };

        let scheduler = Arc::clone(&self.scheduler);
        let level_tx = Arc::clone(&self.level_tx);
        let active = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&active);

        let task = tokio::spawn(async move {
            loop {
                scheduler.next_frame().await;
                let level = analyser.lock().volume();

                // Unter dem Write-Lock des Channels: nach teardown() wird nichts mehr publiziert
                level_tx.send_if_modified(|current| {
                    if !flag.load(Ordering::SeqCst) {
                        return false;
                    }
                    *current = level;
                    true
                });

                if !flag.load(Ordering::SeqCst) {
                    break;
                }
            }
        });

        self.sampler = Some(Sampler { task, active });
        true
    }

    /// Beendet die Sampling-Schleife
    pub fn stop_mic_level(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            sampler.cancel();
        }
    }

    /// Hängt den Remote-Stream zur Wiedergabe an
    pub fn attach_remote(&mut self, stream: MediaStream) -> Result<(), MediaError> {
        if self.remote.is_some() {
            self.backend.detach_remote();
        }
        self.backend.attach_remote(&stream)?;
        tracing::info!("Remote stream {} attached for playback", stream.id());
        self.remote = Some(stream);
        Ok(())
    }

    /// Gibt alle Ressourcen frei (idempotent)
    pub fn teardown(&mut self) {
        self.stop_mic_level();

        if let Some(stream) = self.stream.take() {
            stream.stop_all();
            tracing::info!("Microphone stream {} released", stream.id());
        }

        if let Some(analyser) = self.analyser.take() {
            analyser.lock().disconnect();
        }

        self.close_context();

        if self.remote.take().is_some() {
            self.backend.detach_remote();
        }

        self.level_tx.send_replace(0.0);
    }

    fn build_analysis(&mut self, stream: &MediaStream) -> Result<(), MediaError> {
        if self.context.is_none() {
            self.context = Some(self.backend.create_audio_context()?);
        }

        let context = self
            .context
            .as_ref()
            .ok_or_else(|| MediaError::InvalidState("no audio context".to_string()))?;
        let analyser = context.create_analyser(stream, self.settings.fft_size)?;

        self.analyser = Some(Arc::new(Mutex::new(analyser)));
        Ok(())
    }

    fn close_context(&mut self) {
        if let Some(mut context) = self.context.take() {
            if let Err(e) = context.close() {
                tracing::debug!("Ignoring AudioContext close error: {}", e);
            }
        }
    }
}

impl Drop for MediaPipeline {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for MediaPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaPipeline")
            .field("stream", &self.stream.as_ref().map(MediaStream::id))
            .field("sampling", &self.is_sampling())
            .field("mic_level", &self.mic_level())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
