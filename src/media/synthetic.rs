//! Synthetisches Mikrofon
//!
//! Erzeugt einen Sinuston oder Stille in 20ms-Frames. Wird für die Demo
//! und für Tests ohne Audio-Hardware verwendet. Verweigerte Berechtigung
//! und fehlender Audio-Kontext lassen sich gezielt simulieren.

use super::analyser::AudioContext;
use super::backend::{MediaBackend, MediaError};
use super::stream::{AudioConstraints, AudioTrack, MediaStream, FRAME_SIZE, SAMPLE_RATE};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Dauer eines Frames
const FRAME_DURATION: Duration = Duration::from_millis(20);

/// Signal des synthetischen Mikrofons
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    Silence,
    Tone { frequency: f32, amplitude: f32 },
}

/// Erzeugt fortlaufende Frames ohne Phasensprung
struct ToneGenerator {
    signal: Signal,
    phase: f32,
}

impl ToneGenerator {
    fn new(signal: Signal) -> Self {
        Self { signal, phase: 0.0 }
    }

    fn next_frame(&mut self) -> Vec<f32> {
        match self.signal {
            Signal::Silence => vec![0.0; FRAME_SIZE],
            Signal::Tone {
                frequency,
                amplitude,
            } => {
                let step = 2.0 * PI * frequency / SAMPLE_RATE as f32;
                (0..FRAME_SIZE)
                    .map(|_| {
                        let sample = amplitude * self.phase.sin();
                        self.phase = (self.phase + step) % (2.0 * PI);
                        sample
                    })
                    .collect()
            }
        }
    }
}

/// Media Backend mit generiertem Signal
#[derive(Debug)]
pub struct SyntheticMedia {
    signal: Signal,
    permission_granted: bool,
    audio_context_supported: bool,
    requests: AtomicUsize,
    issued: Mutex<Vec<AudioTrack>>,
    attached: Mutex<Option<Uuid>>,
}

impl SyntheticMedia {
    pub fn new(signal: Signal) -> Self {
        Self {
            signal,
            permission_granted: true,
            audio_context_supported: true,
            requests: AtomicUsize::new(0),
            issued: Mutex::new(Vec::new()),
            attached: Mutex::new(None),
        }
    }

    pub fn tone(frequency: f32, amplitude: f32) -> Self {
        Self::new(Signal::Tone {
            frequency,
            amplitude,
        })
    }

    pub fn silence() -> Self {
        Self::new(Signal::Silence)
    }

    /// Jede Mikrofon-Anfrage wird abgelehnt
    pub fn deny_permission(mut self) -> Self {
        self.permission_granted = false;
        self
    }

    /// Audio-Kontexte können nicht erstellt werden
    pub fn without_audio_context(mut self) -> Self {
        self.audio_context_supported = false;
        self
    }

    /// Anzahl der Mikrofon-Anfragen
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Alle bisher ausgegebenen Tracks
    pub fn issued_tracks(&self) -> Vec<AudioTrack> {
        self.issued.lock().clone()
    }

    /// ID des gerade wiedergegebenen Remote-Streams
    pub fn attached_remote(&self) -> Option<Uuid> {
        *self.attached.lock()
    }
}

#[async_trait]
impl MediaBackend for SyntheticMedia {
    async fn get_user_media(
        &self,
        constraints: AudioConstraints,
    ) -> Result<MediaStream, MediaError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        if !self.permission_granted {
            return Err(MediaError::PermissionDenied);
        }

        let track = AudioTrack::new("Synthetic microphone", constraints);
        let mut generator = ToneGenerator::new(self.signal);
        let writer = track.writer();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(FRAME_DURATION);
            loop {
                interval.tick().await;
                if !writer.write(&generator.next_frame()) {
                    break;
                }
            }
        });
        track.set_stop_hook(move || task.abort());

        self.issued.lock().push(track.clone());
        tracing::debug!("Synthetic microphone {} started ({:?})", track.id(), self.signal);

        Ok(MediaStream::new(vec![track]))
    }

    fn create_audio_context(&self) -> Result<AudioContext, MediaError> {
        if !self.audio_context_supported {
            return Err(MediaError::Unsupported);
        }
        Ok(AudioContext::new(SAMPLE_RATE))
    }

    fn attach_remote(&self, stream: &MediaStream) -> Result<(), MediaError> {
        *self.attached.lock() = Some(stream.id());
        Ok(())
    }

    fn detach_remote(&self) {
        self.attached.lock().take();
    }
}

// ============================================================================
// TESTS
// ============================================================================
