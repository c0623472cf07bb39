//! Media Streams und Audio Tracks
//!
//! Ein Track ist ein Fan-out-Producer: jeder Konsument (Analyser, Playback)
//! holt sich einen eigenen `SampleTap` mit eigenem Ring-Buffer. Ist der
//! Buffer voll, werden die ältesten Samples überschrieben.

use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use uuid::Uuid;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Sample Rate (48kHz ist der Standard für beste Qualität)
pub const SAMPLE_RATE: u32 = 48000;

/// Channels (Mono für Voice)
pub const CHANNELS: u16 = 1;

/// Frame Size in Samples (20ms @ 48kHz = 960 samples)
pub const FRAME_SIZE: usize = 960;

/// Kapazität eines Taps
const TAP_CAPACITY: usize = FRAME_SIZE * 10;

// ============================================================================
// CONSTRAINTS
// ============================================================================

/// Optionen für die Mikrofon-Anfrage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

// ============================================================================
// SAMPLE TAP
// ============================================================================

type SharedRing = Arc<Mutex<HeapRb<f32>>>;

/// Lesende Seite eines Tracks
#[derive(Clone)]
pub struct SampleTap {
    buffer: SharedRing,
}

impl SampleTap {
    /// Liest bis zu `max` Samples (älteste zuerst)
    pub fn read_into<E: Extend<f32>>(&self, out: &mut E, max: usize) -> usize {
        let mut buffer = self.buffer.lock();
        let mut count = 0;
        while count < max {
            match buffer.try_pop() {
                Some(sample) => {
                    out.extend(std::iter::once(sample));
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    /// Anzahl der ungelesenen Samples
    pub fn available(&self) -> usize {
        self.buffer.lock().occupied_len()
    }
}

impl fmt::Debug for SampleTap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleTap")
            .field("available", &self.available())
            .finish()
    }
}

// ============================================================================
// AUDIO TRACK
// ============================================================================

type StopHook = Box<dyn FnOnce() + Send>;

struct TrackInner {
    id: Uuid,
    label: String,
    settings: AudioConstraints,
    ended: AtomicBool,
    sinks: Mutex<Vec<Weak<Mutex<HeapRb<f32>>>>>,
    on_stop: Mutex<Option<StopHook>>,
}

impl TrackInner {
    fn write(&self, samples: &[f32]) -> bool {
        if self.ended.load(Ordering::SeqCst) {
            return false;
        }

        let mut sinks = self.sinks.lock();
        sinks.retain(|sink| match sink.upgrade() {
            Some(buffer) => {
                let mut buffer = buffer.lock();
                for sample in samples {
                    buffer.push_overwrite(*sample);
                }
                true
            }
            None => false,
        });
        true
    }
}

/// Audio-Track eines Streams
#[derive(Clone)]
pub struct AudioTrack {
    inner: Arc<TrackInner>,
}

impl AudioTrack {
    pub fn new(label: impl Into<String>, settings: AudioConstraints) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4(),
                label: label.into(),
                settings,
                ended: AtomicBool::new(false),
                sinks: Mutex::new(Vec::new()),
                on_stop: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Tatsächlich angewendete Einstellungen
    pub fn settings(&self) -> AudioConstraints {
        self.inner.settings
    }

    pub fn is_live(&self) -> bool {
        !self.inner.ended.load(Ordering::SeqCst)
    }

    /// Registriert den Hook, der beim Stoppen die Quelle freigibt
    pub fn set_stop_hook(&self, hook: impl FnOnce() + Send + 'static) {
        let mut slot = self.inner.on_stop.lock();
        if self.is_live() {
            *slot = Some(Box::new(hook));
            return;
        }
        drop(slot);
        hook();
    }

    /// Neuer Konsument mit eigenem Buffer
    pub fn tap(&self) -> SampleTap {
        let buffer: SharedRing = Arc::new(Mutex::new(HeapRb::new(TAP_CAPACITY)));
        self.inner.sinks.lock().push(Arc::downgrade(&buffer));
        SampleTap { buffer }
    }

    /// Schreibende Seite für die Quelle (hält den Track nicht am Leben)
    pub fn writer(&self) -> TrackWriter {
        TrackWriter {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Verteilt Samples an alle Taps
    pub fn write(&self, samples: &[f32]) -> bool {
        self.inner.write(samples)
    }

    /// Stoppt den Track (idempotent)
    pub fn stop(&self) {
        if self.inner.ended.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.sinks.lock().clear();
        if let Some(hook) = self.inner.on_stop.lock().take() {
            hook();
        }

        tracing::debug!("Track {} ({}) stopped", self.inner.id, self.inner.label);
    }
}

impl fmt::Debug for AudioTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioTrack")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Schwache Referenz auf einen Track für Capture-Callbacks
#[derive(Clone)]
pub struct TrackWriter {
    inner: Weak<TrackInner>,
}

impl TrackWriter {
    /// Gibt `false` zurück, sobald der Track gestoppt oder verworfen ist
    pub fn write(&self, samples: &[f32]) -> bool {
        match self.inner.upgrade() {
            Some(inner) => inner.write(samples),
            None => false,
        }
    }
}

// ============================================================================
// MEDIA STREAM
// ============================================================================

/// Stream aus einem oder mehreren Audio-Tracks
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: Uuid,
    tracks: Vec<AudioTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<AudioTrack>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tracks,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tracks(&self) -> &[AudioTrack] {
        &self.tracks
    }

    /// Mindestens ein Track läuft noch
    pub fn is_active(&self) -> bool {
        self.tracks.iter().any(AudioTrack::is_live)
    }

    /// Stoppt alle Tracks
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_each_tap_gets_all_samples() {
        let track = AudioTrack::new("mic", AudioConstraints::default());
        let first = track.tap();
        let second = track.tap();

        track.write(&[0.1, 0.2, 0.3]);

        let mut a = Vec::new();
        let mut b = VecDeque::new();
        assert_eq!(first.read_into(&mut a, usize::MAX), 3);
        assert_eq!(second.read_into(&mut b, 2), 2);
        assert_eq!(a, vec![0.1, 0.2, 0.3]);
        assert_eq!(second.available(), 1);
    }

    #[test]
    fn test_full_tap_keeps_newest_samples() {
        let track = AudioTrack::new("mic", AudioConstraints::default());
        let tap = track.tap();

        let samples: Vec<f32> = (0..TAP_CAPACITY + 10).map(|i| i as f32).collect();
        track.write(&samples);

        let mut out = Vec::new();
        tap.read_into(&mut out, usize::MAX);
        assert_eq!(out.len(), TAP_CAPACITY);
        assert_eq!(out[0], 10.0);
    }

    #[test]
    fn test_stop_is_idempotent_and_runs_hook_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let track = AudioTrack::new("mic", AudioConstraints::default());
        let counter = Arc::clone(&calls);
        track.set_stop_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        track.stop();
        track.stop();

        assert!(!track.is_live());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!track.write(&[1.0]));
    }

    #[test]
    fn test_writer_does_not_keep_track_alive() {
        let track = AudioTrack::new("mic", AudioConstraints::default());
        let writer = track.writer();
        assert!(writer.write(&[0.5]));

        drop(track);
        assert!(!writer.write(&[0.5]));
    }

    #[test]
    fn test_dropped_tap_is_pruned() {
        let track = AudioTrack::new("mic", AudioConstraints::default());
        let tap = track.tap();
        drop(tap);

        track.write(&[0.1]);
        assert!(track.inner.sinks.lock().is_empty());
    }

    #[test]
    fn test_stream_stop_all() {
        let stream = MediaStream::new(vec![
            AudioTrack::new("left", AudioConstraints::default()),
            AudioTrack::new("right", AudioConstraints::default()),
        ]);
        assert!(stream.is_active());

        stream.stop_all();
        assert!(!stream.is_active());
    }
}
