//! Media Modul
//!
//! Mikrofon-Zugriff, Pegel-Analyse und Wiedergabe des Remote-Streams.
//!
//! Architektur:
//! - `MediaBackend` abstrahiert die Umgebung (synthetisch oder cpal)
//! - `MediaPipeline` hält Stream, Audio-Kontext und Analyser einer Session
//! - Der Pegel wird pro Frame über einen `watch`-Channel veröffentlicht

mod analyser;
mod backend;
mod clipboard;
#[cfg(feature = "device-audio")]
mod device;
mod frames;
mod pipeline;
mod stream;
mod synthetic;

pub use analyser::{
    is_valid_fft_size, AnalyserNode, AudioContext, AudioContextState, DEFAULT_FFT_SIZE,
    MAX_FFT_SIZE, MIN_FFT_SIZE,
};
pub use backend::{MediaBackend, MediaError};
pub use clipboard::{Clipboard, ClipboardError, MemoryClipboard};
#[cfg(feature = "device-audio")]
pub use device::DeviceMedia;
pub use frames::{FrameScheduler, IntervalFrames, ManualFrames, DEFAULT_FRAME_INTERVAL};
pub use pipeline::{MediaPipeline, MediaSettings};
pub use stream::{
    AudioConstraints, AudioTrack, MediaStream, SampleTap, TrackWriter, CHANNELS, FRAME_SIZE,
    SAMPLE_RATE,
};
pub use synthetic::{Signal, SyntheticMedia};
