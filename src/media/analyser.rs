//! Audio-Kontext und Analyser
//!
//! Der Analyser verhält sich wie ein Web-Audio `AnalyserNode`:
//! Blackman-Fenster über die letzten `fft_size` Samples, FFT,
//! zeitliche Glättung und Abbildung von [-100 dB, -30 dB] auf 0..=255.

use super::backend::MediaError;
use super::stream::{MediaStream, SampleTap};
use rustfft::{num_complex::Complex32, Fft, FftPlanner};
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Standard FFT-Größe (128 Frequenz-Bins)
pub const DEFAULT_FFT_SIZE: usize = 256;

pub const MIN_FFT_SIZE: usize = 32;
pub const MAX_FFT_SIZE: usize = 32768;

/// Zeitkonstante der Glättung
const SMOOTHING: f32 = 0.8;

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Prüft ob `size` eine gültige FFT-Größe ist
pub fn is_valid_fft_size(size: usize) -> bool {
    size.is_power_of_two() && (MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&size)
}

// ============================================================================
// AUDIO CONTEXT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioContextState {
    Running,
    Closed,
}

/// Audio-Verarbeitungskontext (einer pro Session)
#[derive(Debug)]
pub struct AudioContext {
    id: Uuid,
    sample_rate: u32,
    state: AudioContextState,
}

impl AudioContext {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            sample_rate,
            state: AudioContextState::Running,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn state(&self) -> AudioContextState {
        self.state
    }

    /// Erstellt einen Analyser, der vom ersten Track des Streams gespeist wird
    pub fn create_analyser(
        &self,
        source: &MediaStream,
        fft_size: usize,
    ) -> Result<AnalyserNode, MediaError> {
        if self.state == AudioContextState::Closed {
            return Err(MediaError::InvalidState(
                "AudioContext is closed".to_string(),
            ));
        }
        if !is_valid_fft_size(fft_size) {
            return Err(MediaError::InvalidFftSize(fft_size));
        }

        let track = source.tracks().first().ok_or(MediaError::NoAudioTrack)?;
        Ok(AnalyserNode::new(track.tap(), fft_size))
    }

    /// Schließt den Kontext
    pub fn close(&mut self) -> Result<(), MediaError> {
        if self.state == AudioContextState::Closed {
            return Err(MediaError::InvalidState(
                "Cannot close a closed AudioContext".to_string(),
            ));
        }
        self.state = AudioContextState::Closed;
        tracing::debug!("AudioContext {} closed", self.id);
        Ok(())
    }
}

// ============================================================================
// ANALYSER NODE
// ============================================================================

/// Frequenz-Analyse eines Tracks
pub struct AnalyserNode {
    source: Option<SampleTap>,
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    time_domain: VecDeque<f32>,
    smoothed: Vec<f32>,
    scratch: Vec<Complex32>,
}

impl AnalyserNode {
    fn new(source: SampleTap, fft_size: usize) -> Self {
        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);

        Self {
            source: Some(source),
            fft,
            fft_size,
            window: blackman_window(fft_size),
            time_domain: std::iter::repeat(0.0).take(fft_size).collect(),
            smoothed: vec![0.0; fft_size / 2],
            scratch: vec![Complex32::new(0.0, 0.0); fft_size],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn is_connected(&self) -> bool {
        self.source.is_some()
    }

    /// Trennt den Analyser von seiner Quelle
    pub fn disconnect(&mut self) {
        self.source = None;
    }

    /// Füllt `out` mit Byte-Magnituden pro Frequenz-Bin
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) {
        self.pull_samples();

        for (i, (sample, weight)) in self.time_domain.iter().zip(&self.window).enumerate() {
            self.scratch[i] = Complex32::new(sample * weight, 0.0);
        }
        self.fft.process(&mut self.scratch);

        let scale = 1.0 / self.fft_size as f32;
        for (bin, value) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.scratch[bin].norm() * scale;
            *value = SMOOTHING * *value + (1.0 - SMOOTHING) * magnitude;
        }

        for (byte, value) in out.iter_mut().zip(&self.smoothed) {
            *byte = decibels_to_byte(20.0 * value.log10());
        }
    }

    /// Durchschnitt über alle Bins (0..=255, Sprache liegt meist unter 100)
    pub fn volume(&mut self) -> f32 {
        let mut bins = vec![0u8; self.frequency_bin_count()];
        self.byte_frequency_data(&mut bins);

        let sum: u32 = bins.iter().map(|b| *b as u32).sum();
        sum as f32 / bins.len() as f32
    }

    fn pull_samples(&mut self) {
        if let Some(source) = &self.source {
            source.read_into(&mut self.time_domain, usize::MAX);
        }
        while self.time_domain.len() > self.fft_size {
            self.time_domain.pop_front();
        }
    }
}

impl fmt::Debug for AnalyserNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyserNode")
            .field("fft_size", &self.fft_size)
            .field("connected", &self.is_connected())
            .finish()
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| {
            let x = i as f32 / n;
            0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
        })
        .collect()
}

fn decibels_to_byte(db: f32) -> u8 {
    if !db.is_finite() {
        return 0;
    }
    let scaled = (255.0 / (MAX_DECIBELS - MIN_DECIBELS)) * (db - MIN_DECIBELS);
    scaled.clamp(0.0, 255.0) as u8
}

// ============================================================================
// TESTS
// ============================================================================
