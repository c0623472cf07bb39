//! Audio-Hardware über cpal
//!
//! cpal-Streams sind nicht `Send`. Jeder Stream lebt deshalb auf einem
//! eigenen Thread, bis sein Stop-Signal eintrifft.

use super::backend::{MediaBackend, MediaError};
use super::stream::{AudioConstraints, AudioTrack, MediaStream, SampleTap, SAMPLE_RATE};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, SampleFormat, Stream, StreamConfig, SupportedStreamConfigRange};
use parking_lot::Mutex;
use std::sync::mpsc;
use std::thread;

// ============================================================================
// STREAM THREAD
// ============================================================================

/// Thread, der einen laufenden cpal-Stream besitzt
struct StreamThread {
    stop: mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
}

impl StreamThread {
    /// Baut den Stream auf einem eigenen Thread und wartet bis er läuft
    fn spawn<F>(name: &str, build: F) -> Result<Self, MediaError>
    where
        F: FnOnce() -> Result<Stream, MediaError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(MediaError::Device(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Blockiert bis stop() oder bis der Sender verworfen wird
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| MediaError::Device(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop: stop_tx,
                handle,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(MediaError::Device(format!("{} thread exited", name))),
        }
    }

    fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            tracing::warn!("Audio stream thread panicked");
        }
    }
}

// ============================================================================
// DEVICE MEDIA
// ============================================================================

/// Media Backend für Standard-Mikrofon und Lautsprecher
///
/// Echo-Unterdrückung und Rauschunterdrückung werden vom Gerät nicht
/// angewendet. Die Track-Settings melden das entsprechend.
#[derive(Default)]
pub struct DeviceMedia {
    playback: Mutex<Option<StreamThread>>,
}

impl DeviceMedia {
    pub fn new() -> Self {
        Self::default()
    }

    fn open_capture(track: &AudioTrack) -> Result<StreamThread, MediaError> {
        let writer = track.writer();

        StreamThread::spawn("audio-capture", move || {
            let host = cpal::default_host();
            let device = host.default_input_device().ok_or(MediaError::NotFound)?;
            let configs = device
                .supported_input_configs()
                .map_err(|e| MediaError::Device(e.to_string()))?;
            let config = select_best_config(configs.collect())?;

            tracing::info!(
                "Starting audio capture: {} Hz, {} channels",
                config.sample_rate.0,
                config.channels
            );

            let channels = config.channels as usize;
            let source_rate = config.sample_rate.0;
            let mut mono = Vec::new();

            device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        downmix(data, channels, &mut mono);
                        if source_rate != SAMPLE_RATE {
                            mono = resample(&mono, source_rate, SAMPLE_RATE);
                        }
                        writer.write(&mono);
                    },
                    |err| tracing::error!("Audio capture error: {}", err),
                    None,
                )
                .map_err(map_build_error)
        })
    }

    fn open_playback(tap: SampleTap) -> Result<StreamThread, MediaError> {
        StreamThread::spawn("audio-playback", move || {
            let host = cpal::default_host();
            let device = host.default_output_device().ok_or(MediaError::NotFound)?;
            let configs = device
                .supported_output_configs()
                .map_err(|e| MediaError::Device(e.to_string()))?;
            let config = select_best_config(configs.collect())?;

            tracing::info!(
                "Starting audio playback: {} Hz, {} channels",
                config.sample_rate.0,
                config.channels
            );
            if config.sample_rate.0 != SAMPLE_RATE {
                tracing::warn!(
                    "Output device runs at {} Hz, playback is not resampled",
                    config.sample_rate.0
                );
            }

            let channels = config.channels as usize;
            let mut pending = Vec::new();

            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let frames = data.len() / channels;
                        pending.clear();
                        tap.read_into(&mut pending, frames);

                        for (i, frame) in data.chunks_mut(channels).enumerate() {
                            let sample = pending.get(i).copied().unwrap_or(0.0);
                            frame.iter_mut().for_each(|s| *s = sample);
                        }
                    },
                    |err| tracing::error!("Audio playback error: {}", err),
                    None,
                )
                .map_err(map_build_error)
        })
    }
}

#[async_trait]
impl MediaBackend for DeviceMedia {
    async fn get_user_media(
        &self,
        _constraints: AudioConstraints,
    ) -> Result<MediaStream, MediaError> {
        let applied = AudioConstraints {
            echo_cancellation: false,
            noise_suppression: false,
        };
        let track = AudioTrack::new("Default microphone", applied);

        let capture = {
            let track = track.clone();
            tokio::task::spawn_blocking(move || Self::open_capture(&track))
                .await
                .map_err(|e| MediaError::Device(e.to_string()))??
        };
        track.set_stop_hook(move || capture.stop());

        Ok(MediaStream::new(vec![track]))
    }

    fn attach_remote(&self, stream: &MediaStream) -> Result<(), MediaError> {
        let track = stream.tracks().first().ok_or(MediaError::NoAudioTrack)?;
        let playback = Self::open_playback(track.tap())?;

        if let Some(previous) = self.playback.lock().replace(playback) {
            previous.stop();
        }
        Ok(())
    }

    fn detach_remote(&self) {
        if let Some(playback) = self.playback.lock().take() {
            playback.stop();
            tracing::info!("Audio playback stopped");
        }
    }
}

impl Drop for DeviceMedia {
    fn drop(&mut self) {
        self.detach_remote();
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Mittelt alle Kanäle eines Frames zu Mono
fn downmix(data: &[f32], channels: usize, out: &mut Vec<f32>) {
    out.clear();
    if channels <= 1 {
        out.extend_from_slice(data);
        return;
    }
    out.extend(
        data.chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
    );
}

/// Einfaches Linear-Resampling
fn resample(data: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    let ratio = target_rate as f32 / source_rate as f32;
    let new_len = (data.len() as f32 * ratio) as usize;
    (0..new_len)
        .map(|i| {
            let src_idx = i as f32 / ratio;
            let idx = src_idx as usize;
            let frac = src_idx - idx as f32;
            let s1 = data.get(idx).copied().unwrap_or(0.0);
            let s2 = data.get(idx + 1).copied().unwrap_or(s1);
            s1 + (s2 - s1) * frac
        })
        .collect()
}

fn map_build_error(err: BuildStreamError) -> MediaError {
    match err {
        BuildStreamError::DeviceNotAvailable => MediaError::NotFound,
        BuildStreamError::StreamConfigNotSupported => MediaError::Unsupported,
        other => MediaError::Device(other.to_string()),
    }
}

/// Wählt die beste Konfiguration (48kHz F32 bevorzugt)
fn select_best_config(configs: Vec<SupportedStreamConfigRange>) -> Result<StreamConfig, MediaError> {
    let target_rate = cpal::SampleRate(SAMPLE_RATE);
    let f32_configs: Vec<_> = configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .collect();

    if let Some(config) = f32_configs
        .iter()
        .find(|c| c.min_sample_rate() <= target_rate && c.max_sample_rate() >= target_rate)
    {
        return Ok((*config).clone().with_sample_rate(target_rate).into());
    }

    // Callbacks arbeiten nur mit f32
    f32_configs
        .first()
        .map(|c| (*c).clone().with_max_sample_rate().into())
        .ok_or(MediaError::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        let mut out = Vec::new();
        downmix(&[1.0, 0.0, 0.5, 0.5], 2, &mut out);
        assert_eq!(out, vec![0.5, 0.5]);
    }

    #[test]
    fn test_resample_doubles_length() {
        let out = resample(&[0.0, 1.0, 0.0, 1.0], 24000, 48000);
        assert_eq!(out.len(), 8);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }
}
