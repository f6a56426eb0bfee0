// src/capture.rs
//
// Default input device -> SpectralAnalyzer -> SharedLevels.
//
// The analyzer lives inside the cpal callback. The render thread only ever
// reads `SharedLevels`.

use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};

use crate::audio::{SharedLevels, SpectralAnalyzer};
use crate::tuning::{AnalyzerTuning, Sensitivity};

/// Wait between the first failed start and the single retry.
pub const AUDIO_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no audio input device")]
    NoDevice,
    #[error("no usable input config: {0}")]
    Config(String),
    #[error("failed to build input stream: {0}")]
    Build(String),
    #[error("failed to start input stream: {0}")]
    Play(String),
    #[error("audio device reported 0 channels")]
    ZeroChannels,
}

/// A running capture. Dropping it stops the stream and zeroes the levels.
pub struct AudioCapture {
    _stream: cpal::Stream,
    levels: SharedLevels,
    device_name: String,
    sample_rate: u32,
    channels: u16,
}

impl AudioCapture {
    pub fn start(
        levels: SharedLevels,
        sensitivity: Sensitivity,
        tuning: AnalyzerTuning,
    ) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(AudioError::NoDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let supported = device
            .default_input_config()
            .map_err(|e| AudioError::Config(e.to_string()))?;
        let channels = supported.channels();
        if channels == 0 {
            return Err(AudioError::ZeroChannels);
        }
        let sample_rate = supported.sample_rate().0;
        let format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();

        let analyzer = SpectralAnalyzer::new(sample_rate as f32, sensitivity, tuning);
        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, analyzer, levels.clone()),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, analyzer, levels.clone()),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, analyzer, levels.clone()),
            SampleFormat::I32 => build_stream::<i32>(&device, &config, analyzer, levels.clone()),
            other => return Err(AudioError::Config(format!("unsupported sample format {other:?}"))),
        }?;
        stream.play().map_err(|e| AudioError::Play(e.to_string()))?;

        log::info!("audio capture: {device_name} @ {sample_rate} Hz, {channels} ch ({format:?})");
        Ok(Self {
            _stream: stream,
            levels,
            device_name,
            sample_rate,
            channels,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.levels.clear();
        log::info!("audio capture stopped");
    }
}

/// One start attempt now and, if that fails, exactly one more once a delay
/// has passed. Polled from the frame loop so nothing ever sleeps.
#[derive(Clone, Copy, Debug)]
pub struct RetryOnce {
    delay: Duration,
    retry_at: Option<Instant>,
}

impl RetryOnce {
    pub fn new(delay: Duration) -> Self {
        Self { delay, retry_at: None }
    }

    /// A failed first attempt is waiting for its retry.
    pub fn is_pending(&self) -> bool {
        self.retry_at.is_some()
    }

    pub fn cancel(&mut self) {
        self.retry_at = None;
    }

    /// First attempt. On failure the retry is armed for `now + delay` and `None` comes back.
    pub fn start<T, F>(&mut self, now: Instant, attempt: F) -> Option<T>
    where
        F: FnOnce() -> Result<T, AudioError>,
    {
        self.retry_at = None;
        match attempt() {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!("audio start failed ({e}), retrying in {:?}", self.delay);
                self.retry_at = Some(now + self.delay);
                None
            }
        }
    }

    /// Run the armed retry once `now` has reached its deadline. `None` means nothing ran.
    pub fn poll<T, F>(&mut self, now: Instant, attempt: F) -> Option<Result<T, AudioError>>
    where
        F: FnOnce() -> Result<T, AudioError>,
    {
        let due = self.retry_at?;
        if now < due {
            return None;
        }
        self.retry_at = None;
        Some(attempt().inspect_err(|e| log::error!("audio start failed again: {e}")))
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut analyzer: SpectralAnalyzer,
    levels: SharedLevels,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    let mut converted: Vec<f32> = Vec::new();
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                converted.clear();
                converted.extend(data.iter().map(|s| s.to_sample::<f32>()));
                let snapshot = analyzer.push_samples(&converted, channels);
                levels.publish(snapshot);
            },
            |err| log::error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| AudioError::Build(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const DELAY: Duration = Duration::from_millis(500);

    #[test]
    fn first_success_needs_no_retry() {
        let mut r = RetryOnce::new(DELAY);
        let t0 = Instant::now();
        assert_eq!(r.start(t0, || Ok::<_, AudioError>(3)), Some(3));
        assert!(!r.is_pending());
        assert!(r.poll(t0 + DELAY, || Ok::<_, AudioError>(4)).is_none());
    }

    #[test]
    fn retry_waits_for_the_deadline_then_runs_once() {
        let mut r = RetryOnce::new(DELAY);
        let t0 = Instant::now();
        let calls = Cell::new(0);
        let attempt = || {
            calls.set(calls.get() + 1);
            if calls.get() == 1 { Err(AudioError::NoDevice) } else { Ok(7) }
        };

        assert_eq!(r.start(t0, attempt), None);
        assert!(r.is_pending());
        assert!(r.poll(t0 + DELAY / 2, attempt).is_none());
        assert_eq!(calls.get(), 1);

        let done = r.poll(t0 + DELAY, attempt);
        assert_eq!(done.and_then(Result::ok), Some(7));
        assert_eq!(calls.get(), 2);
        assert!(!r.is_pending());
        assert!(r.poll(t0 + DELAY * 10, attempt).is_none());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn second_failure_is_reported() {
        let mut r = RetryOnce::new(DELAY);
        let t0 = Instant::now();
        assert_eq!(r.start(t0, || Err::<(), _>(AudioError::ZeroChannels)), None);
        let done = r.poll(t0 + DELAY, || Err::<(), _>(AudioError::ZeroChannels));
        assert!(matches!(done, Some(Err(AudioError::ZeroChannels))));
        assert!(!r.is_pending());
    }

    #[test]
    fn cancel_drops_the_pending_retry() {
        let mut r = RetryOnce::new(DELAY);
        let t0 = Instant::now();
        assert_eq!(r.start(t0, || Err::<(), _>(AudioError::NoDevice)), None);
        r.cancel();
        assert!(r.poll(t0 + DELAY, || Ok::<_, AudioError>(())).is_none());
    }
}
