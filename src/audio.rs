// src/audio.rs
//
// Spectral analysis of captured audio.
//
// Runs on the capture callback thread. Every block of samples produces one
// complete `AudioLevels` snapshot which is published wholesale; the render
// thread copies it out and never sees a half-written value.

use std::sync::{Arc, Mutex, PoisonError};

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::tuning::{AnalyzerTuning, FFT_SIZE, NUM_BANDS, Sensitivity};

/// Smoothed levels, all in 0..1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AudioLevels {
    pub rms: f32,
    pub bass: f32,
    pub mid: f32,
    pub high: f32,
    pub peak: f32,
    /// Log-spaced bands, low to high.
    pub bands: [f32; NUM_BANDS],
}

impl Default for AudioLevels {
    fn default() -> Self {
        Self {
            rms: 0.0,
            bass: 0.0,
            mid: 0.0,
            high: 0.0,
            peak: 0.0,
            bands: [0.0; NUM_BANDS],
        }
    }
}

impl AudioLevels {
    /// Band energy at `pos` in 0..1, linearly interpolated between bands.
    pub fn band_energy(&self, pos: f32) -> f32 {
        let pos = if pos.is_finite() { pos.clamp(0.0, 1.0) } else { 0.0 };
        let f = pos * (NUM_BANDS - 1) as f32;
        let i = (f.floor() as usize).min(NUM_BANDS - 1);
        let j = (i + 1).min(NUM_BANDS - 1);
        let t = f - i as f32;
        self.bands[i] + (self.bands[j] - self.bands[i]) * t
    }
}

/// Asymmetric exponential smoother: `attack` when rising, `release` when falling.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Smoother {
    pub attack: f32,
    pub release: f32,
}

impl Smoother {
    #[inline]
    pub fn step(self, current: f32, target: f32) -> f32 {
        let k = if target > current { self.attack } else { self.release };
        (current + (target - current) * k.clamp(0.0, 1.0)).clamp(0.0, 1.0)
    }
}

/// Windowed FFT over a rolling window of the most recent mono samples.
pub struct SpectralAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    history: Vec<f32>,
    mono: Vec<f32>,
    power: Vec<f32>,

    /// `[low, high)` bin ranges per band.
    band_bins: [(usize, usize); NUM_BANDS],
    band_gain: [f32; NUM_BANDS],
    legacy_bins: [(usize, usize); 3],

    smoother: Smoother,
    gain: f32,
    tuning: AnalyzerTuning,
    levels: AudioLevels,
}

fn bin_range(lo_hz: f32, hi_hz: f32, bin_hz: f32) -> (usize, usize) {
    let max_bin = FFT_SIZE / 2;
    let lo = ((lo_hz / bin_hz).floor() as usize).clamp(1, max_bin - 1);
    let hi = ((hi_hz / bin_hz).ceil() as usize).clamp(lo + 1, max_bin);
    (lo, hi)
}

impl SpectralAnalyzer {
    pub fn new(sample_rate: f32, sensitivity: Sensitivity, tuning: AnalyzerTuning) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        let window = (0..FFT_SIZE)
            .map(|i| 0.5 * (1.0 - (std::f32::consts::TAU * i as f32 / FFT_SIZE as f32).cos()))
            .collect();

        let sample_rate = if sample_rate.is_finite() && sample_rate > 0.0 { sample_rate } else { 44_100.0 };
        let bin_hz = sample_rate / FFT_SIZE as f32;
        let max_hz = tuning.max_hz.min(sample_rate * 0.5);
        let ratio = max_hz / tuning.min_hz;

        let mut band_bins = [(0, 0); NUM_BANDS];
        let mut band_gain = [0.0; NUM_BANDS];
        for i in 0..NUM_BANDS {
            let lo = tuning.min_hz * ratio.powf(i as f32 / NUM_BANDS as f32);
            let hi = tuning.min_hz * ratio.powf((i + 1) as f32 / NUM_BANDS as f32);
            band_bins[i] = bin_range(lo, hi, bin_hz);
            band_gain[i] = tuning.band_gain_base + i as f32 * tuning.band_gain_slope;
        }
        let legacy_bins = [
            bin_range(tuning.min_hz, tuning.bass_max_hz, bin_hz),
            bin_range(tuning.bass_max_hz, tuning.mid_max_hz, bin_hz),
            bin_range(tuning.mid_max_hz, max_hz, bin_hz),
        ];

        Self {
            fft,
            window,
            buffer: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            scratch,
            history: vec![0.0; FFT_SIZE],
            mono: Vec::with_capacity(FFT_SIZE),
            power: vec![0.0; FFT_SIZE / 2 + 1],
            band_bins,
            band_gain,
            legacy_bins,
            smoother: Smoother { attack: tuning.attack, release: tuning.release },
            gain: sensitivity.gain(),
            tuning,
            levels: AudioLevels::default(),
        }
    }

    pub fn levels(&self) -> AudioLevels {
        self.levels
    }

    /// Feed a block of interleaved samples; returns the new smoothed levels.
    pub fn push_samples(&mut self, samples: &[f32], channels: usize) -> AudioLevels {
        let channels = channels.max(1);
        self.mono.clear();
        self.mono.extend(
            samples
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
        );
        if self.mono.is_empty() {
            return self.levels;
        }

        let n = self.mono.len();
        if n >= FFT_SIZE {
            self.history.copy_from_slice(&self.mono[n - FFT_SIZE..]);
        } else {
            self.history.copy_within(n.., 0);
            self.history[FFT_SIZE - n..].copy_from_slice(&self.mono);
        }

        self.analyze();
        self.levels
    }

    fn analyze(&mut self) {
        for ((b, &s), &w) in self.buffer.iter_mut().zip(&self.history).zip(&self.window) {
            *b = Complex::new(s * w, 0.0);
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let norm = (FFT_SIZE * FFT_SIZE) as f32;
        for (p, c) in self.power.iter_mut().zip(&self.buffer) {
            *p = c.norm_sqr() / norm;
        }

        let band_level = |power: &[f32], (lo, hi): (usize, usize), gain: f32| -> f32 {
            let avg = power[lo..hi].iter().sum::<f32>() / (hi - lo) as f32;
            avg.sqrt() * gain
        };

        let g = self.gain;
        let s = self.smoother;
        let mut next = self.levels;

        for i in 0..NUM_BANDS {
            let raw = (band_level(&self.power, self.band_bins[i], self.band_gain[i]) * g).clamp(0.0, 1.0);
            next.bands[i] = s.step(self.levels.bands[i], raw);
        }

        let [bass, mid, high] = self.tuning.legacy_gain;
        let raw_bass = (band_level(&self.power, self.legacy_bins[0], bass) * g).clamp(0.0, 1.0);
        let raw_mid = (band_level(&self.power, self.legacy_bins[1], mid) * g).clamp(0.0, 1.0);
        let raw_high = (band_level(&self.power, self.legacy_bins[2], high) * g).clamp(0.0, 1.0);
        next.bass = s.step(self.levels.bass, raw_bass);
        next.mid = s.step(self.levels.mid, raw_mid);
        next.high = s.step(self.levels.high, raw_high);

        let mean_sq = self.history.iter().map(|x| x * x).sum::<f32>() / FFT_SIZE as f32;
        let raw_rms = (mean_sq.sqrt() * self.tuning.rms_gain * g).clamp(0.0, 1.0);
        let raw_peak = (self.history.iter().fold(0.0f32, |m, x| m.max(x.abs())) * g).clamp(0.0, 1.0);
        next.rms = s.step(self.levels.rms, raw_rms);
        next.peak = s.step(self.levels.peak, raw_peak);

        self.levels = next;
    }
}

/// The one piece of state shared between the audio callback and the render thread.
#[derive(Clone, Default)]
pub struct SharedLevels(Arc<Mutex<AudioLevels>>);

impl SharedLevels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, levels: AudioLevels) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = levels;
    }

    /// Copy of the latest levels, or all zeros if nothing is capturing.
    pub fn snapshot(&self) -> AudioLevels {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn clear(&self) {
        self.publish(AudioLevels::default());
    }
}
