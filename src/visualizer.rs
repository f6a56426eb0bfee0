// src/visualizer.rs
//
// AudioLevels -> per-cell column heights.
//
// Three zones by isometric depth `d = x + y` around a fixed EQ strip:
//   back  (d < strip)  ambient terrain + interpolated band energy + throb
//   strip             one discrete band per cross-diagonal column
//   front (d > strip)  low ambient terrain, lightly modulated

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::audio::AudioLevels;
use crate::palette::smoothstep;
use crate::tuning::{NUM_BANDS, VisualizerTuning};

/// Frame-rate independent smoothing factor for a per-60Hz-frame coefficient.
#[inline]
fn k_eff(k: f32, dt: f32) -> f32 {
    1.0 - (1.0 - k.clamp(0.0, 1.0)).powf((dt * 60.0).max(0.0))
}

#[derive(Clone, Debug)]
pub struct BeatDetector {
    bass_avg: f32,
    pulse: f32,
    since_beat: f32,
    beats: u64,
    tuning: VisualizerTuning,
}

impl BeatDetector {
    pub fn new(tuning: VisualizerTuning) -> Self {
        Self {
            bass_avg: 0.0,
            pulse: 0.0,
            since_beat: tuning.beat_cooldown,
            beats: 0,
            tuning,
        }
    }

    /// Feed one frame of bass. Returns whether a beat fired.
    pub fn update(&mut self, bass: f32, dt: f32) -> bool {
        let t = &self.tuning;
        self.since_beat += dt.max(0.0);
        self.pulse *= t.beat_decay.powf((dt * 60.0).max(0.0));

        let fired = bass > t.beat_ratio * self.bass_avg + t.beat_floor
            && self.since_beat >= t.beat_cooldown;
        if fired {
            self.pulse = (self.pulse + t.beat_kick).min(1.0);
            self.since_beat = 0.0;
            self.beats += 1;
            log::trace!("beat #{} (bass {bass:.3}, avg {:.3})", self.beats, self.bass_avg);
        }

        self.bass_avg = self.bass_avg * t.bass_avg_keep + bass * (1.0 - t.bass_avg_keep);
        fired
    }

    pub fn pulse(&self) -> f32 {
        self.pulse
    }

    pub fn beats(&self) -> u64 {
        self.beats
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.tuning);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Zone {
    Back,
    Strip,
    Front,
}

pub struct AudioVisualizer {
    side: usize,
    tuning: VisualizerTuning,
    values: Vec<f32>,
    zones: Vec<Zone>,
    /// Cross-diagonal position in 0..1. Strip cells span their own diagonal
    /// end to end so every band gets a column.
    band_pos: Vec<f32>,
    /// Strip cells: 1 at the center diagonal, `strip_edge_keep` at the edge.
    taper: Vec<f32>,
    edge_fade: Vec<f32>,
    phases: Vec<f32>,
    beat: BeatDetector,
}

impl AudioVisualizer {
    pub fn new(side: usize, seed: u64, tuning: VisualizerTuning) -> Self {
        let n = side.max(1);
        let max_d = 2.0 * (n - 1).max(1) as f32;
        let center = tuning.strip_center * max_d;
        let hw = tuning.strip_half_width.max(0.0);

        let mut rng = StdRng::seed_from_u64(seed);
        let mut zones = Vec::with_capacity(n * n);
        let mut band_pos = Vec::with_capacity(n * n);
        let mut taper = Vec::with_capacity(n * n);
        let mut edge_fade = Vec::with_capacity(n * n);
        let mut phases = Vec::with_capacity(n * n);

        for y in 0..n {
            for x in 0..n {
                let d = (x + y) as f32;
                let pos = (x as f32 - y as f32 + (n - 1) as f32) / max_d;
                let off = (d - center).abs();
                if off <= hw {
                    // Normalized along this diagonal rather than the whole grid's x - y
                    // range: off-center strip diagonals are shorter than the grid, and a
                    // grid-wide scale would leave the outermost bands without a column.
                    let lo = (x + y).saturating_sub(n - 1);
                    let hi = (x + y).min(n - 1);
                    let along = if hi > lo { (x - lo) as f32 / (hi - lo) as f32 } else { 0.5 };
                    zones.push(Zone::Strip);
                    band_pos.push(along);
                    let edge = if hw > 0.0 { off / hw } else { 0.0 };
                    taper.push(1.0 - (1.0 - tuning.strip_edge_keep) * edge);
                } else {
                    zones.push(if d > center { Zone::Front } else { Zone::Back });
                    band_pos.push(pos);
                    taper.push(1.0);
                }
                let border = x.min(y).min(n - 1 - x).min(n - 1 - y) as f32;
                edge_fade.push(smoothstep(border / tuning.edge_fade_cells.max(1.0)));
                phases.push(rng.random_range(0.0..std::f32::consts::TAU));
            }
        }

        Self {
            side: n,
            tuning,
            values: vec![0.0; n * n],
            zones,
            band_pos,
            taper,
            edge_fade,
            phases,
            beat: BeatDetector::new(tuning),
        }
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[inline]
    pub fn value(&self, x: usize, y: usize) -> f32 {
        self.values[y * self.side + x]
    }

    #[inline]
    pub fn zone(&self, x: usize, y: usize) -> Zone {
        self.zones[y * self.side + x]
    }

    pub fn beat_pulse(&self) -> f32 {
        self.beat.pulse()
    }

    pub fn beat(&self) -> &BeatDetector {
        &self.beat
    }

    /// Drop all heights back to zero.
    pub fn reset(&mut self) {
        self.values.fill(0.0);
        self.beat.reset();
    }

    /// Ambient terrain in 0..1: five sinusoids over position and time.
    fn terrain(&self, x: usize, y: usize, time: f32) -> f32 {
        let n = self.side as f32;
        let (fx, fy) = (x as f32 / n, y as f32 / n);
        let r = ((fx - 0.5).powi(2) + (fy - 0.5).powi(2)).sqrt();
        let sum = (fx * 6.0 + time * 0.7).sin()
            + (fy * 5.0 - time * 0.9).sin()
            + ((fx + fy) * 4.0 + time * 0.5).sin()
            + ((fx - fy) * 7.0 - time * 1.1).sin()
            + (r * 10.0 - time * 1.3).sin();
        (sum / 5.0) * 0.5 + 0.5
    }

    pub fn update(&mut self, levels: &AudioLevels, time: f32, dt: f32) {
        self.beat.update(levels.bass, dt);
        let beat = self.beat.pulse();
        let t = self.tuning;

        let strip_up = k_eff(t.strip_attack, dt);
        let strip_down = k_eff(t.strip_decay, dt);
        let terrain_up = k_eff(t.terrain_attack, dt);
        let terrain_down = k_eff(t.terrain_decay, dt);
        let throb = levels.bass * levels.bass;

        let n = self.side;
        for y in 0..n {
            for x in 0..n {
                let i = y * n + x;
                let (target, up, down) = match self.zones[i] {
                    Zone::Strip => {
                        let b = (self.band_pos[i] * NUM_BANDS as f32) as usize;
                        let band = levels.bands[b.min(NUM_BANDS - 1)];
                        (t.strip_gain * band * self.taper[i], strip_up, strip_down)
                    }
                    Zone::Front => {
                        let ground = self.terrain(x, y, time) * self.edge_fade[i];
                        let jitter = (time * 3.0 + self.phases[i]).sin() * t.front_jitter;
                        let v = ground * (t.front_terrain + levels.rms * t.front_rms)
                            + beat * t.front_beat
                            + jitter * levels.rms;
                        (v, terrain_up, terrain_down)
                    }
                    Zone::Back => {
                        let ground = self.terrain(x, y, time) * self.edge_fade[i];
                        let band = levels.band_energy(self.band_pos[i]);
                        let v = ground * t.back_terrain
                            + band * band * t.back_band
                            + beat * t.back_beat
                            + throb * t.back_throb;
                        (v, terrain_up, terrain_down)
                    }
                };
                let target = target.clamp(0.0, 2.0);
                let cur = self.values[i];
                let k = if target > cur { up } else { down };
                self.values[i] = cur + (target - cur) * k;
            }
        }
    }
}
