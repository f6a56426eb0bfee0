// src/tuning.rs
//
// This file is the CONTROL PANEL.
// The intent: if you want to change how the scene looks or feels, you change it here.
//
// Two kinds of knobs live here:
//   1) `Settings`: the preference snapshot handed to us from outside (CLI today).
//      Read once per grid construction, clamped, never validated beyond that.
//   2) `ControlPanel`: tuning values for animation, cube motion, spectral analysis
//      and the audio terrain. These are design choices, not contracts.

use rand::Rng;

/// Number of colors in the cell palette.
pub const PALETTE_SIZE: usize = 24;

/// Chance that a newborn ignores its neighbors and picks a random color.
pub const MUTATION_CHANCE: f64 = 0.08;

/// Probability that a cell starts alive on `randomize()`.
pub const INITIAL_ALIVE_PROBABILITY: f64 = 0.25;

/// Randomized cells get an age in `0..=INITIAL_MAX_AGE`.
pub const INITIAL_MAX_AGE: u16 = 5;

/// Smallest grid we will ever build.
pub const MIN_GRID_SIDE: usize = 20;

/// Smallest tile width in pixels.
pub const MIN_TILE_WIDTH: f32 = 24.0;

/// FFT window length (power of two).
pub const FFT_SIZE: usize = 1024;

/// Number of log-spaced spectral bands.
pub const NUM_BANDS: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RangeF32 {
    pub min: f32,
    pub max: f32,
}
impl RangeF32 {
    #[inline]
    pub fn pick<R: Rng + ?Sized>(self, rng: &mut R) -> f32 {
        rng.random_range(self.min..self.max)
    }
}

/// Audio sensitivity preset. Scales every raw level before smoothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl Sensitivity {
    pub fn gain(self) -> f32 {
        match self {
            Sensitivity::Low => 0.6,
            Sensitivity::Medium => 1.0,
            Sensitivity::High => 1.8,
        }
    }
}

/// Preference snapshot. Treated as immutable per grid construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Settings {
    /// Target number of tiles across the viewport width.
    pub tile_density: f32,
    /// Cube height as a fraction of the tile width.
    pub cube_height: f32,
    /// Rendered frames per simulation tick.
    pub tick_every: u32,
    pub audio_reactive: bool,
    pub sensitivity: Sensitivity,
    /// Overshoot ("bounce") on spawn.
    pub bounce: bool,
    /// Fixed seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tile_density: 40.0,
            cube_height: 0.55,
            tick_every: 120,
            audio_reactive: false,
            sensitivity: Sensitivity::Medium,
            bounce: true,
            seed: None,
        }
    }
}

impl Settings {
    /// Clamp anything corrupted or out of range back to something sane.
    /// Never fails: bad values fall back to the defaults.
    pub fn sanitized(self) -> Self {
        let d = Settings::default();
        let tile_density = if self.tile_density.is_finite() && self.tile_density > 0.0 {
            self.tile_density
        } else {
            d.tile_density
        };
        let cube_height = if self.cube_height.is_finite() && self.cube_height > 0.0 {
            self.cube_height.min(4.0)
        } else {
            d.cube_height
        };
        let tick_every = if self.tick_every == 0 { d.tick_every } else { self.tick_every };
        Self {
            tile_density,
            cube_height,
            tick_every,
            ..self
        }
    }
}

/// Tile width and grid side for a viewport.
///
/// A 2:1 isometric diamond of side `n` and tile width `tw` is `n*tw` wide and
/// `n*tw/2` tall; it contains a `w x h` rectangle when `w + 2h <= n*tw`.
pub fn grid_side_for_viewport(width: u32, height: u32, tile_density: f32) -> (usize, f32) {
    let w = width.max(1) as f32;
    let h = height.max(1) as f32;
    let density = if tile_density.is_finite() && tile_density > 0.0 {
        tile_density
    } else {
        Settings::default().tile_density
    };
    let tile_w = (w / density).max(MIN_TILE_WIDTH);
    let side = ((w + 2.0 * h) / tile_w).ceil() as usize + 2;
    (side.max(MIN_GRID_SIDE), tile_w)
}

/// Per-frame animation steps for the cell state machine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnimTuning {
    /// Progress added per frame while spawning.
    pub spawn_step: f32,
    pub spawn_step_audio: f32,
    /// Progress added per frame while dying.
    pub dying_step: f32,
    pub dying_step_audio: f32,
    /// Random per-cell phase for breathe/bob.
    pub bob_phase: RangeF32,
}

impl Default for AnimTuning {
    fn default() -> Self {
        Self {
            spawn_step: 0.02,
            spawn_step_audio: 0.05,
            dying_step: 0.015,
            dying_step_audio: 0.04,
            bob_phase: RangeF32 { min: 0.0, max: std::f32::consts::TAU },
        }
    }
}

/// How cubes move and shade in Game of Life mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CubeLook {
    /// Overshoot constant for ease-out-back.
    pub back_overshoot: f32,
    /// Spawn alpha reaches 1 at this progress.
    pub spawn_fade_in: f32,

    pub breathe_amplitude: f32,
    pub breathe_speed: f32,
    /// Bob amplitude as a fraction of the tile height.
    pub bob_amplitude: f32,
    pub bob_speed: f32,

    /// Frames of age until the brightening caps.
    pub age_cap_frames: u32,
    pub age_brighten_max: f32,

    /// Dying: vibrate below this progress, fall above it.
    pub vibrate_until: f32,
    /// Vibration amplitude as a fraction of the tile width.
    pub vibrate_amplitude: f32,
    pub vibrate_speed: f32,
    pub death_tint: [f32; 3],
    pub death_tint_max: f32,
    /// Fall distance at the end of dying, in tile heights.
    pub fall_tiles: f32,
    pub fall_shrink: f32,
    /// Horizontal tumble as a fraction of the tile width.
    pub tumble: f32,
}

impl Default for CubeLook {
    fn default() -> Self {
        Self {
            back_overshoot: 1.70158,
            spawn_fade_in: 0.4,
            breathe_amplitude: 0.08,
            breathe_speed: 1.3,
            bob_amplitude: 0.06,
            bob_speed: 2.1,
            age_cap_frames: 900,
            age_brighten_max: 0.18,
            vibrate_until: 0.35,
            vibrate_amplitude: 0.05,
            vibrate_speed: 55.0,
            death_tint: [1.0, 0.18, 0.12],
            death_tint_max: 0.6,
            fall_tiles: 3.0,
            fall_shrink: 0.6,
            tumble: 0.15,
        }
    }
}

/// Spectral analyzer gains and smoothing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnalyzerTuning {
    pub min_hz: f32,
    pub max_hz: f32,
    pub bass_max_hz: f32,
    pub mid_max_hz: f32,
    /// Gain of band 0; band `i` gets `band_gain_base + i * band_gain_slope`.
    pub band_gain_base: f32,
    pub band_gain_slope: f32,
    /// Gain for the legacy bass/mid/high bands.
    pub legacy_gain: [f32; 3],
    pub rms_gain: f32,
    /// Smoothing coefficient when rising.
    pub attack: f32,
    /// Smoothing coefficient when falling.
    pub release: f32,
}

impl Default for AnalyzerTuning {
    fn default() -> Self {
        Self {
            min_hz: 20.0,
            max_hz: 20_000.0,
            bass_max_hz: 250.0,
            mid_max_hz: 4000.0,
            band_gain_base: 4.0,
            band_gain_slope: 0.25,
            legacy_gain: [4.0, 6.0, 10.0],
            rms_gain: 2.5,
            attack: 0.6,
            release: 0.12,
        }
    }
}

/// Audio terrain: zones, gains and beat detection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisualizerTuning {
    /// EQ strip center as a fraction of the max isometric depth.
    pub strip_center: f32,
    /// Half-width of the strip in diagonals.
    pub strip_half_width: f32,
    /// Strip height is `strip_gain * band`.
    pub strip_gain: f32,
    /// Fraction of height kept at the strip edge.
    pub strip_edge_keep: f32,
    pub strip_attack: f32,
    pub strip_decay: f32,

    pub terrain_attack: f32,
    pub terrain_decay: f32,
    /// Cells from the border where terrain fades out.
    pub edge_fade_cells: f32,

    pub front_terrain: f32,
    pub front_rms: f32,
    pub front_beat: f32,
    pub front_jitter: f32,

    pub back_terrain: f32,
    pub back_band: f32,
    pub back_beat: f32,
    pub back_throb: f32,

    /// Running bass average keeps this much of itself per frame.
    pub bass_avg_keep: f32,
    pub beat_ratio: f32,
    pub beat_floor: f32,
    pub beat_cooldown: f32,
    pub beat_kick: f32,
    /// Beat pulse keeps this much of itself per frame.
    pub beat_decay: f32,
}

impl Default for VisualizerTuning {
    fn default() -> Self {
        Self {
            strip_center: 0.65,
            strip_half_width: 2.0,
            strip_gain: 2.0,
            strip_edge_keep: 0.45,
            strip_attack: 0.55,
            strip_decay: 0.3,
            terrain_attack: 0.12,
            terrain_decay: 0.06,
            edge_fade_cells: 4.0,
            front_terrain: 0.35,
            front_rms: 0.3,
            front_beat: 0.15,
            front_jitter: 0.05,
            back_terrain: 0.5,
            back_band: 1.4,
            back_beat: 0.3,
            back_throb: 0.5,
            bass_avg_keep: 0.93,
            beat_ratio: 1.5,
            beat_floor: 0.05,
            beat_cooldown: 0.25,
            beat_kick: 0.6,
            beat_decay: 0.96,
        }
    }
}

/// Diff queue batch sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueTuning {
    /// Steps computed per background refill.
    pub batch: usize,
    /// Refill is requested once fewer than this many diffs remain.
    pub low_water: usize,
}

impl Default for QueueTuning {
    fn default() -> Self {
        Self { batch: 1000, low_water: 100 }
    }
}

/// Clear color behind the grid.
pub const BACKGROUND: [f64; 3] = [0.035, 0.035, 0.05];

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ControlPanel {
    pub anim: AnimTuning,
    pub look: CubeLook,
    pub analyzer: AnalyzerTuning,
    pub visualizer: VisualizerTuning,
    pub queue: QueueTuning,
}

impl ControlPanel {
    /// Build the control panel for a grid of the given side.
    /// Narrow grids get a proportionally narrower EQ strip.
    pub fn for_grid(side: usize) -> Self {
        let mut panel = Self::default();
        let max_half = (side as f32 / 12.0).max(1.0);
        panel.visualizer.strip_half_width = panel.visualizer.strip_half_width.min(max_half);
        panel
    }
}
