// src/scene.rs
//
// Per-frame driver for everything below the window: tick cadence, diff
// consumption, animation, instance building, and the pause/stop switches.
// Owned by the render thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::anim::AnimGrid;
use crate::audio::AudioLevels;
use crate::diff::{Diff, DiffQueue};
use crate::instances::{CubeInstance, InstanceBuilder, IsoLayout};
use crate::sim::Engine;
use crate::tuning::{ControlPanel, Settings, grid_side_for_viewport};
use crate::visualizer::AudioVisualizer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Life,
    Audio,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneStats {
    pub side: usize,
    pub mode: Mode,
    pub paused: bool,
    pub stopped: bool,
    /// Diffs consumed.
    pub ticks: u64,
    /// Ticks that found the queue empty.
    pub skipped_ticks: u64,
    /// Beats detected since the audio view was last reset.
    pub beats: u64,
    pub queue_len: usize,
    pub refill_in_flight: bool,
    /// Spawning or alive cells.
    pub population: usize,
    pub instances: usize,
}

pub struct Scene {
    settings: Settings,
    panel: ControlPanel,
    queue: DiffQueue,
    anim: AnimGrid,
    builder: InstanceBuilder,
    visualizer: AudioVisualizer,
    stopped: Arc<AtomicBool>,
    paused: bool,
    mode: Mode,
    frames_to_tick: u32,
    clock: f32,
    ticks: u64,
    skipped_ticks: u64,
    rng: StdRng,
}

impl Scene {
    /// Build a grid sized for `viewport` and kick off the first refill.
    pub fn new(viewport: (u32, u32), settings: Settings) -> Self {
        let settings = settings.sanitized();
        let (side, tile_w) = grid_side_for_viewport(viewport.0, viewport.1, settings.tile_density);
        let panel = ControlPanel::for_grid(side);
        let layout = IsoLayout::new(side, tile_w, settings.cube_height, viewport);

        let seed = settings.seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);
        let engine = Engine::with_seed(side, rng.random());
        let mut anim = AnimGrid::new(side, rng.random(), panel.anim);
        anim.apply_diff(&Diff::initial(&engine));
        let visualizer = AudioVisualizer::new(side, rng.random(), panel.visualizer);

        log::info!(
            "grid {side}x{side} (tile {tile_w:.1}px) for {}x{}, seed {seed}, {} alive",
            viewport.0,
            viewport.1,
            engine.alive_count()
        );

        let stopped = Arc::new(AtomicBool::new(false));
        let mut queue = DiffQueue::new(engine, panel.queue, Arc::clone(&stopped));
        queue.request_refill();

        Self {
            settings,
            panel,
            queue,
            anim,
            builder: InstanceBuilder::new(layout, panel.look, settings.bounce),
            visualizer,
            stopped,
            paused: false,
            mode: if settings.audio_reactive { Mode::Audio } else { Mode::Life },
            frames_to_tick: settings.tick_every,
            clock: 0.0,
            ticks: 0,
            skipped_ticks: 0,
            rng,
        }
    }

    pub fn panel(&self) -> &ControlPanel {
        &self.panel
    }

    pub fn layout(&self) -> &IsoLayout {
        self.builder.layout()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Seconds of running (unpaused) time.
    pub fn clock(&self) -> f32 {
        self.clock
    }

    /// Instances from the most recent frame.
    pub fn instances(&self) -> &[CubeInstance] {
        self.builder.instances()
    }

    /// Advance one rendered frame. `levels` is only read in audio mode;
    /// `None` there means silence.
    pub fn frame(&mut self, dt: f32, levels: Option<&AudioLevels>) -> &[CubeInstance] {
        // Refills keep landing while paused so finished workers never sit on a full channel.
        self.queue.poll();
        if self.paused || self.is_stopped() {
            return self.builder.instances();
        }
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.clock += dt;

        self.frames_to_tick = self.frames_to_tick.saturating_sub(1);
        if self.frames_to_tick == 0 {
            self.frames_to_tick = self.settings.tick_every;
            self.tick();
        }

        self.anim.advance(self.mode == Mode::Audio);
        match self.mode {
            Mode::Life => self.builder.build_life(&self.anim, self.clock),
            Mode::Audio => {
                let levels = levels.copied().unwrap_or_default();
                self.visualizer.update(&levels, self.clock, dt);
                self.builder.build_audio(&self.anim, &self.visualizer, self.clock)
            }
        }
    }

    fn tick(&mut self) {
        match self.queue.pop() {
            Some(diff) => {
                self.anim.apply_diff(&diff);
                self.ticks += 1;
            }
            None => {
                self.skipped_ticks += 1;
                log::debug!("diff queue empty, skipping tick");
            }
        }
        self.queue.request_refill();
    }

    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            log::info!("paused");
        }
    }

    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            log::info!("resumed");
        }
    }

    pub fn toggle_pause(&mut self) {
        if self.paused { self.resume() } else { self.pause() }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Stop for good: no more refills, no more frames. Anything in flight is dropped on arrival.
    pub fn stop(&mut self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            log::info!("scene stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Fresh random grid, same geometry.
    pub fn reset(&mut self) {
        let engine = Engine::with_seed(self.anim.side(), self.rng.random());
        self.anim.clear();
        self.anim.apply_diff(&Diff::initial(&engine));
        log::info!("reset: {} alive", engine.alive_count());
        self.queue.reset(engine);
        self.queue.request_refill();
        self.frames_to_tick = self.settings.tick_every;
        self.visualizer.reset();
    }

    pub fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            log::info!("mode: {mode:?}");
            self.mode = mode;
            if mode == Mode::Audio {
                self.visualizer.reset();
            }
        }
    }

    pub fn toggle_mode(&mut self) {
        self.set_mode(match self.mode {
            Mode::Life => Mode::Audio,
            Mode::Audio => Mode::Life,
        });
    }

    /// Block until the in-flight refill (if any) lands.
    pub fn wait_for_refill(&mut self, timeout: Duration) -> usize {
        self.queue.wait_for_refill(timeout)
    }

    pub fn stats(&self) -> SceneStats {
        SceneStats {
            side: self.anim.side(),
            mode: self.mode,
            paused: self.paused,
            stopped: self.is_stopped(),
            ticks: self.ticks,
            skipped_ticks: self.skipped_ticks,
            beats: self.visualizer.beat().beats(),
            queue_len: self.queue.len(),
            refill_in_flight: self.queue.in_flight(),
            population: self.anim.live_count(),
            instances: self.builder.instances().len(),
        }
    }
}
