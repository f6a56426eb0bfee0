// src/main.rs
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use clap::Parser;
use pollster::block_on;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Fullscreen, Window, WindowAttributes, WindowId},
};

use isolife::{
    audio::SharedLevels,
    capture::{AUDIO_RETRY_DELAY, AudioCapture, RetryOnce},
    scene::{Mode, Scene},
    tuning::{AnalyzerTuning, BACKGROUND, Sensitivity, Settings},
};

mod gfx;

use gfx::Gfx;

// -----------------------------
// CLI
// -----------------------------
/// Isometric Game of Life with color genetics.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Borderless fullscreen; any key quits.
    #[arg(long)]
    screensaver: bool,

    /// Log CPU/memory/FPS/queue stats once per second.
    #[arg(long)]
    debug: bool,

    /// Target number of tiles across the window width.
    #[arg(long, default_value_t = 40.0)]
    density: f32,

    /// Cube height as a fraction of the tile width.
    #[arg(long, default_value_t = 0.55)]
    cube_height: f32,

    /// Rendered frames per simulation tick.
    #[arg(long, default_value_t = 120)]
    tick_every: u32,

    /// Start in audio-reactive mode.
    #[arg(long)]
    audio: bool,

    #[arg(long, value_enum, default_value_t = Sensitivity::Medium)]
    sensitivity: Sensitivity,

    /// Plain ease-out on spawn instead of the overshoot bounce.
    #[arg(long)]
    no_bounce: bool,

    /// Fixed seed for a reproducible run.
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn settings(&self) -> Settings {
        Settings {
            tile_density: self.density,
            cube_height: self.cube_height,
            tick_every: self.tick_every,
            audio_reactive: self.audio,
            sensitivity: self.sensitivity,
            bounce: !self.no_bounce,
            seed: self.seed,
        }
        .sanitized()
    }
}

// -----------------------------
// App
// -----------------------------
struct App {
    is_screensaver: bool,
    debug: bool,
    settings: Settings,

    window: Option<Arc<Window>>,
    gfx: Option<Gfx>,
    scene: Option<Scene>,

    levels: SharedLevels,
    capture: Option<AudioCapture>,
    audio_retry: RetryOnce,

    last_frame: Instant,
    last_stat: Instant,
    frames: u64,
    last_ticks: u64,

    sys: System,
}

impl App {
    fn new(args: &Args) -> Self {
        let mut sys = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        sys.refresh_all();

        Self {
            is_screensaver: args.screensaver,
            debug: args.debug,
            settings: args.settings(),
            window: None,
            gfx: None,
            scene: None,
            levels: SharedLevels::new(),
            capture: None,
            audio_retry: RetryOnce::new(AUDIO_RETRY_DELAY),
            last_frame: Instant::now(),
            last_stat: Instant::now(),
            frames: 0,
            last_ticks: 0,
            sys,
        }
    }

    /// (Re)build the grid for the current surface size. The old scene is stopped first.
    fn rebuild_scene(&mut self) {
        let Some(gfx) = self.gfx.as_mut() else {
            return;
        };
        let mode = self.scene.as_ref().map(Scene::mode);
        if let Some(old) = self.scene.as_mut() {
            old.stop();
        }

        let mut scene = Scene::new(gfx.size(), self.settings);
        let layout = *scene.layout();
        gfx.set_tile(layout.tile_w, layout.tile_h);
        if let Some(mode) = mode {
            scene.set_mode(mode);
        }
        self.last_ticks = 0;
        self.scene = Some(scene);
    }

    /// Everything `AudioCapture::start` needs, once a scene exists.
    fn capture_args(&self) -> Option<(SharedLevels, Sensitivity, AnalyzerTuning)> {
        let tuning = self.scene.as_ref()?.panel().analyzer;
        Some((self.levels.clone(), self.settings.sensitivity, tuning))
    }

    /// Switch to audio mode, starting capture first if needed. A failed start
    /// is retried once from `poll_audio_retry`; until then the life view stays up.
    fn enter_audio(&mut self) {
        if self.capture.is_some() {
            self.set_mode(Mode::Audio);
            return;
        }
        if self.audio_retry.is_pending() {
            return;
        }
        let Some((levels, sensitivity, tuning)) = self.capture_args() else {
            return;
        };
        let attempt = move || AudioCapture::start(levels, sensitivity, tuning);
        if let Some(c) = self.audio_retry.start(Instant::now(), attempt) {
            self.capture = Some(c);
            self.set_mode(Mode::Audio);
        }
    }

    fn poll_audio_retry(&mut self, now: Instant) {
        if !self.audio_retry.is_pending() {
            return;
        }
        let Some((levels, sensitivity, tuning)) = self.capture_args() else {
            self.audio_retry.cancel();
            return;
        };
        let attempt = move || AudioCapture::start(levels, sensitivity, tuning);
        match self.audio_retry.poll(now, attempt) {
            Some(Ok(c)) => {
                self.capture = Some(c);
                self.set_mode(Mode::Audio);
            }
            Some(Err(e)) => {
                log::error!("audio unavailable: {e}");
                log::warn!("staying in Game of Life mode");
            }
            None => {}
        }
    }

    fn set_mode(&mut self, mode: Mode) {
        if let Some(scene) = self.scene.as_mut() {
            scene.set_mode(mode);
        }
    }

    fn toggle_audio(&mut self) {
        let Some(mode) = self.scene.as_ref().map(Scene::mode) else {
            return;
        };
        match mode {
            Mode::Life if self.audio_retry.is_pending() => {
                log::info!("audio start cancelled");
                self.audio_retry.cancel();
            }
            Mode::Life => self.enter_audio(),
            Mode::Audio => {
                self.set_mode(Mode::Life);
                self.capture = None;
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(scene) = self.scene.as_mut() {
            scene.stop();
        }
        self.audio_retry.cancel();
        self.capture = None;
    }

    fn log_stats(&mut self) {
        self.sys.refresh_cpu_all();
        self.sys.refresh_memory();

        let cpu = self.sys.global_cpu_usage();
        let mem_used = self.sys.used_memory();
        let mem_total = self.sys.total_memory();
        let mem_pct = if mem_total > 0 {
            (mem_used as f32 / mem_total as f32) * 100.0
        } else {
            0.0
        };

        if let Some(scene) = self.scene.as_ref() {
            let st = scene.stats();
            let tps = st.ticks - self.last_ticks;
            self.last_ticks = st.ticks;
            log::info!(
                "CPU {:5.1}% | MEM {:5.1}% | FPS {} | ticks/s {} | queue {}{} | pop {} | cubes {} | skipped {} | beats {} | {:?}",
                cpu,
                mem_pct,
                self.frames,
                tps,
                st.queue_len,
                if st.refill_in_flight { "+" } else { "" },
                st.population,
                st.instances,
                st.skipped_ticks,
                st.beats,
                st.mode,
            );
            if let Some(c) = self.capture.as_ref() {
                log::info!(
                    "audio {} @ {} Hz, {} ch",
                    c.device_name(),
                    c.sample_rate(),
                    c.channels()
                );
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, el: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut attrs = WindowAttributes::default()
            .with_title("isolife")
            .with_decorations(!self.is_screensaver)
            .with_resizable(!self.is_screensaver);
        if self.is_screensaver {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        } else {
            attrs = attrs.with_inner_size(PhysicalSize::new(1280u32, 720u32));
        }

        let win = match el.create_window(attrs) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("create_window: {e}");
                el.exit();
                return;
            }
        };
        win.set_cursor_visible(!self.is_screensaver);

        let size = win.inner_size();
        let gfx = match block_on(Gfx::new(win.clone(), size.width, size.height, BACKGROUND)) {
            Ok(g) => g,
            Err(e) => {
                log::error!("{e}");
                el.exit();
                return;
            }
        };

        self.window = Some(win);
        self.gfx = Some(gfx);
        self.rebuild_scene();

        if self.settings.audio_reactive {
            // Life until capture is actually running.
            self.set_mode(Mode::Life);
            self.enter_audio();
        }

        self.last_frame = Instant::now();
        self.last_stat = Instant::now();
        self.frames = 0;
    }

    fn window_event(&mut self, el: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => el.exit(),

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return;
                }
                if self.is_screensaver {
                    el.exit();
                    return;
                }
                match event.logical_key {
                    Key::Named(NamedKey::Escape) => el.exit(),
                    Key::Named(NamedKey::Space) => {
                        if let Some(scene) = self.scene.as_mut() {
                            scene.toggle_pause();
                        }
                    }
                    Key::Character(ref s) if s.as_str().eq_ignore_ascii_case("r") => {
                        if let Some(scene) = self.scene.as_mut() {
                            scene.reset();
                        }
                    }
                    Key::Character(ref s) if s.as_str().eq_ignore_ascii_case("a") => {
                        self.toggle_audio();
                    }
                    Key::Character(ref s) if s.as_str().eq_ignore_ascii_case("d") => {
                        self.debug = !self.debug;
                        log::info!("debug stats {}", if self.debug { "on" } else { "off" });
                    }
                    _ => {}
                }
            }

            WindowEvent::Resized(sz) => {
                if sz.width == 0 || sz.height == 0 {
                    return;
                }
                if let Some(gfx) = &mut self.gfx {
                    if gfx.size() == (sz.width, sz.height) {
                        return;
                    }
                    gfx.resize(sz.width, sz.height);
                }
                self.rebuild_scene();
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, el: &ActiveEventLoop) {
        el.set_control_flow(ControlFlow::Poll);

        let now = Instant::now();
        let mut dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;
        if dt.is_nan() || dt < 0.0 {
            dt = 0.0;
        }
        if dt > 0.25 {
            dt = 0.25;
        }

        self.poll_audio_retry(now);

        let levels = self.capture.as_ref().map(|_| self.levels.snapshot());
        if let (Some(gfx), Some(scene)) = (self.gfx.as_mut(), self.scene.as_mut()) {
            let instances = scene.frame(dt, levels.as_ref());
            gfx.upload(instances);
            gfx.render();
        }
        self.frames += 1;

        if self.debug && self.last_stat.elapsed() >= Duration::from_secs(1) {
            self.log_stats();
            self.frames = 0;
            self.last_stat = Instant::now();
        }
    }

    fn exiting(&mut self, _el: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn main() -> Result<(), winit::error::EventLoopError> {
    env_logger::init();
    let args = Args::parse();

    let event_loop = EventLoop::new()?;
    let mut app = App::new(&args);
    event_loop.run_app(&mut app)
}
