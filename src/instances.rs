// src/instances.rs
//
// AnimGrid (+ audio field) -> flat list of cube instances, once per frame.
//
// Instances come out back to front by isometric depth `x + y`, so the
// rasterizer can alpha-blend without a depth buffer.

use bytemuck::{Pod, Zeroable};

use crate::anim::{AnimGrid, CellAnim, Phase};
use crate::palette::{self, Palette, Rgb};
use crate::tuning::CubeLook;
use crate::visualizer::{AudioVisualizer, Zone};

/// One cube as the GPU sees it.
///
/// `screen_pos` is the center of the cube's base diamond in pixels (y down).
/// `height` is the vertical extent in pixels, `scale` multiplies the tile
/// footprint. The fourth channel of each face color is a glow amount.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CubeInstance {
    pub screen_pos: [f32; 2],
    pub height: f32,
    pub scale: f32,
    pub top_color: [f32; 4],
    pub left_color: [f32; 4],
    pub right_color: [f32; 4],
    pub alpha: f32,
    /// 0 at the back corner, 1 at the front corner.
    pub depth: f32,
    pub _pad: [f32; 2],
}

/// 2:1 isometric projection of the grid, centered in the viewport.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IsoLayout {
    pub side: usize,
    pub tile_w: f32,
    pub tile_h: f32,
    /// Full cube height in pixels.
    pub cube_h: f32,
    pub origin: [f32; 2],
}

impl IsoLayout {
    pub fn new(side: usize, tile_w: f32, cube_height: f32, viewport: (u32, u32)) -> Self {
        let tile_h = tile_w * 0.5;
        let c = side.saturating_sub(1) as f32 * 0.5;
        let origin = [viewport.0 as f32 * 0.5, viewport.1 as f32 * 0.5 - c * tile_h];
        Self {
            side,
            tile_w,
            tile_h,
            cube_h: tile_w * cube_height,
            origin,
        }
    }

    #[inline]
    pub fn project(&self, x: usize, y: usize) -> [f32; 2] {
        let (fx, fy) = (x as f32, y as f32);
        [
            self.origin[0] + (fx - fy) * self.tile_w * 0.5,
            self.origin[1] + (fx + fy) * self.tile_h * 0.5,
        ]
    }

    #[inline]
    pub fn depth(&self, x: usize, y: usize) -> f32 {
        let max = 2 * self.side.saturating_sub(1);
        if max == 0 { 0.0 } else { (x + y) as f32 / max as f32 }
    }

    /// Visit every cell back to front: diagonal `x + y = 0` first.
    pub fn for_each_back_to_front(&self, mut f: impl FnMut(usize, usize)) {
        let n = self.side;
        if n == 0 {
            return;
        }
        for d in 0..(2 * n - 1) {
            let lo = d.saturating_sub(n - 1);
            let hi = d.min(n - 1);
            for x in lo..=hi {
                f(x, d - x);
            }
        }
    }
}

pub fn ease_out_back(t: f32, overshoot: f32) -> f32 {
    let c3 = overshoot + 1.0;
    let u = t - 1.0;
    1.0 + c3 * u * u * u + overshoot * u * u
}

pub fn ease_out_cubic(t: f32) -> f32 {
    let u = 1.0 - t;
    1.0 - u * u * u
}

pub fn ease_in_cubic(t: f32) -> f32 {
    t * t * t
}

fn rgba(c: Rgb, glow: f32) -> [f32; 4] {
    [c[0], c[1], c[2], glow]
}

pub struct InstanceBuilder {
    layout: IsoLayout,
    look: CubeLook,
    palette: Palette,
    bounce: bool,
    out: Vec<CubeInstance>,
}

impl InstanceBuilder {
    pub fn new(layout: IsoLayout, look: CubeLook, bounce: bool) -> Self {
        Self {
            layout,
            look,
            palette: Palette::new(),
            bounce,
            out: Vec::with_capacity(layout.side * layout.side),
        }
    }

    pub fn layout(&self) -> &IsoLayout {
        &self.layout
    }

    /// Result of the last build.
    pub fn instances(&self) -> &[CubeInstance] {
        &self.out
    }

    /// Game of Life path: one instance per non-empty cell.
    pub fn build_life(&mut self, anim: &AnimGrid, time: f32) -> &[CubeInstance] {
        let mut out = std::mem::take(&mut self.out);
        out.clear();
        let layout = self.layout;
        let n = anim.side().min(layout.side);
        layout.for_each_back_to_front(|x, y| {
            if x >= n || y >= n {
                return;
            }
            let c = anim.get(x, y);
            if c.phase != Phase::Empty {
                out.push(self.life_cube(c, x, y, time));
            }
        });
        self.out = out;
        &self.out
    }

    fn life_cube(&self, c: &CellAnim, x: usize, y: usize, time: f32) -> CubeInstance {
        let l = &self.layout;
        let look = &self.look;
        let mut pos = l.project(x, y);
        let base = self.palette.color(c.color);
        let p = c.progress.clamp(0.0, 1.0);

        let (height, scale, alpha, color) = match c.phase {
            Phase::Spawning => {
                let e = if self.bounce {
                    ease_out_back(p, look.back_overshoot)
                } else {
                    ease_out_cubic(p)
                }
                .max(0.0);
                let height = l.cube_h * e;
                // Grow from the cube's own center, not its base.
                pos[1] -= (l.cube_h - height) * 0.5;
                let alpha = (p / look.spawn_fade_in).min(1.0);
                (height, e, alpha, base)
            }
            Phase::Alive => {
                let breathe =
                    1.0 + look.breathe_amplitude * (time * look.breathe_speed + c.bob_phase).sin();
                let bob = look.bob_amplitude
                    * l.tile_h
                    * (time * look.bob_speed + c.bob_phase * 1.7).sin();
                pos[1] -= bob;
                let cap = look.age_cap_frames.max(1);
                let age = c.age.min(cap) as f32 / cap as f32;
                let color = palette::brighten(base, look.age_brighten_max * age);
                (l.cube_h * breathe, 1.0, 1.0, color)
            }
            Phase::Dying if p < look.vibrate_until => {
                let k = p / look.vibrate_until;
                let amp = look.vibrate_amplitude * l.tile_w * k;
                let w = time * look.vibrate_speed + c.bob_phase;
                pos[0] += w.sin() * amp;
                pos[1] += (w * 1.3).cos() * amp * 0.5;
                let color = palette::lerp_rgb(base, look.death_tint, look.death_tint_max * k);
                (l.cube_h, 1.0, 1.0, color)
            }
            Phase::Dying => {
                let q = ((p - look.vibrate_until) / (1.0 - look.vibrate_until)).clamp(0.0, 1.0);
                pos[1] += ease_in_cubic(q) * look.fall_tiles * l.tile_h;
                pos[0] += c.bob_phase.sin() * look.tumble * l.tile_w * q;
                let scale = 1.0 - look.fall_shrink * q;
                let color = palette::lerp_rgb(base, look.death_tint, look.death_tint_max);
                (l.cube_h * scale, scale, 1.0 - q, color)
            }
            Phase::Empty => (0.0, 0.0, 0.0, base),
        };

        let (top, left, right) = palette::faces(color);
        CubeInstance {
            screen_pos: pos,
            height,
            scale,
            top_color: rgba(top, 0.0),
            left_color: rgba(left, 0.0),
            right_color: rgba(right, 0.0),
            alpha,
            depth: l.depth(x, y),
            _pad: [0.0; 2],
        }
    }

    /// Audio path: same cells and same spawn/death curves as the life path,
    /// but alive cubes take their height and hue from the visualizer.
    pub fn build_audio(
        &mut self,
        anim: &AnimGrid,
        vis: &AudioVisualizer,
        time: f32,
    ) -> &[CubeInstance] {
        let mut out = std::mem::take(&mut self.out);
        out.clear();
        let layout = self.layout;
        let n = anim.side().min(layout.side).min(vis.side());
        let beat = vis.beat_pulse();
        layout.for_each_back_to_front(|x, y| {
            if x >= n || y >= n {
                return;
            }
            let c = anim.get(x, y);
            match c.phase {
                Phase::Empty => {}
                Phase::Alive => out.push(self.audio_cube(c, x, y, vis, beat)),
                Phase::Spawning | Phase::Dying => out.push(self.life_cube(c, x, y, time)),
            }
        });
        self.out = out;
        &self.out
    }

    fn audio_cube(
        &self,
        c: &CellAnim,
        x: usize,
        y: usize,
        vis: &AudioVisualizer,
        beat: f32,
    ) -> CubeInstance {
        let l = &self.layout;
        let v = vis.value(x, y);

        let mut height = l.cube_h * (0.15 + v);
        let mut value = 0.45 + 0.4 * v.min(1.0) + 0.25 * beat;
        let mut glow = beat * 0.3;
        if vis.zone(x, y) == Zone::Strip {
            height *= 1.3;
            value += 0.15;
            glow = v.min(1.0);
        }
        let base = self.palette.shifted(c.color, v * 0.35, value);
        let (top, left, right) = palette::faces(base);
        CubeInstance {
            screen_pos: l.project(x, y),
            height,
            scale: 1.0,
            top_color: rgba(top, glow),
            left_color: rgba(left, glow),
            right_color: rgba(right, glow),
            alpha: 1.0,
            depth: l.depth(x, y),
            _pad: [0.0; 2],
        }
    }
}
