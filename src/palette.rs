// src/palette.rs
//
// Cell colors and cube face shading.

use crate::tuning::PALETTE_SIZE;

/// Linear RGB, 0..1.
pub type Rgb = [f32; 3];

/// Light falls from the upper left: top is lit, left is half-shaded, right is in shadow.
pub const TOP_SHADE: f32 = 1.0;
pub const LEFT_SHADE: f32 = 0.72;
pub const RIGHT_SHADE: f32 = 0.5;

pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb {
    let h = (h % 1.0 + 1.0) % 1.0;
    let i = (h * 6.0).floor();
    let f = h * 6.0 - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);
    let (r, g, b) = match i as i32 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    [r, g, b]
}

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

pub fn lerp_rgb(a: Rgb, b: Rgb, t: f32) -> Rgb {
    [lerp(a[0], b[0], t), lerp(a[1], b[1], t), lerp(a[2], b[2], t)]
}

#[inline]
pub fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Brighten toward white by `amount` (0 = unchanged, 1 = white).
pub fn brighten(c: Rgb, amount: f32) -> Rgb {
    lerp_rgb(c, [1.0, 1.0, 1.0], amount.clamp(0.0, 1.0))
}

pub fn scale(c: Rgb, k: f32) -> Rgb {
    [
        (c[0] * k).clamp(0.0, 1.0),
        (c[1] * k).clamp(0.0, 1.0),
        (c[2] * k).clamp(0.0, 1.0),
    ]
}

/// Shaded (top, left, right) faces for a base color.
pub fn faces(base: Rgb) -> (Rgb, Rgb, Rgb) {
    (scale(base, TOP_SHADE), scale(base, LEFT_SHADE), scale(base, RIGHT_SHADE))
}

/// Fixed hue wheel. Neighboring entries alternate saturation/value so
/// adjacent hues stay distinguishable.
#[derive(Clone, Debug)]
pub struct Palette {
    colors: [Rgb; PALETTE_SIZE],
}

impl Default for Palette {
    fn default() -> Self {
        Self::new()
    }
}

impl Palette {
    pub fn new() -> Self {
        let mut colors = [[0.0; 3]; PALETTE_SIZE];
        for (i, c) in colors.iter_mut().enumerate() {
            let h = i as f32 / PALETTE_SIZE as f32;
            let (s, v) = if i % 2 == 0 { (0.72, 0.95) } else { (0.55, 0.82) };
            *c = hsv_to_rgb(h, s, v);
        }
        Self { colors }
    }

    /// Color for a palette index. Out-of-range indices wrap.
    pub fn color(&self, index: u8) -> Rgb {
        self.colors[index as usize % PALETTE_SIZE]
    }

    /// Hue of an index, shifted by `shift` turns, for audio mode.
    pub fn shifted(&self, index: u8, shift: f32, value: f32) -> Rgb {
        let h = (index as usize % PALETTE_SIZE) as f32 / PALETTE_SIZE as f32 + shift;
        hsv_to_rgb(h, 0.75, value.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Rgb, b: Rgb) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn primary_hues() {
        assert!(close(hsv_to_rgb(0.0, 1.0, 1.0), [1.0, 0.0, 0.0]));
        assert!(close(hsv_to_rgb(1.0 / 3.0, 1.0, 1.0), [0.0, 1.0, 0.0]));
        assert!(close(hsv_to_rgb(2.0 / 3.0, 1.0, 1.0), [0.0, 0.0, 1.0]));
        // Hue wraps.
        assert!(close(hsv_to_rgb(1.25, 0.5, 0.5), hsv_to_rgb(0.25, 0.5, 0.5)));
    }

    #[test]
    fn palette_entries_are_distinct() {
        let p = Palette::new();
        for i in 0..PALETTE_SIZE as u8 {
            for j in (i + 1)..PALETTE_SIZE as u8 {
                assert!(!close(p.color(i), p.color(j)), "{i} vs {j}");
            }
        }
        assert_eq!(p.color(PALETTE_SIZE as u8), p.color(0));
    }

    #[test]
    fn faces_darken_left_then_right() {
        let (t, l, r) = faces([0.8, 0.6, 0.4]);
        for k in 0..3 {
            assert!(t[k] > l[k] && l[k] > r[k]);
        }
    }

    #[test]
    fn smoothstep_endpoints() {
        assert_eq!(smoothstep(-1.0), 0.0);
        assert_eq!(smoothstep(0.5), 0.5);
        assert_eq!(smoothstep(2.0), 1.0);
    }
}
