// src/sim.rs
//
// Toroidal Game of Life with color genetics.
// One rule (B3/S23), one neighborhood (Moore, wraparound), nothing else.

use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::prelude::*;

use crate::tuning::{
    INITIAL_ALIVE_PROBABILITY, INITIAL_MAX_AGE, MIN_GRID_SIDE, MUTATION_CHANCE, PALETTE_SIZE,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cell {
    pub alive: bool,
    /// Index into the palette, `0..PALETTE_SIZE`.
    pub color: u8,
    /// Generations survived.
    pub age: u16,
}

impl Cell {
    pub const DEAD: Cell = Cell { alive: false, color: 0, age: 0 };

    pub fn born(color: u8) -> Self {
        Self { alive: true, color, age: 0 }
    }
}

/// Knobs that change what `step()` does. Defaults are the real rules.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rules {
    /// Chance a newborn takes a uniformly random color instead of its neighbors' mode.
    pub mutation_chance: f64,
    /// Inject patterns when the population runs low.
    pub injection: bool,
}

impl Default for Rules {
    fn default() -> Self {
        Self { mutation_chance: MUTATION_CHANCE, injection: true }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Pattern {
    RPentomino,
    Acorn,
    Glider,
    LightweightSpaceship,
    Diehard,
}

impl Pattern {
    pub fn all() -> &'static [Pattern] {
        &[
            Pattern::RPentomino,
            Pattern::Acorn,
            Pattern::Glider,
            Pattern::LightweightSpaceship,
            Pattern::Diehard,
        ]
    }

    /// Live cells relative to the anchor (top-left of the bounding box).
    pub fn offsets(self) -> &'static [(usize, usize)] {
        match self {
            Pattern::RPentomino => &[(1, 0), (2, 0), (0, 1), (1, 1), (1, 2)],
            Pattern::Acorn => &[(1, 0), (3, 1), (0, 2), (1, 2), (4, 2), (5, 2), (6, 2)],
            Pattern::Glider => &[(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)],
            Pattern::LightweightSpaceship => &[
                (1, 0),
                (4, 0),
                (0, 1),
                (0, 2),
                (4, 2),
                (0, 3),
                (1, 3),
                (2, 3),
                (3, 3),
            ],
            Pattern::Diehard => &[(6, 0), (0, 1), (1, 1), (1, 2), (5, 2), (6, 2), (7, 2)],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Pattern::RPentomino => "R-PENTOMINO",
            Pattern::Acorn => "ACORN",
            Pattern::Glider => "GLIDER",
            Pattern::LightweightSpaceship => "LWSS",
            Pattern::Diehard => "DIEHARD",
        }
    }
}

/// Most frequent color; ties go to whichever tied color shows up first in `colors`.
pub fn dominant_color(colors: &[u8]) -> Option<u8> {
    let mut counts = [0u8; PALETTE_SIZE];
    for &c in colors {
        counts[c as usize % PALETTE_SIZE] += 1;
    }
    let best = colors.iter().map(|&c| counts[c as usize % PALETTE_SIZE]).max()?;
    colors
        .iter()
        .copied()
        .find(|&c| counts[c as usize % PALETTE_SIZE] == best)
}

/// Patterns to inject for a population of `alive` out of `total` cells.
pub fn injections_for(alive: usize, total: usize) -> usize {
    if alive < total / 25 {
        5
    } else if alive < total / 12 {
        1
    } else {
        0
    }
}

#[derive(Clone)]
pub struct Engine {
    side: usize,
    cur: Vec<Cell>,
    next: Vec<Cell>,
    rng: StdRng,
    rules: Rules,
    generation: u64,
    last_injections: usize,
}

impl Engine {
    /// Randomized grid seeded from the OS.
    pub fn new(side: usize) -> Self {
        let mut e = Self::blank(side, StdRng::from_os_rng());
        e.randomize();
        e
    }

    /// Randomized grid with a reproducible seed.
    pub fn with_seed(side: usize, seed: u64) -> Self {
        let mut e = Self::empty(side, seed);
        e.randomize();
        e
    }

    /// All-dead grid with a reproducible seed.
    pub fn empty(side: usize, seed: u64) -> Self {
        Self::blank(side, StdRng::seed_from_u64(seed))
    }

    fn blank(side: usize, rng: StdRng) -> Self {
        let side = side.max(MIN_GRID_SIDE);
        let n = side * side;
        Self {
            side,
            cur: vec![Cell::DEAD; n],
            next: vec![Cell::DEAD; n],
            rng,
            rules: Rules::default(),
            generation: 0,
            last_injections: 0,
        }
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cur
    }

    pub fn cell(&self, x: usize, y: usize) -> Cell {
        self.cur[(y % self.side) * self.side + (x % self.side)]
    }

    pub fn set_cell(&mut self, x: usize, y: usize, cell: Cell) {
        let i = (y % self.side) * self.side + (x % self.side);
        self.cur[i] = cell;
    }

    pub fn rules(&self) -> Rules {
        self.rules
    }

    pub fn set_rules(&mut self, rules: Rules) {
        self.rules = rules;
    }

    /// Number of `step()` calls so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn alive_count(&self) -> usize {
        self.cur.iter().filter(|c| c.alive).count()
    }

    /// Patterns injected by the most recent `step()`.
    pub fn last_injections(&self) -> usize {
        self.last_injections
    }

    /// Every cell independently alive with probability 0.25.
    pub fn randomize(&mut self) {
        for c in &mut self.cur {
            let alive = self.rng.random_bool(INITIAL_ALIVE_PROBABILITY);
            *c = Cell {
                alive,
                color: self.rng.random_range(0..PALETTE_SIZE) as u8,
                age: if alive { self.rng.random_range(0..=INITIAL_MAX_AGE) } else { 0 },
            };
        }
    }

    /// Place a pattern with its anchor at (x, y). Cells that fall off the grid are skipped.
    pub fn stamp(&mut self, pattern: Pattern, x: usize, y: usize, color: u8) {
        let n = self.side;
        for &(dx, dy) in pattern.offsets() {
            let (tx, ty) = (x + dx, y + dy);
            if tx < n && ty < n {
                self.cur[ty * n + tx] = Cell::born(color % PALETTE_SIZE as u8);
            }
        }
    }

    /// Random pattern, random color, random interior anchor.
    pub fn inject_random_pattern(&mut self) {
        let n = self.side;
        let lo = 2;
        let hi = n.saturating_sub(2).max(lo + 1);
        let x = self.rng.random_range(lo..hi);
        let y = self.rng.random_range(lo..hi);
        let color = self.rng.random_range(0..PALETTE_SIZE) as u8;
        let all = Pattern::all();
        let pattern = all[self.rng.random_range(0..all.len())];
        log::trace!("inject {} at ({x}, {y}), color {color}", pattern.label());
        self.stamp(pattern, x, y, color);
    }

    /// One generation, then anti-stagnation injection if enabled.
    pub fn step(&mut self) {
        self.step_life();
        self.last_injections = if self.rules.injection { self.inject_if_sparse() } else { 0 };
        self.generation += 1;
    }

    fn inject_if_sparse(&mut self) -> usize {
        let total = self.side * self.side;
        let alive = self.alive_count();
        let count = injections_for(alive, total);
        for _ in 0..count {
            self.inject_random_pattern();
        }
        if count > 0 {
            log::trace!("population {alive}/{total}: injected {count} pattern(s)");
        }
        count
    }

    fn step_life(&mut self) {
        let n = self.side;
        let cur = &self.cur;

        self.next.par_chunks_mut(n).enumerate().for_each(|(y, nrow)| {
            let ym1 = if y == 0 { n - 1 } else { y - 1 };
            let yp1 = if y + 1 == n { 0 } else { y + 1 };
            for x in 0..n {
                let xm1 = if x == 0 { n - 1 } else { x - 1 };
                let xp1 = if x + 1 == n { 0 } else { x + 1 };

                // Row-major neighbor order; color ties resolve in this order.
                let coords = [
                    (xm1, ym1),
                    (x, ym1),
                    (xp1, ym1),
                    (xm1, y),
                    (xp1, y),
                    (xm1, yp1),
                    (x, yp1),
                    (xp1, yp1),
                ];

                let mut colors = [0u8; 8];
                let mut live = 0usize;
                for (xx, yy) in coords {
                    let c = cur[yy * n + xx];
                    if c.alive {
                        colors[live] = c.color;
                        live += 1;
                    }
                }

                let me = cur[y * n + x];
                nrow[x] = if me.alive {
                    if live == 2 || live == 3 {
                        Cell { age: me.age.saturating_add(1), ..me }
                    } else {
                        Cell::DEAD
                    }
                } else if live == 3 {
                    Cell::born(dominant_color(&colors[..live]).unwrap_or(0))
                } else {
                    Cell::DEAD
                };
            }
        });

        // Mutation rolls stay sequential so a seed fully determines the run.
        let chance = self.rules.mutation_chance.clamp(0.0, 1.0);
        if chance > 0.0 {
            let rng = &mut self.rng;
            for (next, prev) in self.next.iter_mut().zip(self.cur.iter()) {
                if next.alive && !prev.alive && rng.random_bool(chance) {
                    next.color = rng.random_range(0..PALETTE_SIZE) as u8;
                }
            }
        }

        std::mem::swap(&mut self.cur, &mut self.next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_rules() -> Rules {
        Rules { mutation_chance: 0.0, injection: false }
    }

    fn alive_set(e: &Engine) -> Vec<(usize, usize)> {
        let n = e.side();
        (0..n * n)
            .filter(|&i| e.cells()[i].alive)
            .map(|i| (i % n, i / n))
            .collect()
    }

    /// Straightforward reference step used to cross-check the parallel kernel.
    fn reference_alive(e: &Engine) -> Vec<bool> {
        let n = e.side() as i64;
        let mut out = vec![false; (n * n) as usize];
        for y in 0..n {
            for x in 0..n {
                let mut live = 0;
                for dy in -1..=1i64 {
                    for dx in -1..=1i64 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let xx = (x + dx).rem_euclid(n) as usize;
                        let yy = (y + dy).rem_euclid(n) as usize;
                        if e.cell(xx, yy).alive {
                            live += 1;
                        }
                    }
                }
                let me = e.cell(x as usize, y as usize).alive;
                out[(y * n + x) as usize] = (me && (live == 2 || live == 3)) || (!me && live == 3);
            }
        }
        out
    }

    #[test]
    fn dominant_color_majority_and_ties() {
        assert_eq!(dominant_color(&[1, 1, 2]), Some(1));
        assert_eq!(dominant_color(&[2, 1, 1]), Some(1));
        assert_eq!(dominant_color(&[1, 1, 2, 2]), Some(1));
        assert_eq!(dominant_color(&[2, 1, 1, 2]), Some(2));
        assert_eq!(dominant_color(&[7, 3, 5]), Some(7));
        assert_eq!(dominant_color(&[]), None);
    }

    #[test]
    fn step_matches_reference_rule() {
        for seed in 0..4 {
            let mut e = Engine::with_seed(32, seed);
            e.set_rules(quiet_rules());
            for _ in 0..10 {
                let expected = reference_alive(&e);
                let before: Vec<Cell> = e.cells().to_vec();
                e.step();
                for (i, cell) in e.cells().iter().enumerate() {
                    assert_eq!(cell.alive, expected[i], "seed {seed} cell {i}");
                    if cell.alive && before[i].alive {
                        assert_eq!(cell.color, before[i].color, "survivors keep their color");
                        assert_eq!(cell.age, before[i].age + 1);
                    }
                }
            }
        }
    }

    #[test]
    fn newborn_inherits_neighbor_color_without_mutation() {
        let mut e = Engine::empty(20, 1);
        e.set_rules(quiet_rules());
        // Horizontal blinker, color 5.
        for x in 4..7 {
            e.set_cell(x, 5, Cell::born(5));
        }
        e.step();
        assert!(e.cell(5, 4).alive && e.cell(5, 6).alive);
        assert_eq!(e.cell(5, 4).color, 5);
        assert_eq!(e.cell(5, 6).color, 5);
        assert_eq!(e.cell(5, 4).age, 0);
    }

    #[test]
    fn newborn_takes_majority_of_mixed_parents() {
        let mut e = Engine::empty(20, 1);
        e.set_rules(quiet_rules());
        // Three parents around (10, 10): two of color 1, one of color 2.
        e.set_cell(9, 9, Cell::born(2));
        e.set_cell(10, 9, Cell::born(1));
        e.set_cell(11, 9, Cell::born(1));
        e.step();
        assert!(e.cell(10, 10).alive);
        assert_eq!(e.cell(10, 10).color, 1);
    }

    #[test]
    fn full_mutation_still_yields_palette_colors() {
        let mut e = Engine::with_seed(24, 9);
        e.set_rules(Rules { mutation_chance: 1.0, injection: false });
        for _ in 0..5 {
            e.step();
            assert!(e.cells().iter().all(|c| (c.color as usize) < PALETTE_SIZE));
        }
    }

    #[test]
    fn blinker_oscillates_across_the_seam() {
        let mut e = Engine::empty(20, 3);
        e.set_rules(quiet_rules());
        // Vertical blinker straddling the top/bottom edge.
        e.set_cell(7, 19, Cell::born(0));
        e.set_cell(7, 0, Cell::born(0));
        e.set_cell(7, 1, Cell::born(0));
        let start = alive_set(&e);
        e.step();
        let mid = alive_set(&e);
        assert_eq!(mid, vec![(6, 0), (7, 0), (8, 0)]);
        e.step();
        assert_eq!(alive_set(&e), start);
    }

    #[test]
    fn glider_wraps_around_the_torus() {
        let n = 20;
        let mut e = Engine::empty(n, 4);
        e.set_rules(quiet_rules());
        e.stamp(Pattern::Glider, 16, 16, 3);
        let start = alive_set(&e);

        // Every 4 generations the glider moves one cell down-right.
        for _ in 0..4 {
            e.step();
        }
        let mut shifted: Vec<(usize, usize)> = start
            .iter()
            .map(|&(x, y)| ((x + 1) % n, (y + 1) % n))
            .collect();
        shifted.sort_by_key(|&(x, y)| (y, x));
        assert_eq!(alive_set(&e), shifted);

        // A full lap brings it home.
        for _ in 4..4 * n {
            e.step();
        }
        assert_eq!(alive_set(&e), start);
        assert_eq!(e.generation(), 4 * n as u64);
    }

    /// 2x2 blocks on a 4-cell pitch: still lifes that never touch.
    fn blocks(e: &mut Engine, count: usize) {
        let per_row = e.side() / 4;
        for k in 0..count {
            let (bx, by) = (4 * (k % per_row) + 1, 4 * (k / per_row) + 1);
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                e.set_cell(bx + dx, by + dy, Cell::born(0));
            }
        }
    }

    #[test]
    fn injection_tiers_follow_population() {
        // 40x40: sparse below 64 alive, thin below 133.
        assert_eq!(injections_for(0, 1600), 5);
        assert_eq!(injections_for(63, 1600), 5);
        assert_eq!(injections_for(64, 1600), 1);
        assert_eq!(injections_for(132, 1600), 1);
        assert_eq!(injections_for(133, 1600), 0);
        assert_eq!(injections_for(1600, 1600), 0);
    }

    #[test]
    fn empty_grid_gets_five_injections() {
        let mut e = Engine::empty(40, 11);
        e.set_rules(Rules { mutation_chance: 0.0, injection: true });
        e.step();
        assert_eq!(e.last_injections(), 5);
        assert!(e.alive_count() > 0);
    }

    #[test]
    fn thin_grid_gets_one_injection() {
        let mut e = Engine::empty(40, 12);
        e.set_rules(Rules { mutation_chance: 0.0, injection: true });
        blocks(&mut e, 20);
        e.step();
        assert_eq!(e.last_injections(), 1);
        assert!(e.alive_count() > 80);
    }

    #[test]
    fn dense_grid_is_left_alone() {
        let mut e = Engine::empty(40, 13);
        e.set_rules(Rules { mutation_chance: 0.0, injection: true });
        blocks(&mut e, 40);
        e.step();
        assert_eq!(e.last_injections(), 0);
        assert_eq!(e.alive_count(), 160);

        let mut a = Engine::with_seed(30, 5);
        let mut b = a.clone();
        a.set_rules(Rules { mutation_chance: 0.0, injection: true });
        b.set_rules(quiet_rules());
        a.step();
        b.step();
        assert!(a.alive_count() >= 30 * 30 / 12);
        assert_eq!(a.cells(), b.cells());
    }

    #[test]
    fn mutation_rate_matches_the_rule() {
        // 400 single-color blinkers per grid, two births each on the first step.
        let color = 7;
        let mut births = 0usize;
        let mut off_color = 0usize;
        for seed in 0..25 {
            let mut e = Engine::empty(100, seed);
            e.set_rules(Rules { mutation_chance: MUTATION_CHANCE, injection: false });
            for by in (0..100).step_by(5) {
                for bx in (0..100).step_by(5) {
                    for dx in 0..3 {
                        e.set_cell(bx + dx, by + 2, Cell::born(color));
                    }
                }
            }
            let before: Vec<bool> = e.cells().iter().map(|c| c.alive).collect();
            e.step();
            for (cell, was) in e.cells().iter().zip(&before) {
                if cell.alive && !was {
                    births += 1;
                    if cell.color != color {
                        off_color += 1;
                    }
                }
            }
        }
        assert_eq!(births, 25 * 800);
        // A mutation lands back on the parent color 1 time in 24.
        let expected = MUTATION_CHANCE * (PALETTE_SIZE - 1) as f64 / PALETTE_SIZE as f64;
        let rate = off_color as f64 / births as f64;
        assert!((rate - expected).abs() < 0.01, "off-color rate {rate}, expected {expected}");
    }

    #[test]
    fn stamp_clips_at_the_border() {
        let mut e = Engine::empty(20, 0);
        e.stamp(Pattern::Diehard, 15, 18, 2);
        // Diehard is 8 wide and 3 tall: only the first two rows and five columns fit.
        assert!(e.alive_count() < Pattern::Diehard.offsets().len());
        assert!(e.cells().iter().filter(|c| c.alive).all(|c| c.color == 2));
    }

    #[test]
    fn randomize_density_and_ages() {
        let e = Engine::with_seed(100, 21);
        let alive = e.alive_count() as f32 / (100.0 * 100.0);
        assert!((0.2..0.3).contains(&alive), "alive fraction {alive}");
        assert!(e.cells().iter().all(|c| c.age <= INITIAL_MAX_AGE));
        assert!(e.cells().iter().filter(|c| !c.alive).all(|c| c.age == 0));
    }

    #[test]
    fn side_is_clamped() {
        assert_eq!(Engine::empty(3, 0).side(), MIN_GRID_SIDE);
    }
}
