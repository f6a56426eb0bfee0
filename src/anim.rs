// src/anim.rs
//
// Render-side mirror of the grid. Only diffs and frame ticks move it;
// it never looks at engine cells directly.

use rand::{SeedableRng, rngs::StdRng};
use rayon::prelude::*;

use crate::diff::Diff;
use crate::tuning::AnimTuning;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Empty,
    Spawning,
    Alive,
    Dying,
}

/// What can happen to a cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Event {
    Born { color: u8, bob_phase: f32 },
    Died,
    /// One rendered frame with the given progress steps.
    Frame { spawn_step: f32, dying_step: f32 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CellAnim {
    pub phase: Phase,
    /// 0..1 within the current phase.
    pub progress: f32,
    pub color: u8,
    pub bob_phase: f32,
    /// Frames spent alive.
    pub age: u32,
}

impl CellAnim {
    /// Spawning or alive: the engine considers this cell alive.
    pub fn is_live(&self) -> bool {
        matches!(self.phase, Phase::Spawning | Phase::Alive)
    }

    /// The transition table.
    ///
    /// | from             | event | to                              |
    /// |------------------|-------|---------------------------------|
    /// | empty, dying     | born  | spawning                        |
    /// | spawning, alive  | died  | dying                           |
    /// | spawning         | frame | spawning, or alive at progress 1 |
    /// | alive            | frame | alive, age + 1                  |
    /// | dying            | frame | dying, or empty at progress 1    |
    ///
    /// Anything else is ignored.
    pub fn apply(&mut self, event: Event) {
        match (self.phase, event) {
            (Phase::Empty | Phase::Dying, Event::Born { color, bob_phase }) => {
                *self = CellAnim { phase: Phase::Spawning, progress: 0.0, color, bob_phase, age: 0 };
            }
            (Phase::Spawning | Phase::Alive, Event::Died) => {
                self.phase = Phase::Dying;
                self.progress = 0.0;
            }
            (Phase::Spawning, Event::Frame { spawn_step, .. }) => {
                self.progress += spawn_step;
                if self.progress >= 1.0 {
                    self.phase = Phase::Alive;
                    self.progress = 0.0;
                    self.age = 0;
                }
            }
            (Phase::Alive, Event::Frame { .. }) => {
                self.age = self.age.saturating_add(1);
            }
            (Phase::Dying, Event::Frame { dying_step, .. }) => {
                self.progress += dying_step;
                if self.progress >= 1.0 {
                    self.phase = Phase::Empty;
                    self.progress = 0.0;
                }
            }
            _ => {}
        }
    }
}

pub struct AnimGrid {
    side: usize,
    cells: Vec<CellAnim>,
    rng: StdRng,
    tuning: AnimTuning,
}

impl AnimGrid {
    pub fn new(side: usize, seed: u64, tuning: AnimTuning) -> Self {
        Self {
            side,
            cells: vec![CellAnim::default(); side * side],
            rng: StdRng::seed_from_u64(seed),
            tuning,
        }
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn cells(&self) -> &[CellAnim] {
        &self.cells
    }

    pub fn get(&self, x: usize, y: usize) -> &CellAnim {
        &self.cells[y * self.side + x]
    }

    pub fn clear(&mut self) {
        self.cells.fill(CellAnim::default());
    }

    pub fn count(&self, phase: Phase) -> usize {
        self.cells.iter().filter(|c| c.phase == phase).count()
    }

    pub fn live_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_live()).count()
    }

    /// Consume one simulation tick.
    pub fn apply_diff(&mut self, diff: &Diff) {
        let n = self.side;
        for &(x, y) in &diff.deaths {
            let (x, y) = (x as usize, y as usize);
            if x < n && y < n {
                self.cells[y * n + x].apply(Event::Died);
            }
        }
        for &(x, y, color) in &diff.births {
            let (x, y) = (x as usize, y as usize);
            if x < n && y < n {
                let bob_phase = self.tuning.bob_phase.pick(&mut self.rng);
                self.cells[y * n + x].apply(Event::Born { color, bob_phase });
            }
        }
    }

    /// Advance every cell by one rendered frame.
    pub fn advance(&mut self, audio_mode: bool) {
        let t = self.tuning;
        let event = if audio_mode {
            Event::Frame { spawn_step: t.spawn_step_audio, dying_step: t.dying_step_audio }
        } else {
            Event::Frame { spawn_step: t.spawn_step, dying_step: t.dying_step }
        };
        self.cells.par_iter_mut().for_each(|c| c.apply(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::precompute;
    use crate::sim::Engine;

    fn frame() -> Event {
        let t = AnimTuning::default();
        Event::Frame { spawn_step: t.spawn_step, dying_step: t.dying_step }
    }

    #[test]
    fn full_lifecycle() {
        let mut c = CellAnim::default();
        c.apply(Event::Born { color: 4, bob_phase: 1.0 });
        assert_eq!(c.phase, Phase::Spawning);
        assert_eq!((c.progress, c.color, c.bob_phase), (0.0, 4, 1.0));

        let mut frames = 0;
        while c.phase == Phase::Spawning {
            let before = c.progress;
            c.apply(frame());
            frames += 1;
            if c.phase == Phase::Spawning {
                assert!(c.progress > before);
            }
        }
        assert_eq!(c.phase, Phase::Alive);
        assert!((49..=51).contains(&frames), "spawn took {frames} frames");
        assert_eq!((c.progress, c.age), (0.0, 0));

        for _ in 0..10 {
            c.apply(frame());
        }
        assert_eq!(c.age, 10);

        c.apply(Event::Died);
        assert_eq!((c.phase, c.progress), (Phase::Dying, 0.0));
        let mut frames = 0;
        while c.phase == Phase::Dying {
            c.apply(frame());
            frames += 1;
        }
        assert_eq!(c.phase, Phase::Empty);
        assert!((66..=68).contains(&frames), "dying took {frames} frames");
    }

    #[test]
    fn ignored_events() {
        let mut c = CellAnim::default();
        c.apply(Event::Died);
        c.apply(frame());
        assert_eq!(c, CellAnim::default());

        c.apply(Event::Born { color: 1, bob_phase: 0.5 });
        c.apply(frame());
        let snapshot = c;
        c.apply(Event::Born { color: 9, bob_phase: 2.0 });
        assert_eq!(c, snapshot, "birth on a live cell is ignored");
    }

    #[test]
    fn interrupted_transitions() {
        let mut c = CellAnim::default();
        c.apply(Event::Born { color: 2, bob_phase: 0.0 });
        c.apply(frame());
        c.apply(Event::Died);
        assert_eq!((c.phase, c.progress), (Phase::Dying, 0.0));
        c.apply(frame());
        c.apply(Event::Born { color: 3, bob_phase: 0.0 });
        assert_eq!((c.phase, c.progress, c.color), (Phase::Spawning, 0.0, 3));
    }

    #[test]
    fn audio_mode_animates_faster() {
        let mut slow = AnimGrid::new(20, 0, AnimTuning::default());
        let mut fast = AnimGrid::new(20, 0, AnimTuning::default());
        let d = Diff { births: vec![(3, 3, 0)], deaths: vec![] };
        slow.apply_diff(&d);
        fast.apply_diff(&d);
        slow.advance(false);
        fast.advance(true);
        assert!(fast.get(3, 3).progress > slow.get(3, 3).progress);
    }

    #[test]
    fn replayed_diffs_match_engine_state() {
        let mut engine = Engine::with_seed(30, 8);
        let mut anim = AnimGrid::new(30, 8, AnimTuning::default());
        anim.apply_diff(&Diff::initial(&engine));

        let diffs = precompute(&mut engine, 60);
        for (k, d) in diffs.iter().enumerate() {
            anim.apply_diff(d);
            // Any number of rendered frames between ticks.
            for _ in 0..(k % 7) * 11 {
                anim.advance(k % 2 == 0);
            }
        }

        for y in 0..30 {
            for x in 0..30 {
                assert_eq!(
                    anim.get(x, y).is_live(),
                    engine.cell(x, y).alive,
                    "cell ({x}, {y})"
                );
            }
        }
        assert_eq!(anim.live_count(), engine.alive_count());
    }

    #[test]
    fn out_of_range_diff_entries_are_ignored() {
        let mut anim = AnimGrid::new(20, 0, AnimTuning::default());
        anim.apply_diff(&Diff { births: vec![(25, 1, 0)], deaths: vec![(1, 40)] });
        assert_eq!(anim.count(Phase::Empty), 400);
    }
}
