// src/diff.rs
//
// Precomputed per-step births/deaths.
//
// The engine runs ahead in bursts on the rayon pool; the render thread only ever
// pops ready-made diffs. Ownership of the `Engine` moves into the worker and comes
// back with the batch, so "engine is None" is the single-flight guard.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::sim::Engine;
use crate::tuning::QueueTuning;

/// Births and deaths between two consecutive generations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diff {
    /// (x, y, color)
    pub births: Vec<(u16, u16, u8)>,
    /// (x, y)
    pub deaths: Vec<(u16, u16)>,
}

impl Diff {
    /// Every live cell as a birth. Seeds an empty animation grid.
    pub fn initial(engine: &Engine) -> Self {
        let n = engine.side();
        let births = engine
            .cells()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.alive)
            .map(|(i, c)| ((i % n) as u16, (i / n) as u16, c.color))
            .collect();
        Self { births, deaths: Vec::new() }
    }
}

/// Step `engine` `steps` times, recording one diff per step.
pub fn precompute(engine: &mut Engine, steps: usize) -> Vec<Diff> {
    let n = engine.side();
    let mut before: Vec<bool> = engine.cells().iter().map(|c| c.alive).collect();
    let mut out = Vec::with_capacity(steps);

    for _ in 0..steps {
        engine.step();
        let mut diff = Diff::default();
        for (i, (cell, was)) in engine.cells().iter().zip(before.iter_mut()).enumerate() {
            if cell.alive != *was {
                let (x, y) = ((i % n) as u16, (i / n) as u16);
                if cell.alive {
                    diff.births.push((x, y, cell.color));
                } else {
                    diff.deaths.push((x, y));
                }
                *was = cell.alive;
            }
        }
        out.push(diff);
    }
    out
}

struct Refill {
    generation: u64,
    engine: Engine,
    diffs: Vec<Diff>,
}

/// FIFO of precomputed diffs with asynchronous, single-flight refills.
pub struct DiffQueue {
    queue: VecDeque<Diff>,
    /// `None` while a refill owns the engine.
    engine: Option<Engine>,
    generation: u64,
    tuning: QueueTuning,
    stopped: Arc<AtomicBool>,
    tx: Sender<Refill>,
    rx: Receiver<Refill>,
}

impl DiffQueue {
    pub fn new(engine: Engine, tuning: QueueTuning, stopped: Arc<AtomicBool>) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(4);
        Self {
            queue: VecDeque::with_capacity(tuning.batch + tuning.low_water),
            engine: Some(engine),
            generation: 0,
            tuning,
            stopped,
            tx,
            rx,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// A background refill currently owns the engine.
    pub fn in_flight(&self) -> bool {
        self.engine.is_none()
    }

    /// The engine, unless a refill has it.
    pub fn engine(&self) -> Option<&Engine> {
        self.engine.as_ref()
    }

    pub fn pop(&mut self) -> Option<Diff> {
        self.queue.pop_front()
    }

    /// Merge any finished refills. Returns how many diffs were appended.
    pub fn poll(&mut self) -> usize {
        let mut merged = 0;
        while let Ok(refill) = self.rx.try_recv() {
            merged += self.merge(refill);
        }
        merged
    }

    /// Block until no refill is in flight or `timeout` passes. Returns diffs appended.
    pub fn wait_for_refill(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut merged = self.poll();
        while self.in_flight() {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(left) {
                Ok(refill) => merged += self.merge(refill),
                Err(_) => break,
            }
        }
        merged
    }

    fn merge(&mut self, refill: Refill) -> usize {
        if refill.generation != self.generation {
            log::debug!(
                "dropping stale refill (generation {} != {})",
                refill.generation,
                self.generation
            );
            return 0;
        }
        self.engine = Some(refill.engine);
        if self.stopped.load(Ordering::Acquire) {
            log::debug!("stopped: discarding {} precomputed diffs", refill.diffs.len());
            return 0;
        }
        let count = refill.diffs.len();
        self.queue.extend(refill.diffs);
        log::debug!("merged {count} diffs, queue depth {}", self.queue.len());
        count
    }

    /// Dispatch a background refill if the queue is below the low-water mark.
    /// Returns whether a refill was dispatched.
    pub fn request_refill(&mut self) -> bool {
        if self.queue.len() >= self.tuning.low_water || self.stopped.load(Ordering::Acquire) {
            return false;
        }
        let Some(mut engine) = self.engine.take() else {
            return false;
        };

        let steps = self.tuning.batch;
        let generation = self.generation;
        let stopped = Arc::clone(&self.stopped);
        let tx = self.tx.clone();
        log::debug!("dispatching refill of {steps} steps (generation {generation})");

        rayon::spawn(move || {
            let diffs = if stopped.load(Ordering::Acquire) {
                Vec::new()
            } else {
                let mut diffs = precompute(&mut engine, steps);
                if stopped.load(Ordering::Acquire) {
                    diffs.clear();
                }
                diffs
            };
            // The receiver only disappears with the queue itself.
            let _ = tx.send(Refill { generation, engine, diffs });
        });
        true
    }

    /// Swap in a fresh engine. Pending diffs and any in-flight refill are discarded.
    pub fn reset(&mut self, engine: Engine) {
        self.generation += 1;
        self.queue.clear();
        self.engine = Some(engine);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Cell, Rules};

    const WAIT: Duration = Duration::from_secs(10);

    fn small_tuning() -> QueueTuning {
        QueueTuning { batch: 40, low_water: 10 }
    }

    #[test]
    fn blinker_diff() {
        let mut e = Engine::empty(20, 0);
        e.set_rules(Rules { mutation_chance: 0.0, injection: false });
        for x in 4..7 {
            e.set_cell(x, 5, Cell::born(9));
        }
        let diffs = precompute(&mut e, 2);
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].births, vec![(5, 4, 9), (5, 6, 9)]);
        assert_eq!(diffs[0].deaths, vec![(4, 5), (6, 5)]);
        assert_eq!(diffs[1].births, vec![(4, 5, 9), (6, 5, 9)]);
        assert_eq!(e.generation(), 2);
    }

    #[test]
    fn initial_diff_lists_the_population() {
        let e = Engine::with_seed(20, 3);
        let d = Diff::initial(&e);
        assert_eq!(d.births.len(), e.alive_count());
        assert!(d.deaths.is_empty());
        for &(x, y, color) in &d.births {
            let c = e.cell(x as usize, y as usize);
            assert!(c.alive);
            assert_eq!(c.color, color);
        }
    }

    #[test]
    fn refill_is_single_flight_and_fifo() {
        let engine = Engine::with_seed(24, 77);
        let mut reference = engine.clone();
        let expected = precompute(&mut reference, 80);

        let stopped = Arc::new(AtomicBool::new(false));
        let mut q = DiffQueue::new(engine, small_tuning(), stopped);

        assert!(q.request_refill());
        assert!(q.in_flight());
        assert!(!q.request_refill(), "second request while in flight");
        assert_eq!(q.wait_for_refill(WAIT), 40);
        assert!(!q.in_flight());

        // Above the low-water mark nothing is requested.
        assert!(!q.request_refill());
        let mut got = Vec::new();
        while q.len() >= 10 {
            got.extend(q.pop());
        }
        assert!(q.request_refill());
        assert_eq!(q.wait_for_refill(WAIT), 40);
        while let Some(d) = q.pop() {
            got.push(d);
        }
        assert_eq!(got, expected);
        assert_eq!(q.engine().map(|e| e.generation()), Some(80));
    }

    #[test]
    fn stopped_queue_never_dispatches() {
        let stopped = Arc::new(AtomicBool::new(true));
        let mut q = DiffQueue::new(Engine::with_seed(20, 1), small_tuning(), stopped);
        assert!(!q.request_refill());
        assert!(!q.in_flight());
    }

    #[test]
    fn results_arriving_after_stop_are_dropped() {
        let stopped = Arc::new(AtomicBool::new(false));
        let mut q = DiffQueue::new(Engine::with_seed(20, 1), small_tuning(), Arc::clone(&stopped));
        assert!(q.request_refill());
        stopped.store(true, Ordering::Release);
        assert_eq!(q.wait_for_refill(WAIT), 0);
        assert!(q.is_empty());
        assert!(!q.request_refill());
    }

    #[test]
    fn reset_discards_in_flight_batch() {
        let stopped = Arc::new(AtomicBool::new(false));
        let mut q = DiffQueue::new(Engine::with_seed(20, 1), small_tuning(), stopped);
        assert!(q.request_refill());
        q.reset(Engine::with_seed(20, 2));
        assert!(!q.in_flight());
        assert_eq!(q.wait_for_refill(WAIT), 0, "stale generation");
        assert!(q.is_empty());
        assert_eq!(q.engine().map(|e| e.generation()), Some(0));

        assert!(q.request_refill());
        assert_eq!(q.wait_for_refill(WAIT), 40);
    }
}
