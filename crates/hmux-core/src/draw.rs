//! Random source for first-time backend assignment.
//!
//! Every draw a mux makes goes through one [`DrawSource`], which is shared by
//! every context-bound copy of that mux. Tests swap in a seeded
//! [`RngDraw`] or a [`ScriptedDraw`] to make assignments predictable.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Picks a backend index.
pub trait DrawSource: Send + Sync + fmt::Debug {
    /// Return an index in `[0, upper)`. `upper` is never zero.
    fn draw(&self, upper: usize) -> usize;
}

/// Uniform draws from a [`StdRng`].
pub struct RngDraw {
    rng: Mutex<StdRng>,
}

impl RngDraw {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Restart the sequence from `seed`.
    pub fn reseed(&self, seed: u64) {
        *self.rng.lock().unwrap_or_else(PoisonError::into_inner) = StdRng::seed_from_u64(seed);
    }
}

impl Default for RngDraw {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl fmt::Debug for RngDraw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RngDraw").finish_non_exhaustive()
    }
}

impl DrawSource for RngDraw {
    fn draw(&self, upper: usize) -> usize {
        if upper <= 1 {
            return 0;
        }
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0..upper)
    }
}

/// Replays a fixed sequence of picks, cycling when exhausted.
///
/// Picks are reduced modulo `upper`.
#[derive(Debug)]
pub struct ScriptedDraw {
    state: Mutex<(Vec<usize>, usize)>,
}

impl ScriptedDraw {
    pub fn new(picks: impl IntoIterator<Item = usize>) -> Self {
        let picks: Vec<usize> = picks.into_iter().collect();
        Self {
            state: Mutex::new((picks, 0)),
        }
    }

    /// Replace the remaining sequence with `picks`.
    pub fn rescript(&self, picks: impl IntoIterator<Item = usize>) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = (picks.into_iter().collect(), 0);
    }
}

impl DrawSource for ScriptedDraw {
    fn draw(&self, upper: usize) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (picks, cursor) = &mut *state;
        if picks.is_empty() || upper == 0 {
            return 0;
        }
        let pick = picks[*cursor % picks.len()];
        *cursor += 1;
        pick % upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_draws_are_reproducible() {
        let a = RngDraw::seeded(25);
        let b = RngDraw::seeded(25);
        let xs: Vec<_> = (0..16).map(|_| a.draw(7)).collect();
        let ys: Vec<_> = (0..16).map(|_| b.draw(7)).collect();
        assert_eq!(xs, ys);
        assert!(xs.iter().all(|x| *x < 7));
    }

    #[test]
    fn reseed_restarts_sequence() {
        let draw = RngDraw::seeded(3);
        let first: Vec<_> = (0..8).map(|_| draw.draw(100)).collect();
        draw.reseed(3);
        let again: Vec<_> = (0..8).map(|_| draw.draw(100)).collect();
        assert_eq!(first, again);
    }

    #[test]
    fn single_backend_always_zero() {
        let draw = RngDraw::from_entropy();
        assert!((0..32).all(|_| draw.draw(1) == 0));
    }

    #[test]
    fn scripted_cycles_and_wraps() {
        let draw = ScriptedDraw::new([0, 1, 5]);
        assert_eq!(draw.draw(2), 0);
        assert_eq!(draw.draw(2), 1);
        assert_eq!(draw.draw(2), 1); // 5 % 2
        assert_eq!(draw.draw(2), 0);
        draw.rescript([1]);
        assert_eq!(draw.draw(3), 1);
        assert_eq!(draw.draw(3), 1);
    }

    #[test]
    fn empty_script_draws_zero() {
        assert_eq!(ScriptedDraw::new([]).draw(4), 0);
    }
}
