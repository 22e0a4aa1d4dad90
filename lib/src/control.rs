//! Time control: the speed the simulated clock runs at.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SimulationConfig;

/// Real-time playback.
pub const REAL_TIME: f64 = 1.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeControl {
    scale: f64,
    ceiling: f64,
    unlocked_ceiling: f64,
    unlocked: bool,
}

impl TimeControl {
    pub fn new(ceiling: f64, unlocked_ceiling: f64) -> Self {
        Self {
            scale: REAL_TIME.min(ceiling),
            ceiling,
            unlocked_ceiling: unlocked_ceiling.max(ceiling),
            unlocked: false,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.max_time_scale, config.unlocked_time_scale)
    }

    pub fn time_scale(&self) -> f64 {
        self.scale
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    pub fn is_paused(&self) -> bool {
        self.scale == 0.0
    }

    /// Whether `unlock` has run, even if it did not raise the ceiling.
    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    /// Set the scale, clamped to `[0, ceiling]`. Returns the value applied.
    /// NaN is ignored.
    pub fn set_time_scale(&mut self, value: f64) -> f64 {
        if value.is_nan() {
            warn!("ignoring NaN time scale");
            return self.scale;
        }
        let clamped = value.clamp(0.0, self.ceiling);
        if clamped != value {
            debug!(requested = value, applied = clamped, "time scale clamped");
        }
        self.scale = clamped;
        clamped
    }

    /// Pause, or resume at real time if already paused.
    pub fn toggle_pause(&mut self) -> f64 {
        if self.is_paused() {
            self.set_time_scale(REAL_TIME)
        } else {
            self.set_time_scale(0.0)
        }
    }

    /// Raise the ceiling to the unlocked value. The current scale is kept.
    pub fn unlock(&mut self) {
        if !self.unlocked {
            info!(ceiling = self.unlocked_ceiling, "time scale ceiling unlocked");
        }
        self.unlocked = true;
        self.ceiling = self.unlocked_ceiling;
    }

    /// Unlock and jump straight to the unlocked ceiling.
    pub fn engage_override(&mut self) -> f64 {
        self.unlock();
        self.set_time_scale(self.unlocked_ceiling)
    }
}

impl Default for TimeControl {
    fn default() -> Self {
        Self::from_config(&SimulationConfig::default())
    }
}

/// ↑ ↑ ↓ ↓ ← → ← → B A
pub const KONAMI: [&str; 10] = [
    "ArrowUp",
    "ArrowUp",
    "ArrowDown",
    "ArrowDown",
    "ArrowLeft",
    "ArrowRight",
    "ArrowLeft",
    "ArrowRight",
    "b",
    "a",
];

/// Watches a stream of key names for a fixed sequence.
#[derive(Clone, Debug)]
pub struct CheatSequence {
    code: &'static [&'static str],
    recent: VecDeque<String>,
}

impl CheatSequence {
    pub fn new(code: &'static [&'static str]) -> Self {
        Self {
            code,
            recent: VecDeque::with_capacity(code.len()),
        }
    }

    pub fn konami() -> Self {
        Self::new(&KONAMI)
    }

    /// Feed one key. Returns true when the last keys spell the code; the
    /// history is then cleared so the code has to be entered again in full.
    pub fn press(&mut self, key: &str) -> bool {
        if self.code.is_empty() {
            return false;
        }
        if self.recent.len() == self.code.len() {
            self.recent.pop_front();
        }
        self.recent.push_back(key.to_owned());
        if self.recent.iter().eq(self.code.iter().copied()) {
            self.recent.clear();
            true
        } else {
            false
        }
    }
}

impl Default for CheatSequence {
    fn default() -> Self {
        Self::konami()
    }
}

#[test]
fn clamps_to_ceiling() {
    let mut tc = TimeControl::new(5.0, 10.0);
    assert_eq!(tc.time_scale(), 1.0);
    assert_eq!(tc.set_time_scale(7.0), 5.0);
    assert_eq!(tc.set_time_scale(-2.0), 0.0);
    assert!(tc.is_paused());
    assert_eq!(tc.set_time_scale(2.5), 2.5);
    assert_eq!(tc.set_time_scale(f64::NAN), 2.5);
    assert_eq!(tc.set_time_scale(f64::INFINITY), 5.0);
}

#[test]
fn pause_toggles_to_real_time() {
    let mut tc = TimeControl::new(5.0, 10.0);
    tc.set_time_scale(3.0);
    assert_eq!(tc.toggle_pause(), 0.0);
    assert_eq!(tc.toggle_pause(), 1.0);
}

#[test]
fn unlock_raises_ceiling() {
    let mut tc = TimeControl::new(5.0, 10.0);
    assert!(!tc.is_unlocked());
    tc.unlock();
    assert!(tc.is_unlocked());
    assert_eq!(tc.time_scale(), 1.0);
    assert_eq!(tc.set_time_scale(9.0), 9.0);
    assert_eq!(tc.set_time_scale(12.0), 10.0);
}

#[test]
fn equal_ceilings_start_locked() {
    let mut tc = TimeControl::new(5.0, 5.0);
    assert!(!tc.is_unlocked());
    tc.unlock();
    assert!(tc.is_unlocked());
    assert_eq!(tc.ceiling(), 5.0);

    let mut tc = TimeControl::new(8.0, 3.0);
    assert!(!tc.is_unlocked());
    assert_eq!(tc.engage_override(), 8.0);
    assert!(tc.is_unlocked());
}

#[test]
fn override_jumps_to_unlocked_ceiling() {
    let mut tc = TimeControl::new(5.0, 10.0);
    assert_eq!(tc.engage_override(), 10.0);
    assert_eq!(tc.ceiling(), 10.0);
}

#[test]
fn konami_fires_on_full_sequence_only() {
    let mut cheat = CheatSequence::konami();
    for key in &KONAMI[..9] {
        assert!(!cheat.press(key));
    }
    assert!(cheat.press("a"));
    assert!(!cheat.press("a"));
}

#[test]
fn konami_tolerates_leading_noise() {
    let mut cheat = CheatSequence::konami();
    for key in ["x", "ArrowUp", "Enter"] {
        assert!(!cheat.press(key));
    }
    let fired = KONAMI.iter().map(|k| cheat.press(k)).collect::<Vec<_>>();
    assert_eq!(fired.iter().filter(|f| **f).count(), 1);
    assert!(fired[9]);
}
