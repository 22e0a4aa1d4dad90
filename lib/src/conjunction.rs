//! Conjunction detection.

use std::{collections::HashSet, sync::Arc};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{bodies::BodyRegistry, math::separation_deg, time::SimTime};

/// An unordered pair of registry indices. `PairKey::new(a, b)` and
/// `PairKey::new(b, a)` are the same key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey(usize, usize);

impl PairKey {
    pub fn new(a: usize, b: usize) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn lo(self) -> usize {
        self.0
    }

    pub fn hi(self) -> usize {
        self.1
    }
}

/// Two bodies just came into alignment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConjunctionEvent {
    pub a: Arc<str>,
    pub b: Arc<str>,
    pub separation_deg: f64,
    pub elapsed: SimTime,
    /// Session total including this event
    pub count: u64,
}

/// Tracks which pairs of bodies are currently aligned and counts each new
/// alignment once.
///
/// Every frame checks all `n * (n - 1) / 2` pairs. That is fine for the
/// handful of bodies a portfolio system has; it is not meant for hundreds.
#[derive(Clone, Debug)]
pub struct ConjunctionDetector {
    threshold_deg: f64,
    active: HashSet<PairKey>,
    count: u64,
}

impl ConjunctionDetector {
    pub fn new(threshold_deg: f64) -> Self {
        Self {
            threshold_deg,
            active: HashSet::new(),
            count: 0,
        }
    }

    pub fn threshold_deg(&self) -> f64 {
        self.threshold_deg
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_active(&self, a: usize, b: usize) -> bool {
        self.active.contains(&PairKey::new(a, b))
    }

    pub fn active(&self) -> impl Iterator<Item = PairKey> + '_ {
        self.active.iter().copied()
    }

    /// Whether two angles are close enough to count as aligned. The boundary
    /// itself is not aligned.
    pub fn aligned(&self, a_deg: f64, b_deg: f64) -> bool {
        separation_deg(a_deg, b_deg) < self.threshold_deg
    }

    /// Sweep all pairs of freshly integrated orbit angles. Returns one event
    /// per pair that entered alignment this frame; pairs that drifted apart
    /// are re-armed.
    pub fn sweep(
        &mut self,
        registry: &BodyRegistry,
        orbit_deg: &[f64],
        elapsed: SimTime,
    ) -> Vec<ConjunctionEvent> {
        let mut events = Vec::new();
        // angles without a registered body are never paired
        let n = orbit_deg.len().min(registry.len());
        for (i, j) in (0..n).tuple_combinations() {
            let (Some(a), Some(b)) = (registry.get(i), registry.get(j)) else {
                continue;
            };
            let key = PairKey::new(i, j);
            let sep = separation_deg(orbit_deg[i], orbit_deg[j]);
            if sep < self.threshold_deg {
                if self.active.insert(key) {
                    self.count += 1;
                    debug!(a = %a.id, b = %b.id, sep, count = self.count, "conjunction");
                    events.push(ConjunctionEvent {
                        a: a.id.clone(),
                        b: b.id.clone(),
                        separation_deg: sep,
                        elapsed,
                        count: self.count,
                    });
                }
            } else {
                self.active.remove(&key);
            }
        }
        events
    }
}

#[cfg(test)]
use crate::bodies::Body;

#[cfg(test)]
fn registry(n: usize) -> BodyRegistry {
    BodyRegistry::new(
        (0..n)
            .map(|i| Body::new(&format!("p{i}"), 1.0 + i as f64, 30.0, 1.0))
            .collect(),
    )
    .unwrap()
}

#[test]
fn boundary_is_not_a_conjunction() {
    let reg = registry(2);
    let mut det = ConjunctionDetector::new(1.5);
    assert!(det.sweep(&reg, &[10.0, 11.5], SimTime::ZERO).is_empty());
    assert_eq!(det.count(), 0);
    let events = det.sweep(&reg, &[10.0, 11.4], SimTime::ZERO);
    assert_eq!(events.len(), 1);
    assert_eq!(&*events[0].a, "p0");
    assert_eq!(&*events[0].b, "p1");
}

#[test]
fn wraps_across_zero() {
    let reg = registry(2);
    let mut det = ConjunctionDetector::new(1.5);
    let events = det.sweep(&reg, &[359.5, 0.3], SimTime::ZERO);
    assert_eq!(events.len(), 1);
    assert!((events[0].separation_deg - 0.8).abs() < 1e-9);
}

#[test]
fn counts_once_while_aligned_and_rearms() {
    let reg = registry(2);
    let mut det = ConjunctionDetector::new(1.5);
    assert_eq!(det.sweep(&reg, &[0.0, 1.0], SimTime::ZERO).len(), 1);
    assert_eq!(det.sweep(&reg, &[0.0, 0.5], SimTime::ZERO).len(), 0);
    assert_eq!(det.sweep(&reg, &[0.0, 0.0], SimTime::ZERO).len(), 0);
    assert_eq!(det.count(), 1);
    assert!(det.is_active(1, 0));

    assert!(det.sweep(&reg, &[0.0, 90.0], SimTime::ZERO).is_empty());
    assert!(!det.is_active(0, 1));

    assert_eq!(det.sweep(&reg, &[0.0, 359.0], SimTime::ZERO).len(), 1);
    assert_eq!(det.count(), 2);
}

#[test]
fn simultaneous_pairs_count_separately() {
    let reg = registry(3);
    let mut det = ConjunctionDetector::new(1.5);
    let events = det.sweep(&reg, &[5.0, 5.5, 6.0], SimTime::ZERO);
    assert_eq!(events.len(), 3);
    assert_eq!(det.count(), 3);
    assert_eq!(events.last().unwrap().count, 3);
}

#[test]
fn pair_order_does_not_matter() {
    assert_eq!(PairKey::new(3, 1), PairKey::new(1, 3));
    let det = ConjunctionDetector::new(1.5);
    for (a, b) in [(0.0, 1.0), (359.9, 0.2), (10.0, 11.5), (0.0, 180.0)] {
        assert_eq!(det.aligned(a, b), det.aligned(b, a));
    }
}

#[test]
fn unregistered_angles_are_ignored() {
    let mut det = ConjunctionDetector::new(1.5);
    let events = det.sweep(&registry(2), &[5.0, 5.5, 6.0], SimTime::ZERO);
    assert_eq!(events.len(), 1);
    assert_eq!(det.count(), 1);
    assert!(!det.is_active(0, 2));
}

#[test]
fn nothing_to_compare() {
    let mut det = ConjunctionDetector::new(1.5);
    assert!(det.sweep(&registry(0), &[], SimTime::ZERO).is_empty());
    assert!(det.sweep(&registry(1), &[42.0], SimTime::ZERO).is_empty());
    assert_eq!(det.count(), 0);
}
