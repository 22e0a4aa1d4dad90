//! Session telemetry derived from the simulation, for status displays.

use serde::{Deserialize, Serialize};

use crate::{
    bodies::BodyRegistry,
    math::{as_whole, lcm},
    time::SimTime,
};

/// Read-only session counters. Refreshed once per frame, after integration
/// and conjunction detection.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub elapsed: SimTime,
    pub conjunction_count: u64,
    pub time_scale: f64,
}

impl Telemetry {
    /// Alignments since the display epoch: everything before this session
    /// plus what this session has seen.
    pub fn epoch_alignments(&self, epoch_base: u64) -> u64 {
        epoch_base.saturating_add(self.conjunction_count)
    }

    /// Where the current system cycle stands, if the system has one.
    pub fn forecast(&self, cycle: Option<f64>) -> Option<CycleForecast> {
        cycle.map(|cycle| CycleForecast::new(cycle, self.elapsed, self.time_scale))
    }
}

/// Length of one full system cycle in simulated seconds: the least common
/// multiple of all orbit periods. After a full cycle every body is back at its
/// starting angle.
///
/// Only defined when every period is a whole number of seconds.
pub fn system_cycle(registry: &BodyRegistry) -> Option<f64> {
    let periods = registry
        .iter()
        .map(|b| as_whole(b.orbit_period, 1e-9))
        .collect::<Option<Vec<_>>>()?;
    lcm(periods).map(|c| c as f64)
}

/// Progress through the current system cycle.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleForecast {
    pub cycle: f64,
    /// Completed cycles so far
    pub completed: u64,
    /// Simulated seconds until the current cycle completes
    pub remaining: f64,
    /// Wall seconds until the current cycle completes at the current scale;
    /// `None` while paused
    pub wall_remaining: Option<f64>,
}

impl CycleForecast {
    pub fn new(cycle: f64, elapsed: SimTime, time_scale: f64) -> Self {
        let elapsed = elapsed.as_seconds();
        let into = elapsed.rem_euclid(cycle);
        let remaining = cycle - into;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let completed = (elapsed / cycle).floor() as u64;
        Self {
            cycle,
            completed,
            remaining,
            wall_remaining: (time_scale > 0.0).then(|| remaining / time_scale),
        }
    }

    /// Wall time until the current cycle completes, if the simulation is
    /// running and the wait is representable as a duration.
    pub fn wall_eta(&self) -> Option<std::time::Duration> {
        std::time::Duration::try_from_secs_f64(self.wall_remaining?).ok()
    }
}

#[cfg(test)]
use crate::bodies::Body;

#[test]
fn portfolio_cycle() {
    let reg = BodyRegistry::new(
        [30.0, 45.0, 60.0, 75.0, 90.0, 105.0, 120.0, 135.0]
            .iter()
            .enumerate()
            .map(|(i, p)| Body::new(&format!("p{i}"), 1.0, *p, 1.0))
            .collect(),
    )
    .unwrap();
    assert_eq!(system_cycle(&reg), Some(37800.0));
}

#[test]
fn fractional_periods_have_no_cycle() {
    let reg = BodyRegistry::new(vec![
        Body::new("a", 1.0, 30.0, 1.0),
        Body::new("b", 1.0, 12.5, 1.0),
    ])
    .unwrap();
    assert_eq!(system_cycle(&reg), None);
}

#[test]
fn forecast_scales_with_speed() {
    let t = Telemetry {
        elapsed: SimTime::new_seconds(37800.0 + 800.0),
        conjunction_count: 3,
        time_scale: 2.0,
    };
    let f = t.forecast(Some(37800.0)).unwrap();
    assert_eq!(f.completed, 1);
    assert_eq!(f.remaining, 37000.0);
    assert_eq!(f.wall_remaining, Some(18500.0));
    assert_eq!(t.epoch_alignments(8492), 8495);
    assert!(t.forecast(None).is_none());
}

#[test]
fn crawling_forecast_has_no_eta() {
    let t = Telemetry {
        elapsed: SimTime::new_seconds(0.0),
        conjunction_count: 0,
        time_scale: 1e-15,
    };
    let f = t.forecast(Some(37800.0)).unwrap();
    assert!(f.wall_remaining.unwrap() > 1e19);
    assert_eq!(f.wall_eta(), None);

    let t = Telemetry { time_scale: 2.0, ..t };
    assert_eq!(
        t.forecast(Some(37800.0)).unwrap().wall_eta(),
        Some(std::time::Duration::from_secs(18900))
    );
}

#[test]
fn paused_forecast_has_no_eta() {
    let t = Telemetry {
        elapsed: SimTime::new_seconds(10.0),
        conjunction_count: 0,
        time_scale: 0.0,
    };
    let f = t.forecast(Some(30.0)).unwrap();
    assert_eq!(f.remaining, 20.0);
    assert_eq!(f.wall_remaining, None);
    assert_eq!(f.wall_eta(), None);
}
