//! Angular integrator.
//!
//! Orbit and rotation angles are never accumulated frame over frame. Each
//! frame only adds to the simulated clock, and every angle is evaluated
//! directly from that clock and the body's period, so pausing, resuming, and
//! changing speed cannot introduce drift.

use crate::{
    bodies::BodyRegistry,
    math::{swept_deg, wrap_deg, wrap_signed_deg},
    time::SimTime,
};

/// Per-body angular state in registry order.
#[derive(Clone, Debug, PartialEq)]
pub struct AngleState {
    pub elapsed: SimTime,
    /// Fixed at creation (`deg`)
    pub offsets: Vec<f64>,
    /// `[0, 360)` (`deg`)
    pub orbit: Vec<f64>,
    /// `(-360, 360)`, negative for retrograde bodies (`deg`)
    pub rotation: Vec<f64>,
}

impl AngleState {
    pub fn new(registry: &BodyRegistry) -> Self {
        let offsets: Vec<f64> = (0..registry.len())
            .map(|i| registry.initial_offset_deg(i))
            .collect();
        Self {
            elapsed: SimTime::ZERO,
            orbit: offsets.clone(),
            rotation: vec![0.0; registry.len()],
            offsets,
        }
    }
}

pub fn orbit_angle(offset_deg: f64, elapsed: SimTime, orbit_period: f64) -> f64 {
    wrap_deg(offset_deg + swept_deg(elapsed.as_seconds(), orbit_period))
}

pub fn rotation_angle(elapsed: SimTime, rotation_period: f64) -> f64 {
    wrap_signed_deg(
        swept_deg(elapsed.as_seconds(), rotation_period.abs()),
        rotation_period,
    )
}

/// Advance the simulated clock by `wall_delta * time_scale` and re-evaluate
/// every angle. Returns the simulated delta that was applied.
///
/// `wall_delta` must already be sanitized (finite, non-negative). A zero
/// simulated delta leaves the state untouched.
pub fn integrate(
    state: &mut AngleState,
    registry: &BodyRegistry,
    wall_delta: f64,
    time_scale: f64,
) -> f64 {
    let sim_delta = wall_delta * time_scale;
    if sim_delta <= 0.0 {
        return 0.0;
    }
    state.elapsed += sim_delta;
    for (i, body) in registry.iter().enumerate() {
        state.orbit[i] = orbit_angle(state.offsets[i], state.elapsed, body.orbit_period);
        state.rotation[i] = rotation_angle(state.elapsed, body.rotation_period);
    }
    sim_delta
}

#[cfg(test)]
use crate::bodies::Body;

#[cfg(test)]
fn registry() -> BodyRegistry {
    BodyRegistry::new(vec![
        Body::new("a", 3.2, 30.0, 10.0),
        Body::new("b", 4.6, 45.0, -15.0),
    ])
    .unwrap()
}

#[test]
fn starts_at_offsets() {
    let state = AngleState::new(&registry());
    assert_eq!(state.orbit, [0.0, 180.0]);
    assert_eq!(state.rotation, [0.0, 0.0]);
    assert_eq!(state.elapsed, SimTime::ZERO);
}

#[test]
fn quarter_period() {
    let reg = registry();
    let mut state = AngleState::new(&reg);
    let applied = integrate(&mut state, &reg, 7.5, 1.0);
    assert_eq!(applied, 7.5);
    assert!((state.orbit[0] - 90.0).abs() < 1e-9);
    assert!((state.rotation[0] - 270.0).abs() < 1e-9);
    assert!((state.rotation[1] + 180.0).abs() < 1e-9);
}

#[test]
fn scale_multiplies_wall_time() {
    let reg = registry();
    let mut state = AngleState::new(&reg);
    integrate(&mut state, &reg, 0.5, 4.0);
    assert_eq!(state.elapsed.as_seconds(), 2.0);
}

#[test]
fn zero_scale_freezes_everything() {
    let reg = registry();
    let mut state = AngleState::new(&reg);
    integrate(&mut state, &reg, 3.3, 1.0);
    let before = state.clone();
    for _ in 0..1000 {
        assert_eq!(integrate(&mut state, &reg, 0.016, 0.0), 0.0);
    }
    assert_eq!(state, before);
}
