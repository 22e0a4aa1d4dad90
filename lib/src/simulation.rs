//! The simulation proper: one owned state, advanced by a single composed step.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::{
    bodies::BodyRegistry,
    config::{SimulationConfig, SystemConfiguration},
    conjunction::{ConjunctionDetector, ConjunctionEvent},
    control::TimeControl,
    integrator::{self, AngleState},
    layout::{depth_layer, orbit_position, DepthLayer, NPoint2},
    telemetry::{self, Telemetry},
    time::SimTime,
};

/// Make a measured wall delta safe to integrate: NaN and negative deltas
/// become zero, oversized ones (a suspended tab, a sleeping laptop) are capped.
pub fn sanitize_wall_delta(delta: f64, max: f64) -> f64 {
    if delta.is_nan() || delta < 0.0 {
        warn!(delta, "discarding degenerate wall delta");
        0.0
    } else if delta > max {
        warn!(delta, max, "capping oversized wall delta");
        max
    } else {
        delta
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyAngles {
    pub id: Arc<str>,
    pub orbit_deg: f64,
    pub rotation_deg: f64,
}

/// Everything a consumer may read about one frame. Immutable once published.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub frame: u64,
    pub telemetry: Telemetry,
    pub ceiling: f64,
    pub unlocked: bool,
    pub bodies: Vec<BodyAngles>,
}

impl Snapshot {
    pub fn elapsed(&self) -> SimTime {
        self.telemetry.elapsed
    }

    pub fn conjunction_count(&self) -> u64 {
        self.telemetry.conjunction_count
    }

    pub fn time_scale(&self) -> f64 {
        self.telemetry.time_scale
    }

    pub fn body(&self, id: &str) -> Option<&BodyAngles> {
        self.bodies.iter().find(|b| &*b.id == id)
    }

    /// Orbit-plane position and depth layer of every body, in registry order.
    pub fn positions(
        &self,
        registry: &BodyRegistry,
        base_radius: f64,
    ) -> Vec<(Arc<str>, NPoint2, DepthLayer)> {
        self.bodies
            .iter()
            .zip(registry.iter())
            .map(|(angles, body)| {
                (
                    angles.id.clone(),
                    orbit_position(body.orbit, angles.orbit_deg, base_radius),
                    depth_layer(angles.orbit_deg),
                )
            })
            .collect()
    }
}

/// One simulation session.
#[derive(Clone, Debug)]
pub struct Simulation {
    config: SimulationConfig,
    registry: BodyRegistry,
    angles: AngleState,
    detector: ConjunctionDetector,
    control: TimeControl,
    frame: u64,
    cycle: Option<f64>,
}

impl Simulation {
    pub fn new(config: SimulationConfig, registry: BodyRegistry) -> Self {
        Self {
            angles: AngleState::new(&registry),
            detector: ConjunctionDetector::new(config.alignment_threshold_deg),
            control: TimeControl::from_config(&config),
            frame: 0,
            cycle: telemetry::system_cycle(&registry),
            config,
            registry,
        }
    }

    pub fn from_system(system: SystemConfiguration) -> Self {
        Self::new(system.simulation, system.registry)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn registry(&self) -> &BodyRegistry {
        &self.registry
    }

    pub fn control(&self) -> &TimeControl {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut TimeControl {
        &mut self.control
    }

    pub fn detector(&self) -> &ConjunctionDetector {
        &self.detector
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn elapsed(&self) -> SimTime {
        self.angles.elapsed
    }

    pub fn orbit_deg(&self, id: &str) -> Option<f64> {
        self.registry.position(id).map(|i| self.angles.orbit[i])
    }

    pub fn rotation_deg(&self, id: &str) -> Option<f64> {
        self.registry.position(id).map(|i| self.angles.rotation[i])
    }

    pub fn system_cycle(&self) -> Option<f64> {
        self.cycle
    }

    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            elapsed: self.angles.elapsed,
            conjunction_count: self.detector.count(),
            time_scale: self.control.time_scale(),
        }
    }

    /// Integrate one frame and then detect conjunctions on the new angles.
    ///
    /// `wall_delta` is sanitized here, so raw clock differences are fine.
    pub fn step(&mut self, wall_delta: f64) -> Vec<ConjunctionEvent> {
        let wall_delta = sanitize_wall_delta(wall_delta, self.config.max_wall_delta);
        let sim_delta = integrator::integrate(
            &mut self.angles,
            &self.registry,
            wall_delta,
            self.control.time_scale(),
        );
        let events = self
            .detector
            .sweep(&self.registry, &self.angles.orbit, self.angles.elapsed);
        self.frame += 1;
        trace!(
            frame = self.frame,
            wall_delta,
            sim_delta,
            elapsed = self.angles.elapsed.as_seconds(),
            "frame"
        );
        events
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            frame: self.frame,
            telemetry: self.telemetry(),
            ceiling: self.control.ceiling(),
            unlocked: self.control.is_unlocked(),
            bodies: self
                .registry
                .iter()
                .enumerate()
                .map(|(i, body)| BodyAngles {
                    id: body.id.clone(),
                    orbit_deg: self.angles.orbit[i],
                    rotation_deg: self.angles.rotation[i],
                })
                .collect(),
        }
    }
}

#[cfg(test)]
use crate::bodies::Body;

#[test]
fn delta_sanitizing() {
    assert_eq!(sanitize_wall_delta(0.016, 0.25), 0.016);
    assert_eq!(sanitize_wall_delta(-0.5, 0.25), 0.0);
    assert_eq!(sanitize_wall_delta(f64::NAN, 0.25), 0.0);
    assert_eq!(sanitize_wall_delta(3600.0, 0.25), 0.25);
    assert_eq!(sanitize_wall_delta(f64::INFINITY, 0.25), 0.25);
}

#[test]
fn huge_step_is_capped() {
    let reg = BodyRegistry::new(vec![Body::new("a", 1.0, 30.0, 10.0)]).unwrap();
    let mut sim = Simulation::new(SimulationConfig::default(), reg);
    sim.step(3600.0);
    assert_eq!(sim.elapsed().as_seconds(), 0.25);
}

#[test]
fn snapshot_follows_registry_order() {
    let reg = BodyRegistry::new(vec![
        Body::new("a", 1.0, 30.0, 10.0),
        Body::new("b", 2.0, 60.0, -10.0),
    ])
    .unwrap();
    let mut sim = Simulation::new(SimulationConfig::default(), reg);
    sim.step(0.1);
    let snap = sim.snapshot();
    assert_eq!(snap.frame, 1);
    assert_eq!(&*snap.bodies[0].id, "a");
    assert_eq!(snap.body("b").unwrap().orbit_deg, sim.orbit_deg("b").unwrap());
    assert!(snap.body("b").unwrap().rotation_deg < 0.0);

    let pos = snap.positions(sim.registry(), 10.0);
    assert_eq!(pos.len(), 2);
    assert!((pos[1].1.coords.norm() - 20.0).abs() < 1e-9);
}
