use orrery::{
    bodies::{Body, BodyRegistry},
    config::{SimulationConfig, SystemConfiguration},
    conjunction::ConjunctionDetector,
    simulation::Simulation,
    time::SimTime,
};

const FRAME: f64 = 1.0 / 60.0;

fn sim(bodies: Vec<Body>) -> Simulation {
    Simulation::new(
        SimulationConfig::default(),
        BodyRegistry::new(bodies).unwrap(),
    )
}

fn portfolio() -> Simulation {
    let system =
        SystemConfiguration::from_toml(include_str!("../../systems/portfolio.toml")).unwrap();
    Simulation::from_system(system)
}

#[test]
fn portfolio_loads() {
    let sim = portfolio();
    assert_eq!(sim.registry().len(), 8);
    assert_eq!(sim.system_cycle(), Some(37800.0));
    assert_eq!(sim.orbit_deg("cliffcoffin"), Some(0.0));
    assert_eq!(sim.orbit_deg("matselamat"), Some(45.0));
    assert!(sim.registry().by_id("whitechick").unwrap().is_retrograde());
}

#[test]
fn pause_is_idempotent() {
    let mut sim = portfolio();
    for _ in 0..120 {
        sim.step(FRAME);
    }
    sim.control_mut().set_time_scale(0.0);
    let before = sim.snapshot();
    for _ in 0..500 {
        sim.step(FRAME);
    }
    let after = sim.snapshot();
    assert_eq!(after.bodies, before.bodies);
    assert_eq!(after.elapsed(), before.elapsed());
    assert_eq!(after.conjunction_count(), before.conjunction_count());
}

#[test]
fn orbit_angles_stay_in_range() {
    let mut sim = portfolio();
    sim.control_mut().unlock();
    sim.control_mut().set_time_scale(10.0);
    for _ in 0..20_000 {
        sim.step(0.25);
        for body in &sim.snapshot().bodies {
            assert!((0.0..360.0).contains(&body.orbit_deg), "{body:?}");
            assert!(body.rotation_deg > -360.0 && body.rotation_deg < 360.0, "{body:?}");
        }
    }
}

#[test]
fn elapsed_and_count_never_decrease() {
    let mut sim = portfolio();
    sim.control_mut().set_time_scale(5.0);
    let deltas = [FRAME, 0.0, -1.0, f64::NAN, 0.25, 90.0, FRAME * 3.0];
    let mut prev = sim.telemetry();
    for i in 0..10_000 {
        if i % 1000 == 500 {
            sim.control_mut().toggle_pause();
        }
        sim.step(deltas[i % deltas.len()]);
        let now = sim.telemetry();
        assert!(now.elapsed >= prev.elapsed);
        assert!(now.conjunction_count >= prev.conjunction_count);
        prev = now;
    }
    assert!(prev.conjunction_count > 0);
}

#[test]
fn detection_is_symmetric() {
    let reg = BodyRegistry::new(vec![
        Body::new("a", 1.0, 30.0, 1.0),
        Body::new("b", 2.0, 30.0, 1.0),
    ])
    .unwrap();
    for (x, y) in [(0.0, 1.0), (359.6, 0.4), (10.0, 11.5), (100.0, 300.0)] {
        let mut ab = ConjunctionDetector::new(1.5);
        let mut ba = ConjunctionDetector::new(1.5);
        let e1 = ab.sweep(&reg, &[x, y], SimTime::ZERO);
        let e2 = ba.sweep(&reg, &[y, x], SimTime::ZERO);
        assert_eq!(e1.len(), e2.len());
        assert_eq!(ab.is_active(0, 1), ba.is_active(1, 0));
    }
}

#[test]
fn conjunctions_rearm_after_separating() {
    // offsets 0 and 180; relative motion is 360/30 - 360/60 = 6 deg/s, so the
    // pair meets every 60 s starting at t = 30
    let mut sim = sim(vec![
        Body::new("fast", 1.0, 30.0, 1.0),
        Body::new("slow", 2.0, 60.0, 1.0),
    ]);
    let mut events = 0;
    let mut t = 0.0;
    while t < 200.0 {
        events += sim.step(0.05).len();
        t += 0.05;
    }
    assert_eq!(events, 3);
    assert_eq!(sim.detector().count(), 3);
}

#[test]
fn opposed_bodies_never_meet() {
    let mut sim = sim(vec![
        Body::new("a", 1.0, 40.0, 1.0),
        Body::new("b", 2.0, 40.0, 1.0),
    ]);
    assert_eq!(sim.orbit_deg("b"), Some(180.0));
    for _ in 0..10_000 {
        sim.step(0.1);
        let a = sim.orbit_deg("a").unwrap();
        let b = sim.orbit_deg("b").unwrap();
        let sep = orrery::math::separation_deg(a, b);
        assert!((sep - 180.0).abs() < 1e-6);
    }
    assert_eq!(sim.detector().count(), 0);
}

#[test]
fn near_but_outside_threshold_never_counts() {
    let reg = BodyRegistry::new(vec![
        Body::new("a", 1.0, 40.0, 1.0),
        Body::new("b", 2.0, 40.0, 1.0),
    ])
    .unwrap();
    let mut det = ConjunctionDetector::new(1.5);
    for k in 0..1000 {
        let a = (k as f64 * 0.37) % 360.0;
        let b = (a + 2.0) % 360.0;
        assert!(det.sweep(&reg, &[a, b], SimTime::new_seconds(k as f64)).is_empty());
    }
    assert_eq!(det.count(), 0);
}

#[test]
fn full_period_returns_to_offset() {
    let mut sim = portfolio();
    let start = sim.orbit_deg("cliffcoffin").unwrap();
    for _ in 0..120 {
        sim.step(0.25);
    }
    assert!((sim.elapsed().as_seconds() - 30.0).abs() < 1e-9);
    let end = sim.orbit_deg("cliffcoffin").unwrap();
    assert!(orrery::math::separation_deg(start, end) < 1e-6);
}

#[test]
fn resume_continues_from_pause() {
    let mut sim = portfolio();
    for _ in 0..30 {
        sim.step(0.1);
    }
    sim.control_mut().set_time_scale(0.0);
    let paused_at = sim.elapsed();
    let angle = sim.orbit_deg("alim").unwrap();
    for _ in 0..30 {
        sim.step(0.1);
    }
    assert_eq!(sim.elapsed(), paused_at);

    sim.control_mut().set_time_scale(1.0);
    sim.step(0.1);
    assert!((sim.elapsed() - paused_at - 0.1).abs() < 1e-12);
    let moved = sim.orbit_deg("alim").unwrap() - angle;
    assert!((moved - 0.1 * 360.0 / 105.0).abs() < 1e-9);
}

#[test]
fn retrograde_spins_the_other_way() {
    let mut sim = sim(vec![
        Body::new("pro", 1.0, 30.0, 10.0),
        Body::new("retro", 2.0, 30.0, -10.0),
    ]);
    let mut last = (0.0, 0.0);
    for _ in 0..20 {
        sim.step(0.1);
        let pro = sim.rotation_deg("pro").unwrap();
        let retro = sim.rotation_deg("retro").unwrap();
        assert!(pro > last.0);
        assert!(retro < last.1);
        assert!((pro + retro).abs() < 1e-9);
        last = (pro, retro);
    }
}

#[test]
fn empty_system_runs() {
    let mut sim = sim(vec![]);
    for _ in 0..10 {
        assert!(sim.step(FRAME).is_empty());
    }
    assert_eq!(sim.snapshot().bodies.len(), 0);
    assert_eq!(sim.system_cycle(), None);
}
