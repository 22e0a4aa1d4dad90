//! Orbit-plane positions for renderers.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

pub type NPoint2 = Point2<f64>;

/// Which side of the sun a body is drawn on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepthLayer {
    Front,
    Back,
}

/// Position on the orbit plane, centred on the sun. `base_radius` is the
/// on-screen length of one orbit index unit.
pub fn orbit_position(orbit: f64, angle_deg: f64, base_radius: f64) -> NPoint2 {
    let r = base_radius * orbit;
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    NPoint2::new(r * cos, r * sin)
}

pub fn depth_layer(angle_deg: f64) -> DepthLayer {
    if angle_deg.to_radians().sin() > 0.0 {
        DepthLayer::Front
    } else {
        DepthLayer::Back
    }
}

#[test]
fn positions_on_axes() {
    let p = orbit_position(2.0, 0.0, 10.0);
    assert!((p.x - 20.0).abs() < 1e-12 && p.y.abs() < 1e-12);
    let p = orbit_position(2.0, 90.0, 10.0);
    assert!(p.x.abs() < 1e-12 && (p.y - 20.0).abs() < 1e-12);
    let p = orbit_position(1.0, 180.0, 5.0);
    assert!((p.x + 5.0).abs() < 1e-12);
}

#[test]
fn lower_half_is_in_front() {
    assert_eq!(depth_layer(90.0), DepthLayer::Front);
    assert_eq!(depth_layer(270.0), DepthLayer::Back);
    assert_eq!(depth_layer(0.0), DepthLayer::Back);
}
