//! Definitions of orbiting bodies and the registry that holds them.

use std::{collections::HashMap, sync::Arc};

use color_eyre::eyre::{self, ensure};
use serde::{Deserialize, Serialize};

/// An orbiting body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Body {
    /// Stable identifier
    pub id: Arc<str>,
    /// Name as displayed, if different from the id
    #[serde(default)]
    pub name: Option<Arc<str>>,
    /// Relative orbital radius rank (unitless)
    pub orbit: f64,
    /// Simulated seconds per revolution
    pub orbit_period: f64,
    /// Simulated seconds per spin; negative for retrograde rotation
    pub rotation_period: f64,
}

impl Body {
    pub fn new(id: &str, orbit: f64, orbit_period: f64, rotation_period: f64) -> Self {
        Self {
            id: id.into(),
            name: None,
            orbit,
            orbit_period,
            rotation_period,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn is_retrograde(&self) -> bool {
        self.rotation_period < 0.0
    }

    fn validate(&self) -> eyre::Result<()> {
        ensure!(!self.id.trim().is_empty(), "body has an empty id");
        ensure!(
            self.orbit.is_finite() && self.orbit > 0.0,
            "body {:?}: orbit index must be positive, got {}",
            self.id,
            self.orbit
        );
        ensure!(
            self.orbit_period.is_finite() && self.orbit_period > 0.0,
            "body {:?}: orbit period must be positive, got {}",
            self.id,
            self.orbit_period
        );
        ensure!(
            self.rotation_period.is_finite() && self.rotation_period != 0.0,
            "body {:?}: rotation period must be nonzero, got {}",
            self.id,
            self.rotation_period
        );
        Ok(())
    }
}

/// The ordered, validated set of bodies a simulation runs over.
///
/// Order matters: a body's index fixes its initial orbit offset.
#[derive(Clone, Debug, PartialEq)]
pub struct BodyRegistry {
    bodies: Arc<[Body]>,
    index: HashMap<Arc<str>, usize>,
}

impl BodyRegistry {
    /// Validate and freeze a list of bodies.
    pub fn new(bodies: Vec<Body>) -> eyre::Result<Self> {
        let mut index = HashMap::with_capacity(bodies.len());
        for (i, body) in bodies.iter().enumerate() {
            body.validate()?;
            ensure!(
                index.insert(body.id.clone(), i).is_none(),
                "duplicate body id {:?}",
                body.id
            );
        }
        Ok(Self {
            bodies: bodies.into(),
            index,
        })
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Body> {
        self.bodies.iter()
    }

    pub fn get(&self, i: usize) -> Option<&Body> {
        self.bodies.get(i)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn by_id(&self, id: &str) -> Option<&Body> {
        self.position(id).map(|i| &self.bodies[i])
    }

    /// Starting orbit angle of the body at `i`: bodies are spread evenly
    /// around the circle in registry order.
    pub fn initial_offset_deg(&self, i: usize) -> f64 {
        i as f64 * crate::math::FULL_TURN / self.bodies.len() as f64
    }
}

#[test]
fn rejects_bad_periods() {
    assert!(BodyRegistry::new(vec![Body::new("a", 1.0, 0.0, 1.0)]).is_err());
    assert!(BodyRegistry::new(vec![Body::new("a", 1.0, -3.0, 1.0)]).is_err());
    assert!(BodyRegistry::new(vec![Body::new("a", 1.0, 10.0, 0.0)]).is_err());
    assert!(BodyRegistry::new(vec![Body::new("a", 1.0, f64::NAN, 1.0)]).is_err());
    assert!(BodyRegistry::new(vec![Body::new("a", 0.0, 10.0, 1.0)]).is_err());
    assert!(BodyRegistry::new(vec![Body::new(" ", 1.0, 10.0, 1.0)]).is_err());
}

#[test]
fn accepts_retrograde() {
    let reg = BodyRegistry::new(vec![Body::new("venus", 1.0, 10.0, -15.0)]).unwrap();
    assert!(reg.by_id("venus").unwrap().is_retrograde());
}

#[test]
fn rejects_duplicate_ids() {
    let err = BodyRegistry::new(vec![
        Body::new("a", 1.0, 10.0, 1.0),
        Body::new("a", 2.0, 20.0, 1.0),
    ])
    .unwrap_err();
    assert!(err.to_string().contains("duplicate"));
}

#[test]
fn offsets_are_evenly_spread() {
    let reg = BodyRegistry::new(
        ["a", "b", "c", "d"]
            .into_iter()
            .map(|id| Body::new(id, 1.0, 10.0, 1.0))
            .collect(),
    )
    .unwrap();
    let offsets: Vec<_> = (0..4).map(|i| reg.initial_offset_deg(i)).collect();
    assert_eq!(offsets, [0.0, 90.0, 180.0, 270.0]);
    assert_eq!(reg.position("c"), Some(2));
    assert!(reg.by_id("e").is_none());
}

#[test]
fn empty_registry_is_valid() {
    let reg = BodyRegistry::new(vec![]).unwrap();
    assert!(reg.is_empty());
}
