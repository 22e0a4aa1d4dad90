//! System files: the body registry plus simulation tunables, stored as TOML.

use std::path::Path;

use color_eyre::eyre::{self, ensure, WrapErr};
use serde::{Deserialize, Serialize};

use crate::bodies::{Body, BodyRegistry};

/// Tunables for one simulation session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Separation below which two bodies count as aligned (`deg`)
    pub alignment_threshold_deg: f64,
    /// Normal ceiling for the time scale
    pub max_time_scale: f64,
    /// Ceiling once the override has been unlocked
    pub unlocked_time_scale: f64,
    /// Largest wall delta a single frame may integrate (`sec`)
    pub max_wall_delta: f64,
    /// Refresh rate the fixed-rate signal ticks at (`Hz`)
    pub refresh_hz: f64,
    /// Alignments counted before this session, added to the live count
    pub epoch_base: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            alignment_threshold_deg: 1.5,
            max_time_scale: 5.0,
            unlocked_time_scale: 10.0,
            max_wall_delta: 0.25,
            refresh_hz: 60.0,
            epoch_base: 8492,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> eyre::Result<()> {
        ensure!(
            self.alignment_threshold_deg.is_finite() && self.alignment_threshold_deg > 0.0,
            "alignment threshold must be positive, got {}",
            self.alignment_threshold_deg
        );
        ensure!(
            self.max_time_scale.is_finite() && self.max_time_scale >= 0.0,
            "time scale ceiling must be non-negative, got {}",
            self.max_time_scale
        );
        ensure!(
            self.unlocked_time_scale.is_finite()
                && self.unlocked_time_scale >= self.max_time_scale,
            "unlocked ceiling {} is below the normal ceiling {}",
            self.unlocked_time_scale,
            self.max_time_scale
        );
        ensure!(
            self.max_wall_delta.is_finite() && self.max_wall_delta > 0.0,
            "maximum wall delta must be positive, got {}",
            self.max_wall_delta
        );
        ensure!(
            self.refresh_hz.is_finite() && self.refresh_hz > 0.0,
            "refresh rate must be positive, got {}",
            self.refresh_hz
        );
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SystemFile {
    #[serde(default)]
    simulation: SimulationConfig,
    #[serde(default)]
    bodies: Vec<Body>,
}

/// A loaded, validated system: what to simulate and how.
#[derive(Clone, Debug)]
pub struct SystemConfiguration {
    pub simulation: SimulationConfig,
    pub registry: BodyRegistry,
}

impl SystemConfiguration {
    pub fn from_toml(src: &str) -> eyre::Result<Self> {
        let file: SystemFile = toml::from_str(src).wrap_err("malformed system file")?;
        file.simulation.validate()?;
        Ok(Self {
            simulation: file.simulation,
            registry: BodyRegistry::new(file.bodies)?,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("could not read {}", path.display()))?;
        Self::from_toml(&src).wrap_err_with(|| format!("in {}", path.display()))
    }
}

#[test]
fn defaults_fill_missing_keys() {
    let sys = SystemConfiguration::from_toml(
        r#"
        [simulation]
        max_time_scale = 3.0

        [[bodies]]
        id = "a"
        orbit = 3.2
        orbit_period = 30.0
        rotation_period = 10.0

        [[bodies]]
        id = "b"
        name = "Bee"
        orbit = 4.6
        orbit_period = 45.0
        rotation_period = -15.0
        "#,
    )
    .unwrap();
    assert_eq!(sys.simulation.max_time_scale, 3.0);
    assert_eq!(sys.simulation.alignment_threshold_deg, 1.5);
    assert_eq!(sys.registry.len(), 2);
    assert_eq!(sys.registry.by_id("b").unwrap().display_name(), "Bee");
    assert_eq!(sys.registry.by_id("a").unwrap().display_name(), "a");
}

#[test]
fn rejects_invalid_bodies_before_start() {
    let err = SystemConfiguration::from_toml(
        r#"
        [[bodies]]
        id = "a"
        orbit = 1.0
        orbit_period = 0.0
        rotation_period = 1.0
        "#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("orbit period"));
}

#[test]
fn rejects_inverted_ceilings() {
    let err = SystemConfiguration::from_toml(
        "[simulation]\nmax_time_scale = 8.0\nunlocked_time_scale = 4.0\n",
    )
    .unwrap_err();
    assert!(err.to_string().contains("unlocked ceiling"));
}

#[test]
fn rejects_unknown_shape() {
    assert!(SystemConfiguration::from_toml("bodies = 3").is_err());
}
