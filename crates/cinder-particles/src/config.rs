//! Effect definitions parsed from TOML
//!
//! An `EffectConfig` is the authored description of one particle effect.
//! Every field has a default so a definition only lists what it changes.
//! Integers are accepted wherever a float is expected.
//!
//! ```toml
//! texture = "sprites/spark.png"
//! time_step = 0.05
//! spawn_time = 0.02
//! life_time = 1.5
//! gravity = [0, -9.8, 0]
//!
//! [emit_velocity]
//! offset = [0, 2, 0]
//! sphere = { max_radius = 1.0 }
//!
//! [alpha_curve]
//! points = [[0, 0], [0.1, 1], [1, 0]]
//! ```

use std::path::Path;
use std::sync::Arc;

use cinder_core::{CinderError, ContentHash, Result};
use serde::{Deserialize, Serialize};

use crate::curves::{Curve, Gradient};
use crate::sampler::RandomVec3;

/// A point attractor (positive strength) or repeller (negative strength)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GravityPoint {
    /// Position relative to the emitter
    pub offset: [f32; 3],
    pub strength: f32,
    /// Softening radius, keeps the pull finite at the point itself
    pub radius: f32,
}

impl Default for GravityPoint {
    fn default() -> Self {
        Self {
            offset: [0.0; 3],
            strength: 0.0,
            radius: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    /// Sprite texture; the renderer falls back to a white texel when unset
    pub texture: Option<String>,
    /// Half-extent of the box registered with the visibility index
    pub update_radius: f32,
    /// Fixed simulation step in seconds
    pub time_step: f32,

    pub spawn_time: f32,
    pub spawn_time_variance: f32,
    pub life_time: f32,
    pub life_time_variance: f32,
    pub size: f32,
    pub size_variance: f32,

    /// Sprite sheet cells along x and y
    pub frame_count: [u32; 2],
    /// Sprite sheet frames per second
    pub frame_rate: f32,

    pub gravity: [f32; 3],
    pub drag: f32,
    pub gravity_points: Vec<GravityPoint>,

    pub emit_position: RandomVec3,
    pub emit_velocity: RandomVec3,
    /// Spawn velocity is pushed along `normalize(position - offset)` by `strength`
    pub emit_velocity_attractor_offset: [f32; 3],
    pub emit_velocity_attractor_strength: f32,

    /// Stop emitting after this many seconds
    pub emit_duration: Option<f32>,
    /// Particles spawned at once when the effect starts
    pub burst_count: u32,

    /// Extra margin added to the particle bounds for culling
    pub cull_padding: f32,
    /// Simulate in emitter space instead of world space
    pub local_space: bool,
    pub render_order: i32,
    /// Remove the effect immediately instead of letting particles drain
    pub instant_delete: bool,

    pub scale_curve: Curve,
    pub alpha_curve: Curve,
    pub additive_curve: Curve,
    pub erosion_curve: Curve,
    pub gradient: Gradient,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            texture: None,
            update_radius: 5.0,
            time_step: 0.1,
            spawn_time: 1.0,
            spawn_time_variance: 0.0,
            life_time: 1.0,
            life_time_variance: 0.0,
            size: 1.0,
            size_variance: 0.0,
            frame_count: [1, 1],
            frame_rate: 0.0,
            gravity: [0.0; 3],
            drag: 0.0,
            gravity_points: Vec::new(),
            emit_position: RandomVec3::default(),
            emit_velocity: RandomVec3::default(),
            emit_velocity_attractor_offset: [0.0; 3],
            emit_velocity_attractor_strength: 0.0,
            emit_duration: None,
            burst_count: 0,
            cull_padding: 1.0,
            local_space: false,
            render_order: 0,
            instant_delete: false,
            scale_curve: Curve::default(),
            alpha_curve: Curve::default(),
            additive_curve: Curve::default(),
            erosion_curve: Curve::default(),
            gradient: Gradient::default(),
        }
    }
}

fn positive(field: &str, v: f32) -> Result<()> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(CinderError::invalid(field, format!("must be positive, got {v}")))
    }
}

fn non_negative(field: &str, v: f32) -> Result<()> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(CinderError::invalid(field, format!("must be non-negative, got {v}")))
    }
}

fn check_distribution(field: &str, v: &RandomVec3) -> Result<()> {
    let s = &v.sphere;
    non_negative(&format!("{field}.sphere.min_radius"), s.min_radius)?;
    if s.max_radius < s.min_radius {
        return Err(CinderError::invalid(
            &format!("{field}.sphere.max_radius"),
            format!("{} is below min_radius {}", s.max_radius, s.min_radius),
        ));
    }
    Ok(())
}

impl EffectConfig {
    /// Parse a definition from TOML source
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: EffectConfig = toml::from_str(source)?;
        Ok(config)
    }

    /// Reject values the simulator cannot make progress with
    pub fn validate(&self) -> Result<()> {
        positive("time_step", self.time_step)?;
        positive("spawn_time", self.spawn_time)?;
        positive("life_time", self.life_time)?;
        non_negative("spawn_time_variance", self.spawn_time_variance)?;
        non_negative("life_time_variance", self.life_time_variance)?;
        non_negative("size_variance", self.size_variance)?;
        non_negative("drag", self.drag)?;
        non_negative("update_radius", self.update_radius)?;
        non_negative("cull_padding", self.cull_padding)?;
        if let Some(d) = self.emit_duration {
            non_negative("emit_duration", d)?;
        }
        if self.frame_count[0] == 0 || self.frame_count[1] == 0 {
            return Err(CinderError::invalid("frame_count", "cells must be at least 1x1"));
        }
        for (i, p) in self.gravity_points.iter().enumerate() {
            non_negative(&format!("gravity_points[{i}].radius"), p.radius)?;
        }
        check_distribution("emit_position", &self.emit_position)?;
        check_distribution("emit_velocity", &self.emit_velocity)?;
        Ok(())
    }
}

/// A validated effect definition together with its content identity.
///
/// The hash covers the canonical re-serialization of the config, so two
/// sources that differ only in formatting, key order or integer/float
/// spelling share an identity.
#[derive(Debug)]
pub struct EffectPrefab {
    config: EffectConfig,
    hash: ContentHash,
}

impl EffectPrefab {
    pub fn new(config: EffectConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let canonical = toml::to_string(&config)?;
        let hash = ContentHash::from_str(&canonical);
        Ok(Arc::new(Self { config, hash }))
    }

    pub fn from_toml_str(source: &str) -> Result<Arc<Self>> {
        Self::new(EffectConfig::from_toml_str(source)?)
    }

    /// Load a definition from a `.toml` file
    pub fn load(path: &Path) -> Result<Arc<Self>> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn config(&self) -> &EffectConfig {
        &self.config
    }

    pub fn hash(&self) -> ContentHash {
        self.hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_is_default() {
        let config = EffectConfig::from_toml_str("").unwrap();
        assert_eq!(config, EffectConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn integers_coerce_to_floats() {
        let config = EffectConfig::from_toml_str(
            r#"
            life_time = 5
            gravity = [0, -10, 0]
            frame_count = [4, 2]

            [emit_velocity]
            offset = [1, 0, 0]
            "#,
        )
        .unwrap();
        assert_eq!(config.life_time, 5.0);
        assert_eq!(config.gravity, [0.0, -10.0, 0.0]);
        assert_eq!(config.frame_count, [4, 2]);
        assert_eq!(config.emit_velocity.offset, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn nested_tables_parse() {
        let config = EffectConfig::from_toml_str(
            r#"
            texture = "spark.png"
            render_order = -2

            [emit_position.sphere]
            min_radius = 0.5
            max_radius = 1

            [[gravity_points]]
            offset = [0, 3, 0]
            strength = 4

            [gradient]
            points = [{ t = 0, color = [1, 0, 0] }, { t = 1, color = [0, 0, 1] }]

            [scale_curve]
            points = [[0, 0], [1, 1]]
            "#,
        )
        .unwrap();
        assert_eq!(config.texture.as_deref(), Some("spark.png"));
        assert_eq!(config.render_order, -2);
        assert_eq!(config.emit_position.sphere.max_radius, 1.0);
        assert_eq!(config.gravity_points.len(), 1);
        assert_eq!(config.gravity_points[0].radius, 1.0);
        assert_eq!(config.gradient.points.len(), 2);
        assert_eq!(config.scale_curve.points, vec![[0.0, 0.0], [1.0, 1.0]]);
    }

    #[test]
    fn unknown_type_is_parse_error() {
        let err = EffectConfig::from_toml_str("life_time = \"long\"").unwrap_err();
        assert!(matches!(err, CinderError::TomlParseError(_)));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = EffectConfig::default();
        config.time_step = 0.0;
        assert!(config.validate().is_err());

        let mut config = EffectConfig::default();
        config.drag = -1.0;
        assert!(config.validate().is_err());

        let mut config = EffectConfig::default();
        config.emit_velocity.sphere.min_radius = 2.0;
        config.emit_velocity.sphere.max_radius = 1.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("emit_velocity.sphere.max_radius"));

        let mut config = EffectConfig::default();
        config.frame_count = [0, 1];
        assert!(config.validate().is_err());
    }

    #[test]
    fn hash_ignores_formatting() {
        let a = EffectPrefab::from_toml_str("life_time = 5\nspawn_time = 0.5").unwrap();
        let b = EffectPrefab::from_toml_str("spawn_time=0.5\n\n# comment\nlife_time = 5.0").unwrap();
        let c = EffectPrefab::from_toml_str("life_time = 4").unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn prefab_rejects_invalid() {
        assert!(EffectPrefab::from_toml_str("spawn_time = -1").is_err());
    }

    #[test]
    fn demo_effects_load() {
        let campfire = EffectPrefab::from_toml_str(include_str!("../../../demos/campfire.toml")).unwrap();
        assert_eq!(campfire.config().gradient.points.len(), 3);
        assert_eq!(campfire.config().emit_velocity.sphere.max_phi, 45.0);

        let burst = EffectPrefab::from_toml_str(include_str!("../../../demos/impact_burst.toml")).unwrap();
        assert_eq!(burst.config().burst_count, 60);
        assert_eq!(burst.config().gravity_points.len(), 1);
        assert_eq!(burst.config().emit_duration, Some(0.0));
        assert_ne!(campfire.hash(), burst.hash());
    }
}
