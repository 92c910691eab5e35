//! Box / sphere-shell random vectors for spawn position and velocity
//!
//! `RandomVec3` is the authored form (degrees, radii); `Vec3Sampler` is the
//! precomputed form sampled once per spawned particle. The sphere path uses
//! polynomial approximations of acos and sin/cos: directions are within
//! ~0.1% of unit length, which is invisible on particles and several times
//! cheaper than libm.

use crate::rand::ParticleRng;
use glam::{Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};

/// Spherical shell distribution (angles in degrees)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomSphere {
    pub min_radius: f32,
    pub max_radius: f32,
    /// Azimuth range around +Y
    pub min_theta: f32,
    pub max_theta: f32,
    /// Inclination range from +Y
    pub min_phi: f32,
    pub max_phi: f32,
    /// Per-axis scale applied after sampling
    pub scale: [f32; 3],
}

impl Default for RandomSphere {
    fn default() -> Self {
        Self {
            min_radius: 0.0,
            max_radius: 0.0,
            min_theta: 0.0,
            max_theta: 360.0,
            min_phi: 0.0,
            max_phi: 180.0,
            scale: [1.0, 1.0, 1.0],
        }
    }
}

/// Authored random vector: offset + optional box jitter + optional sphere
/// shell, optionally rotated as a whole (Euler degrees).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomVec3 {
    pub offset: [f32; 3],
    /// Full box size; samples land in `offset ± box_extent / 2`
    pub box_extent: [f32; 3],
    pub sphere: RandomSphere,
    pub rotation: [f32; 3],
}

impl RandomVec3 {
    pub fn constant(v: [f32; 3]) -> Self {
        Self {
            offset: v,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SphereParams {
    theta_bias: f32,
    theta_scale: f32,
    cos_phi_bias: f32,
    cos_phi_scale: f32,
    /// (min / max)^3, the lower end of the cube-root radius mapping
    radius_cube_min: f32,
    radius: f32,
    scale: Vec3,
}

/// Precomputed sampler for one `RandomVec3`
#[derive(Debug, Clone, Copy)]
pub struct Vec3Sampler {
    offset: Vec3,
    box_extent: Option<Vec3>,
    sphere: Option<SphereParams>,
    rotation: Option<Quat>,
}

impl Vec3Sampler {
    pub fn new(src: &RandomVec3) -> Self {
        let box_extent = Vec3::from_array(src.box_extent);
        let box_extent = (box_extent != Vec3::ZERO).then_some(box_extent);

        let s = &src.sphere;
        let sphere = (s.max_radius > 0.0).then(|| {
            let deg = PI / 180.0;
            let cos_phi_bias = (s.max_phi * deg).cos();
            let min_ratio = (s.min_radius / s.max_radius).clamp(0.0, 1.0);
            SphereParams {
                theta_bias: s.min_theta * deg,
                theta_scale: (s.max_theta - s.min_theta) * deg,
                cos_phi_bias,
                cos_phi_scale: (s.min_phi * deg).cos() - cos_phi_bias,
                radius_cube_min: min_ratio * min_ratio * min_ratio,
                radius: s.max_radius,
                scale: Vec3::from_array(s.scale),
            }
        });

        let rotation = Vec3::from_array(src.rotation);
        let rotation = (rotation != Vec3::ZERO).then(|| {
            let r = rotation * (PI / 180.0);
            Quat::from_euler(glam::EulerRot::XYZ, r.x, r.y, r.z)
        });

        Self {
            offset: Vec3::from_array(src.offset),
            box_extent,
            sphere,
            rotation,
        }
    }

    pub fn sample(&self, rng: &mut ParticleRng) -> Vec3 {
        let mut p = self.offset;

        if let Some(extent) = self.box_extent {
            p += (rng.next_vec3() - Vec3::splat(0.5)) * extent;
        }

        if let Some(s) = &self.sphere {
            let u = rng.next_f32();
            let v = rng.next_f32();
            let w = rng.next_f32();
            let theta = s.theta_bias + u * s.theta_scale;
            let phi = approx_acos(s.cos_phi_bias + v * s.cos_phi_scale);
            let trig = approx_cos_sin2(theta, phi);
            let (cos_theta, sin_theta) = (trig.x, trig.y);
            let (cos_phi, sin_phi) = (trig.z, trig.w);

            let radius = (s.radius_cube_min + w * (1.0 - s.radius_cube_min)).cbrt() * s.radius;
            let dir = Vec3::new(sin_phi * cos_theta, cos_phi, sin_phi * sin_theta);
            p += dir * radius * s.scale;
        }

        if let Some(q) = self.rotation {
            p = q * p;
        }

        p
    }
}

/// acos(a) for a in [-1, 1], max error around 0.018 rad
pub fn approx_acos(a: f32) -> f32 {
    let x = a.abs();
    let v = -1.280_827_7 + 1.280_827_7 * (1.0 - x).max(0.0).sqrt() - 0.289_968_65 * x;
    PI * 0.5 - v.copysign(a)
}

/// Simultaneous cos/sin of two angles: returns (cos a, sin a, cos b, sin b).
///
/// Parabolic approximation with one refinement step, valid for any input
/// range since the phase is wrapped first.
pub fn approx_cos_sin2(a: f32, b: f32) -> Vec4 {
    let mut t = Vec4::new(a, a, b, b) * (1.0 / TAU) + Vec4::new(0.0, -0.25, 0.0, -0.25);
    t -= (t - Vec4::splat(0.25)).round() + Vec4::splat(0.25);
    t *= (t.abs() - Vec4::splat(0.5)) * 16.0;
    t += t * (t.abs() - Vec4::ONE) * 0.225;
    t
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn approx_acos_endpoints() {
        assert!(approx_acos(1.0).abs() < 1e-4);
        assert!((approx_acos(0.0) - PI * 0.5).abs() < 1e-4);
        assert!((approx_acos(-1.0) - PI).abs() < 1e-4);
        let mut t = -1.0f32;
        while t <= 1.0 {
            assert!((approx_acos(t) - t.acos()).abs() < 0.02, "acos({t})");
            t += 0.01;
        }
    }

    #[test]
    fn approx_trig_close_to_libm() {
        for i in 0..200 {
            let a = -7.0 + i as f32 * 0.07;
            let r = approx_cos_sin2(a, a * 0.5);
            assert!((r.x - a.cos()).abs() < 0.002, "cos({a})");
            assert!((r.y - a.sin()).abs() < 0.002, "sin({a})");
            assert!((r.z - (a * 0.5).cos()).abs() < 0.002);
            assert!((r.w - (a * 0.5).sin()).abs() < 0.002);
        }
    }

    #[test]
    fn degenerate_distribution_is_offset() {
        let src = RandomVec3 {
            offset: [1.0, 2.0, 3.0],
            sphere: RandomSphere {
                min_radius: 1.0,
                max_radius: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let sampler = Vec3Sampler::new(&src);
        let mut rng = ParticleRng::new(3, 3);
        for _ in 0..16 {
            assert_eq!(sampler.sample(&mut rng), Vec3::new(1.0, 2.0, 3.0));
        }
    }

    #[test]
    fn rotation_applies_to_offset() {
        let src = RandomVec3 {
            offset: [1.0, 0.0, 0.0],
            rotation: [0.0, 0.0, 90.0],
            ..Default::default()
        };
        let p = Vec3Sampler::new(&src).sample(&mut ParticleRng::new(1, 1));
        assert!((p - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn same_rng_state_same_samples() {
        let src = RandomVec3 {
            box_extent: [1.0, 2.0, 3.0],
            sphere: RandomSphere { max_radius: 2.0, ..Default::default() },
            ..Default::default()
        };
        let sampler = Vec3Sampler::new(&src);
        let mut a = ParticleRng::new(99, 5);
        let mut b = ParticleRng::new(99, 5);
        for _ in 0..32 {
            assert_eq!(sampler.sample(&mut a), sampler.sample(&mut b));
        }
    }

    proptest! {
        #[test]
        fn box_samples_stay_in_box(
            seed in any::<u64>(),
            ex in 0.0f32..10.0, ey in 0.0f32..10.0, ez in 0.0f32..10.0,
            ox in -5.0f32..5.0,
        ) {
            let src = RandomVec3 {
                offset: [ox, 0.0, 0.0],
                box_extent: [ex, ey, ez],
                ..Default::default()
            };
            let sampler = Vec3Sampler::new(&src);
            let mut rng = ParticleRng::new(seed, 17);
            let half = Vec3::new(ex, ey, ez) * 0.5 + Vec3::splat(1e-5);
            for _ in 0..64 {
                let d = (sampler.sample(&mut rng) - Vec3::new(ox, 0.0, 0.0)).abs();
                prop_assert!(d.x <= half.x && d.y <= half.y && d.z <= half.z);
            }
        }

        #[test]
        fn sphere_samples_stay_in_shell(
            seed in any::<u64>(),
            min_radius in 0.0f32..5.0,
            thickness in 0.01f32..5.0,
        ) {
            let max_radius = min_radius + thickness;
            let src = RandomVec3 {
                sphere: RandomSphere { min_radius, max_radius, ..Default::default() },
                ..Default::default()
            };
            let sampler = Vec3Sampler::new(&src);
            let mut rng = ParticleRng::new(seed, 23);
            for _ in 0..64 {
                let r = sampler.sample(&mut rng).length();
                prop_assert!(r >= min_radius * 0.99 - 1e-4, "r={} min={}", r, min_radius);
                prop_assert!(r <= max_radius * 1.01 + 1e-4, "r={} max={}", r, max_radius);
            }
        }
    }
}
