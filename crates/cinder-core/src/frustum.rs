//! View frustum extracted from a world-to-clip matrix

use crate::Bounds3;
use glam::{Mat4, Vec3, Vec4};

/// A plane `normal . p + distance = 0`; the inside is the positive half-space.
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    fn from_vec4(v: Vec4) -> Self {
        let normal = v.truncate();
        let len = normal.length();
        if len > 0.0 {
            Self {
                normal: normal / len,
                distance: v.w / len,
            }
        } else {
            Self {
                normal: Vec3::ZERO,
                distance: v.w,
            }
        }
    }

    /// Signed distance from the plane, positive inside
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Six clip planes: left, right, bottom, top, near, far
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Gribb/Hartmann plane extraction for a column-vector `clip = M * world`
    /// matrix with a [0, 1] depth range.
    pub fn from_world_to_clip(m: &Mat4) -> Self {
        let r0 = m.row(0);
        let r1 = m.row(1);
        let r2 = m.row(2);
        let r3 = m.row(3);
        Self {
            planes: [
                Plane::from_vec4(r3 + r0),
                Plane::from_vec4(r3 - r0),
                Plane::from_vec4(r3 + r1),
                Plane::from_vec4(r3 - r1),
                Plane::from_vec4(r2),
                Plane::from_vec4(r3 - r2),
            ],
        }
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|p| p.distance_to_point(point) >= 0.0)
    }

    /// Conservative box test: false only if the box is fully outside one plane
    pub fn intersects(&self, bounds: &Bounds3) -> bool {
        self.planes.iter().all(|p| {
            let r = bounds.extent.dot(p.normal.abs());
            p.distance_to_point(bounds.origin) + r >= 0.0
        })
    }
}
