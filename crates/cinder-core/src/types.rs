//! Spatial types

use glam::{Mat4, Quat, Vec3};

/// A rigid transform with non-uniform scale
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Convert to a column-major 4x4 matrix (scale, then rotate, then translate)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// Axis-aligned bounding box stored as center and half-extent
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds3 {
    pub origin: Vec3,
    pub extent: Vec3,
}

impl Default for Bounds3 {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            extent: Vec3::ZERO,
        }
    }
}

impl Bounds3 {
    pub fn new(origin: Vec3, extent: Vec3) -> Self {
        Self { origin, extent }
    }

    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self {
            origin: (min + max) * 0.5,
            extent: (max - min) * 0.5,
        }
    }

    pub fn min(&self) -> Vec3 {
        self.origin - self.extent
    }

    pub fn max(&self) -> Vec3 {
        self.origin + self.extent
    }

    /// Grow the extent by `padding` on every axis
    pub fn padded(&self, padding: f32) -> Self {
        Self {
            origin: self.origin,
            extent: self.extent + Vec3::splat(padding),
        }
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        let d = (p - self.origin).abs();
        d.x <= self.extent.x && d.y <= self.extent.y && d.z <= self.extent.z
    }

    /// Conservative world bound of this box after an affine transform.
    ///
    /// The new half-extent is `|M3| * extent` (Arvo).
    pub fn transformed(&self, m: &Mat4) -> Self {
        let origin = m.transform_point3(self.origin);
        let extent = m.x_axis.truncate().abs() * self.extent.x
            + m.y_axis.truncate().abs() * self.extent.y
            + m.z_axis.truncate().abs() * self.extent.z;
        Self { origin, extent }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_default() {
        let t = Transform::default();
        assert_eq!(t.position, Vec3::ZERO);
        assert_eq!(t.rotation, Quat::IDENTITY);
        assert_eq!(t.scale, Vec3::ONE);
        assert_eq!(t.to_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_transform_matrix_translates() {
        let t = Transform::from_position(Vec3::new(1.0, 2.0, 3.0)).with_scale(Vec3::splat(2.0));
        let p = t.to_matrix().transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert!((p - Vec3::new(3.0, 2.0, 3.0)).length() < 1e-6);
    }

    #[test]
    fn test_bounds_min_max() {
        let b = Bounds3::from_min_max(Vec3::new(-1.0, 0.0, 2.0), Vec3::new(1.0, 4.0, 6.0));
        assert_eq!(b.origin, Vec3::new(0.0, 2.0, 4.0));
        assert_eq!(b.extent, Vec3::new(1.0, 2.0, 2.0));
        assert_eq!(b.min(), Vec3::new(-1.0, 0.0, 2.0));
        assert!(b.contains_point(Vec3::new(0.5, 3.0, 5.0)));
        assert!(!b.contains_point(Vec3::new(0.5, 5.0, 5.0)));
    }

    #[test]
    fn test_bounds_transformed_rotation() {
        let b = Bounds3::new(Vec3::ZERO, Vec3::new(2.0, 1.0, 1.0));
        let m = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let t = b.transformed(&m);
        assert!((t.extent - Vec3::new(1.0, 1.0, 2.0)).length() < 1e-5);
    }
}
