//! Shared, reference-counted effect types
//!
//! Effects created from the same authored content share one `EffectType`,
//! looked up by the prefab's content hash. A type is built once (samplers,
//! baked curve slot, shader parameters) and is immutable afterwards apart
//! from its reference count.

use std::collections::HashMap;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use cinder_core::{CinderError, ContentHash, Result};
use tracing::{debug, warn};

use crate::atlas::{bake_slot, AtlasSlot, AtlasUpload, CurveAtlas, CurveSet};
use crate::config::EffectPrefab;
use crate::sampler::Vec3Sampler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectTypeId(pub u32);

impl EffectTypeId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for EffectTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

/// Per-type shader parameters, matches the WGSL `TypeParams` uniform (48 bytes)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct TypeParams {
    /// `uv = vec2(age, row) * xy + zw` into the curve atlas
    pub spline_mad: [f32; 4],
    pub scale_base_variance: [f32; 2],
    pub life_time_base_variance: [f32; 2],
    pub frame_count: [f32; 2],
    pub frame_rate: f32,
    pub _pad: f32,
}

#[derive(Debug)]
pub struct EffectType {
    pub prefab: Arc<EffectPrefab>,
    pub ref_count: u32,
    pub update_radius: f32,
    pub time_step: f32,
    pub emit_position: Vec3Sampler,
    pub emit_velocity: Vec3Sampler,
    pub params: TypeParams,
    pub texture: Option<String>,
    pub render_order: i32,
    /// Creation serial, orders types that share a render order
    pub tiebreak: u32,
    pub atlas_slot: AtlasSlot,
}

#[derive(Debug, Default)]
pub struct EffectTypeRegistry {
    types: Vec<Option<EffectType>>,
    free_ids: Vec<u32>,
    by_hash: HashMap<ContentHash, EffectTypeId>,
    atlas: CurveAtlas,
    pending_uploads: Vec<AtlasUpload>,
    next_serial: u32,
}

impl EffectTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live types
    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    pub fn get(&self, id: EffectTypeId) -> Option<&EffectType> {
        self.types.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn find(&self, hash: &ContentHash) -> Option<EffectTypeId> {
        self.by_hash.get(hash).copied()
    }

    pub fn ref_count(&self, id: EffectTypeId) -> u32 {
        self.get(id).map_or(0, |t| t.ref_count)
    }

    /// Atlas rows baked since the last call, to be copied into the GPU atlas
    pub fn take_atlas_uploads(&mut self) -> Vec<AtlasUpload> {
        std::mem::take(&mut self.pending_uploads)
    }

    /// Take a reference to the type for `prefab`, creating it on first use
    pub fn reserve(&mut self, prefab: &Arc<EffectPrefab>) -> Result<EffectTypeId> {
        let hash = prefab.hash();
        if let Some(id) = self.by_hash.get(&hash).copied() {
            if let Some(ty) = self.types.get_mut(id.0 as usize).and_then(Option::as_mut) {
                ty.ref_count += 1;
                return Ok(id);
            }
        }

        let ty = self.create(prefab)?;
        let id = match self.free_ids.pop() {
            Some(raw) => {
                self.types[raw as usize] = Some(ty);
                EffectTypeId(raw)
            }
            None => {
                self.types.push(Some(ty));
                EffectTypeId(self.types.len() as u32 - 1)
            }
        };
        self.by_hash.insert(hash, id);
        debug!(target: "particles", %id, %hash, "created effect type");
        Ok(id)
    }

    /// Drop a reference, destroying the type when it was the last one.
    ///
    /// Returns `true` if the type was destroyed.
    pub fn release(&mut self, id: EffectTypeId) -> Result<bool> {
        let slot = self
            .types
            .get_mut(id.0 as usize)
            .ok_or_else(|| CinderError::EffectTypeNotFound(id.to_string()))?;
        let ty = slot
            .as_mut()
            .ok_or_else(|| CinderError::EffectTypeNotFound(id.to_string()))?;

        debug_assert!(ty.ref_count > 0);
        ty.ref_count -= 1;
        if ty.ref_count > 0 {
            return Ok(false);
        }

        if let Some(ty) = slot.take() {
            let hash = ty.prefab.hash();
            self.by_hash.remove(&hash);
            self.atlas.free(ty.atlas_slot);
            debug!(target: "particles", %id, %hash, "destroyed effect type");
        }
        self.free_ids.push(id.0);
        Ok(true)
    }

    /// Release by authored content instead of by handle
    pub fn release_prefab(&mut self, prefab: &EffectPrefab) -> Result<bool> {
        let id = self
            .find(&prefab.hash())
            .ok_or_else(|| CinderError::EffectTypeNotFound(prefab.hash().to_string()))?;
        self.release(id)
    }

    fn create(&mut self, prefab: &Arc<EffectPrefab>) -> Result<EffectType> {
        let c = prefab.config();
        let atlas_slot = self.atlas.allocate()?;

        let baked = bake_slot(&CurveSet {
            scale: &c.scale_curve,
            alpha: &c.alpha_curve,
            additive: &c.additive_curve,
            erosion: &c.erosion_curve,
            gradient: &c.gradient,
        });
        for &channel in &baked.reordered {
            warn!(
                target: "particles",
                hash = %prefab.hash(),
                channel,
                "curve control points are not sorted by x, baking them sorted"
            );
        }
        self.pending_uploads
            .push(self.atlas.upload_for(atlas_slot, baked.texels));

        let params = TypeParams {
            spline_mad: atlas_slot.spline_mad(),
            scale_base_variance: [c.size, c.size_variance],
            life_time_base_variance: [c.life_time, c.life_time_variance],
            frame_count: [c.frame_count[0] as f32, c.frame_count[1] as f32],
            frame_rate: c.frame_rate,
            _pad: 0.0,
        };

        let tiebreak = self.next_serial;
        self.next_serial = self.next_serial.wrapping_add(1);

        Ok(EffectType {
            prefab: Arc::clone(prefab),
            ref_count: 1,
            update_radius: c.update_radius,
            time_step: c.time_step,
            emit_position: Vec3Sampler::new(&c.emit_position),
            emit_velocity: Vec3Sampler::new(&c.emit_velocity),
            params,
            texture: c.texture.clone(),
            render_order: c.render_order,
            tiebreak,
            atlas_slot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefab(src: &str) -> Arc<EffectPrefab> {
        EffectPrefab::from_toml_str(src).unwrap()
    }

    #[test]
    fn type_params_layout() {
        assert_eq!(std::mem::size_of::<TypeParams>(), 48);
    }

    #[test]
    fn same_content_shares_a_type() {
        let mut reg = EffectTypeRegistry::new();
        let a = prefab("life_time = 2");
        let b = prefab("life_time = 2.0");
        let id_a = reg.reserve(&a).unwrap();
        let id_b = reg.reserve(&b).unwrap();
        assert_eq!(id_a, id_b);
        assert_eq!(reg.ref_count(id_a), 2);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.take_atlas_uploads().len(), 1);
        assert!(reg.take_atlas_uploads().is_empty());
    }

    #[test]
    fn last_release_destroys() {
        let mut reg = EffectTypeRegistry::new();
        let p = prefab("");
        let id = reg.reserve(&p).unwrap();
        reg.reserve(&p).unwrap();

        assert!(!reg.release(id).unwrap());
        assert_eq!(reg.ref_count(id), 1);
        assert!(reg.release_prefab(&p).unwrap());
        assert!(reg.get(id).is_none());
        assert!(reg.is_empty());
        assert!(reg.release(id).is_err());
    }

    #[test]
    fn ids_and_slots_are_recycled() {
        let mut reg = EffectTypeRegistry::new();
        let a = prefab("render_order = 1");
        let b = prefab("render_order = 2");
        let id_a = reg.reserve(&a).unwrap();
        let slot_a = reg.get(id_a).unwrap().atlas_slot;
        reg.release(id_a).unwrap();

        let id_b = reg.reserve(&b).unwrap();
        let ty = reg.get(id_b).unwrap();
        assert_eq!(id_b, id_a);
        assert_eq!(ty.atlas_slot, slot_a);
        assert_eq!(ty.render_order, 2);
        assert_eq!(ty.tiebreak, 1);
    }

    #[test]
    fn params_follow_config() {
        let mut reg = EffectTypeRegistry::new();
        let p = prefab(
            r#"
            size = 0.5
            size_variance = 0.25
            life_time = 3
            frame_count = [4, 2]
            frame_rate = 12
            texture = "smoke.png"
            "#,
        );
        let id = reg.reserve(&p).unwrap();
        let ty = reg.get(id).unwrap();
        assert_eq!(ty.params.scale_base_variance, [0.5, 0.25]);
        assert_eq!(ty.params.life_time_base_variance, [3.0, 0.0]);
        assert_eq!(ty.params.frame_count, [4.0, 2.0]);
        assert_eq!(ty.params.frame_rate, 12.0);
        assert_eq!(ty.params.spline_mad, ty.atlas_slot.spline_mad());
        assert_eq!(ty.texture.as_deref(), Some("smoke.png"));
    }
}
