//! The particle system: owns effect types and instances, runs simulation and
//! rendering once per frame

use std::sync::Arc;

use cinder_core::{Bounds3, CinderError, EntityId, Result, Transform};
use cinder_runtime::{AreaGroup, AreaIndex, EntityComponent, EntitySystem, TransformUpdate};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EffectPrefab;
use crate::effect::{Effect, EffectId, SimLimits};
use crate::rand::ParticleRng;
use crate::registry::{EffectTypeId, EffectTypeRegistry};
use crate::render::{render_effects, FrameStats, ParticleBackend, RenderArgs};
use crate::upload::{FrameUploadAllocator, UploadConfig};

const UPDATE_STREAM: u64 = 581_271;
const INIT_STREAM: u64 = 0x1d7e_c0de;

/// Construction parameters for a `ParticleSystem`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleSystemDesc {
    pub seed: u64,
    pub upload: UploadConfig,
    /// Largest real-time delta accepted per update, in seconds
    pub dt_cap: f32,
    pub max_spawns_per_step: u32,
    /// Each instance stretches its type's time step by up to this fraction,
    /// so identical effects do not step in lockstep
    pub time_step_jitter: f32,
}

impl Default for ParticleSystemDesc {
    fn default() -> Self {
        Self {
            seed: 0,
            upload: UploadConfig::default(),
            dt_cap: 0.1,
            max_spawns_per_step: 20,
            time_step_jitter: 0.1,
        }
    }
}

pub struct ParticleSystem {
    desc: ParticleSystemDesc,
    limits: SimLimits,
    registry: EffectTypeRegistry,
    effects: Vec<Option<Effect>>,
    free_effect_ids: Vec<u32>,
    update_rng: ParticleRng,
    init_rng: ParticleRng,
    uploads: FrameUploadAllocator,
}

impl ParticleSystem {
    pub fn new(desc: ParticleSystemDesc) -> Self {
        Self {
            desc,
            limits: SimLimits {
                dt_cap: desc.dt_cap,
                max_spawns_per_step: desc.max_spawns_per_step,
                max_particles: desc.upload.max_particles_per_frame,
            },
            registry: EffectTypeRegistry::new(),
            effects: Vec::new(),
            free_effect_ids: Vec::new(),
            update_rng: ParticleRng::new(desc.seed, UPDATE_STREAM),
            init_rng: ParticleRng::new(desc.seed, INIT_STREAM),
            uploads: FrameUploadAllocator::new(desc.upload),
        }
    }

    pub fn desc(&self) -> &ParticleSystemDesc {
        &self.desc
    }

    pub fn registry(&self) -> &EffectTypeRegistry {
        &self.registry
    }

    pub fn effect(&self, id: EffectId) -> Option<&Effect> {
        self.effects.get(id.0 as usize).and_then(Option::as_ref)
    }

    fn effect_mut(&mut self, id: EffectId) -> Result<&mut Effect> {
        self.effects
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(CinderError::EffectNotFound(id.0))
    }

    /// Number of live effect instances
    pub fn effect_count(&self) -> usize {
        self.effects.iter().flatten().count()
    }

    /// Hold a type alive without an instance, e.g. to bake it ahead of use
    pub fn reserve_effect_type(&mut self, prefab: &Arc<EffectPrefab>) -> Result<EffectTypeId> {
        self.registry.reserve(prefab)
    }

    pub fn release_effect_type(&mut self, prefab: &EffectPrefab) -> Result<()> {
        self.registry.release_prefab(prefab).map(|_| ())
    }

    /// Spawn an effect for `entity` and register its area with `areas`
    pub fn add_effect(
        &mut self,
        areas: &mut dyn AreaIndex,
        entity: EntityId,
        component_index: u8,
        prefab: &Arc<EffectPrefab>,
        transform: &Transform,
    ) -> Result<EffectId> {
        let type_id = self.registry.reserve(prefab)?;
        let ty = self
            .registry
            .get(type_id)
            .ok_or_else(|| CinderError::EffectTypeNotFound(type_id.to_string()))?;

        let jitter = 1.0 + self.init_rng.next_f32() * self.desc.time_step_jitter;
        let mut effect = Effect::new(
            type_id,
            ty,
            entity,
            component_index,
            transform.to_matrix(),
            ty.time_step * jitter,
        );

        let raw = match self.free_effect_ids.pop() {
            Some(raw) => raw,
            None => {
                self.effects.push(None);
                self.effects.len() as u32 - 1
            }
        };
        let bounds = Bounds3::new(transform.position, Vec3::splat(ty.update_radius));
        effect.area_id = Some(areas.add_box_area(AreaGroup::ParticleEffect, raw, bounds));
        self.effects[raw as usize] = Some(effect);

        let id = EffectId(raw);
        debug!(target: "particles", %id, %entity, %type_id, "added effect");
        Ok(id)
    }

    /// Queue `count` extra particles for the next step
    pub fn queue_burst(&mut self, id: EffectId, count: u32) -> Result<()> {
        self.effect_mut(id)?.queue_burst(count);
        Ok(())
    }

    pub fn set_instant_delete(&mut self, id: EffectId, instant: bool) -> Result<()> {
        self.effect_mut(id)?.set_instant_delete(instant);
        Ok(())
    }

    pub fn move_effect(
        &mut self,
        areas: &mut dyn AreaIndex,
        id: EffectId,
        update: &TransformUpdate,
    ) -> Result<()> {
        let effect = self
            .effects
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(CinderError::EffectNotFound(id.0))?;
        effect.set_emitter_to_world(update.entity_to_world);

        let radius = self
            .registry
            .get(effect.type_id)
            .map_or(0.0, |ty| ty.update_radius);
        if let Some(area) = effect.area_id {
            areas.update_box_area(area, Bounds3::new(update.transform.position, Vec3::splat(radius)));
        }
        Ok(())
    }

    /// Stop emitting and report whether the effect may be torn down now
    pub fn prepare_remove_effect(&mut self, id: EffectId) -> bool {
        match self.effect_mut(id) {
            Ok(effect) => {
                effect.stop_emit();
                effect.instant_delete() || effect.particle_count() == 0
            }
            Err(_) => true,
        }
    }

    pub fn remove_effect(&mut self, areas: &mut dyn AreaIndex, id: EffectId) -> Result<()> {
        let effect = self
            .effects
            .get_mut(id.0 as usize)
            .and_then(Option::take)
            .ok_or(CinderError::EffectNotFound(id.0))?;
        if let Some(area) = effect.area_id {
            areas.remove_box_area(area);
        }
        self.free_effect_ids.push(id.0);
        self.registry.release(effect.type_id)?;
        debug!(target: "particles", %id, "removed effect");
        Ok(())
    }

    /// Simulate every effect listed in `active`
    pub fn update_particles(&mut self, active: &[u32], dt: f32) {
        for &raw in active {
            let Some(effect) = self.effects.get_mut(raw as usize).and_then(Option::as_mut) else {
                continue;
            };
            if let Some(ty) = self.registry.get(effect.type_id) {
                effect.update(ty, &mut self.update_rng, dt, &self.limits);
            }
        }
    }

    /// Upload and draw the effects listed in `visible`
    pub fn render_main(
        &mut self,
        visible: &[u32],
        args: &RenderArgs,
        backend: &mut dyn ParticleBackend,
    ) -> FrameStats {
        render_effects(
            &mut self.effects,
            &mut self.registry,
            &mut self.uploads,
            visible,
            args,
            backend,
        )
    }
}

impl EntitySystem for ParticleSystem {
    fn update_transform(
        &mut self,
        areas: &mut dyn AreaIndex,
        entity: EntityId,
        ec: &EntityComponent,
        update: &TransformUpdate,
    ) {
        if let Err(err) = self.move_effect(areas, EffectId(ec.user_id), update) {
            warn!(target: "particles", %entity, %err, "transform update for unknown effect");
        }
    }

    fn prepare_for_remove(&mut self, _entity: EntityId, ec: &EntityComponent) -> bool {
        self.prepare_remove_effect(EffectId(ec.user_id))
    }

    fn remove(&mut self, areas: &mut dyn AreaIndex, entity: EntityId, ec: &EntityComponent) {
        if let Err(err) = self.remove_effect(areas, EffectId(ec.user_id)) {
            warn!(target: "particles", %entity, %err, "failed to remove effect");
        }
    }

    fn name(&self) -> &str {
        "particles"
    }
}
