//! Visibility-ordered, type-batched particle draws over a pluggable backend

use std::cmp::Ordering;

use bytemuck::{Pod, Zeroable};
use cinder_core::Frustum;
use glam::{Mat4, Vec3};
use tracing::{trace, warn};

use crate::atlas::AtlasUpload;
use crate::effect::{Effect, EffectId};
use crate::registry::{EffectTypeId, EffectTypeRegistry, TypeParams};
use crate::upload::{FrameUploadAllocator, UploadDecision};

/// Camera state for one frame
#[derive(Debug, Clone, Copy)]
pub struct RenderArgs {
    pub world_to_clip: Mat4,
    pub view_to_clip: Mat4,
    pub camera_position: Vec3,
    pub frustum: Frustum,
}

impl RenderArgs {
    pub fn new(world_to_view: Mat4, view_to_clip: Mat4) -> Self {
        let world_to_clip = view_to_clip * world_to_view;
        Self {
            world_to_clip,
            view_to_clip,
            camera_position: world_to_view.inverse().w_axis.truncate(),
            frustum: Frustum::from_world_to_clip(&world_to_clip),
        }
    }

    /// Width over height, recovered from the projection
    pub fn aspect(&self) -> f32 {
        self.view_to_clip.y_axis.y / self.view_to_clip.x_axis.x
    }
}

/// Per-draw shader parameters, matches the WGSL `InstanceParams` uniform (144 bytes)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceParams {
    pub world_to_clip: [[f32; 4]; 4],
    /// Identity unless the effect simulates in emitter space
    pub emitter_to_world: [[f32; 4]; 4],
    pub aspect: f32,
    pub inv_delta: f32,
    pub _pad: [f32; 2],
}

/// One effect's draw: `count` quads read from `byte_offset` of ring region `slot`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleDraw {
    pub effect: EffectId,
    pub slot: u32,
    pub byte_offset: u64,
    pub count: u32,
    pub instance: InstanceParams,
}

impl ParticleDraw {
    pub fn index_count(&self) -> u32 {
        self.count * 6
    }
}

/// The GPU side of particle rendering
pub trait ParticleBackend {
    /// Copy baked curve rows into the curve atlas
    fn write_atlas(&mut self, upload: &AtlasUpload);

    /// Write particle records into ring region `slot`
    fn write_particles(&mut self, slot: u32, byte_offset: u64, data: &[u8]);

    fn bind_pipeline(&mut self);

    /// Bind per-type parameters and sprite texture (`None` uses the fallback texture)
    fn bind_type(&mut self, type_id: EffectTypeId, params: &TypeParams, texture: Option<&str>);

    /// Record one draw, returning `false` when the backend had to drop it
    fn draw(&mut self, draw: &ParticleDraw) -> bool;
}

/// What happened during one `render_main`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Effects that passed the visibility and particle-count checks
    pub visible: u32,
    pub drawn: u32,
    pub uploaded_effects: u32,
    pub uploaded_particles: u32,
    /// Effects dropped for this frame because the upload budget ran out
    pub skipped_budget: u32,
    /// Draws the backend could not record
    pub dropped_draws: u32,
    pub type_binds: u32,
}

#[derive(Debug, Clone, Copy)]
struct DrawKey {
    render_order: i32,
    tiebreak: u32,
    dist_sq: f32,
    effect: u32,
}

impl DrawKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.render_order
            .cmp(&other.render_order)
            .then(self.tiebreak.cmp(&other.tiebreak))
            .then(other.dist_sq.total_cmp(&self.dist_sq))
            .then(self.effect.cmp(&other.effect))
    }
}

/// Upload and draw every visible effect in `(render order, type, far to near, id)` order
pub(crate) fn render_effects(
    effects: &mut [Option<Effect>],
    registry: &mut EffectTypeRegistry,
    allocator: &mut FrameUploadAllocator,
    visible: &[u32],
    args: &RenderArgs,
    backend: &mut dyn ParticleBackend,
) -> FrameStats {
    let mut stats = FrameStats::default();

    for upload in registry.take_atlas_uploads() {
        backend.write_atlas(&upload);
    }
    allocator.begin_frame();

    let mut keys: Vec<DrawKey> = visible
        .iter()
        .filter_map(|&id| {
            let effect = effects.get(id as usize)?.as_ref()?;
            let bounds = effect.world_bounds()?;
            if effect.particle_count() == 0 || !args.frustum.intersects(&bounds) {
                return None;
            }
            let ty = registry.get(effect.type_id)?;
            Some(DrawKey {
                render_order: ty.render_order,
                tiebreak: ty.tiebreak,
                dist_sq: bounds.origin.distance_squared(args.camera_position),
                effect: id,
            })
        })
        .collect();
    keys.sort_by(DrawKey::cmp);
    stats.visible = keys.len() as u32;

    let world_to_clip = args.world_to_clip.to_cols_array_2d();
    let aspect = args.aspect();
    let mut pipeline_bound = false;
    let mut bound_type = None;

    for key in keys {
        let Some(effect) = effects.get_mut(key.effect as usize).and_then(Option::as_mut) else {
            continue;
        };
        let Some(ty) = registry.get(effect.type_id) else {
            continue;
        };
        let count = effect.particle_count() as u32;

        let (slot, byte_offset) = match allocator.acquire(&mut effect.upload, count) {
            UploadDecision::Reuse { slot, byte_offset } => (slot, byte_offset),
            UploadDecision::Upload { slot, byte_offset } => {
                backend.write_particles(slot, byte_offset, bytemuck::cast_slice(effect.particles()));
                stats.uploaded_effects += 1;
                stats.uploaded_particles += count;
                (slot, byte_offset)
            }
            UploadDecision::Skip => {
                warn!(
                    target: "particle_render",
                    effect = key.effect,
                    count,
                    "particle upload budget exhausted, skipping effect this frame"
                );
                stats.skipped_budget += 1;
                continue;
            }
        };

        if !pipeline_bound {
            backend.bind_pipeline();
            pipeline_bound = true;
        }
        if bound_type != Some(effect.type_id) {
            backend.bind_type(effect.type_id, &ty.params, ty.texture.as_deref());
            bound_type = Some(effect.type_id);
            stats.type_binds += 1;
        }

        let emitter_to_world = if effect.local_space() {
            effect.emitter_to_world()
        } else {
            Mat4::IDENTITY
        };
        let recorded = backend.draw(&ParticleDraw {
            effect: EffectId(key.effect),
            slot,
            byte_offset,
            count,
            instance: InstanceParams {
                world_to_clip,
                emitter_to_world: emitter_to_world.to_cols_array_2d(),
                aspect,
                inv_delta: effect.inv_delta(),
                _pad: [0.0; 2],
            },
        });
        if recorded {
            stats.drawn += 1;
        } else {
            stats.dropped_draws += 1;
        }
    }

    trace!(target: "particle_render", ?stats, frame = allocator.frame(), "particle frame");
    stats
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Backend that records every call for inspection
    #[derive(Debug, Default)]
    pub(crate) struct RecordingBackend {
        pub atlas_writes: Vec<AtlasUpload>,
        pub particle_writes: Vec<(u32, u64, usize)>,
        pub pipeline_binds: u32,
        pub type_binds: Vec<(EffectTypeId, Option<String>)>,
        pub draws: Vec<ParticleDraw>,
        /// Draws accepted before the rest are refused
        pub draw_limit: Option<usize>,
    }

    impl ParticleBackend for RecordingBackend {
        fn write_atlas(&mut self, upload: &AtlasUpload) {
            self.atlas_writes.push(upload.clone());
        }

        fn write_particles(&mut self, slot: u32, byte_offset: u64, data: &[u8]) {
            self.particle_writes.push((slot, byte_offset, data.len()));
        }

        fn bind_pipeline(&mut self) {
            self.pipeline_binds += 1;
        }

        fn bind_type(&mut self, type_id: EffectTypeId, _params: &TypeParams, texture: Option<&str>) {
            self.type_binds.push((type_id, texture.map(str::to_owned)));
        }

        fn draw(&mut self, draw: &ParticleDraw) -> bool {
            if self.draw_limit.is_some_and(|limit| self.draws.len() >= limit) {
                return false;
            }
            self.draws.push(*draw);
            true
        }
    }

    impl RecordingBackend {
        pub fn drawn_effects(&self) -> Vec<u32> {
            self.draws.iter().map(|d| d.effect.raw()).collect()
        }
    }

    pub(crate) fn camera_at(position: Vec3) -> RenderArgs {
        let view = Mat4::look_at_rh(position, Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 1000.0);
        RenderArgs::new(view, proj)
    }

    #[test]
    fn instance_params_layout() {
        assert_eq!(std::mem::size_of::<InstanceParams>(), 144);
    }

    #[test]
    fn render_args_recover_camera() {
        let args = camera_at(Vec3::new(0.0, 5.0, 20.0));
        assert!((args.camera_position - Vec3::new(0.0, 5.0, 20.0)).length() < 1e-3);
        assert!((args.aspect() - 16.0 / 9.0).abs() < 1e-4);
        assert!(args.frustum.contains_point(Vec3::ZERO));
        assert!(!args.frustum.contains_point(Vec3::new(0.0, 5.0, 40.0)));
    }

    #[test]
    fn draw_key_order() {
        let key = |render_order, tiebreak, dist_sq, effect| DrawKey {
            render_order,
            tiebreak,
            dist_sq,
            effect,
        };
        let mut keys = vec![
            key(1, 0, 1.0, 0),
            key(0, 1, 1.0, 1),
            key(0, 0, 9.0, 2),
            key(0, 0, 4.0, 3),
            key(0, 0, 4.0, 4),
            key(-1, 5, 0.0, 5),
        ];
        keys.sort_by(DrawKey::cmp);
        let order: Vec<u32> = keys.iter().map(|k| k.effect).collect();
        assert_eq!(order, vec![5, 2, 3, 4, 1, 0]);
    }
}
