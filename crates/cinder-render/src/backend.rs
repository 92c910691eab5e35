//! `ParticleBackend` over a live wgpu render pass

use cinder_particles::{AtlasUpload, EffectTypeId, ParticleBackend, ParticleDraw, TypeParams};
use tracing::{debug, warn};

use crate::particle_pipeline::ParticlePipeline;
use crate::texture_cache::SpriteTextures;

/// Records particle draws into `pass`.
///
/// Buffer and texture writes go through the queue, so they land before the
/// command buffer holding `pass` executes.
pub struct WgpuParticleBackend<'a, 'pass> {
    queue: &'a wgpu::Queue,
    pipeline: &'a ParticlePipeline,
    textures: &'a SpriteTextures,
    pass: &'a mut wgpu::RenderPass<'pass>,
    draws: u32,
    warned_full: bool,
}

impl<'a, 'pass> WgpuParticleBackend<'a, 'pass> {
    pub fn new(
        queue: &'a wgpu::Queue,
        pipeline: &'a ParticlePipeline,
        textures: &'a SpriteTextures,
        pass: &'a mut wgpu::RenderPass<'pass>,
    ) -> Self {
        Self {
            queue,
            pipeline,
            textures,
            pass,
            draws: 0,
            warned_full: false,
        }
    }
}

impl ParticleBackend for WgpuParticleBackend<'_, '_> {
    fn write_atlas(&mut self, upload: &AtlasUpload) {
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.pipeline.atlas_texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: upload.x,
                    y: upload.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            &upload.data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(upload.bytes_per_row()),
                rows_per_image: Some(upload.height),
            },
            wgpu::Extent3d {
                width: upload.width,
                height: upload.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn write_particles(&mut self, slot: u32, byte_offset: u64, data: &[u8]) {
        match self.pipeline.ring_buffers.get(slot as usize) {
            Some(buffer) => self.queue.write_buffer(buffer, byte_offset, data),
            None => warn!(target: "particle_render", slot, "particle upload to unknown ring slot"),
        }
    }

    fn bind_pipeline(&mut self) {
        self.pass.set_pipeline(&self.pipeline.pipeline);
        self.pass
            .set_index_buffer(self.pipeline.quad_index_buffer.slice(..), wgpu::IndexFormat::Uint32);
    }

    fn bind_type(&mut self, type_id: EffectTypeId, params: &TypeParams, texture: Option<&str>) {
        let offset = u64::from(type_id.raw()) * self.pipeline.type_stride;
        self.queue
            .write_buffer(&self.pipeline.type_buffer, offset, bytemuck::bytes_of(params));
        self.pass
            .set_bind_group(1, &self.pipeline.type_bind_group, &[offset as u32]);

        if let Some(name) = texture {
            if !self.textures.contains(name) {
                debug!(target: "particle_render", texture = name, "sprite texture not loaded, using fallback");
            }
        }
        self.pass
            .set_bind_group(2, &self.textures.get_or_default(texture).bind_group, &[]);
    }

    fn draw(&mut self, draw: &ParticleDraw) -> bool {
        if self.draws >= self.pipeline.max_draws {
            if !self.warned_full {
                warn!(
                    target: "particle_render",
                    max_draws = self.pipeline.max_draws,
                    "particle instance buffer full, dropping draws"
                );
                self.warned_full = true;
            }
            return false;
        }
        let Some(ring) = self.pipeline.ring_bind_groups.get(draw.slot as usize) else {
            warn!(target: "particle_render", slot = draw.slot, "draw from unknown ring slot");
            return false;
        };

        let instance_offset = u64::from(self.draws) * self.pipeline.instance_stride;
        self.draws += 1;
        self.queue.write_buffer(
            &self.pipeline.instance_buffer,
            instance_offset,
            bytemuck::bytes_of(&draw.instance),
        );

        self.pass.set_bind_group(
            0,
            &self.pipeline.frame_bind_group,
            &[instance_offset as u32],
        );
        self.pass.set_bind_group(3, ring, &[draw.byte_offset as u32]);
        self.pass.draw_indexed(0..draw.index_count(), 0, 0..1);
        true
    }
}
