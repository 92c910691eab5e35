//! Cinder Render - wgpu backend for particle effects
//!
//! Implements `cinder_particles::ParticleBackend` on top of a wgpu render
//! pass: ring storage buffers for streamed particle records, a shared curve
//! atlas texture, and one premultiplied-alpha sprite pipeline.

mod backend;
mod error;
mod headless;
pub mod particle_pipeline;
mod texture_cache;

pub use backend::WgpuParticleBackend;
pub use error::RenderError;
pub use headless::HeadlessContext;
pub use particle_pipeline::{ParticlePipeline, DEFAULT_MAX_DRAWS};
pub use texture_cache::{GpuTexture, SpriteTextures};
