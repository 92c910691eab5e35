//! Cinder Particles - lane-packed particle simulation with bounded GPU streaming
//!
//! Provides:
//! - Box/sphere spawn distributions with fast approximate trig
//! - B-spline curve and gradient baking into a shared curve atlas
//! - Reference-counted effect types keyed by authored content
//! - Fixed-step, 4-wide particle simulation with free-list recycling
//! - A per-frame upload budget over a ring of GPU regions
//! - Visibility-ordered, type-batched draws over a pluggable backend

pub mod atlas;
pub mod config;
pub mod curves;
pub mod effect;
pub mod particle;
pub mod rand;
pub mod registry;
pub mod render;
pub mod sampler;
pub mod system;
pub mod upload;

pub use atlas::{AtlasUpload, ATLAS_HEIGHT, ATLAS_WIDTH};
pub use config::{EffectConfig, EffectPrefab, GravityPoint};
pub use curves::{Curve, Gradient, GradientPoint};
pub use effect::{Effect, EffectId, SimLimits};
pub use particle::GpuParticle;
pub use registry::{EffectTypeId, EffectTypeRegistry, TypeParams};
pub use render::{FrameStats, InstanceParams, ParticleBackend, ParticleDraw, RenderArgs};
pub use sampler::{RandomSphere, RandomVec3};
pub use system::{ParticleSystem, ParticleSystemDesc};
pub use upload::{UploadConfig, GPU_PARTICLE_SIZE};
