//! Headless effect-to-PNG render command

use std::path::Path;

use anyhow::{Context, Result};
use cinder_core::{EntityId, Transform};
use cinder_particles::{ParticleSystem, ParticleSystemDesc, RenderArgs as CameraArgs};
use cinder_render::{HeadlessContext, ParticlePipeline, SpriteTextures, DEFAULT_MAX_DRAWS};
use cinder_runtime::{AreaGroup, FlatAreaIndex, VisibleSets};
use glam::{Mat4, Vec3};
use tracing::warn;

use super::load_prefab;

pub struct RenderArgs {
    pub effect: String,
    pub output: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub dt: f32,
    pub seed: u64,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub target: Option<[f32; 3]>,
    pub fov: f32,
}

/// Eye position orbiting `target` at `distance`
fn orbit_eye(target: Vec3, distance: f32, yaw_deg: f32, pitch_deg: f32) -> Vec3 {
    let (yaw, pitch) = (yaw_deg.to_radians(), pitch_deg.to_radians());
    target
        + distance
            * Vec3::new(
                pitch.cos() * yaw.sin(),
                pitch.sin(),
                pitch.cos() * yaw.cos(),
            )
}

pub fn run(args: RenderArgs) -> Result<()> {
    let prefab = load_prefab(&args.effect, false)?;
    let desc = ParticleSystemDesc {
        seed: args.seed,
        ..Default::default()
    };
    let mut system = ParticleSystem::new(desc);
    let mut areas = FlatAreaIndex::new();
    system
        .add_effect(&mut areas, EntityId(1), 0, &prefab, &Transform::IDENTITY)
        .context("Failed to add effect")?;

    let mut sets = VisibleSets::default();
    areas.collect(AreaGroup::ParticleEffect, None, &mut sets);
    for _ in 0..args.steps {
        system.update_particles(&sets.active, args.dt);
    }

    let ctx = pollster::block_on(HeadlessContext::new(args.width, args.height))
        .context("Failed to create headless render context")?;
    let pipeline = ParticlePipeline::new(
        &ctx.device,
        &ctx.queue,
        ctx.format,
        &desc.upload,
        DEFAULT_MAX_DRAWS,
    )
    .context("Failed to create particle pipeline")?;

    let mut textures =
        SpriteTextures::new(&ctx.device, &ctx.queue, &pipeline.sprite_bind_group_layout);
    if let Some(name) = prefab.config().texture.as_deref() {
        // Texture names resolve relative to the effect file
        let base = Path::new(&args.effect).parent().unwrap_or(Path::new("."));
        if let Err(e) = textures.load_file(
            &ctx.device,
            &ctx.queue,
            &pipeline.sprite_bind_group_layout,
            name,
            &base.join(name),
        ) {
            warn!("{}, rendering with the white fallback", e);
        }
    }

    let target = args.target.map_or(Vec3::ZERO, Vec3::from);
    let eye = orbit_eye(target, args.distance, args.yaw, args.pitch);
    let camera = CameraArgs::new(
        Mat4::look_at_rh(eye, target, Vec3::Y),
        Mat4::perspective_rh(args.fov.to_radians(), ctx.aspect_ratio(), 0.1, 1000.0),
    );
    areas.collect(AreaGroup::ParticleEffect, Some(&camera.frustum), &mut sets);

    let stats = ctx.render_particles(
        &pipeline,
        &textures,
        &mut system,
        &sets.visible,
        &camera,
        [0.02, 0.02, 0.03, 1.0],
    );

    let pixels = pollster::block_on(ctx.read_pixels()).context("Failed to read back pixels")?;
    image::save_buffer(
        &args.output,
        &pixels,
        args.width,
        args.height,
        image::ColorType::Rgba8,
    )
    .with_context(|| format!("Failed to save '{}'", args.output))?;

    println!(
        "Rendered {} effect(s), {} particle(s) uploaded -> {}",
        stats.drawn, stats.uploaded_particles, args.output
    );
    if stats.dropped_draws > 0 {
        warn!("{} draw(s) dropped, the instance buffer is full", stats.dropped_draws);
    }
    Ok(())
}
