//! Headless effect stepping

use anyhow::{Context, Result};
use cinder_core::{EntityId, Transform};
use cinder_particles::{ParticleSystem, ParticleSystemDesc};
use cinder_runtime::FlatAreaIndex;
use glam::Vec3;

use super::load_prefab;

pub struct SimulateArgs {
    pub effect: String,
    pub steps: u32,
    pub dt: f32,
    pub seed: u64,
    pub local: bool,
    pub burst: u32,
}

fn fmt_vec3(v: Vec3) -> String {
    format!("({:.3}, {:.3}, {:.3})", v.x, v.y, v.z)
}

pub fn run(args: SimulateArgs) -> Result<()> {
    let prefab = load_prefab(&args.effect, args.local)?;
    let mut system = ParticleSystem::new(ParticleSystemDesc {
        seed: args.seed,
        ..Default::default()
    });
    let mut areas = FlatAreaIndex::new();
    let id = system
        .add_effect(&mut areas, EntityId(1), 0, &prefab, &Transform::IDENTITY)
        .context("Failed to add effect")?;
    if args.burst > 0 {
        system.queue_burst(id, args.burst)?;
    }

    println!("Effect: {}", args.effect);
    println!("Hash:   {}", prefab.hash());
    println!(
        "Space:  {}",
        if prefab.config().local_space { "local" } else { "world" }
    );
    println!();
    println!("{:>5} {:>8}  bounds (min .. max)", "step", "alive");

    for step in 1..=args.steps {
        system.update_particles(&[id.raw()], args.dt);
        let effect = system.effect(id).context("Effect disappeared during simulation")?;
        match effect.bounds() {
            Some(b) => println!(
                "{:>5} {:>8}  {} .. {}",
                step,
                effect.particle_count(),
                fmt_vec3(b.min()),
                fmt_vec3(b.max())
            ),
            None => println!("{:>5} {:>8}  -", step, effect.particle_count()),
        }
    }

    Ok(())
}
