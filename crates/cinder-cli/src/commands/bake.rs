//! Print the baked curve rows of an effect

use anyhow::Result;
use cinder_particles::atlas::{bake_slot, CurveSet, SAMPLE_RATE};

use super::load_prefab;

/// Texel indices of `count` evenly spaced samples over one row
fn sample_indices(count: usize) -> Vec<usize> {
    let last = SAMPLE_RATE as usize - 1;
    match count {
        0 => Vec::new(),
        1 => vec![0],
        n => (0..n).map(|k| k * last / (n - 1)).collect(),
    }
}

pub fn run(path: &str, samples: usize) -> Result<()> {
    let prefab = load_prefab(path, false)?;
    let c = prefab.config();
    let baked = bake_slot(&CurveSet {
        scale: &c.scale_curve,
        alpha: &c.alpha_curve,
        additive: &c.additive_curve,
        erosion: &c.erosion_curve,
        gradient: &c.gradient,
    });

    for channel in &baked.reordered {
        println!("Note: {} control points were sorted by x before baking", channel);
    }

    let row = SAMPLE_RATE as usize * 4;
    println!(
        "{:>6} {:>6} {:>6} {:>8} {:>8}  color",
        "age", "scale", "alpha", "additive", "erosion"
    );
    for i in sample_indices(samples) {
        let curve = &baked.texels[i * 4..i * 4 + 4];
        let color = &baked.texels[row + i * 4..row + i * 4 + 4];
        println!(
            "{:>6.3} {:>6.3} {:>6.3} {:>8.3} {:>8.3}  #{:02x}{:02x}{:02x}",
            i as f32 / (SAMPLE_RATE - 1) as f32,
            curve[0] as f32 / 255.0,
            curve[1] as f32 / 255.0,
            1.0 - curve[2] as f32 / 255.0,
            curve[3] as f32 / 255.0,
            color[0],
            color[1],
            color[2]
        );
    }

    Ok(())
}
