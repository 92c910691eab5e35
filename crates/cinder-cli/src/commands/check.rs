//! Validate an effect definition

use anyhow::Result;

use super::load_prefab;

pub fn run(path: &str) -> Result<()> {
    let prefab = load_prefab(path, false)?;
    let c = prefab.config();

    println!("OK: {}", path);
    println!("  hash:         {}", prefab.hash());
    println!("  time step:    {}s", c.time_step);
    println!(
        "  spawn every:  {}s (+{}s variance)",
        c.spawn_time, c.spawn_time_variance
    );
    println!(
        "  lifetime:     {}s (+{}s variance)",
        c.life_time, c.life_time_variance
    );
    if let Some(duration) = c.emit_duration {
        println!("  emits for:    {}s", duration);
    }
    if c.burst_count > 0 {
        println!("  burst:        {}", c.burst_count);
    }
    println!(
        "  space:        {}",
        if c.local_space { "local" } else { "world" }
    );
    println!("  render order: {}", c.render_order);
    println!(
        "  texture:      {}",
        c.texture.as_deref().unwrap_or("(white)")
    );
    if !c.gravity_points.is_empty() {
        println!("  wells:        {}", c.gravity_points.len());
    }

    Ok(())
}
