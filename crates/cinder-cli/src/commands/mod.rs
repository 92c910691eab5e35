//! CLI command implementations

pub mod bake;
pub mod check;
pub mod render;
pub mod simulate;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use cinder_particles::EffectPrefab;

/// Load an effect definition, optionally forcing emitter-space simulation
pub fn load_prefab(path: &str, force_local: bool) -> Result<Arc<EffectPrefab>> {
    let prefab = EffectPrefab::load(Path::new(path))
        .with_context(|| format!("Failed to load effect '{}'", path))?;
    if !force_local || prefab.config().local_space {
        return Ok(prefab);
    }
    let mut config = prefab.config().clone();
    config.local_space = true;
    Ok(EffectPrefab::new(config)?)
}
