//! Cinder Runtime - collaborator interfaces around the particle engine
//!
//! The particle engine does not own entities or spatial visibility. This
//! crate describes the seams it plugs into:
//! - `EntitySystem` - per-component callbacks driven by the entity framework
//! - `AreaIndex` - registration of culling volumes with the visibility system
//! - `VisibleSets` - the "active" and "visible" id lists produced each frame
//! - `FlatAreaIndex` - a brute-force reference index for tools and tests

mod area;
mod system;

pub use area::{AreaGroup, AreaId, AreaIndex, FlatAreaIndex, VisibleSets};
pub use system::{EntityComponent, EntitySystem, TransformUpdate};
