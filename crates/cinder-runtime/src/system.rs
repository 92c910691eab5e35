//! Entity system trait

use cinder_core::{EntityId, Transform};
use glam::Mat4;

use crate::area::AreaIndex;

/// The link between an entity and one component owned by a system.
///
/// `user_id` is whatever handle the owning system returned when the
/// component was attached (for particles, the effect id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityComponent {
    pub user_id: u32,
    pub component_index: u8,
}

/// A transform change delivered by the entity framework
#[derive(Debug, Clone, Copy)]
pub struct TransformUpdate {
    pub transform: Transform,
    pub entity_to_world: Mat4,
}

impl TransformUpdate {
    pub fn from_transform(transform: Transform) -> Self {
        Self {
            transform,
            entity_to_world: transform.to_matrix(),
        }
    }
}

/// A system owning per-entity components.
///
/// The entity framework calls these in frame order on the simulation thread,
/// passing along the visibility index so systems can keep their areas current.
/// Removal is two-phase: `prepare_for_remove` is polled until it returns
/// true, then `remove` finalizes.
pub trait EntitySystem {
    /// Called whenever the owning entity moves
    fn update_transform(
        &mut self,
        areas: &mut dyn AreaIndex,
        entity: EntityId,
        ec: &EntityComponent,
        update: &TransformUpdate,
    );

    /// Called every frame while the entity is pending removal.
    /// Return true once the component can be torn down.
    fn prepare_for_remove(&mut self, _entity: EntityId, _ec: &EntityComponent) -> bool {
        true
    }

    /// Finalize removal of the component
    fn remove(&mut self, areas: &mut dyn AreaIndex, entity: EntityId, ec: &EntityComponent);

    /// Human-readable name for this system
    fn name(&self) -> &str;
}
