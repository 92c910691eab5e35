//! Entity identifiers supplied by the entity/component collaborator

use serde::{Deserialize, Serialize};
use std::fmt;

/// An entity identifier owned by the entity framework.
///
/// Cinder never allocates these; it only stores them next to the effects
/// the entity owns so removal requests can be routed back.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl EntityId {
    /// Create an EntityId from a raw value
    pub fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw u32 value
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
