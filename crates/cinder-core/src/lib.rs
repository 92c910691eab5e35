//! Cinder Core - Foundational types for the Cinder particle engine
//!
//! This crate provides the core types that all other Cinder crates depend on:
//! - `EntityId` - Identifiers handed out by the entity collaborator
//! - `ContentHash` - SHA-256 based content identity for authored configs
//! - `Transform`, `Bounds3`, `Frustum` - Spatial types
//! - Error types and Result alias

mod error;
mod frustum;
mod hash;
mod id;
mod types;

pub use error::{CinderError, Result};
pub use frustum::{Frustum, Plane};
pub use hash::ContentHash;
pub use id::EntityId;
pub use types::{Bounds3, Transform};
