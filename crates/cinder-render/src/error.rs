//! Render error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to get adapter")]
    AdapterNotFound,
    #[error("Failed to create device: {0}")]
    DeviceCreation(String),
    #[error("Failed to read render buffer: {0}")]
    BufferReadFailed(String),
    #[error("Unsupported particle configuration: {0}")]
    Unsupported(String),
    #[error("Failed to load texture '{name}': {reason}")]
    TextureLoad { name: String, reason: String },
}
