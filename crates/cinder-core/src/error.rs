//! Error types for Cinder

use thiserror::Error;

/// The main error type for Cinder operations
#[derive(Debug, Error)]
pub enum CinderError {
    #[error("Invalid config: {field} {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(String),

    #[error("TOML serialization error: {0}")]
    TomlSerError(String),

    #[error("Effect not found: {0}")]
    EffectNotFound(u32),

    #[error("Effect type not found: {0}")]
    EffectTypeNotFound(String),

    #[error("Curve atlas is full ({capacity} slots)")]
    AtlasFull { capacity: u32 },

    #[error("Render error: {0}")]
    RenderError(String),
}

/// Result type alias for Cinder operations
pub type Result<T> = std::result::Result<T, CinderError>;

impl CinderError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        CinderError::InvalidConfig {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<toml::de::Error> for CinderError {
    fn from(err: toml::de::Error) -> Self {
        CinderError::TomlParseError(err.to_string())
    }
}

impl From<toml::ser::Error> for CinderError {
    fn from(err: toml::ser::Error) -> Self {
        CinderError::TomlSerError(err.to_string())
    }
}
