use thiserror::Error;

use crate::error::ConfigError;
use crate::field::FieldError;
use crate::mesh::MeshError;
use crate::streaming::StreamingError;

/// Errors from the terrain generators.
#[derive(Debug, Error)]
pub enum TerrainError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("field evaluation failed: {0}")]
    Field(#[from] FieldError),
    #[error("mesh extraction failed: {0}")]
    Mesh(#[from] MeshError),
    #[error("streaming failed: {0}")]
    Streaming(#[from] StreamingError),
}
