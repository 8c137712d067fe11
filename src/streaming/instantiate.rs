//! The instantiation collaborator and variant resolution.

use glam::Vec3;
use log::warn;
use thiserror::Error;

use super::key::CellKey;
use crate::error::ConfigError;
use crate::noise::NoiseModel;

/// Errors from the streaming layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StreamingError {
    #[error("variant `{requested}` is unavailable and so is the safe default `{fallback}`")]
    MissingResource { requested: String, fallback: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Creates and owns the renderable content of streamed cells.
///
/// The grid only stores the returned handles; their lifetime belongs to
/// the implementor.
pub trait Instantiator {
    type Handle;

    /// Whether `variant` names content this instantiator can create.
    fn has_variant(&self, variant: &str) -> bool;

    fn instantiate(&mut self, variant: &str, key: CellKey, position: Vec3) -> Self::Handle;

    fn set_active(&mut self, handle: &Self::Handle, active: bool);

    fn destroy(&mut self, handle: Self::Handle);
}

/// Variant names checked against an instantiator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSet {
    names: Vec<String>,
}

impl VariantSet {
    /// Resolves `requested` names, replacing any the instantiator lacks
    /// with `safe_default`.
    ///
    /// # Returns
    /// An error only when a replacement is needed and `safe_default` is
    /// unavailable as well. An empty request resolves to the safe default.
    pub fn resolve<I: Instantiator + ?Sized>(
        requested: &[String],
        safe_default: &str,
        instantiator: &I,
    ) -> Result<Self, StreamingError> {
        let fallback = |name: &str| {
            if instantiator.has_variant(safe_default) {
                Ok(safe_default.to_string())
            } else {
                Err(StreamingError::MissingResource {
                    requested: name.to_string(),
                    fallback: safe_default.to_string(),
                })
            }
        };

        if requested.is_empty() {
            return Ok(Self {
                names: vec![fallback(safe_default)?],
            });
        }

        let names = requested
            .iter()
            .map(|name| {
                if instantiator.has_variant(name) {
                    Ok(name.clone())
                } else {
                    warn!("Variant `{}` not found, using `{}`", name, safe_default);
                    fallback(name)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Variant for a cell at `position`, picked by the model's object noise.
    pub fn choose(&self, model: &NoiseModel, position: Vec3) -> &str {
        if self.names.len() == 1 {
            return &self.names[0];
        }
        &self.names[model.variant_index(position, self.names.len())]
    }
}
