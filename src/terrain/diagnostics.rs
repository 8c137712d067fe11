//! Human-readable dump of a generator's active configuration.

use serde::Serialize;

use super::config::{FlatTerrainConfig, PlanetConfig};
use super::session::Session;
use crate::error::ConfigError;
use crate::field::{
    ComputeBackend, KERNEL_DENSITY, KERNEL_HEIGHTMAP, KERNEL_MARCHING_CUBES, KERNEL_SPLATMAP,
};
use crate::noise::{ErosionParams, NoiseConfig};
use crate::streaming::{GridConfig, Instantiator, LodConfig};

/// Everything a generator is currently running with.
///
/// Informational only; nothing reads it back.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigDump {
    pub generator: String,
    pub seed: u64,
    pub backend: String,
    pub kernels: Vec<String>,
    /// Resolved variant names, after safe-default substitution.
    pub variants: Vec<String>,
    pub terrain_layers: Vec<String>,
    pub grid: GridConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lod: Option<LodConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface: Option<f32>,
    pub noise: NoiseConfig,
    /// Erosion parameter sets sampled for this seed.
    pub erosion_variants: Vec<ErosionParams>,
}

impl ConfigDump {
    pub(crate) fn flat<B: ComputeBackend, I: Instantiator>(
        config: &FlatTerrainConfig,
        session: &Session<B, I>,
    ) -> Self {
        Self {
            generator: "flat".to_string(),
            kernels: vec![KERNEL_HEIGHTMAP.to_string(), KERNEL_SPLATMAP.to_string()],
            terrain_layers: config.terrain_layers.clone(),
            lod: None,
            surface: None,
            ..Self::common(session)
        }
    }

    pub(crate) fn planet<B: ComputeBackend, I: Instantiator>(
        config: &PlanetConfig,
        session: &Session<B, I>,
    ) -> Self {
        Self {
            generator: "planet".to_string(),
            kernels: vec![KERNEL_DENSITY.to_string(), KERNEL_MARCHING_CUBES.to_string()],
            lod: Some(config.lod),
            surface: Some(config.surface),
            ..Self::common(session)
        }
    }

    fn common<B: ComputeBackend, I: Instantiator>(session: &Session<B, I>) -> Self {
        Self {
            generator: String::new(),
            seed: session.seed,
            backend: session.evaluator.backend().name().to_string(),
            kernels: Vec::new(),
            variants: session.grid.variants().names().to_vec(),
            terrain_layers: Vec::new(),
            grid: session.grid.config().clone(),
            lod: None,
            surface: None,
            noise: session.model.config().clone(),
            erosion_variants: session.model.variants().to_vec(),
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
