//! Noise model for terrain synthesis.
//!
//! Multi-octave simplex layers, eroded fractal noise and crater overlays,
//! all driven by a seeded permutation table and published together as an
//! immutable [`NoiseModel`].

mod crater;
mod layer;
mod model;
mod permutation;
mod simplex;
mod uber;

pub use crater::{evaluate_crater, rim_profile, CraterOverlay};
pub use layer::{evaluate_base, evaluate_base_ranged, NoiseLayer};
pub use model::{NoiseConfig, NoiseModel, PlanetShell};
pub use permutation::{PermutationTable, PERMUTATION_SIZE};
pub use simplex::{simplex3, simplex3_with_derivative};
pub use uber::{evaluate_erosion, evaluate_population, ErosionBlend, ErosionBounds, ErosionParams};
