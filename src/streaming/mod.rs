//! Spatial streaming of fixed-size cells around a tracked point.
//!
//! [`StreamingGrid`] owns the map from [`CellKey`] to the handles an
//! [`Instantiator`] returns, and decides each tick which cells are
//! created, reused, hidden or destroyed. [`LodConfig`] maps distance to
//! a voxel resolution for the planet path.

mod config;
mod grid;
mod instantiate;
mod key;
mod lod;

pub use config::{CullMode, CullPolicy, FillMode, GridConfig};
pub use grid::{Candidate, CellState, StreamingGrid, TickReport};
pub use instantiate::{Instantiator, StreamingError, VariantSet};
pub use key::CellKey;
pub use lod::{LodConfig, LodTracker};

#[cfg(test)]
pub(crate) use instantiate::testing;
