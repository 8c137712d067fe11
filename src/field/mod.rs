//! Dense field evaluation through an injected compute backend.
//!
//! [`FieldEvaluator`] turns a sampling region and resolution into a
//! heightmap, splat-weight or density field by dispatching kernels on a
//! [`ComputeBackend`]. [`cpu::CpuBackend`] is the reference backend.

mod backend;
mod buffers;
pub mod cpu;
mod evaluator;
pub mod layout;
mod records;
mod sample;

pub use backend::{
    params, slots, BackendError, BufferDesc, BufferHandle, BufferInfo, BufferKind,
    ComputeBackend, KernelId, ParamValue, KERNEL_DENSITY, KERNEL_HEIGHTMAP,
    KERNEL_MARCHING_CUBES, KERNEL_SPLATMAP,
};
pub use buffers::BufferCache;
pub use cpu::CpuBackend;
pub use evaluator::{FieldError, FieldEvaluator, TriangleStream};
pub use records::{ErosionRecord, NoiseLayerRecord};
pub use sample::{ConfigMismatch, DensityField, FieldStatus, HeightField, SplatField};
