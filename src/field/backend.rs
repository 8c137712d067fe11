//! The compute backend interface fields are evaluated through.
//!
//! A backend owns named buffers, scalar and vector parameters and a set of
//! kernels dispatched over work groups. The evaluator only speaks this
//! request/response protocol, so a GPU implementation and the CPU reference
//! backend are interchangeable.

use std::fmt;

use thiserror::Error;

/// Kernel that samples terrain heights over a 2D grid.
pub const KERNEL_HEIGHTMAP: &str = "Heightmap";
/// Kernel that samples raw terrain-layer weights.
pub const KERNEL_SPLATMAP: &str = "Splatmap";
/// Kernel that samples planet densities over a 3D grid.
pub const KERNEL_DENSITY: &str = "Density";
/// Kernel that triangulates a density volume into an append buffer.
pub const KERNEL_MARCHING_CUBES: &str = "MarchingCubes";

/// Buffer and binding names shared by the evaluator and backends.
pub mod slots {
    pub const PERMS: &str = "Perms";
    pub const NOISES: &str = "Noises";
    pub const UBERS: &str = "Ubers";
    pub const HEIGHTS: &str = "Heights";
    pub const SPLATS: &str = "Splats";
    pub const DENSITIES: &str = "Densities";
    pub const TRIANGLES: &str = "Triangles";
}

/// Parameter names shared by the evaluator and backends.
pub mod params {
    pub const SIZE: &str = "size";
    pub const LAYERS: &str = "layers";
    pub const START: &str = "start";
    pub const SPACING: &str = "spacing";
    pub const SURFACE: &str = "surface";
    pub const VARIANT_COUNT: &str = "variantCount";
    pub const BLEND: &str = "blend";
    pub const CRATERS_ENABLED: &str = "cratersEnabled";
    pub const CRATER_EFFECT: &str = "craterEffect";
    pub const CRATER_THRESHOLD: &str = "craterThreshold";
    pub const CRATER_WARP: &str = "craterWarp";
    pub const CRATER_COMPOSITE: &str = "craterComposite";
    pub const CRATER_BAND: &str = "craterBand";
    pub const SHELL_CENTER: &str = "shellCenter";
    pub const SHELL_RADII: &str = "shellRadii";
}

/// Opaque handle to a backend buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u64);

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque handle to a backend kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelId(pub usize);

/// How a buffer is used by kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Plain indexed storage.
    Structured,
    /// Append-only storage with a hidden element counter.
    Append,
}

/// A named allocation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub name: String,
    pub count: usize,
    pub stride: usize,
    pub kind: BufferKind,
}

impl BufferDesc {
    pub fn structured(name: &str, count: usize, stride: usize) -> Self {
        Self {
            name: name.to_string(),
            count,
            stride,
            kind: BufferKind::Structured,
        }
    }

    pub fn append(name: &str, count: usize, stride: usize) -> Self {
        Self {
            name: name.to_string(),
            count,
            stride,
            kind: BufferKind::Append,
        }
    }
}

/// What a backend actually allocated for a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub count: usize,
    pub stride: usize,
    pub kind: BufferKind,
}

/// A kernel parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Int(i32),
    Float(f32),
    Vector([f32; 4]),
}

/// Errors reported by a compute backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("unknown kernel `{0}`")]
    UnknownKernel(String),
    #[error("unknown buffer {0}")]
    UnknownBuffer(BufferHandle),
    #[error("kernel `{kernel}` has no buffer bound to `{slot}`")]
    MissingBinding { kernel: String, slot: String },
    #[error("parameter `{0}` was never set")]
    MissingParam(String),
    #[error("parameter `{0}` has the wrong type")]
    ParamType(String),
    #[error("buffer stride {0} is not a multiple of 4 bytes")]
    InvalidStride(usize),
    #[error("buffer `{name}` cannot be viewed as {expected}-byte records")]
    Layout { name: String, expected: usize },
    #[error("write of {bytes} bytes overflows buffer {handle} ({capacity} bytes)")]
    WriteOverflow {
        handle: BufferHandle,
        bytes: usize,
        capacity: usize,
    },
    #[error("read of {count} elements at {start} exceeds the {available} available in {handle}")]
    ReadOutOfBounds {
        handle: BufferHandle,
        start: usize,
        count: usize,
        available: usize,
    },
    #[error("buffer {0} is not an append buffer")]
    NotAppend(BufferHandle),
    #[error("dispatch of `{kernel}` failed: {reason}")]
    Dispatch { kernel: String, reason: String },
}

/// A compute service that evaluates kernels over buffers.
///
/// Calls are synchronous from the caller's side: when `dispatch` returns
/// the whole batch has completed, however the backend parallelizes it.
pub trait ComputeBackend {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Looks up a kernel by name.
    fn find_kernel(&self, name: &str) -> Result<KernelId, BackendError>;

    /// Threads per work group along each axis.
    fn thread_group_size(&self, kernel: KernelId) -> Result<[u32; 3], BackendError>;

    /// Allocates a buffer. Backends may allocate less than requested.
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle, BackendError>;

    /// Reports what was actually allocated.
    fn buffer_info(&self, handle: BufferHandle) -> Result<BufferInfo, BackendError>;

    fn release_buffer(&mut self, handle: BufferHandle) -> Result<(), BackendError>;

    /// Uploads raw bytes starting at element 0.
    fn write_buffer(&mut self, handle: BufferHandle, bytes: &[u8]) -> Result<(), BackendError>;

    /// Reads `count` elements starting at `start`.
    ///
    /// Reads past the element count, or past the counter of an append
    /// buffer, fail with [`BackendError::ReadOutOfBounds`].
    fn read_buffer(
        &self,
        handle: BufferHandle,
        start: usize,
        count: usize,
    ) -> Result<Vec<u8>, BackendError>;

    fn set_param(&mut self, name: &str, value: ParamValue);

    fn bind_buffer(
        &mut self,
        kernel: KernelId,
        slot: &str,
        handle: BufferHandle,
    ) -> Result<(), BackendError>;

    /// Runs a kernel over `groups` work groups and waits for completion.
    fn dispatch(&mut self, kernel: KernelId, groups: [u32; 3]) -> Result<(), BackendError>;

    /// Zeroes the counter of an append buffer.
    fn reset_counter(&mut self, handle: BufferHandle) -> Result<(), BackendError>;

    /// Reads back the counter of an append buffer.
    fn read_counter(&self, handle: BufferHandle) -> Result<usize, BackendError>;
}
