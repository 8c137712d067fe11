//! CPU reference implementation of the compute backend.
//!
//! Buffers live in host memory as 32-bit words; kernels run with rayon,
//! parallel over sample points. Results are bit-identical to evaluating
//! the noise model directly, which makes this backend the reference for
//! determinism tests.

mod kernels;

use std::collections::HashMap;

use log::{debug, warn};

use super::backend::{
    BackendError, BufferDesc, BufferHandle, BufferInfo, BufferKind, ComputeBackend, KernelId,
    ParamValue, KERNEL_DENSITY, KERNEL_HEIGHTMAP, KERNEL_MARCHING_CUBES, KERNEL_SPLATMAP,
};
use kernels::{run_kernel, KernelKind, KernelOutput};

#[derive(Debug, Clone)]
struct KernelSpec {
    name: &'static str,
    kind: KernelKind,
    thread_group: [u32; 3],
}

#[derive(Debug, Clone)]
pub(crate) struct CpuBuffer {
    name: String,
    count: usize,
    stride: usize,
    kind: BufferKind,
    words: Vec<u32>,
    counter: usize,
}

impl CpuBuffer {
    fn capacity_bytes(&self) -> usize {
        self.words.len() * 4
    }

    /// Elements that may be read back.
    fn readable(&self) -> usize {
        match self.kind {
            BufferKind::Structured => self.count,
            BufferKind::Append => self.counter.min(self.count),
        }
    }
}

/// Host-memory compute backend.
#[derive(Debug, Clone)]
pub struct CpuBackend {
    kernels: Vec<KernelSpec>,
    buffers: HashMap<BufferHandle, CpuBuffer>,
    next_handle: u64,
    params: HashMap<String, ParamValue>,
    bindings: HashMap<(usize, String), BufferHandle>,
    allocation_limit: Option<usize>,
    append_limit: Option<usize>,
    dispatch_fault: Option<String>,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    pub fn new() -> Self {
        let kernels = vec![
            KernelSpec {
                name: KERNEL_HEIGHTMAP,
                kind: KernelKind::Heightmap,
                thread_group: [1, 1, 1],
            },
            KernelSpec {
                name: KERNEL_SPLATMAP,
                kind: KernelKind::Splatmap,
                thread_group: [8, 8, 1],
            },
            KernelSpec {
                name: KERNEL_DENSITY,
                kind: KernelKind::Density,
                thread_group: [4, 4, 4],
            },
            KernelSpec {
                name: KERNEL_MARCHING_CUBES,
                kind: KernelKind::MarchingCubes,
                thread_group: [8, 8, 8],
            },
        ];
        Self {
            kernels,
            buffers: HashMap::new(),
            next_handle: 1,
            params: HashMap::new(),
            bindings: HashMap::new(),
            allocation_limit: None,
            append_limit: None,
            dispatch_fault: None,
        }
    }

    /// Overrides the thread group shape of a kernel.
    pub fn with_thread_group(mut self, kernel: &str, group: [u32; 3]) -> Self {
        for spec in self.kernels.iter_mut().filter(|spec| spec.name == kernel) {
            spec.thread_group = group;
        }
        self
    }

    /// Caps every allocation at `count` elements, like a device with
    /// little memory would.
    pub fn with_allocation_limit(mut self, count: usize) -> Self {
        self.allocation_limit = Some(count);
        self
    }

    /// Changes the allocation cap for buffers created from now on.
    pub fn set_allocation_limit(&mut self, limit: Option<usize>) {
        self.allocation_limit = limit;
    }

    /// Caps append buffers at `count` elements, leaving structured
    /// buffers at their requested size.
    pub fn with_append_limit(mut self, count: usize) -> Self {
        self.append_limit = Some(count);
        self
    }

    /// Makes every following dispatch fail with `reason`.
    pub fn fail_dispatches(&mut self, reason: &str) {
        self.dispatch_fault = Some(reason.to_string());
    }

    /// Lets dispatches succeed again after [`fail_dispatches`](Self::fail_dispatches).
    pub fn clear_fault(&mut self) {
        self.dispatch_fault = None;
    }

    /// Number of buffers currently allocated.
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    fn buffer(&self, handle: BufferHandle) -> Result<&CpuBuffer, BackendError> {
        self.buffers
            .get(&handle)
            .ok_or(BackendError::UnknownBuffer(handle))
    }

    fn buffer_mut(&mut self, handle: BufferHandle) -> Result<&mut CpuBuffer, BackendError> {
        self.buffers
            .get_mut(&handle)
            .ok_or(BackendError::UnknownBuffer(handle))
    }

    fn kernel_spec(&self, kernel: KernelId) -> Result<&KernelSpec, BackendError> {
        self.kernels
            .get(kernel.0)
            .ok_or_else(|| BackendError::UnknownKernel(format!("#{}", kernel.0)))
    }

    pub(crate) fn bound_buffer(&self, kernel: usize, slot: &str) -> Result<&CpuBuffer, BackendError> {
        let name = self.kernels.get(kernel).map(|spec| spec.name).unwrap_or("?");
        let handle = self
            .bindings
            .get(&(kernel, slot.to_string()))
            .ok_or_else(|| BackendError::MissingBinding {
                kernel: name.to_string(),
                slot: slot.to_string(),
            })?;
        self.buffer(*handle)
    }

    pub(crate) fn param(&self, name: &str) -> Result<ParamValue, BackendError> {
        self.params
            .get(name)
            .copied()
            .ok_or_else(|| BackendError::MissingParam(name.to_string()))
    }

    fn apply(&mut self, output: KernelOutput) -> Result<(), BackendError> {
        match output {
            KernelOutput::Words { handle, writes } => {
                let buffer = self.buffer_mut(handle)?;
                let words_per_element = buffer.stride / 4;
                let mut dropped = 0usize;
                // Out-of-range writes are discarded, as on a GPU.
                for (index, values) in writes {
                    let at = index * words_per_element;
                    if at + values.len() > buffer.words.len() {
                        dropped += 1;
                        continue;
                    }
                    buffer.words[at..at + values.len()].copy_from_slice(&values);
                }
                if dropped > 0 {
                    warn!("Dropped {} writes past the end of buffer `{}`", dropped, buffer.name);
                }
            }
            KernelOutput::Append { handle, records } => {
                let buffer = self.buffer_mut(handle)?;
                let words_per_element = buffer.stride / 4;
                for record in records {
                    let at = buffer.counter * words_per_element;
                    if buffer.counter < buffer.count && record.len() == words_per_element {
                        buffer.words[at..at + words_per_element].copy_from_slice(&record);
                    }
                    buffer.counter += 1;
                }
                if buffer.counter > buffer.count {
                    warn!(
                        "Append buffer `{}` overflowed: {} records for {} slots",
                        buffer.name, buffer.counter, buffer.count
                    );
                }
            }
        }
        Ok(())
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn find_kernel(&self, name: &str) -> Result<KernelId, BackendError> {
        self.kernels
            .iter()
            .position(|spec| spec.name == name)
            .map(KernelId)
            .ok_or_else(|| BackendError::UnknownKernel(name.to_string()))
    }

    fn thread_group_size(&self, kernel: KernelId) -> Result<[u32; 3], BackendError> {
        Ok(self.kernel_spec(kernel)?.thread_group)
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle, BackendError> {
        if desc.stride == 0 || desc.stride % 4 != 0 {
            return Err(BackendError::InvalidStride(desc.stride));
        }
        let mut count = match self.allocation_limit {
            Some(limit) => desc.count.min(limit),
            None => desc.count,
        };
        if let (BufferKind::Append, Some(limit)) = (desc.kind, self.append_limit) {
            count = count.min(limit);
        }
        let handle = BufferHandle(self.next_handle);
        self.next_handle += 1;
        self.buffers.insert(
            handle,
            CpuBuffer {
                name: desc.name.clone(),
                count,
                stride: desc.stride,
                kind: desc.kind,
                words: vec![0; count * desc.stride / 4],
                counter: 0,
            },
        );
        Ok(handle)
    }

    fn buffer_info(&self, handle: BufferHandle) -> Result<BufferInfo, BackendError> {
        let buffer = self.buffer(handle)?;
        Ok(BufferInfo {
            count: buffer.count,
            stride: buffer.stride,
            kind: buffer.kind,
        })
    }

    fn release_buffer(&mut self, handle: BufferHandle) -> Result<(), BackendError> {
        self.buffers
            .remove(&handle)
            .ok_or(BackendError::UnknownBuffer(handle))?;
        self.bindings.retain(|_, bound| *bound != handle);
        Ok(())
    }

    fn write_buffer(&mut self, handle: BufferHandle, bytes: &[u8]) -> Result<(), BackendError> {
        let buffer = self.buffer_mut(handle)?;
        if bytes.len() > buffer.capacity_bytes() || bytes.len() % 4 != 0 {
            return Err(BackendError::WriteOverflow {
                handle,
                bytes: bytes.len(),
                capacity: buffer.capacity_bytes(),
            });
        }
        let target: &mut [u8] = bytemuck::cast_slice_mut(&mut buffer.words);
        target[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read_buffer(
        &self,
        handle: BufferHandle,
        start: usize,
        count: usize,
    ) -> Result<Vec<u8>, BackendError> {
        let buffer = self.buffer(handle)?;
        let available = buffer.readable();
        if start + count > available {
            return Err(BackendError::ReadOutOfBounds {
                handle,
                start,
                count,
                available,
            });
        }
        let bytes: &[u8] = bytemuck::cast_slice(&buffer.words);
        Ok(bytes[start * buffer.stride..(start + count) * buffer.stride].to_vec())
    }

    fn set_param(&mut self, name: &str, value: ParamValue) {
        self.params.insert(name.to_string(), value);
    }

    fn bind_buffer(
        &mut self,
        kernel: KernelId,
        slot: &str,
        handle: BufferHandle,
    ) -> Result<(), BackendError> {
        self.kernel_spec(kernel)?;
        self.buffer(handle)?;
        self.bindings.insert((kernel.0, slot.to_string()), handle);
        Ok(())
    }

    fn dispatch(&mut self, kernel: KernelId, groups: [u32; 3]) -> Result<(), BackendError> {
        let spec = self.kernel_spec(kernel)?.clone();
        if let Some(reason) = &self.dispatch_fault {
            return Err(BackendError::Dispatch {
                kernel: spec.name.to_string(),
                reason: reason.clone(),
            });
        }
        let threads = [
            groups[0] as usize * spec.thread_group[0] as usize,
            groups[1] as usize * spec.thread_group[1] as usize,
            groups[2] as usize * spec.thread_group[2] as usize,
        ];
        debug!("Dispatching `{}` over {:?} threads", spec.name, threads);
        let output = run_kernel(self, kernel.0, spec.kind, threads)?;
        self.apply(output)
    }

    fn reset_counter(&mut self, handle: BufferHandle) -> Result<(), BackendError> {
        let buffer = self.buffer_mut(handle)?;
        if buffer.kind != BufferKind::Append {
            return Err(BackendError::NotAppend(handle));
        }
        buffer.counter = 0;
        Ok(())
    }

    fn read_counter(&self, handle: BufferHandle) -> Result<usize, BackendError> {
        let buffer = self.buffer(handle)?;
        if buffer.kind != BufferKind::Append {
            return Err(BackendError::NotAppend(handle));
        }
        Ok(buffer.counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_lookup() {
        let backend = CpuBackend::new();
        let id = backend.find_kernel(KERNEL_DENSITY).unwrap();
        assert_eq!(backend.thread_group_size(id).unwrap(), [4, 4, 4]);
        assert!(matches!(
            backend.find_kernel("Erode"),
            Err(BackendError::UnknownKernel(_))
        ));
    }

    #[test]
    fn test_write_then_read() {
        let mut backend = CpuBackend::new();
        let handle = backend.create_buffer(&BufferDesc::structured("A", 4, 4)).unwrap();
        let values = [1.0f32, 2.0, 3.0, 4.0];
        backend.write_buffer(handle, bytemuck::cast_slice(&values)).unwrap();
        let bytes = backend.read_buffer(handle, 1, 2).unwrap();
        let read: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes);
        assert_eq!(read, vec![2.0, 3.0]);
    }

    #[test]
    fn test_read_past_count_fails() {
        let mut backend = CpuBackend::new();
        let handle = backend.create_buffer(&BufferDesc::structured("A", 4, 4)).unwrap();
        assert!(matches!(
            backend.read_buffer(handle, 2, 3),
            Err(BackendError::ReadOutOfBounds { available: 4, .. })
        ));
    }

    #[test]
    fn test_append_reads_limited_by_counter() {
        let mut backend = CpuBackend::new();
        let handle = backend.create_buffer(&BufferDesc::append("T", 10, 36)).unwrap();
        backend.reset_counter(handle).unwrap();
        assert_eq!(backend.read_counter(handle).unwrap(), 0);
        assert!(
            backend.read_buffer(handle, 0, 1).is_err(),
            "Nothing was appended, so nothing may be read"
        );
    }

    #[test]
    fn test_counter_on_structured_buffer_rejected() {
        let mut backend = CpuBackend::new();
        let handle = backend.create_buffer(&BufferDesc::structured("A", 4, 4)).unwrap();
        assert_eq!(backend.read_counter(handle), Err(BackendError::NotAppend(handle)));
    }

    #[test]
    fn test_invalid_stride() {
        let mut backend = CpuBackend::new();
        assert_eq!(
            backend.create_buffer(&BufferDesc::structured("A", 4, 6)),
            Err(BackendError::InvalidStride(6))
        );
    }

    #[test]
    fn test_allocation_limit_shrinks_buffers() {
        let mut backend = CpuBackend::new().with_allocation_limit(8);
        let handle = backend.create_buffer(&BufferDesc::structured("A", 64, 4)).unwrap();
        assert_eq!(backend.buffer_info(handle).unwrap().count, 8);
    }

    #[test]
    fn test_append_limit_leaves_structured_buffers() {
        let mut backend = CpuBackend::new().with_append_limit(3);
        let append = backend.create_buffer(&BufferDesc::append("T", 64, 36)).unwrap();
        let plain = backend.create_buffer(&BufferDesc::structured("A", 64, 4)).unwrap();
        assert_eq!(backend.buffer_info(append).unwrap().count, 3);
        assert_eq!(backend.buffer_info(plain).unwrap().count, 64);
    }

    #[test]
    fn test_injected_fault_surfaces() {
        let mut backend = CpuBackend::new();
        backend.fail_dispatches("device lost");
        let id = backend.find_kernel(KERNEL_HEIGHTMAP).unwrap();
        assert!(matches!(
            backend.dispatch(id, [1, 1, 1]),
            Err(BackendError::Dispatch { .. })
        ));
        backend.clear_fault();
        assert!(
            !matches!(backend.dispatch(id, [1, 1, 1]), Err(BackendError::Dispatch { .. })),
            "Clearing the fault must restore dispatches"
        );
    }
}
