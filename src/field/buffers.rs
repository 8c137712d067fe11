//! Named cache of backend buffers.

use std::collections::HashMap;

use log::debug;

use super::backend::{BackendError, BufferDesc, BufferHandle, ComputeBackend};

#[derive(Debug, Clone)]
struct CachedBuffer {
    handle: BufferHandle,
    desc: BufferDesc,
}

/// Backend buffers keyed by logical name.
///
/// A request matching the cached count, stride and kind reuses the
/// allocation. Any other request releases the stale buffer and allocates
/// a replacement; a buffer is never truncated or reinterpreted.
#[derive(Debug, Default)]
pub struct BufferCache {
    entries: HashMap<String, CachedBuffer>,
}

impl BufferCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a buffer matching `desc`, allocating if needed.
    pub fn ensure<B: ComputeBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        desc: &BufferDesc,
    ) -> Result<BufferHandle, BackendError> {
        if let Some(cached) = self.entries.get(&desc.name) {
            if cached.desc == *desc {
                return Ok(cached.handle);
            }
        }

        if let Some(stale) = self.entries.remove(&desc.name) {
            debug!(
                "Replacing buffer `{}` ({} x {}B -> {} x {}B)",
                desc.name, stale.desc.count, stale.desc.stride, desc.count, desc.stride
            );
            backend.release_buffer(stale.handle)?;
        }

        let handle = backend.create_buffer(desc)?;
        debug!("Allocated buffer `{}` as {} on {}", desc.name, handle, backend.name());
        self.entries.insert(
            desc.name.clone(),
            CachedBuffer {
                handle,
                desc: desc.clone(),
            },
        );
        Ok(handle)
    }

    /// Handle of a cached buffer.
    pub fn get(&self, name: &str) -> Option<BufferHandle> {
        self.entries.get(name).map(|cached| cached.handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Releases every cached buffer.
    pub fn release_all<B: ComputeBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<(), BackendError> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        for name in names {
            if let Some(cached) = self.entries.remove(&name) {
                backend.release_buffer(cached.handle)?;
            }
        }
        Ok(())
    }
}
