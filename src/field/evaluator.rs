//! Field evaluation through a compute backend.

use std::sync::Arc;

use glam::Vec3;
use log::{debug, info, warn};
use thiserror::Error;

use super::backend::{
    params, slots, BackendError, BufferDesc, BufferHandle, ComputeBackend, KernelId, ParamValue,
    KERNEL_DENSITY, KERNEL_HEIGHTMAP, KERNEL_MARCHING_CUBES, KERNEL_SPLATMAP,
};
use super::buffers::BufferCache;
use super::layout::{
    group_count, heightmap_host_index, sample_spacing, splat_host_index, unpack_heightmap_index,
    unpack_splat_index,
};
use super::records::{blend_code, ErosionRecord, NoiseLayerRecord};
use super::sample::{ConfigMismatch, DensityField, FieldStatus, HeightField, SplatField};
use crate::mesh::{MeshError, Triangle, MAX_TRIANGLES_PER_CELL};
use crate::noise::{NoiseModel, PlanetShell};

/// Errors from field evaluation.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("no noise model has been published")]
    NotPublished,
    #[error("resolution {size} is too small for a {dims}D field")]
    InvalidSize { size: usize, dims: usize },
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("mesh error: {0}")]
    Mesh(#[from] MeshError),
}

/// Triangles read back from the backend, with the health of the pass.
#[derive(Debug, Clone, Default)]
pub struct TriangleStream {
    pub triangles: Vec<Triangle>,
    pub status: FieldStatus,
}

/// Samples noise fields by delegating to a compute backend.
///
/// The evaluator owns the backend-side buffers, keyed by name, and the
/// noise model currently uploaded. Every field it returns is freshly
/// allocated and sized to the requested resolution.
pub struct FieldEvaluator<B: ComputeBackend> {
    backend: B,
    buffers: BufferCache,
    model: Option<Arc<NoiseModel>>,
}

impl<B: ComputeBackend> FieldEvaluator<B> {
    /// Wraps `backend` with an empty buffer cache and no model.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            buffers: BufferCache::new(),
            model: None,
        }
    }

    /// The backend kernels run on.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the backend.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// The currently uploaded noise model.
    pub fn model(&self) -> Option<&Arc<NoiseModel>> {
        self.model.as_ref()
    }

    /// Number of backend buffers held in the cache.
    pub fn cached_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Drops every cached buffer and the uploaded model.
    pub fn invalidate(&mut self) -> Result<(), FieldError> {
        self.buffers.release_all(&mut self.backend)?;
        self.model = None;
        Ok(())
    }

    /// Uploads a noise model, replacing whatever was published before.
    ///
    /// The model buffers are staged in a fresh cache. Only when every
    /// upload succeeded are the previous buffers released and the model
    /// swapped in. A failed publish leaves the old model usable.
    pub fn publish(&mut self, model: Arc<NoiseModel>) -> Result<(), FieldError> {
        let mut staged = BufferCache::new();
        if let Err(err) = self.upload_model(&model, &mut staged) {
            if let Err(cleanup) = staged.release_all(&mut self.backend) {
                warn!("Failed to release staged model buffers: {}", cleanup);
            }
            return Err(err);
        }

        let mut previous = std::mem::replace(&mut self.buffers, staged);
        if let Err(err) = previous.release_all(&mut self.backend) {
            warn!("Failed to release buffers of the previous model: {}", err);
        }

        let config = model.config();
        let crater = &config.crater;
        self.set_int(params::VARIANT_COUNT, model.variants().len());
        self.backend.set_param(params::BLEND, ParamValue::Int(blend_code(config.blend)));
        self.backend.set_param(
            params::CRATERS_ENABLED,
            ParamValue::Int(i32::from(config.craters_enabled)),
        );
        self.backend.set_param(params::CRATER_EFFECT, ParamValue::Float(crater.effect));
        self.backend.set_param(params::CRATER_THRESHOLD, ParamValue::Float(crater.threshold));
        self.backend.set_param(params::CRATER_WARP, ParamValue::Float(crater.warp_amount));
        self.backend.set_param(
            params::CRATER_COMPOSITE,
            ParamValue::Vector(crater.composite.to_array()),
        );
        self.backend.set_param(
            params::CRATER_BAND,
            ParamValue::Vector([crater.min, crater.max, crater.lip, 0.0]),
        );

        info!(
            "Published noise model for seed {} with {} erosion variants on {}",
            model.seed(),
            model.variants().len(),
            self.backend.name()
        );
        self.model = Some(model);
        Ok(())
    }

    /// Writes the permutation, noise layer and erosion buffers of `model`
    /// into `cache`.
    fn upload_model(&mut self, model: &NoiseModel, cache: &mut BufferCache) -> Result<(), FieldError> {
        let config = model.config();
        let perms = model.permutation().entries();
        let noises = [
            NoiseLayerRecord::from(&config.height),
            NoiseLayerRecord::from(&config.splat),
            NoiseLayerRecord::from(&config.object),
            NoiseLayerRecord::from(&config.crater.noise),
        ];
        let ubers: Vec<ErosionRecord> = [&config.height_erosion, &config.splat_erosion]
            .into_iter()
            .chain(model.variants())
            .map(ErosionRecord::from)
            .collect();

        let uploads: [(BufferDesc, &[u8]); 3] = [
            (
                BufferDesc::structured(slots::PERMS, perms.len(), 4),
                bytemuck::cast_slice(&perms),
            ),
            (
                BufferDesc::structured(slots::NOISES, noises.len(), std::mem::size_of::<NoiseLayerRecord>()),
                bytemuck::cast_slice(&noises),
            ),
            (
                BufferDesc::structured(slots::UBERS, ubers.len(), std::mem::size_of::<ErosionRecord>()),
                bytemuck::cast_slice(&ubers),
            ),
        ];
        for (desc, bytes) in uploads {
            let handle = cache.ensure(&mut self.backend, &desc)?;
            self.backend.write_buffer(handle, bytes)?;
        }
        Ok(())
    }

    /// Samples terrain heights on a `size x size` grid over `[start, end]`.
    ///
    /// Heights vary along x and z; the y coordinate of `start` is used for
    /// every sample.
    pub fn heights(&mut self, start: Vec3, end: Vec3, size: usize) -> Result<HeightField, FieldError> {
        if size < 2 {
            return Err(FieldError::InvalidSize { size, dims: 2 });
        }
        let kernel = self.prepare(KERNEL_HEIGHTMAP)?;
        let mut status = FieldStatus::default();
        let count = size * size;
        let output = self.buffer(BufferDesc::structured(slots::HEIGHTS, count, 4), &mut status)?;

        self.set_sampling(start, end, size);
        self.bind_model(kernel)?;
        self.backend.bind_buffer(kernel, slots::HEIGHTS, output)?;

        let group = self.backend.thread_group_size(kernel)?;
        self.expect_flat_group(KERNEL_HEIGHTMAP, group, &mut status);
        let groups = [group_count(size, group[0]), group_count(size, group[1]), 1];
        self.backend.dispatch(kernel, groups)?;

        let raw: Vec<f32> = self.read_scalars(output, count)?;
        let mut heights = vec![0.0; count];
        for (i, h) in raw.into_iter().enumerate() {
            let (x, z) = unpack_heightmap_index(i, size);
            heights[heightmap_host_index(x, z, size)] = h;
        }
        Ok(HeightField::new(size, start, end, heights, status))
    }

    /// Samples raw terrain-layer weights on a `size x size` grid.
    pub fn splats(
        &mut self,
        start: Vec3,
        end: Vec3,
        size: usize,
        layers: usize,
    ) -> Result<SplatField, FieldError> {
        if size < 2 || layers == 0 {
            return Err(FieldError::InvalidSize { size, dims: 1 });
        }
        let kernel = self.prepare(KERNEL_SPLATMAP)?;
        let mut status = FieldStatus::default();
        let count = size * size * layers;
        let output = self.buffer(BufferDesc::structured(slots::SPLATS, count, 4), &mut status)?;

        self.set_sampling(start, end, size);
        self.set_int(params::LAYERS, layers);
        self.bind_model(kernel)?;
        self.backend.bind_buffer(kernel, slots::SPLATS, output)?;

        let group = self.backend.thread_group_size(kernel)?;
        self.expect_flat_group(KERNEL_SPLATMAP, group, &mut status);
        let groups = [
            group_count(size, group[0]),
            group_count(size, group[1]),
            group_count(layers, group[2]),
        ];
        self.backend.dispatch(kernel, groups)?;

        let raw: Vec<f32> = self.read_scalars(output, count)?;
        let mut weights = vec![0.0; count];
        for (i, w) in raw.into_iter().enumerate() {
            let (x, y, layer) = unpack_splat_index(i, size);
            weights[splat_host_index(x, y, layer, size, layers)] = w;
        }
        Ok(SplatField::new(size, layers, weights, status))
    }

    /// Samples planet densities on a `size^3` grid over `[start, end]`.
    pub fn densities(
        &mut self,
        start: Vec3,
        end: Vec3,
        size: usize,
        shell: &PlanetShell,
    ) -> Result<DensityField, FieldError> {
        if size < 2 {
            return Err(FieldError::InvalidSize { size, dims: 3 });
        }
        let kernel = self.prepare(KERNEL_DENSITY)?;
        let mut status = FieldStatus::default();
        let count = size * size * size;
        let output = self.buffer(BufferDesc::structured(slots::DENSITIES, count, 16), &mut status)?;

        self.set_sampling(start, end, size);
        self.backend.set_param(
            params::SHELL_CENTER,
            ParamValue::Vector(shell.center.extend(0.0).to_array()),
        );
        self.backend.set_param(
            params::SHELL_RADII,
            ParamValue::Vector([shell.radius, shell.min_radius, shell.max_radius, 0.0]),
        );
        self.bind_model(kernel)?;
        self.backend.bind_buffer(kernel, slots::DENSITIES, output)?;

        let group = self.backend.thread_group_size(kernel)?;
        let groups = [
            group_count(size, group[0]),
            group_count(size, group[1]),
            group_count(size, group[2]),
        ];
        self.backend.dispatch(kernel, groups)?;

        let available = self.checked_count(output, count)?;
        let bytes = self.backend.read_buffer(output, 0, available)?;
        let mut samples: Vec<[f32; 4]> = bytemuck::pod_collect_to_vec(&bytes);
        samples.resize(count, [0.0; 4]);
        Ok(DensityField::new(size, samples, status))
    }

    /// Triangulates a density field on the backend.
    ///
    /// The triangle count is read from the append buffer's counter and only
    /// that many triangles are read back, never more than were allocated.
    pub fn extract_triangles(
        &mut self,
        field: &DensityField,
        surface: f32,
    ) -> Result<TriangleStream, FieldError> {
        let size = field.size();
        if size < 2 {
            return Err(FieldError::InvalidSize { size, dims: 3 });
        }
        let kernel = self.backend.find_kernel(KERNEL_MARCHING_CUBES)?;
        let mut status = field.status().clone();
        let count = size * size * size;
        let cells = size - 1;
        let capacity = cells * cells * cells * MAX_TRIANGLES_PER_CELL;

        let densities = self.buffer(BufferDesc::structured(slots::DENSITIES, count, 16), &mut status)?;
        let available = self.checked_count(densities, count)?;
        self.backend
            .write_buffer(densities, bytemuck::cast_slice(&field.samples()[..available]))?;

        let triangles = self.buffer(
            BufferDesc::append(slots::TRIANGLES, capacity, Triangle::STRIDE),
            &mut status,
        )?;
        let capacity = self.backend.buffer_info(triangles)?.count;
        self.backend.reset_counter(triangles)?;

        self.set_int(params::SIZE, size);
        self.backend.set_param(params::SURFACE, ParamValue::Float(surface));
        self.backend.bind_buffer(kernel, slots::DENSITIES, densities)?;
        self.backend.bind_buffer(kernel, slots::TRIANGLES, triangles)?;

        let group = self.backend.thread_group_size(kernel)?;
        let groups = [
            group_count(cells, group[0]),
            group_count(cells, group[1]),
            group_count(cells, group[2]),
        ];
        self.backend.dispatch(kernel, groups)?;

        let mut produced = self.backend.read_counter(triangles)?;
        if produced > capacity {
            status.record(ConfigMismatch {
                subject: format!("buffer `{}`", slots::TRIANGLES),
                expected: format!("at most {} triangles", capacity),
                actual: produced.to_string(),
            });
            produced = capacity;
        }
        let bytes = self.backend.read_buffer(triangles, 0, produced)?;
        let triangles: Vec<Triangle> = bytemuck::pod_collect_to_vec(&bytes);
        debug!("Extracted {} triangles from a {}^3 volume", triangles.len(), size);
        Ok(TriangleStream { triangles, status })
    }

    fn prepare(&self, name: &str) -> Result<KernelId, FieldError> {
        if self.model.is_none() {
            return Err(FieldError::NotPublished);
        }
        Ok(self.backend.find_kernel(name)?)
    }

    /// Fetches a cached buffer and checks what the backend allocated.
    fn buffer(&mut self, desc: BufferDesc, status: &mut FieldStatus) -> Result<BufferHandle, FieldError> {
        let handle = self.buffers.ensure(&mut self.backend, &desc)?;
        let info = self.backend.buffer_info(handle)?;
        if info.count != desc.count || info.stride != desc.stride {
            status.record(ConfigMismatch {
                subject: format!("buffer `{}`", desc.name),
                expected: format!("{} x {}B", desc.count, desc.stride),
                actual: format!("{} x {}B", info.count, info.stride),
            });
        }
        Ok(handle)
    }

    /// Elements that can be read from a buffer, at most `expected`.
    fn checked_count(&self, handle: BufferHandle, expected: usize) -> Result<usize, FieldError> {
        Ok(self.backend.buffer_info(handle)?.count.min(expected))
    }

    fn read_scalars(&self, handle: BufferHandle, count: usize) -> Result<Vec<f32>, FieldError> {
        let available = self.checked_count(handle, count)?;
        let bytes = self.backend.read_buffer(handle, 0, available)?;
        let mut values: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes);
        values.resize(count, 0.0);
        Ok(values)
    }

    fn expect_flat_group(&self, kernel: &str, group: [u32; 3], status: &mut FieldStatus) {
        if group[2] != 1 {
            status.record(ConfigMismatch {
                subject: format!("kernel `{}` thread group", kernel),
                expected: "depth 1".to_string(),
                actual: format!("{:?}", group),
            });
        }
    }

    fn set_sampling(&mut self, start: Vec3, end: Vec3, size: usize) {
        let spacing = sample_spacing(start, end, size);
        self.set_int(params::SIZE, size);
        self.backend
            .set_param(params::START, ParamValue::Vector(start.extend(0.0).to_array()));
        self.backend
            .set_param(params::SPACING, ParamValue::Vector(spacing.extend(0.0).to_array()));
    }

    fn set_int(&mut self, name: &str, value: usize) {
        let value = i32::try_from(value).unwrap_or(i32::MAX);
        self.backend.set_param(name, ParamValue::Int(value));
    }

    fn bind_model(&mut self, kernel: KernelId) -> Result<(), FieldError> {
        for slot in [slots::PERMS, slots::NOISES, slots::UBERS] {
            let handle = self.buffers.get(slot).ok_or(FieldError::NotPublished)?;
            self.backend.bind_buffer(kernel, slot, handle)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::cpu::CpuBackend;
    use crate::mesh::extract_surface;
    use crate::noise::NoiseConfig;

    fn evaluator(seed: u64) -> FieldEvaluator<CpuBackend> {
        let mut evaluator = FieldEvaluator::new(CpuBackend::new());
        let model = NoiseModel::build(&NoiseConfig::default(), seed).unwrap();
        evaluator.publish(model).unwrap();
        evaluator
    }

    #[test]
    fn test_unpublished_evaluator_refuses() {
        let mut evaluator = FieldEvaluator::new(CpuBackend::new());
        assert!(matches!(
            evaluator.heights(Vec3::ZERO, Vec3::ONE, 4),
            Err(FieldError::NotPublished)
        ));
    }

    #[test]
    fn test_heights_match_model_orientation() {
        let mut evaluator = evaluator(15);
        let start = Vec3::new(-20.0, 0.0, -20.0);
        let end = Vec3::new(20.0, 0.0, 20.0);
        let field = evaluator.heights(start, end, 9).unwrap();
        assert!(!field.is_dirty());
        assert_eq!(field.as_slice().len(), 81);

        let model = evaluator.model().unwrap().clone();
        let spacing = sample_spacing(start, end, 9);
        for (x, z) in [(0, 0), (8, 0), (0, 8), (3, 5), (7, 2)] {
            let p = start + spacing * Vec3::new(x as f32, 0.0, z as f32);
            assert_eq!(
                field.get(x, z),
                model.surface_height(p),
                "Height at column {} row {} is transposed or misplaced",
                x,
                z
            );
        }
    }

    #[test]
    fn test_heights_deterministic() {
        let a = evaluator(7).heights(Vec3::ZERO, Vec3::splat(40.0), 5).unwrap();
        let b = evaluator(7).heights(Vec3::ZERO, Vec3::splat(40.0), 5).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_splats_layout() {
        let mut evaluator = evaluator(3);
        let start = Vec3::new(0.0, 0.0, 0.0);
        let end = Vec3::new(40.0, 0.0, 40.0);
        let field = evaluator.splats(start, end, 8, 3).unwrap();
        let model = evaluator.model().unwrap().clone();
        let spacing = sample_spacing(start, end, 8);
        for (x, y, layer) in [(0, 0, 0), (7, 1, 2), (2, 6, 1)] {
            let p = start + spacing * Vec3::new(x as f32, 0.0, y as f32);
            assert_eq!(field.get(x, y, layer), model.splat_weight(p, layer as u32));
        }
    }

    #[test]
    fn test_densities_carry_positions() {
        let mut evaluator = evaluator(1);
        let shell = PlanetShell::default();
        let field = evaluator
            .densities(Vec3::splat(-100.0), Vec3::splat(100.0), 5, &shell)
            .unwrap();
        assert_eq!(field.position(0, 0, 0), Vec3::splat(-100.0));
        assert_eq!(field.position(4, 4, 4), Vec3::splat(100.0));
        assert_eq!(field.density(2, 2, 2), 1.0, "Planet centre is solid");
        assert_eq!(field.density(0, 0, 0), 0.0, "Corner of the box is empty space");
    }

    #[test]
    fn test_backend_extraction_matches_host() {
        let mut evaluator = evaluator(1);
        let shell = PlanetShell::default();
        let field = evaluator
            .densities(Vec3::splat(-100.0), Vec3::splat(100.0), 12, &shell)
            .unwrap();
        let stream = evaluator.extract_triangles(&field, 0.5).unwrap();
        assert!(!stream.triangles.is_empty());
        assert_eq!(stream.triangles, extract_surface(&field, 0.5).unwrap());
    }

    #[test]
    fn test_single_solid_sample_via_backend() {
        let mut evaluator = FieldEvaluator::new(CpuBackend::new());
        let start = Vec3::splat(-10.0);
        let end = Vec3::splat(10.0);
        let field = DensityField::from_fn(start, end, 8, |_, index| {
            if index == [4, 4, 4] {
                1.0
            } else {
                0.0
            }
        });
        let stream = evaluator.extract_triangles(&field, 0.5).unwrap();
        assert!(!stream.status.is_dirty());
        assert_eq!(stream.triangles.len(), 8);
        for t in &stream.triangles {
            for v in t.vertices() {
                assert!(v.cmpge(start).all() && v.cmple(end).all());
            }
        }
    }

    #[test]
    fn test_triangle_overflow_is_clamped_and_flagged() {
        let mut evaluator = FieldEvaluator::new(CpuBackend::new().with_append_limit(3));
        let field = DensityField::from_fn(Vec3::splat(-10.0), Vec3::splat(10.0), 8, |_, index| {
            if index == [4, 4, 4] {
                1.0
            } else {
                0.0
            }
        });
        let stream = evaluator.extract_triangles(&field, 0.5).unwrap();
        assert_eq!(stream.triangles.len(), 3, "Read back no more than the buffer holds");
        assert!(stream.status.is_dirty(), "An overflowing pass must be flagged");
        assert!(
            stream.status.issues().iter().any(|issue| {
                issue.subject == "buffer `Triangles`"
                    && issue.expected == "at most 3 triangles"
                    && issue.actual == "8"
            }),
            "Missing overflow issue in {:?}",
            stream.status.issues()
        );
        let host = extract_surface(&field, 0.5).unwrap();
        assert_eq!(stream.triangles[..], host[..3], "The kept triangles are the first ones produced");
    }

    #[test]
    fn test_buffers_reused_across_passes() {
        let mut evaluator = evaluator(2);
        evaluator.heights(Vec3::ZERO, Vec3::ONE, 4).unwrap();
        let before = evaluator.backend().live_buffers();
        evaluator.heights(Vec3::ONE, Vec3::splat(2.0), 4).unwrap();
        assert_eq!(evaluator.backend().live_buffers(), before);
        evaluator.heights(Vec3::ONE, Vec3::splat(2.0), 6).unwrap();
        assert_eq!(evaluator.backend().live_buffers(), before, "Resized buffer replaces the old one");
    }

    #[test]
    fn test_short_allocation_marks_field_dirty() {
        let mut evaluator = FieldEvaluator::new(CpuBackend::new().with_allocation_limit(300));
        let model = NoiseModel::build(&NoiseConfig::default(), 4).unwrap();
        evaluator.publish(model).unwrap();
        let field = evaluator.heights(Vec3::ZERO, Vec3::splat(10.0), 20).unwrap();
        assert!(field.is_dirty(), "A truncated buffer must be reported");
        assert_eq!(field.as_slice().len(), 400, "Field still has the requested size");
    }

    #[test]
    fn test_deep_thread_group_marks_field_dirty() {
        let backend = CpuBackend::new().with_thread_group(KERNEL_HEIGHTMAP, [1, 1, 4]);
        let mut evaluator = FieldEvaluator::new(backend);
        evaluator
            .publish(NoiseModel::build(&NoiseConfig::default(), 4).unwrap())
            .unwrap();
        let field = evaluator.heights(Vec3::ZERO, Vec3::splat(10.0), 5).unwrap();
        assert!(field.is_dirty());
    }

    #[test]
    fn test_dispatch_failure_is_distinguishable() {
        let mut evaluator = evaluator(5);
        evaluator.backend_mut().fail_dispatches("device lost");
        let result = evaluator.heights(Vec3::ZERO, Vec3::ONE, 4);
        assert!(matches!(
            result,
            Err(FieldError::Backend(BackendError::Dispatch { .. }))
        ));
    }

    #[test]
    fn test_republish_discards_caches() {
        let mut evaluator = evaluator(5);
        evaluator.heights(Vec3::ZERO, Vec3::ONE, 4).unwrap();
        assert!(evaluator.cached_buffers() > 3);
        evaluator
            .publish(NoiseModel::build(&NoiseConfig::default(), 6).unwrap())
            .unwrap();
        assert_eq!(evaluator.cached_buffers(), 3, "Only the model buffers survive");
        assert_eq!(evaluator.model().unwrap().seed(), 6);
    }

    #[test]
    fn test_failed_publish_keeps_previous_model() {
        let mut evaluator = evaluator(5);
        let before = evaluator.heights(Vec3::ZERO, Vec3::ONE, 4).unwrap();
        let cached = evaluator.cached_buffers();
        let live = evaluator.backend().live_buffers();

        evaluator.backend_mut().set_allocation_limit(Some(8));
        let result = evaluator.publish(NoiseModel::build(&NoiseConfig::default(), 6).unwrap());
        assert!(
            matches!(result, Err(FieldError::Backend(BackendError::WriteOverflow { .. }))),
            "Expected an overflowing upload, got {:?}",
            result
        );
        assert_eq!(evaluator.model().unwrap().seed(), 5, "The previous model stays published");
        assert_eq!(evaluator.cached_buffers(), cached);
        assert_eq!(evaluator.backend().live_buffers(), live, "Staged buffers are released");

        evaluator.backend_mut().set_allocation_limit(None);
        let after = evaluator.heights(Vec3::ZERO, Vec3::ONE, 4).unwrap();
        assert_eq!(before, after, "Sampling still uses the previous model");
    }
}
