use glam::{Vec3, Vec4};
use rayon::prelude::*;

use super::{CpuBackend, CpuBuffer};
use crate::field::backend::{params, slots, BackendError, BufferHandle, BufferKind, ParamValue};
use crate::field::layout::{heightmap_backend_index, splat_backend_index, volume_index};
use crate::field::records::{blend_from_code, ErosionRecord, NoiseLayerRecord};
use crate::mesh::{march_cell, Triangle};
use crate::noise::{
    CraterOverlay, ErosionBounds, ErosionParams, NoiseConfig, NoiseLayer, NoiseModel,
    PermutationTable, PlanetShell,
};

/// Number of noise layer records a model upload carries.
pub(crate) const NOISE_RECORDS: usize = 4;
/// Number of primary erosion records before the variants.
pub(crate) const PRIMARY_EROSION_RECORDS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum KernelKind {
    Heightmap,
    Splatmap,
    Density,
    MarchingCubes,
}

pub(super) enum KernelOutput {
    /// Element writes into a structured buffer.
    Words {
        handle: BufferHandle,
        writes: Vec<(usize, Vec<u32>)>,
    },
    /// Records appended to an append buffer, in order.
    Append {
        handle: BufferHandle,
        records: Vec<Vec<u32>>,
    },
}

pub(super) fn run_kernel(
    backend: &CpuBackend,
    kernel: usize,
    kind: KernelKind,
    threads: [usize; 3],
) -> Result<KernelOutput, BackendError> {
    let ctx = KernelContext { backend, kernel };
    match kind {
        KernelKind::Heightmap => heightmap(&ctx, threads),
        KernelKind::Splatmap => splatmap(&ctx, threads),
        KernelKind::Density => density(&ctx, threads),
        KernelKind::MarchingCubes => marching_cubes(&ctx, threads),
    }
}

struct KernelContext<'a> {
    backend: &'a CpuBackend,
    kernel: usize,
}

impl<'a> KernelContext<'a> {
    fn buffer(&self, slot: &str) -> Result<&'a CpuBuffer, BackendError> {
        self.backend.bound_buffer(self.kernel, slot)
    }

    fn handle(&self, slot: &str) -> Result<BufferHandle, BackendError> {
        self.backend
            .bindings
            .get(&(self.kernel, slot.to_string()))
            .copied()
            .ok_or_else(|| BackendError::MissingBinding {
                kernel: format!("#{}", self.kernel),
                slot: slot.to_string(),
            })
    }

    fn records<T: bytemuck::Pod>(&self, slot: &str) -> Result<&'a [T], BackendError> {
        let buffer = self.buffer(slot)?;
        bytemuck::try_cast_slice(&buffer.words).map_err(|_| BackendError::Layout {
            name: buffer.name.clone(),
            expected: std::mem::size_of::<T>(),
        })
    }

    fn int(&self, name: &str) -> Result<i32, BackendError> {
        match self.backend.param(name)? {
            ParamValue::Int(v) => Ok(v),
            _ => Err(BackendError::ParamType(name.to_string())),
        }
    }

    fn float(&self, name: &str) -> Result<f32, BackendError> {
        match self.backend.param(name)? {
            ParamValue::Float(v) => Ok(v),
            _ => Err(BackendError::ParamType(name.to_string())),
        }
    }

    fn vector(&self, name: &str) -> Result<Vec4, BackendError> {
        match self.backend.param(name)? {
            ParamValue::Vector(v) => Ok(Vec4::from_array(v)),
            _ => Err(BackendError::ParamType(name.to_string())),
        }
    }

    fn size(&self, name: &str) -> Result<usize, BackendError> {
        usize::try_from(self.int(name)?).map_err(|_| BackendError::ParamType(name.to_string()))
    }

    fn output_words(&self, slot: &str, elements: usize) -> Result<BufferHandle, BackendError> {
        let buffer = self.buffer(slot)?;
        if buffer.kind != BufferKind::Structured {
            return Err(BackendError::Layout {
                name: buffer.name.clone(),
                expected: elements,
            });
        }
        self.handle(slot)
    }

    /// Rebuilds the uploaded noise model from the bound parameter buffers.
    fn model(&self) -> Result<NoiseModel, BackendError> {
        let perms: &[u32] = self.records(slots::PERMS)?;
        let perm = PermutationTable::from_entries(perms).ok_or_else(|| BackendError::Layout {
            name: slots::PERMS.to_string(),
            expected: 4,
        })?;

        let noises: &[NoiseLayerRecord] = self.records(slots::NOISES)?;
        let ubers: &[ErosionRecord] = self.records(slots::UBERS)?;
        let variant_count = self.size(params::VARIANT_COUNT)?;
        if noises.len() < NOISE_RECORDS || ubers.len() < PRIMARY_EROSION_RECORDS + variant_count {
            return Err(BackendError::Layout {
                name: slots::UBERS.to_string(),
                expected: std::mem::size_of::<ErosionRecord>(),
            });
        }

        let blend = blend_from_code(self.int(params::BLEND)?)
            .ok_or_else(|| BackendError::ParamType(params::BLEND.to_string()))?;
        let band = self.vector(params::CRATER_BAND)?;
        let crater = CraterOverlay {
            effect: self.float(params::CRATER_EFFECT)?,
            threshold: self.float(params::CRATER_THRESHOLD)?,
            warp_amount: self.float(params::CRATER_WARP)?,
            composite: self.vector(params::CRATER_COMPOSITE)?,
            noise: NoiseLayer::from(&noises[3]),
            min: band.x,
            max: band.y,
            lip: band.z,
        };

        let config = NoiseConfig {
            height: NoiseLayer::from(&noises[0]),
            splat: NoiseLayer::from(&noises[1]),
            object: NoiseLayer::from(&noises[2]),
            height_erosion: ErosionParams::from(&ubers[0]),
            splat_erosion: ErosionParams::from(&ubers[1]),
            variant_bounds: ErosionBounds::default(),
            blend,
            crater,
            craters_enabled: self.int(params::CRATERS_ENABLED)? != 0,
        };
        let variants = ubers[PRIMARY_EROSION_RECORDS..PRIMARY_EROSION_RECORDS + variant_count]
            .iter()
            .map(ErosionParams::from)
            .collect();
        // The seed itself is not uploaded; the permutation table encodes it.
        Ok(NoiseModel::from_parts(0, perm, config, variants))
    }
}

fn covered(threads: usize, size: usize) -> usize {
    threads.min(size)
}

fn heightmap(ctx: &KernelContext, threads: [usize; 3]) -> Result<KernelOutput, BackendError> {
    let size = ctx.size(params::SIZE)?;
    let start = ctx.vector(params::START)?.truncate();
    let spacing = ctx.vector(params::SPACING)?.truncate();
    let model = ctx.model()?;
    let handle = ctx.output_words(slots::HEIGHTS, size * size)?;

    let nx = covered(threads[0], size);
    let nz = covered(threads[1], size);
    let writes = (0..nx * nz)
        .into_par_iter()
        .map(|k| {
            let (x, z) = (k / nz, k % nz);
            let p = start + spacing * Vec3::new(x as f32, 0.0, z as f32);
            let h = model.surface_height(p);
            (heightmap_backend_index(x, z, size), vec![h.to_bits()])
        })
        .collect();
    Ok(KernelOutput::Words { handle, writes })
}

fn splatmap(ctx: &KernelContext, threads: [usize; 3]) -> Result<KernelOutput, BackendError> {
    let size = ctx.size(params::SIZE)?;
    let layers = ctx.size(params::LAYERS)?;
    let start = ctx.vector(params::START)?.truncate();
    let spacing = ctx.vector(params::SPACING)?.truncate();
    let model = ctx.model()?;
    let handle = ctx.output_words(slots::SPLATS, size * size * layers)?;

    let nx = covered(threads[0], size);
    let ny = covered(threads[1], size);
    let nl = covered(threads[2], layers);
    let writes = (0..nx * ny * nl)
        .into_par_iter()
        .map(|k| {
            let x = k % nx;
            let y = (k / nx) % ny;
            let layer = k / (nx * ny);
            let p = start + spacing * Vec3::new(x as f32, 0.0, y as f32);
            let w = model.splat_weight(p, layer as u32);
            (splat_backend_index(x, y, layer, size), vec![w.to_bits()])
        })
        .collect();
    Ok(KernelOutput::Words { handle, writes })
}

fn density(ctx: &KernelContext, threads: [usize; 3]) -> Result<KernelOutput, BackendError> {
    let size = ctx.size(params::SIZE)?;
    let start = ctx.vector(params::START)?.truncate();
    let spacing = ctx.vector(params::SPACING)?.truncate();
    let center = ctx.vector(params::SHELL_CENTER)?.truncate();
    let radii = ctx.vector(params::SHELL_RADII)?;
    let shell = PlanetShell {
        center,
        radius: radii.x,
        min_radius: radii.y,
        max_radius: radii.z,
    };
    let model = ctx.model()?;
    let handle = ctx.output_words(slots::DENSITIES, size * size * size)?;

    let n = [
        covered(threads[0], size),
        covered(threads[1], size),
        covered(threads[2], size),
    ];
    let writes = (0..n[0] * n[1] * n[2])
        .into_par_iter()
        .map(|k| {
            let x = k % n[0];
            let y = (k / n[0]) % n[1];
            let z = k / (n[0] * n[1]);
            let p = start + spacing * Vec3::new(x as f32, y as f32, z as f32);
            let d = model.planet_density(p, &shell);
            let words = [p.x, p.y, p.z, d].iter().map(|v| v.to_bits()).collect();
            (volume_index(x, y, z, size), words)
        })
        .collect();
    Ok(KernelOutput::Words { handle, writes })
}

fn marching_cubes(ctx: &KernelContext, threads: [usize; 3]) -> Result<KernelOutput, BackendError> {
    let size = ctx.size(params::SIZE)?;
    let surface = ctx.float(params::SURFACE)?;
    let samples: &[[f32; 4]] = ctx.records(slots::DENSITIES)?;
    if size < 2 || samples.len() < size * size * size {
        return Err(BackendError::Layout {
            name: slots::DENSITIES.to_string(),
            expected: 16,
        });
    }
    let handle = ctx.handle(slots::TRIANGLES)?;
    if ctx.buffer(slots::TRIANGLES)?.kind != BufferKind::Append {
        return Err(BackendError::NotAppend(handle));
    }

    let cells = size - 1;
    let n = [
        covered(threads[0], cells),
        covered(threads[1], cells),
        covered(threads[2], cells),
    ];
    let per_cell: Vec<Vec<Triangle>> = (0..n[0] * n[1] * n[2])
        .into_par_iter()
        .map(|k| {
            let cell = [k % n[0], (k / n[0]) % n[1], k / (n[0] * n[1])];
            let mut out = Vec::new();
            march_cell(samples, size, cell, surface, &mut out);
            out
        })
        .collect();

    let records = per_cell
        .into_iter()
        .flatten()
        .map(|t| bytemuck::cast_slice::<Triangle, u32>(&[t]).to_vec())
        .collect();
    Ok(KernelOutput::Append { handle, records })
}
