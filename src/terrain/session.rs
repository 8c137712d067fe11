//! State shared by both generators: seed, published model, evaluator,
//! streaming grid and the regeneration timer.

use std::sync::Arc;

use log::info;

use super::config::RegenSchedule;
use super::error::TerrainError;
use crate::field::{ComputeBackend, FieldEvaluator};
use crate::noise::{NoiseConfig, NoiseModel};
use crate::streaming::{GridConfig, Instantiator, StreamingGrid, VariantSet};

/// Accumulates tick time and fires on the configured interval.
#[derive(Debug, Clone, Default)]
pub struct RegenTimer {
    schedule: RegenSchedule,
    elapsed: f32,
}

impl RegenTimer {
    pub fn new(schedule: RegenSchedule) -> Self {
        Self {
            schedule,
            elapsed: 0.0,
        }
    }

    /// Adds `dt` seconds; returns `true` when a regeneration is due.
    pub fn advance(&mut self, dt: f32) -> bool {
        if !self.schedule.enabled {
            return false;
        }
        self.elapsed += dt.max(0.0);
        if self.elapsed >= self.schedule.interval {
            self.elapsed = 0.0;
            return true;
        }
        false
    }
}

pub(crate) struct Session<B: ComputeBackend, I: Instantiator> {
    pub seed: u64,
    pub noise: NoiseConfig,
    pub model: Arc<NoiseModel>,
    pub evaluator: FieldEvaluator<B>,
    pub grid: StreamingGrid<I>,
    pub timer: RegenTimer,
}

pub(crate) struct SessionParts<'a> {
    pub seed: u64,
    pub noise: &'a NoiseConfig,
    pub grid: GridConfig,
    pub variants: &'a [String],
    pub safe_variant: &'a str,
    pub regen: RegenSchedule,
}

impl<B: ComputeBackend, I: Instantiator> Session<B, I> {
    pub fn new(parts: SessionParts<'_>, backend: B, instantiator: I) -> Result<Self, TerrainError> {
        let variants = VariantSet::resolve(parts.variants, parts.safe_variant, &instantiator)?;
        let model = NoiseModel::build(parts.noise, parts.seed)?;
        let mut evaluator = FieldEvaluator::new(backend);
        evaluator.publish(Arc::clone(&model))?;
        Ok(Self {
            seed: parts.seed,
            noise: parts.noise.clone(),
            model,
            evaluator,
            grid: StreamingGrid::new(parts.grid, instantiator, variants),
            timer: RegenTimer::new(parts.regen),
        })
    }

    /// Rebuilds everything for `seed`.
    ///
    /// The new model is built and published before any cell is torn down,
    /// so a failure at either step leaves the previous generation in place.
    pub fn reseed(&mut self, seed: u64) -> Result<usize, TerrainError> {
        let model = NoiseModel::build(&self.noise, seed)?;
        self.evaluator.publish(Arc::clone(&model))?;
        let cleared = self.grid.clear();
        self.seed = seed;
        self.model = model;
        info!("Regenerated terrain for seed {} ({} cells cleared)", seed, cleared);
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_disabled_never_fires() {
        let mut timer = RegenTimer::new(RegenSchedule::default());
        assert!(!(0..100).any(|_| timer.advance(1.0)));
    }

    #[test]
    fn test_timer_fires_on_interval() {
        let mut timer = RegenTimer::new(RegenSchedule {
            enabled: true,
            interval: 1.0,
        });
        assert!(!timer.advance(0.4));
        assert!(!timer.advance(0.4));
        assert!(timer.advance(0.4), "1.2s accumulated");
        assert!(!timer.advance(0.5), "Elapsed time resets after firing");
    }
}
