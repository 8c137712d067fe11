//! Per-tick fill and cull of the live cell map.

use std::collections::HashMap;

use glam::{IVec3, Vec3};
use log::{debug, trace};

use super::config::{CullPolicy, GridConfig};
use super::instantiate::{Instantiator, VariantSet};
use super::key::CellKey;
use crate::noise::NoiseModel;

/// Lifecycle state of a cell key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    /// Not in the live map (never created, or destroyed).
    Absent,
    Active,
    /// Hidden but retained for reuse.
    Inactive,
}

/// A cell of the candidate box around the streaming center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub key: CellKey,
    pub position: Vec3,
    pub distance_sq: f32,
}

/// Transitions applied by one [`StreamingGrid::tick`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub center: CellKey,
    /// Candidates inside the cull radius.
    pub in_range: usize,
    pub spawned: Vec<CellKey>,
    pub reactivated: Vec<CellKey>,
    pub hidden: Vec<CellKey>,
    pub destroyed: Vec<CellKey>,
    /// In-range cells left absent by the creation cap.
    pub deferred: Vec<CellKey>,
}

impl TickReport {
    /// Whether the tick changed no cell.
    pub fn is_quiet(&self) -> bool {
        self.spawned.is_empty()
            && self.reactivated.is_empty()
            && self.hidden.is_empty()
            && self.destroyed.is_empty()
            && self.deferred.is_empty()
    }
}

struct LiveCell<H> {
    handle: H,
    active: bool,
}

/// The live set of streamed cells around a tracked point.
///
/// Each tick re-snaps the center to the lattice, fills the candidate box
/// nearest first, then culls every mapped cell outside the cull radius.
pub struct StreamingGrid<I: Instantiator> {
    config: GridConfig,
    instantiator: I,
    variants: VariantSet,
    cells: HashMap<CellKey, LiveCell<I::Handle>>,
    center: CellKey,
}

impl<I: Instantiator> StreamingGrid<I> {
    /// Creates an empty grid that spawns through `instantiator`.
    pub fn new(config: GridConfig, instantiator: I, variants: VariantSet) -> Self {
        Self {
            config,
            instantiator,
            variants,
            cells: HashMap::new(),
            center: CellKey::ORIGIN,
        }
    }

    /// The grid's configuration.
    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// The instantiator cells are spawned through.
    pub fn instantiator(&self) -> &I {
        &self.instantiator
    }

    /// Mutable access to the instantiator.
    pub fn instantiator_mut(&mut self) -> &mut I {
        &mut self.instantiator
    }

    /// Variants new cells are picked from.
    pub fn variants(&self) -> &VariantSet {
        &self.variants
    }

    /// Center key of the last tick.
    pub fn center(&self) -> CellKey {
        self.center
    }

    /// World position of `key` on this grid.
    pub fn position_of(&self, key: CellKey) -> Vec3 {
        key.world_position(self.config.offset, self.config.lock_y)
    }

    /// Lifecycle state of the cell at `key`.
    pub fn state(&self, key: CellKey) -> CellState {
        match self.cells.get(&key) {
            None => CellState::Absent,
            Some(cell) if cell.active => CellState::Active,
            Some(_) => CellState::Inactive,
        }
    }

    /// Handle of a mapped cell.
    pub fn handle(&self, key: CellKey) -> Option<&I::Handle> {
        self.cells.get(&key).map(|cell| &cell.handle)
    }

    /// Number of mapped cells, active or not.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether no cell is mapped.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of active cells.
    pub fn active_count(&self) -> usize {
        self.cells.values().filter(|cell| cell.active).count()
    }

    /// Active cells with their handles, in key order.
    pub fn active_cells(&self) -> Vec<(CellKey, &I::Handle)> {
        let mut active: Vec<_> = self
            .cells
            .iter()
            .filter(|(_, cell)| cell.active)
            .map(|(key, cell)| (*key, &cell.handle))
            .collect();
        active.sort_by_key(|(key, _)| *key);
        active
    }

    /// Candidate cells around `tracked`, nearest first.
    ///
    /// Equal distances are ordered by key so the order is reproducible.
    pub fn candidates(&self, tracked: Vec3) -> Vec<Candidate> {
        let offset = self.config.offset;
        let center = CellKey::snap(tracked, offset, self.config.lock_y.is_some());
        let origin = self.position_of(center);
        let repeat = self.config.effective_repeat().as_ivec3();
        let low = (repeat - IVec3::ONE) / 2;

        let mut out = Vec::with_capacity((repeat.x * repeat.y * repeat.z) as usize);
        for x in 0..repeat.x {
            for y in 0..repeat.y {
                for z in 0..repeat.z {
                    let key = center.offset_by(IVec3::new(x, y, z) - low);
                    let position = self.position_of(key);
                    out.push(Candidate {
                        key,
                        position,
                        distance_sq: position.distance_squared(origin),
                    });
                }
            }
        }
        out.sort_by(|a, b| {
            a.distance_sq
                .total_cmp(&b.distance_sq)
                .then_with(|| a.key.cmp(&b.key))
        });
        out
    }

    /// Advances the grid to `tracked`.
    ///
    /// # Arguments
    /// * `tracked` - World position the grid follows
    /// * `model` - Noise model used to pick variants for new cells
    pub fn tick(&mut self, tracked: Vec3, model: &NoiseModel) -> TickReport {
        let candidates = self.candidates(tracked);
        self.center = CellKey::snap(tracked, self.config.offset, self.config.lock_y.is_some());
        let origin = self.position_of(self.center);
        let radius_sq = self.config.cull_radius_sq();
        let culled = |d2: f32| radius_sq.map_or(true, |r2| d2 > r2);

        let mut report = TickReport {
            center: self.center,
            ..Default::default()
        };
        let cap = self.config.fill_mode.creation_cap();

        for candidate in candidates.iter().filter(|c| !culled(c.distance_sq)) {
            report.in_range += 1;
            if let Some(cell) = self.cells.get_mut(&candidate.key) {
                if !cell.active {
                    self.instantiator.set_active(&cell.handle, true);
                    cell.active = true;
                    trace!("Reactivated cell {}", candidate.key);
                    report.reactivated.push(candidate.key);
                }
            } else if report.spawned.len() < cap {
                let variant = self.variants.choose(model, candidate.position);
                let handle = self
                    .instantiator
                    .instantiate(variant, candidate.key, candidate.position);
                trace!("Spawned `{}` at cell {}", variant, candidate.key);
                self.cells.insert(candidate.key, LiveCell { handle, active: true });
                report.spawned.push(candidate.key);
            } else {
                report.deferred.push(candidate.key);
            }
        }

        let mut leaving: Vec<CellKey> = self
            .cells
            .keys()
            .filter(|key| culled(self.position_of(**key).distance_squared(origin)))
            .copied()
            .collect();
        leaving.sort();

        for key in leaving {
            match self.config.cull_policy {
                CullPolicy::Hide => {
                    if let Some(cell) = self.cells.get_mut(&key) {
                        if cell.active {
                            self.instantiator.set_active(&cell.handle, false);
                            cell.active = false;
                            report.hidden.push(key);
                        }
                    }
                }
                CullPolicy::Destroy => {
                    if let Some(cell) = self.cells.remove(&key) {
                        self.instantiator.destroy(cell.handle);
                        report.destroyed.push(key);
                    }
                }
            }
        }

        if !report.is_quiet() {
            debug!(
                "Tick at {}: {} spawned, {} reactivated, {} hidden, {} destroyed, {} deferred",
                report.center,
                report.spawned.len(),
                report.reactivated.len(),
                report.hidden.len(),
                report.destroyed.len(),
                report.deferred.len()
            );
        }
        report
    }

    /// Destroys every handle and empties the map.
    ///
    /// # Returns
    /// The number of cells destroyed.
    pub fn clear(&mut self) -> usize {
        let count = self.cells.len();
        let mut keys: Vec<CellKey> = self.cells.keys().copied().collect();
        keys.sort();
        for key in keys {
            if let Some(cell) = self.cells.remove(&key) {
                self.instantiator.destroy(cell.handle);
            }
        }
        if count > 0 {
            debug!("Cleared {} streamed cells", count);
        }
        count
    }
}
