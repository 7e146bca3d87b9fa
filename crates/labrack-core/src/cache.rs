//! Per-vessel component caches.
//!
//! Finding the labs or experiment storages on a vessel means walking every
//! part. Capacity queries run every frame, so the result is cached per
//! vessel and only rebuilt when the vessel's identity or part count
//! changes. A second, cheaper list of free components sits on top of the
//! storage cache and is refreshed when an experiment moves.
//!
//! The caches are plain owned values. The driver forwards scene changes,
//! vessel destruction and experiment moves to them as method calls.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::equipment_type::EquipmentType;
use crate::id::{LabId, StorageId, VesselId};
use crate::lab::LabDirectory;
use crate::vessel::FindComponents;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// The game scene just loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameScene {
    Loading,
    MainMenu,
    SpaceCenter,
    Editor,
    Flight,
    TrackingStation,
}

impl GameScene {
    /// Scenes in which live vessels persist, so cached entries stay valid.
    pub fn keeps_vessels_live(self) -> bool {
        matches!(
            self,
            GameScene::SpaceCenter | GameScene::Flight | GameScene::TrackingStation
        )
    }
}

/// Which entries a cache keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retention {
    /// Only the most recently queried vessel. Destroying any vessel clears
    /// the cache.
    ActiveVesselOnly,
    /// One entry per vessel. Destroying a vessel drops only its entry.
    AllVessels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub retention: Retention,
    /// Clear everything when the game clock runs backwards (revert).
    pub revert_guard: bool,
}

impl CacheConfig {
    /// Experiment-storage cache: the active vessel only.
    pub const STORAGE: CacheConfig = CacheConfig {
        retention: Retention::ActiveVesselOnly,
        revert_guard: false,
    };

    /// Lab cache: every vessel, guarded against reverts.
    pub const LABS: CacheConfig = CacheConfig {
        retention: Retention::AllVessels,
        revert_guard: true,
    };
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig::LABS
    }
}

/// Counters for observing cache behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub rebuilds: u64,
    /// Wholesale or per-vessel drops that removed at least one entry.
    pub invalidations: u64,
}

// ---------------------------------------------------------------------------
// VesselComponentCache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CacheEntry<C> {
    part_count: usize,
    components: Vec<C>,
    generation: u64,
}

/// Lazily rebuilt per-vessel index of components of type `C`.
///
/// An entry is valid while the vessel id and part count it was built from
/// are unchanged. Any mismatch rebuilds the whole entry.
#[derive(Debug, Clone)]
pub struct VesselComponentCache<C> {
    config: CacheConfig,
    entries: HashMap<VesselId, CacheEntry<C>>,
    last_query_time: Option<f64>,
    next_generation: u64,
    stats: CacheStats,
}

impl<C: Clone> VesselComponentCache<C> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            last_query_time: None,
            next_generation: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, vessel: VesselId) -> bool {
        self.entries.contains_key(&vessel)
    }

    /// Build number of the vessel's current entry. Changes on every rebuild.
    pub fn generation(&self, vessel: VesselId) -> Option<u64> {
        self.entries.get(&vessel).map(|e| e.generation)
    }

    /// Cached components without validation or bookkeeping.
    pub fn peek(&self, vessel: VesselId) -> &[C] {
        self.entries
            .get(&vessel)
            .map_or(&[], |e| e.components.as_slice())
    }

    /// Components of `vessel`, rebuilding the entry if it is stale.
    ///
    /// `now` is the game clock, used by the revert guard.
    pub fn get<V>(&mut self, vessel: &V, now: f64) -> &[C]
    where
        V: FindComponents<C> + ?Sized,
    {
        self.check_clock(now);
        let id = vessel.id();
        let part_count = vessel.part_count();

        if self.config.retention == Retention::ActiveVesselOnly {
            let before = self.entries.len();
            self.entries.retain(|k, _| *k == id);
            if self.entries.len() != before {
                self.stats.invalidations += 1;
            }
        }

        let next_generation = &mut self.next_generation;
        let stats = &mut self.stats;
        let entry = match self.entries.entry(id) {
            Entry::Occupied(occupied) => {
                let entry = occupied.into_mut();
                if entry.part_count == part_count {
                    stats.hits += 1;
                } else {
                    *next_generation += 1;
                    entry.components = vessel.find_components();
                    entry.part_count = part_count;
                    entry.generation = *next_generation;
                    stats.rebuilds += 1;
                    debug!(vessel = %id, part_count, "component cache rebuilt");
                }
                entry
            }
            Entry::Vacant(vacant) => {
                *next_generation += 1;
                stats.rebuilds += 1;
                debug!(vessel = %id, part_count, "component cache built");
                vacant.insert(CacheEntry {
                    part_count,
                    components: vessel.find_components(),
                    generation: *next_generation,
                })
            }
        };
        &entry.components
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.stats.invalidations += 1;
            debug!("component cache cleared");
        }
    }

    /// Clear unless the new scene keeps live vessels.
    pub fn on_scene_loaded(&mut self, scene: GameScene) {
        if !scene.keeps_vessels_live() {
            self.clear();
        }
    }

    pub fn on_vessel_destroyed(&mut self, vessel: VesselId) {
        match self.config.retention {
            Retention::ActiveVesselOnly => self.clear(),
            Retention::AllVessels => {
                if self.entries.remove(&vessel).is_some() {
                    self.stats.invalidations += 1;
                    debug!(%vessel, "component cache entry dropped");
                }
            }
        }
    }

    fn check_clock(&mut self, now: f64) {
        if self.config.revert_guard {
            if let Some(last) = self.last_query_time {
                if now < last {
                    debug!(now, last, "game clock moved backwards");
                    self.clear();
                }
            }
        }
        self.last_query_time = Some(now);
    }
}

// ---------------------------------------------------------------------------
// FreeListCache
// ---------------------------------------------------------------------------

/// A component cache plus a derived list of the free components.
///
/// Occupancy changes do not alter the part count, so the free list has its
/// own invalidation: [`notify_experiment_moved`](Self::notify_experiment_moved)
/// marks it dirty. It is also recomputed when the underlying entry was
/// rebuilt or belongs to another vessel.
#[derive(Debug, Clone)]
pub struct FreeListCache<C> {
    primary: VesselComponentCache<C>,
    free: Vec<C>,
    free_source: Option<(VesselId, u64)>,
    dirty: bool,
}

impl<C: Clone> FreeListCache<C> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            primary: VesselComponentCache::new(config),
            free: Vec::new(),
            free_source: None,
            dirty: true,
        }
    }

    pub fn primary(&self) -> &VesselComponentCache<C> {
        &self.primary
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// All components of `vessel`.
    pub fn get<V>(&mut self, vessel: &V, now: f64) -> &[C]
    where
        V: FindComponents<C> + ?Sized,
    {
        self.primary.get(vessel, now)
    }

    /// Components of `vessel` for which `is_free` held when the list was
    /// last derived.
    pub fn get_free<V, F>(&mut self, vessel: &V, now: f64, mut is_free: F) -> &[C]
    where
        V: FindComponents<C> + ?Sized,
        F: FnMut(&C) -> bool,
    {
        let id = vessel.id();
        self.primary.get(vessel, now);
        let source = self.primary.generation(id).map(|generation| (id, generation));
        if self.dirty || self.free_source != source {
            self.free = self
                .primary
                .peek(id)
                .iter()
                .filter(|c| is_free(c))
                .cloned()
                .collect();
            self.free_source = source;
            self.dirty = false;
            debug!(vessel = %id, free = self.free.len(), "free list recomputed");
        }
        &self.free
    }

    /// An experiment changed storage; the free list is stale.
    pub fn notify_experiment_moved(&mut self) {
        self.dirty = true;
    }

    pub fn clear(&mut self) {
        self.primary.clear();
        self.reset_free();
    }

    pub fn on_scene_loaded(&mut self, scene: GameScene) {
        if !scene.keeps_vessels_live() {
            self.clear();
        }
    }

    pub fn on_vessel_destroyed(&mut self, vessel: VesselId) {
        self.primary.on_vessel_destroyed(vessel);
        if self.primary.config().retention == Retention::ActiveVesselOnly
            || self.free_source.is_some_and(|(v, _)| v == vessel)
        {
            self.reset_free();
        }
    }

    fn reset_free(&mut self) {
        self.free.clear();
        self.free_source = None;
        self.dirty = true;
    }
}

// ---------------------------------------------------------------------------
// VesselCaches
// ---------------------------------------------------------------------------

/// The lab cache and the experiment-storage cache, owned by the driver.
#[derive(Debug, Clone)]
pub struct VesselCaches {
    pub labs: VesselComponentCache<LabId>,
    pub storage: FreeListCache<StorageId>,
}

impl Default for VesselCaches {
    fn default() -> Self {
        Self::new(CacheConfig::LABS, CacheConfig::STORAGE)
    }
}

impl VesselCaches {
    pub fn new(labs: CacheConfig, storage: CacheConfig) -> Self {
        Self {
            labs: VesselComponentCache::new(labs),
            storage: FreeListCache::new(storage),
        }
    }

    pub fn on_scene_loaded(&mut self, scene: GameScene) {
        self.labs.on_scene_loaded(scene);
        self.storage.on_scene_loaded(scene);
    }

    pub fn on_vessel_destroyed(&mut self, vessel: VesselId) {
        self.labs.on_vessel_destroyed(vessel);
        self.storage.on_vessel_destroyed(vessel);
    }

    pub fn notify_experiment_moved(&mut self) {
        self.storage.notify_experiment_moved();
    }

    pub fn clear(&mut self) {
        self.labs.clear();
        self.storage.clear();
    }

    /// Labs on `vessel` with an empty slot of `equipment_type`.
    pub fn labs_with_free_slot<V>(
        &mut self,
        vessel: &V,
        now: f64,
        labs: &dyn LabDirectory,
        equipment_type: EquipmentType,
    ) -> Vec<LabId>
    where
        V: FindComponents<LabId> + ?Sized,
    {
        self.labs
            .get(vessel, now)
            .iter()
            .copied()
            .filter(|&id| {
                labs.lab(id)
                    .is_some_and(|lab| lab.has_free_equipment_slot(equipment_type))
            })
            .collect()
    }

    /// Labs on `vessel` whose `equipment_type` rack can take an experiment.
    pub fn labs_with_free_experiment_slot<V>(
        &mut self,
        vessel: &V,
        now: f64,
        labs: &dyn LabDirectory,
        equipment_type: EquipmentType,
    ) -> Vec<LabId>
    where
        V: FindComponents<LabId> + ?Sized,
    {
        self.labs
            .get(vessel, now)
            .iter()
            .copied()
            .filter(|&id| {
                labs.lab(id)
                    .is_some_and(|lab| lab.has_equipment_free_experiment_slot(equipment_type))
            })
            .collect()
    }

    /// Empty experiment storages on `vessel`.
    pub fn free_storage<V, F>(&mut self, vessel: &V, now: f64, is_free: F) -> &[StorageId]
    where
        V: FindComponents<StorageId> + ?Sized,
        F: FnMut(&StorageId) -> bool,
    {
        self.storage.get_free(vessel, now, is_free)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestVessel;
    use crate::vessel::Vessel;

    fn labs_cache() -> VesselComponentCache<LabId> {
        VesselComponentCache::new(CacheConfig::LABS)
    }

    #[test]
    fn first_query_builds() {
        let vessel = TestVessel::with_labs(2);
        let mut cache = labs_cache();
        assert_eq!(cache.get(&vessel, 0.0).len(), 2);
        assert_eq!(vessel.scans(), 1);
        assert_eq!(cache.stats().rebuilds, 1);
    }

    #[test]
    fn repeated_queries_hit() {
        let vessel = TestVessel::with_labs(3);
        let mut cache = labs_cache();
        let first = cache.get(&vessel, 0.0).as_ptr();
        let second = cache.get(&vessel, 1.0).as_ptr();
        assert_eq!(first, second);
        assert_eq!(vessel.scans(), 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn part_count_change_rebuilds_once() {
        let mut vessel = TestVessel::with_labs(1);
        let mut cache = labs_cache();
        cache.get(&vessel, 0.0);
        let before = cache.generation(vessel.id()).unwrap();

        vessel.add_lab();
        assert_eq!(cache.get(&vessel, 1.0).len(), 2);
        cache.get(&vessel, 2.0);
        cache.get(&vessel, 3.0);
        assert_eq!(vessel.scans(), 2);
        assert_ne!(cache.generation(vessel.id()).unwrap(), before);
    }

    #[test]
    fn structural_part_without_component_still_rebuilds() {
        let mut vessel = TestVessel::with_labs(1);
        let mut cache = labs_cache();
        cache.get(&vessel, 0.0);
        vessel.add_plain_part();
        assert_eq!(cache.get(&vessel, 1.0).len(), 1);
        assert_eq!(vessel.scans(), 2);
    }

    #[test]
    fn all_vessels_keeps_one_entry_each() {
        let a = TestVessel::with_labs(1);
        let b = TestVessel::with_labs(2);
        let mut cache = labs_cache();
        cache.get(&a, 0.0);
        cache.get(&b, 0.0);
        cache.get(&a, 0.0);
        assert_eq!(cache.len(), 2);
        assert_eq!(a.scans(), 1);
        assert_eq!(b.scans(), 1);
    }

    #[test]
    fn active_vessel_only_rebuilds_on_switch() {
        let a = TestVessel::with_labs(1);
        let b = TestVessel::with_labs(1);
        let mut cache: VesselComponentCache<LabId> =
            VesselComponentCache::new(CacheConfig::STORAGE);
        cache.get(&a, 0.0);
        cache.get(&b, 0.0);
        cache.get(&a, 0.0);
        assert_eq!(cache.len(), 1);
        assert_eq!(a.scans(), 2);
    }

    #[test]
    fn destroyed_vessel_entry_dropped() {
        let a = TestVessel::with_labs(1);
        let b = TestVessel::with_labs(1);
        let mut cache = labs_cache();
        cache.get(&a, 0.0);
        cache.get(&b, 0.0);
        cache.on_vessel_destroyed(a.id());
        assert!(!cache.contains(a.id()));
        assert!(cache.contains(b.id()));
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn destroying_any_vessel_clears_single_vessel_cache() {
        let a = TestVessel::with_labs(1);
        let mut cache: VesselComponentCache<LabId> =
            VesselComponentCache::new(CacheConfig::STORAGE);
        cache.get(&a, 0.0);
        cache.on_vessel_destroyed(VesselId::random());
        assert!(cache.is_empty());
    }

    #[test]
    fn scene_changes() {
        let a = TestVessel::with_labs(1);
        let mut cache = labs_cache();
        cache.get(&a, 0.0);
        for scene in [
            GameScene::SpaceCenter,
            GameScene::Flight,
            GameScene::TrackingStation,
        ] {
            cache.on_scene_loaded(scene);
            assert!(cache.contains(a.id()), "{scene:?} cleared the cache");
        }
        cache.on_scene_loaded(GameScene::Editor);
        assert!(cache.is_empty());
    }

    #[test]
    fn clock_going_backwards_clears() {
        let a = TestVessel::with_labs(1);
        let mut cache = labs_cache();
        cache.get(&a, 100.0);
        cache.get(&a, 50.0);
        assert_eq!(a.scans(), 2);
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn clock_ignored_without_guard() {
        let a = TestVessel::with_labs(1);
        let mut cache: VesselComponentCache<LabId> =
            VesselComponentCache::new(CacheConfig::STORAGE);
        cache.get(&a, 100.0);
        cache.get(&a, 50.0);
        assert_eq!(a.scans(), 1);
    }

    #[test]
    fn free_list_waits_for_notification() {
        let vessel = TestVessel::with_storages(3);
        let mut cache: FreeListCache<StorageId> = FreeListCache::new(CacheConfig::STORAGE);
        let full = vessel.storage_ids()[0];

        assert_eq!(cache.get_free(&vessel, 0.0, |_| true).len(), 3);

        // Occupancy changed but nobody said so.
        assert_eq!(cache.get_free(&vessel, 1.0, |&id| id != full).len(), 3);

        cache.notify_experiment_moved();
        assert!(cache.is_dirty());
        assert_eq!(cache.get_free(&vessel, 2.0, |&id| id != full).len(), 2);
        assert!(!cache.is_dirty());
        assert_eq!(vessel.scans(), 1);
    }

    #[test]
    fn free_list_follows_rebuild() {
        let mut vessel = TestVessel::with_storages(1);
        let mut cache: FreeListCache<StorageId> = FreeListCache::new(CacheConfig::STORAGE);
        assert_eq!(cache.get_free(&vessel, 0.0, |_| true).len(), 1);
        vessel.add_storage();
        assert_eq!(cache.get_free(&vessel, 1.0, |_| true).len(), 2);
    }

    #[test]
    fn free_list_reset_on_clear() {
        let vessel = TestVessel::with_storages(2);
        let mut cache: FreeListCache<StorageId> = FreeListCache::new(CacheConfig::STORAGE);
        cache.get_free(&vessel, 0.0, |_| true);
        cache.on_scene_loaded(GameScene::MainMenu);
        assert!(cache.is_dirty());
        assert!(cache.primary().is_empty());
    }
}
