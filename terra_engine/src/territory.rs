//! Orchestrates loading one territory: zones first, then terrain and chunk
//! assets, fanned out across the task pool with a barrier between the waves.
//!
//! Ordering comes entirely from the barriers; tasks within a wave complete in
//! any order. Zone tasks only contend on the shared zone-list append, asset
//! tasks only on the per-run cache, and both locks are separate from the
//! registry's own.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Result};
use log::{debug, error, info, warn};
use terra_formats::zone::ZoneData;
use terra_formats::{read_zone, ArchiveSource, CodecTable};
use terra_registry::{BufferHandle, ObjectHandle, Registry, Value};
use terra_tasks::{CancelToken, Task, TaskPool};

/// Extensions of archive entries that hold zone object data.
const ZONE_PATTERNS: &[&str] = &["*.rfgzone_pc", "*.layer_pc"];
const TERRAIN_EXTENSION: &str = ".cterrain_pc";
const CHUNK_EXTENSION: &str = ".cchk_pc";

/// Where the loader currently is. `Cancelled` covers both a cooperative stop
/// and a fatal scan failure; the log tells the two apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Idle,
    ScanningArchive,
    LoadingZones,
    BarrierWaitZones,
    LoadingTerrainAndChunks,
    BarrierWaitTerrain,
    Ready,
    Cancelled,
}

/// One zone's contribution to the territory.
#[derive(Debug, Clone)]
pub struct TerritoryZone {
    pub name: String,
    pub data: ZoneData,
}

/// Shared state for one territory load/edit session. Registry and archive are
/// passed in explicitly; nothing here is global.
pub struct Territory {
    registry: Arc<Registry>,
    archive: Arc<dyn ArchiveSource>,
    table: Arc<CodecTable>,
    zones: Mutex<Vec<TerritoryZone>>,
    asset_cache: Mutex<HashMap<String, BufferHandle>>,
    stage: Mutex<LoadStage>,
    stop: CancelToken,
    load_task: Mutex<Option<Task>>,
}

impl Territory {
    pub fn new(registry: Arc<Registry>, archive: Arc<dyn ArchiveSource>) -> Arc<Self> {
        Arc::new(Territory {
            registry,
            archive,
            table: Arc::new(CodecTable::new()),
            zones: Mutex::new(Vec::new()),
            asset_cache: Mutex::new(HashMap::new()),
            stage: Mutex::new(LoadStage::Idle),
            stop: CancelToken::new(),
            load_task: Mutex::new(None),
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn stage(&self) -> LoadStage {
        *lock(&self.stage)
    }

    pub fn ready(&self) -> bool {
        self.stage() == LoadStage::Ready
    }

    /// Snapshot of the loaded zones, in completion order.
    pub fn zones(&self) -> Vec<TerritoryZone> {
        lock(&self.zones).clone()
    }

    fn set_stage(&self, stage: LoadStage) {
        debug!("territory stage -> {stage:?}");
        *lock(&self.stage) = stage;
    }

    /// Kicks off the load on the pool and returns the orchestration task for
    /// progress and cancellation. The orchestrator occupies one worker while
    /// it barrier-waits, so the pool must have at least two.
    pub fn start_load(self: &Arc<Self>, pool: &Arc<TaskPool>) -> Result<Task> {
        if pool.worker_count() < 2 {
            bail!(
                "territory load needs a pool of at least 2 workers, got {}",
                pool.worker_count()
            );
        }
        let territory = Arc::clone(self);
        let worker_pool = Arc::clone(pool);
        let task = pool.queue(move |token| {
            territory.run_load(&worker_pool, token);
        });
        *lock(&self.load_task) = Some(task.clone());
        Ok(task)
    }

    /// Requests a cooperative stop and waits for the orchestration task.
    pub fn stop_load(&self) {
        self.stop.cancel();
        let task = lock(&self.load_task).clone();
        if let Some(task) = task {
            task.cancel_and_wait();
        }
    }

    fn stopping(&self, token: &CancelToken) -> bool {
        self.stop.is_cancelled() || token.is_cancelled()
    }

    fn run_load(self: &Arc<Self>, pool: &Arc<TaskPool>, token: &CancelToken) {
        self.set_stage(LoadStage::ScanningArchive);
        if self.stopping(token) {
            self.set_stage(LoadStage::Cancelled);
            return;
        }

        let mut entries = Vec::new();
        for pattern in ZONE_PATTERNS {
            entries.extend(self.archive.file_names(pattern));
        }
        if entries.is_empty() {
            // Nothing to load means the required archive is absent or empty:
            // fatal for the whole territory.
            error!("no zone entries found in archive; aborting territory load");
            self.set_stage(LoadStage::Cancelled);
            return;
        }
        info!("territory scan found {} zone entries", entries.len());

        self.set_stage(LoadStage::LoadingZones);
        let zone_tasks: Vec<Task> = entries
            .iter()
            .map(|name| {
                let territory = Arc::clone(self);
                let name = name.clone();
                pool.queue(move |task_token| territory.load_zone(&name, task_token))
            })
            .collect();

        self.set_stage(LoadStage::BarrierWaitZones);
        if self.stopping(token) {
            for task in &zone_tasks {
                task.cancel();
            }
        }
        for task in &zone_tasks {
            task.wait(None);
        }
        if self.stopping(token) {
            self.set_stage(LoadStage::Cancelled);
            return;
        }

        // Second wave depends on zone objects existing, which the barrier
        // above guarantees.
        self.set_stage(LoadStage::LoadingTerrainAndChunks);
        let zones = self.zones();
        let mut asset_tasks = Vec::with_capacity(zones.len() * 2);
        for zone in &zones {
            let territory = Arc::clone(self);
            let snapshot = zone.clone();
            asset_tasks.push(pool.queue(move |task_token| {
                territory.load_zone_terrain(&snapshot, task_token);
            }));
            let territory = Arc::clone(self);
            let snapshot = zone.clone();
            asset_tasks.push(pool.queue(move |task_token| {
                territory.load_zone_chunks(&snapshot, task_token);
            }));
        }

        self.set_stage(LoadStage::BarrierWaitTerrain);
        if self.stopping(token) {
            for task in &asset_tasks {
                task.cancel();
            }
        }
        for task in &asset_tasks {
            task.wait(None);
        }

        if self.stopping(token) {
            self.set_stage(LoadStage::Cancelled);
        } else {
            info!("territory ready: {} zones loaded", self.zones().len());
            self.set_stage(LoadStage::Ready);
        }
    }

    /// One zone-load task: extract, import, publish. A failure logs and
    /// leaves the zone's slot absent rather than partially populated.
    fn load_zone(&self, name: &str, token: &CancelToken) {
        if self.stopping(token) {
            return;
        }
        let bytes = match self.archive.read_file(name) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("zone {name}: extraction failed: {err:#}");
                return;
            }
        };
        match read_zone(&bytes, &self.registry, &self.table) {
            Ok(data) => {
                debug!("zone {name}: {} objects", data.objects.len());
                lock(&self.zones).push(TerritoryZone {
                    name: name.to_string(),
                    data,
                });
            }
            Err(err) => {
                error!("zone {name}: import failed: {err:#}");
            }
        }
    }

    /// Finds the archive entry for an asset name that may or may not carry
    /// its extension.
    fn find_asset(&self, base: &str, extension: &str) -> Option<String> {
        if self.archive.contains(base) {
            return Some(base.to_string());
        }
        let with_extension = format!("{base}{extension}");
        self.archive
            .contains(&with_extension)
            .then_some(with_extension)
    }

    /// Loads an asset once per territory run; repeat requests reuse the
    /// cached buffer.
    fn load_cached_asset(&self, file_name: &str) -> Result<BufferHandle> {
        if let Some(handle) = lock(&self.asset_cache).get(file_name) {
            return Ok(*handle);
        }
        let bytes = self.archive.read_file(file_name)?;
        let mut cache = lock(&self.asset_cache);
        // Another task may have finished the same load while we read.
        if let Some(handle) = cache.get(file_name) {
            return Ok(*handle);
        }
        let handle = self.registry.create_buffer(file_name, bytes);
        cache.insert(file_name.to_string(), handle);
        Ok(handle)
    }

    fn zone_anchor(&self, zone: &TerritoryZone) -> Option<ObjectHandle> {
        zone.data
            .objects
            .iter()
            .copied()
            .find(|object| {
                self.registry
                    .object_name(*object)
                    .map(|name| name == "obj_zone")
                    .unwrap_or(false)
            })
    }

    /// Terrain wave: the zone's `obj_zone` object names the terrain asset; a
    /// missing asset is optional and only logged.
    fn load_zone_terrain(&self, zone: &TerritoryZone, token: &CancelToken) {
        if self.stopping(token) {
            return;
        }
        let Some(anchor) = self.zone_anchor(zone) else {
            debug!("zone {}: no obj_zone object, skipping terrain", zone.name);
            return;
        };
        let terrain_name = match self.registry.property(anchor, "terrain_file_name") {
            Ok(Some(value)) => match value.as_string() {
                Ok(name) => name,
                Err(err) => {
                    warn!("zone {}: terrain_file_name is not a string: {err}", zone.name);
                    return;
                }
            },
            Ok(None) => {
                debug!("zone {}: no terrain_file_name property", zone.name);
                return;
            }
            Err(err) => {
                error!("zone {}: reading obj_zone failed: {err}", zone.name);
                return;
            }
        };
        let Some(file_name) = self.find_asset(&terrain_name, TERRAIN_EXTENSION) else {
            debug!(
                "zone {}: terrain {terrain_name:?} not present in archive, skipping",
                zone.name
            );
            return;
        };
        match self.load_cached_asset(&file_name) {
            Ok(buffer) => {
                if let Err(err) =
                    self.registry
                        .set_property(anchor, "terrain_buffer", Value::Buffer(buffer))
                {
                    error!("zone {}: attaching terrain failed: {err}", zone.name);
                }
            }
            Err(err) => {
                error!("zone {}: terrain {file_name:?} failed to load: {err:#}", zone.name);
            }
        }
    }

    /// Chunk wave: any object carrying a `chunk_name` property gets its chunk
    /// payload attached. Chunks shared between zones load once via the cache.
    fn load_zone_chunks(&self, zone: &TerritoryZone, token: &CancelToken) {
        for object in zone.data.objects.iter().copied() {
            if self.stopping(token) {
                return;
            }
            let chunk_name = match self.registry.property(object, "chunk_name") {
                Ok(Some(value)) => match value.as_string() {
                    Ok(name) => name,
                    Err(_) => continue,
                },
                _ => continue,
            };
            let Some(file_name) = self.find_asset(&chunk_name, CHUNK_EXTENSION) else {
                debug!(
                    "zone {}: chunk {chunk_name:?} not present in archive, skipping",
                    zone.name
                );
                continue;
            };
            match self.load_cached_asset(&file_name) {
                Ok(buffer) => {
                    if let Err(err) =
                        self.registry
                            .set_property(object, "chunk_buffer", Value::Buffer(buffer))
                    {
                        error!("zone {}: attaching chunk failed: {err}", zone.name);
                    }
                }
                Err(err) => {
                    error!(
                        "zone {}: chunk {file_name:?} failed to load: {err:#}",
                        zone.name
                    );
                }
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}
