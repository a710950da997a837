//! Change queues between the entity model and the flush cycles
//!
//! The queue set holds *intents*, not a log:
//!
//! | Queue | Shape | Merge rule |
//! |-------|-------|------------|
//! | add / update | map keyed by id | last write wins |
//! | remove | set of ids | cancels a pending add instead of queuing |
//! | status, admin status | fast + delayed FIFO lanes | append |
//! | energy status | fast + delayed FIFO lanes | append |
//! | charge detail records | FIFO list | append |
//!
//! A status change for an entity still waiting in its add queue goes to the
//! delayed lane, so the partner learns about the entity before its status.
//! Lanes are decided once at enqueue time and never change afterwards.
//!
//! `QueueSet` has no locking of its own. The adapter guards it with one
//! coarse [`QueueLock`]; the flush cycles take it only for the
//! snapshot-and-clear instant.

use std::collections::{HashMap, HashSet};
use std::mem;

use parking_lot::Mutex;
use roam_core::{
    ChargeDetailRecord, ChargingPool, ChargingStation, ChargingStationOperator,
    EnergyStatusUpdate, EntityAdminStatusUpdate, EntityStatusUpdate, Evse, PropertyUpdateInfo,
    RoamingEntity,
};

use crate::kinds::Synchronized;
use crate::scheduler::FlushCycle;

/// Lane a status change was placed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// Flushed by the fast status cycle
    Fast,
    /// Waits for the data+status cycle, behind the add of its entity
    Delayed,
}

impl Lane {
    /// Flush cycle draining this lane
    pub fn cycle(&self) -> FlushCycle {
        match self {
            Lane::Fast => FlushCycle::FastStatus,
            Lane::Delayed => FlushCycle::DataAndStatus,
        }
    }
}

// ============================================================================
// Status lanes
// ============================================================================

/// Fast and delayed FIFO lanes of one status dimension
#[derive(Debug, Clone)]
pub struct StatusLanes<U> {
    fast: Vec<U>,
    delayed: Vec<U>,
}

impl<U> Default for StatusLanes<U> {
    fn default() -> Self {
        Self {
            fast: Vec::new(),
            delayed: Vec::new(),
        }
    }
}

impl<U> StatusLanes<U> {
    pub fn push(&mut self, lane: Lane, update: U) {
        match lane {
            Lane::Fast => self.fast.push(update),
            Lane::Delayed => self.delayed.push(update),
        }
    }

    pub fn fast(&self) -> &[U] {
        &self.fast
    }

    pub fn delayed(&self) -> &[U] {
        &self.delayed
    }

    pub fn take_fast(&mut self) -> Vec<U> {
        mem::take(&mut self.fast)
    }

    pub fn take_delayed(&mut self) -> Vec<U> {
        mem::take(&mut self.delayed)
    }
}

// ============================================================================
// Per-kind queues
// ============================================================================

/// Queues of one entity kind
#[derive(Debug)]
pub struct KindQueues<E: RoamingEntity> {
    add: HashMap<E::Id, E>,
    update: HashMap<E::Id, E>,
    remove: HashSet<E::Id>,
    status: StatusLanes<EntityStatusUpdate<E>>,
    admin_status: StatusLanes<EntityAdminStatusUpdate<E>>,
    /// Append-only diagnostics, never drained by a flush
    update_log: HashMap<E::Id, Vec<PropertyUpdateInfo>>,
}

impl<E: RoamingEntity> Default for KindQueues<E> {
    fn default() -> Self {
        Self {
            add: HashMap::new(),
            update: HashMap::new(),
            remove: HashSet::new(),
            status: StatusLanes::default(),
            admin_status: StatusLanes::default(),
            update_log: HashMap::new(),
        }
    }
}

impl<E: RoamingEntity> KindQueues<E> {
    /// Queue an entity for creation, superseding pending updates and removes
    pub fn enqueue_add(&mut self, entity: E) {
        let id = entity.id().clone();
        self.update.remove(&id);
        self.remove.remove(&id);
        self.add.insert(id, entity);
    }

    /// Queue a data update and record it in the update log
    ///
    /// An entity still waiting to be added only has its add entry refreshed.
    /// Otherwise the update supersedes a pending remove.
    pub fn enqueue_update(&mut self, entity: E, info: PropertyUpdateInfo) {
        let id = entity.id().clone();
        self.update_log.entry(id.clone()).or_default().push(info);

        if let Some(pending) = self.add.get_mut(&id) {
            *pending = entity;
        } else {
            self.remove.remove(&id);
            self.update.insert(id, entity);
        }
    }

    /// Queue an entity for removal
    ///
    /// Returns `true` when the removal only cancelled a pending add; the
    /// partner never saw the entity, so nothing is queued.
    pub fn enqueue_remove(&mut self, id: E::Id) -> bool {
        self.update.remove(&id);
        if self.add.remove(&id).is_some() {
            return true;
        }
        self.remove.insert(id);
        false
    }

    /// Lane for a status change of `id` at this instant
    pub fn lane_for(&self, id: &E::Id, data_push_enabled: bool) -> Lane {
        if data_push_enabled && self.add.contains_key(id) {
            Lane::Delayed
        } else {
            Lane::Fast
        }
    }

    pub fn enqueue_status(&mut self, update: EntityStatusUpdate<E>, data_push_enabled: bool) -> Lane {
        let lane = self.lane_for(update.id(), data_push_enabled);
        self.status.push(lane, update);
        lane
    }

    pub fn enqueue_admin_status(
        &mut self,
        update: EntityAdminStatusUpdate<E>,
        data_push_enabled: bool,
    ) -> Lane {
        let lane = self.lane_for(update.id(), data_push_enabled);
        self.admin_status.push(lane, update);
        lane
    }

    pub fn contains_add(&self, id: &E::Id) -> bool {
        self.add.contains_key(id)
    }

    pub fn contains_update(&self, id: &E::Id) -> bool {
        self.update.contains_key(id)
    }

    pub fn contains_remove(&self, id: &E::Id) -> bool {
        self.remove.contains(id)
    }

    pub fn pending_add(&self, id: &E::Id) -> Option<&E> {
        self.add.get(id)
    }

    pub fn pending_update(&self, id: &E::Id) -> Option<&E> {
        self.update.get(id)
    }

    pub fn status_lanes(&self) -> &StatusLanes<EntityStatusUpdate<E>> {
        &self.status
    }

    pub fn admin_status_lanes(&self) -> &StatusLanes<EntityAdminStatusUpdate<E>> {
        &self.admin_status
    }

    /// Every property update recorded for `id`, oldest first
    pub fn property_updates(&self, id: &E::Id) -> &[PropertyUpdateInfo] {
        self.update_log.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn data_len(&self) -> usize {
        self.add.len() + self.update.len() + self.remove.len()
    }

    fn fast_len(&self) -> usize {
        self.status.fast.len() + self.admin_status.fast.len()
    }

    fn delayed_len(&self) -> usize {
        self.status.delayed.len() + self.admin_status.delayed.len()
    }

    fn take_changes(&mut self) -> EntityChanges<E> {
        let mut added: Vec<E> = mem::take(&mut self.add).into_values().collect();
        let mut updated: Vec<E> = mem::take(&mut self.update).into_values().collect();
        let mut removed: Vec<E::Id> = mem::take(&mut self.remove).into_iter().collect();
        added.sort_by(|a, b| a.id().cmp(b.id()));
        updated.sort_by(|a, b| a.id().cmp(b.id()));
        removed.sort();

        EntityChanges {
            added,
            updated,
            removed,
            delayed_status: self.status.take_delayed(),
            delayed_admin_status: self.admin_status.take_delayed(),
        }
    }

    fn take_status(&mut self) -> StatusChanges<E> {
        StatusChanges {
            status: self.status.take_fast(),
            admin_status: self.admin_status.take_fast(),
        }
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Drained data changes of one kind, plus its delayed status lanes
#[derive(Debug, Clone)]
pub struct EntityChanges<E: RoamingEntity> {
    pub added: Vec<E>,
    pub updated: Vec<E>,
    pub removed: Vec<E::Id>,
    pub delayed_status: Vec<EntityStatusUpdate<E>>,
    pub delayed_admin_status: Vec<EntityAdminStatusUpdate<E>>,
}

impl<E: RoamingEntity> EntityChanges<E> {
    pub fn len(&self) -> usize {
        self.added.len()
            + self.updated.len()
            + self.removed.len()
            + self.delayed_status.len()
            + self.delayed_admin_status.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drained fast lanes of one kind
#[derive(Debug, Clone)]
pub struct StatusChanges<E: RoamingEntity> {
    pub status: Vec<EntityStatusUpdate<E>>,
    pub admin_status: Vec<EntityAdminStatusUpdate<E>>,
}

impl<E: RoamingEntity> StatusChanges<E> {
    pub fn len(&self) -> usize {
        self.status.len() + self.admin_status.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the data+status cycle hands to the executor
#[derive(Debug, Clone)]
pub struct DataAndStatusSnapshot {
    pub run_id: u64,
    pub evses: EntityChanges<Evse>,
    pub stations: EntityChanges<ChargingStation>,
    pub pools: EntityChanges<ChargingPool>,
    pub operators: EntityChanges<ChargingStationOperator>,
    pub delayed_energy_status: Vec<EnergyStatusUpdate>,
}

impl DataAndStatusSnapshot {
    pub fn len(&self) -> usize {
        self.evses.len()
            + self.stations.len()
            + self.pools.len()
            + self.operators.len()
            + self.delayed_energy_status.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the fast status cycle hands to the executor
#[derive(Debug, Clone)]
pub struct FastStatusSnapshot {
    pub run_id: u64,
    pub evses: StatusChanges<Evse>,
    pub stations: StatusChanges<ChargingStation>,
    pub pools: StatusChanges<ChargingPool>,
    pub operators: StatusChanges<ChargingStationOperator>,
    pub energy_status: Vec<EnergyStatusUpdate>,
}

impl FastStatusSnapshot {
    pub fn len(&self) -> usize {
        self.evses.len()
            + self.stations.len()
            + self.pools.len()
            + self.operators.len()
            + self.energy_status.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Charge detail records handed to the executor
#[derive(Debug, Clone)]
pub struct CdrSnapshot {
    pub run_id: u64,
    pub records: Vec<ChargeDetailRecord>,
}

impl CdrSnapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Queued item counts, grouped by the cycle that drains them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    /// Adds, updates and removes of all kinds
    pub data: usize,
    pub delayed_status: usize,
    pub fast_status: usize,
    pub charge_detail_records: usize,
}

impl PendingCounts {
    /// Items the given cycle would drain
    pub fn for_cycle(&self, cycle: FlushCycle) -> usize {
        match cycle {
            FlushCycle::DataAndStatus => self.data + self.delayed_status,
            FlushCycle::FastStatus => self.fast_status,
            FlushCycle::ChargeDetailRecords => self.charge_detail_records,
        }
    }

    pub fn total(&self) -> usize {
        self.data + self.delayed_status + self.fast_status + self.charge_detail_records
    }
}

// ============================================================================
// Queue set
// ============================================================================

/// All queues of one adapter
#[derive(Debug, Default)]
pub struct QueueSet {
    pub(crate) evses: KindQueues<Evse>,
    pub(crate) stations: KindQueues<ChargingStation>,
    pub(crate) pools: KindQueues<ChargingPool>,
    pub(crate) operators: KindQueues<ChargingStationOperator>,
    energy_status: StatusLanes<EnergyStatusUpdate>,
    cdrs: Vec<ChargeDetailRecord>,
}

impl QueueSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues of entity kind `E`
    pub fn kind<E: Synchronized>(&self) -> &KindQueues<E> {
        E::queues(self)
    }

    pub fn kind_mut<E: Synchronized>(&mut self) -> &mut KindQueues<E> {
        E::queues_mut(self)
    }

    /// Energy updates follow the EVSE lane rule
    pub fn enqueue_energy_status(&mut self, update: EnergyStatusUpdate, data_push_enabled: bool) -> Lane {
        let lane = self.evses.lane_for(update.id(), data_push_enabled);
        self.energy_status.push(lane, update);
        lane
    }

    pub fn energy_status_lanes(&self) -> &StatusLanes<EnergyStatusUpdate> {
        &self.energy_status
    }

    pub fn enqueue_charge_detail_records(&mut self, records: impl IntoIterator<Item = ChargeDetailRecord>) {
        self.cdrs.extend(records);
    }

    pub fn charge_detail_records(&self) -> &[ChargeDetailRecord] {
        &self.cdrs
    }

    pub fn pending(&self) -> PendingCounts {
        PendingCounts {
            data: self.evses.data_len()
                + self.stations.data_len()
                + self.pools.data_len()
                + self.operators.data_len(),
            delayed_status: self.evses.delayed_len()
                + self.stations.delayed_len()
                + self.pools.delayed_len()
                + self.operators.delayed_len()
                + self.energy_status.delayed.len(),
            fast_status: self.evses.fast_len()
                + self.stations.fast_len()
                + self.pools.fast_len()
                + self.operators.fast_len()
                + self.energy_status.fast.len(),
            charge_detail_records: self.cdrs.len(),
        }
    }

    /// Drain adds, updates, removes and delayed lanes of every kind
    pub fn take_data_and_status(&mut self, run_id: u64) -> DataAndStatusSnapshot {
        DataAndStatusSnapshot {
            run_id,
            evses: self.evses.take_changes(),
            stations: self.stations.take_changes(),
            pools: self.pools.take_changes(),
            operators: self.operators.take_changes(),
            delayed_energy_status: self.energy_status.take_delayed(),
        }
    }

    /// Drain the fast lanes of every kind; delayed lanes stay untouched
    pub fn take_fast_status(&mut self, run_id: u64) -> FastStatusSnapshot {
        FastStatusSnapshot {
            run_id,
            evses: self.evses.take_status(),
            stations: self.stations.take_status(),
            pools: self.pools.take_status(),
            operators: self.operators.take_status(),
            energy_status: self.energy_status.take_fast(),
        }
    }

    pub fn take_charge_detail_records(&mut self, run_id: u64) -> CdrSnapshot {
        CdrSnapshot {
            run_id,
            records: mem::take(&mut self.cdrs),
        }
    }
}

// ============================================================================
// Coarse lock
// ============================================================================

/// The single mutex guarding a [`QueueSet`]
///
/// Access goes through closures so a guard can never be held across an
/// `.await`. Critical sections only mutate maps and lists.
#[derive(Debug, Default)]
pub struct QueueLock {
    inner: Mutex<QueueSet>,
}

impl QueueLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to the queues
    pub fn with<R>(&self, f: impl FnOnce(&mut QueueSet) -> R) -> R {
        let mut queues = self.inner.lock();
        f(&mut *queues)
    }

    /// Run `f` with shared read access to the queues
    pub fn inspect<R>(&self, f: impl FnOnce(&QueueSet) -> R) -> R {
        let queues = self.inner.lock();
        f(&*queues)
    }

    pub fn pending(&self) -> PendingCounts {
        self.inspect(QueueSet::pending)
    }
}
