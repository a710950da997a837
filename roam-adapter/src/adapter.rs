//! Roaming adapter facade
//!
//! Producers call the push methods from any task. A push is checked against
//! the disable switches, then the admission filters, merged into the queue
//! set under the coarse lock and answered right away. Flushing happens later
//! on the cycle timers, or immediately for [`TransmissionType::Direct`].

use std::sync::Arc;

use parking_lot::Mutex;
use roam_core::{
    ChargeDetailRecord, EnergyStatusUpdate, EntityAdminStatusUpdate, EntityStatusUpdate,
    EventTrackingId, Evse, PropertyUpdateInfo, PushOutcome, PushResult, TransmissionType, Warning,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::AdapterConfig;
use crate::error::AdapterError;
use crate::events::{AdapterEvent, EventBus};
use crate::executor::FlushExecutor;
use crate::filters::{CdrFilterDecision, IncludeFilters};
use crate::kinds::Synchronized;
use crate::queues::{PendingCounts, QueueLock, QueueSet};
use crate::scheduler::{CycleOutcome, FlushCycle, FlushScheduler, Flusher};

enum Lifecycle {
    Idle,
    Running(FlushScheduler),
    Stopped,
}

/// Queued, timer-driven synchronization toward one roaming partner
pub struct RoamingAdapter {
    config: AdapterConfig,
    filters: IncludeFilters,
    queues: Arc<QueueLock>,
    events: EventBus,
    flusher: Arc<Flusher>,
    lifecycle: Mutex<Lifecycle>,
}

impl RoamingAdapter {
    /// Create an adapter; timers only run after [`RoamingAdapter::start`]
    pub fn new(
        config: AdapterConfig,
        filters: IncludeFilters,
        executor: Arc<dyn FlushExecutor>,
    ) -> Result<Self, AdapterError> {
        config.validate()?;

        let queues = Arc::new(QueueLock::new());
        let events = EventBus::new(config.event_capacity);
        let flusher = Arc::new(Flusher::new(&config, queues.clone(), executor, events.clone()));

        Ok(Self {
            config,
            filters,
            queues,
            events,
            flusher,
            lifecycle: Mutex::new(Lifecycle::Idle),
        })
    }

    /// Spawn the three flush timers on the current tokio runtime
    pub fn start(&self) -> Result<(), AdapterError> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Running(_) => Err(AdapterError::AlreadyStarted),
            Lifecycle::Stopped => Err(AdapterError::Shutdown),
            Lifecycle::Idle => {
                info!(
                    "Starting roaming adapter {} ({}): data every {:?}, status every {:?}, CDRs every {:?}",
                    self.config.id,
                    self.config.name,
                    self.config.data_flush_every,
                    self.config.status_flush_every,
                    self.config.cdr_flush_every
                );
                *lifecycle = Lifecycle::Running(FlushScheduler::start(self.flusher.clone()));
                Ok(())
            }
        }
    }

    /// Stop all timers; queued items stay where they are
    ///
    /// Flushes already in progress run to completion. Calling this again,
    /// or on an adapter that never started, is a no-op.
    pub async fn shutdown(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Stopped);
        if let Lifecycle::Running(scheduler) = previous {
            scheduler.shutdown().await;
            info!("Roaming adapter {} stopped", self.config.id);
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Running(_))
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Receive flush and warning events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.events.subscribe()
    }

    pub fn pending(&self) -> PendingCounts {
        self.queues.pending()
    }

    /// Read-only look at the queue set
    pub fn inspect<R>(&self, f: impl FnOnce(&QueueSet) -> R) -> R {
        self.queues.inspect(f)
    }

    /// Property update log of one entity, oldest first
    pub fn property_updates<E: Synchronized>(&self, id: &E::Id) -> Vec<PropertyUpdateInfo> {
        self.queues
            .inspect(|q| q.kind::<E>().property_updates(id).to_vec())
    }

    /// Id the next run of `cycle` will carry
    pub fn run_id(&self, cycle: FlushCycle) -> u64 {
        self.flusher.run_id(cycle)
    }

    /// Run `cycle` now, outside its timer
    pub async fn flush_now(&self, cycle: FlushCycle) -> CycleOutcome {
        self.flusher.run_cycle(cycle).await
    }

    // ========================================================================
    // Entity data
    // ========================================================================

    /// Queue an entity for creation at the partner
    pub async fn add<E: Synchronized>(
        &self,
        entity: E,
        transmission: TransmissionType,
        event_tracking_id: Option<EventTrackingId>,
    ) -> PushResult<E> {
        let tracking = event_tracking_id.unwrap_or_else(EventTrackingId::generate);

        if self.config.disable_push_data {
            return PushResult::admin_down(&self.config.id, tracking);
        }
        if !self.filters.for_kind::<E>().admits(&entity) {
            return PushResult::no_operation(&self.config.id, tracking);
        }

        let id = entity.id().clone();
        self.queues.with(|q| q.kind_mut::<E>().enqueue_add(entity));
        debug!("{}: queued add of {} {}", self.config.id, E::KIND, id);

        self.accepted(FlushCycle::DataAndStatus, transmission, tracking)
            .await
    }

    /// Queue a data update and log the property change
    pub async fn update<E: Synchronized>(
        &self,
        entity: E,
        property: PropertyUpdateInfo,
        transmission: TransmissionType,
        event_tracking_id: Option<EventTrackingId>,
    ) -> PushResult<E> {
        let tracking = event_tracking_id.unwrap_or_else(EventTrackingId::generate);

        if self.config.disable_push_data {
            return PushResult::admin_down(&self.config.id, tracking);
        }
        if !self.filters.for_kind::<E>().admits(&entity) {
            return PushResult::no_operation(&self.config.id, tracking);
        }

        let id = entity.id().clone();
        debug!(
            "{}: queued update of {} {} ({})",
            self.config.id,
            E::KIND,
            id,
            property.property_name()
        );
        self.queues
            .with(|q| q.kind_mut::<E>().enqueue_update(entity, property));

        self.accepted(FlushCycle::DataAndStatus, transmission, tracking)
            .await
    }

    /// Queue an entity for removal at the partner
    ///
    /// Removing an entity whose add is still queued cancels the add and
    /// answers `NoOperation`: the partner never learns about it.
    pub async fn remove<E: Synchronized>(
        &self,
        id: E::Id,
        transmission: TransmissionType,
        event_tracking_id: Option<EventTrackingId>,
    ) -> PushResult<E::Id> {
        let tracking = event_tracking_id.unwrap_or_else(EventTrackingId::generate);

        if self.config.disable_push_data {
            return PushResult::admin_down(&self.config.id, tracking);
        }
        if !self.filters.for_kind::<E>().admits_id(&id) {
            return PushResult::no_operation(&self.config.id, tracking);
        }

        let cancelled = self
            .queues
            .with(|q| q.kind_mut::<E>().enqueue_remove(id.clone()));

        if cancelled {
            debug!("{}: remove of {} {} cancelled its pending add", self.config.id, E::KIND, id);
            return PushResult::no_operation(&self.config.id, tracking)
                .with_description("cancelled pending add");
        }

        debug!("{}: queued remove of {} {}", self.config.id, E::KIND, id);
        self.accepted(FlushCycle::DataAndStatus, transmission, tracking)
            .await
    }

    // ========================================================================
    // Status
    // ========================================================================

    pub async fn update_status<E: Synchronized>(
        &self,
        update: EntityStatusUpdate<E>,
        transmission: TransmissionType,
        event_tracking_id: Option<EventTrackingId>,
    ) -> PushResult<EntityStatusUpdate<E>> {
        let tracking = event_tracking_id.unwrap_or_else(EventTrackingId::generate);

        if self.config.disable_push_status {
            return PushResult::admin_down(&self.config.id, tracking);
        }
        if !self.filters.for_kind::<E>().admits_id(update.id()) {
            return PushResult::no_operation(&self.config.id, tracking);
        }

        let id = update.id().clone();
        let data_push = !self.config.disable_push_data;
        let lane = self
            .queues
            .with(|q| q.kind_mut::<E>().enqueue_status(update, data_push));
        debug!(
            "{}: queued status of {} {} in {:?} lane",
            self.config.id,
            E::KIND,
            id,
            lane
        );

        self.accepted(lane.cycle(), transmission, tracking).await
    }

    pub async fn update_admin_status<E: Synchronized>(
        &self,
        update: EntityAdminStatusUpdate<E>,
        transmission: TransmissionType,
        event_tracking_id: Option<EventTrackingId>,
    ) -> PushResult<EntityAdminStatusUpdate<E>> {
        let tracking = event_tracking_id.unwrap_or_else(EventTrackingId::generate);

        if self.config.disable_push_admin_status {
            return PushResult::admin_down(&self.config.id, tracking);
        }
        if !self.filters.for_kind::<E>().admits_id(update.id()) {
            return PushResult::no_operation(&self.config.id, tracking);
        }

        let id = update.id().clone();
        let data_push = !self.config.disable_push_data;
        let lane = self
            .queues
            .with(|q| q.kind_mut::<E>().enqueue_admin_status(update, data_push));
        debug!(
            "{}: queued admin status of {} {} in {:?} lane",
            self.config.id,
            E::KIND,
            id,
            lane
        );

        self.accepted(lane.cycle(), transmission, tracking).await
    }

    /// Queue an EVSE meter reading; follows the EVSE status lane rule
    pub async fn update_energy_status(
        &self,
        update: EnergyStatusUpdate,
        transmission: TransmissionType,
        event_tracking_id: Option<EventTrackingId>,
    ) -> PushResult<EnergyStatusUpdate> {
        let tracking = event_tracking_id.unwrap_or_else(EventTrackingId::generate);

        if self.config.disable_push_energy_status {
            return PushResult::admin_down(&self.config.id, tracking);
        }
        if !self.filters.for_kind::<Evse>().admits_id(update.id()) {
            return PushResult::no_operation(&self.config.id, tracking);
        }

        let data_push = !self.config.disable_push_data;
        let lane = self
            .queues
            .with(|q| q.enqueue_energy_status(update, data_push));

        self.accepted(lane.cycle(), transmission, tracking).await
    }

    // ========================================================================
    // Charge detail records
    // ========================================================================

    /// Queue charge detail records for billing
    ///
    /// Records refused by the CDR filter come back in `rejected_items`.
    pub async fn send_charge_detail_records(
        &self,
        records: Vec<ChargeDetailRecord>,
        transmission: TransmissionType,
        event_tracking_id: Option<EventTrackingId>,
    ) -> PushResult<ChargeDetailRecord> {
        let tracking = event_tracking_id.unwrap_or_else(EventTrackingId::generate);

        if self.config.disable_send_charge_detail_records {
            return PushResult::admin_down(&self.config.id, tracking)
                .with_rejected(records);
        }
        if records.is_empty() {
            return PushResult::no_operation(&self.config.id, tracking);
        }

        let (forward, rejected): (Vec<_>, Vec<_>) = records
            .into_iter()
            .partition(|cdr| self.filters.cdr_decision(cdr) == CdrFilterDecision::Forward);

        let warnings: Vec<Warning> = rejected
            .iter()
            .map(|cdr| Warning::new(format!("charge detail record {} was filtered", cdr.id)))
            .collect();

        if forward.is_empty() {
            return PushResult::no_operation(&self.config.id, tracking)
                .with_rejected(rejected)
                .with_warnings(warnings);
        }

        debug!(
            "{}: queued {} charge detail records ({} filtered)",
            self.config.id,
            forward.len(),
            rejected.len()
        );
        self.queues
            .with(|q| q.enqueue_charge_detail_records(forward));

        let result = self
            .accepted(FlushCycle::ChargeDetailRecords, transmission, tracking)
            .await;
        result.with_rejected(rejected).with_warnings(warnings)
    }

    // ========================================================================
    // Transmission
    // ========================================================================

    /// Arm the cycle owning a freshly queued item and answer the caller
    async fn accepted<T>(
        &self,
        cycle: FlushCycle,
        transmission: TransmissionType,
        tracking: EventTrackingId,
    ) -> PushResult<T> {
        self.flusher.arm(cycle);
        let result = PushResult::enqueued(&self.config.id, tracking);

        match transmission {
            TransmissionType::Enqueue => result,
            TransmissionType::Direct => self.transmit_now(cycle, result).await,
        }
    }

    /// Flush `cycle` right away and translate its outcome
    ///
    /// The run is spawned so that hitting the request timeout leaves it to
    /// finish on its own.
    async fn transmit_now<T>(&self, cycle: FlushCycle, result: PushResult<T>) -> PushResult<T> {
        let flusher = self.flusher.clone();
        let run = tokio::spawn(async move { flusher.run_cycle(cycle).await });

        match tokio::time::timeout(self.config.request_timeout, run).await {
            Ok(Ok(CycleOutcome::Completed {
                runtime, warnings, ..
            })) => {
                let outcome = if warnings.is_empty() {
                    PushOutcome::Success
                } else {
                    PushOutcome::PartialSuccess
                };
                result
                    .map_outcome(outcome)
                    .with_warnings(warnings)
                    .with_runtime(runtime)
            }
            Ok(Ok(CycleOutcome::Failed { runtime, error, .. })) => result
                .map_outcome(PushOutcome::Error)
                .with_description(error)
                .with_runtime(runtime),
            Ok(Ok(CycleOutcome::Skipped(reason))) => result.with_description(reason.to_string()),
            Ok(Err(e)) => {
                warn!("{}: direct {} flush task failed: {}", self.config.id, cycle, e);
                result
                    .map_outcome(PushOutcome::Error)
                    .with_description(e.to_string())
            }
            Err(_) => result.with_description("flush still running"),
        }
    }
}

impl std::fmt::Debug for RoamingAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoamingAdapter")
            .field("id", &self.config.id)
            .field("filters", &self.filters)
            .field("pending", &self.queues.pending())
            .field("running", &self.is_running())
            .finish()
    }
}
