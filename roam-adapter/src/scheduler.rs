//! Flush cycles and their timers
//!
//! Three cycles drain the queue set independently:
//!
//! | Cycle | Drains | Default period | Timer |
//! |-------|--------|----------------|-------|
//! | data+status | add/update/remove, delayed lanes | 31s | recurring |
//! | fast status | fast lanes | 3s | armed on enqueue |
//! | charge detail records | CDR list | 15s | recurring |
//!
//! ## Cycle run
//!
//! ```text
//! timer fires
//!   └─ try_lock(cycle lock) ──busy──► skip, re-arm if lanes hold items
//!        └─ executor.skip_flush? ──yes──► release, skip
//!             └─ FlushStarted
//!                  └─ snapshot-and-clear (coarse queue lock, brief)
//!                       └─ executor.flush_*  (errors and panics contained)
//!                            └─ FlushFinished, run_id += 1, release
//! ```
//!
//! Each cycle has its own lock, so a slow data flush never holds back the
//! fast status cycle. Every timer firing spawns its run as a separate task,
//! so a tick arriving while the previous run still holds the lock is skipped
//! instead of queued behind it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use roam_core::Warning;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::config::AdapterConfig;
use crate::error::{root_cause, BoxError};
use crate::events::{AdapterEvent, EventBus};
use crate::executor::{FlushExecutor, FlushReport};
use crate::queues::QueueLock;

/// One of the independently scheduled flush loops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlushCycle {
    DataAndStatus,
    FastStatus,
    ChargeDetailRecords,
}

impl FlushCycle {
    pub const ALL: [FlushCycle; 3] = [
        FlushCycle::DataAndStatus,
        FlushCycle::FastStatus,
        FlushCycle::ChargeDetailRecords,
    ];

    fn index(&self) -> usize {
        match self {
            FlushCycle::DataAndStatus => 0,
            FlushCycle::FastStatus => 1,
            FlushCycle::ChargeDetailRecords => 2,
        }
    }

    /// Recurring cycles fire every period; the others only once armed
    pub fn is_recurring(&self) -> bool {
        !matches!(self, FlushCycle::FastStatus)
    }

    /// Executor method invoked by this cycle
    pub fn method_name(&self) -> &'static str {
        match self {
            FlushCycle::DataAndStatus => "flush_data_and_status",
            FlushCycle::FastStatus => "flush_fast_status",
            FlushCycle::ChargeDetailRecords => "flush_charge_detail_records",
        }
    }
}

impl std::fmt::Display for FlushCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlushCycle::DataAndStatus => write!(f, "data+status"),
            FlushCycle::FastStatus => write!(f, "fast status"),
            FlushCycle::ChargeDetailRecords => write!(f, "charge detail record"),
        }
    }
}

/// Why a cycle run did not flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The previous run of the same cycle still holds its lock
    Busy,
    /// The executor's skip predicate said so
    Predicate,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Busy => write!(f, "previous run still in progress"),
            SkipReason::Predicate => write!(f, "skipped by executor"),
        }
    }
}

/// Result of one cycle run
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Skipped(SkipReason),
    Completed {
        run_id: u64,
        items: usize,
        runtime: Duration,
        warnings: Vec<Warning>,
    },
    Failed {
        run_id: u64,
        items: usize,
        runtime: Duration,
        error: String,
    },
}

impl CycleOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, CycleOutcome::Skipped(_))
    }
}

/// Timer and lock state of one cycle
#[derive(Debug)]
struct CycleState {
    period: Duration,
    lock: Mutex<()>,
    /// Set for as long as a run holds `lock`
    running: AtomicBool,
    run_id: AtomicU64,
    armed: AtomicBool,
    wake: Notify,
}

/// Clears the running flag when a run ends, however it ends
struct RunningFlag<'a>(&'a AtomicBool);

impl<'a> RunningFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CycleState {
    fn new(period: Duration) -> Self {
        Self {
            period,
            lock: Mutex::new(()),
            running: AtomicBool::new(false),
            run_id: AtomicU64::new(0),
            armed: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }
}

// ============================================================================
// Flusher
// ============================================================================

/// Runs flush cycles against an executor
pub struct Flusher {
    sender_id: String,
    queues: Arc<QueueLock>,
    executor: Arc<dyn FlushExecutor>,
    events: EventBus,
    cycles: [CycleState; 3],
}

impl Flusher {
    pub fn new(
        config: &AdapterConfig,
        queues: Arc<QueueLock>,
        executor: Arc<dyn FlushExecutor>,
        events: EventBus,
    ) -> Self {
        Self {
            sender_id: config.id.clone(),
            queues,
            executor,
            events,
            cycles: FlushCycle::ALL.map(|cycle| CycleState::new(config.flush_period(cycle))),
        }
    }

    fn state(&self, cycle: FlushCycle) -> &CycleState {
        &self.cycles[cycle.index()]
    }

    /// Id the next run of `cycle` will carry
    pub fn run_id(&self, cycle: FlushCycle) -> u64 {
        self.state(cycle).run_id.load(Ordering::Acquire)
    }

    pub fn period(&self, cycle: FlushCycle) -> Duration {
        self.state(cycle).period
    }

    /// Whether a run of `cycle` currently holds its lock
    pub fn is_running(&self, cycle: FlushCycle) -> bool {
        self.state(cycle).running.load(Ordering::Acquire)
    }

    pub fn is_armed(&self, cycle: FlushCycle) -> bool {
        self.state(cycle).armed.load(Ordering::Acquire)
    }

    /// Make sure `cycle` fires within one period; no-op while already armed
    pub fn arm(&self, cycle: FlushCycle) {
        let state = self.state(cycle);
        if !state.armed.swap(true, Ordering::AcqRel) {
            state.wake.notify_one();
        }
    }

    /// Run one flush of `cycle` now
    pub async fn run_cycle(&self, cycle: FlushCycle) -> CycleOutcome {
        let state = self.state(cycle);

        let _guard = match state.lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(
                    "{}: {} flush still running, skipping this tick",
                    self.sender_id, cycle
                );
                self.rearm_if_pending(cycle);
                return CycleOutcome::Skipped(SkipReason::Busy);
            }
        };
        let _running = RunningFlag::raise(&state.running);

        let pending = self.queues.pending();
        if self.executor.skip_flush(cycle, &pending) {
            debug!(
                "{}: {} flush skipped ({} pending)",
                self.sender_id,
                cycle,
                pending.for_cycle(cycle)
            );
            self.rearm_if_pending(cycle);
            return CycleOutcome::Skipped(SkipReason::Predicate);
        }

        let run_id = state.run_id.load(Ordering::Acquire);
        let started = Utc::now();
        let clock = Instant::now();

        self.events.emit(AdapterEvent::FlushStarted {
            sender: self.sender_id.clone(),
            cycle,
            started,
            period: state.period,
            run_id,
        });

        let (items, result) = match cycle {
            FlushCycle::DataAndStatus => {
                let snapshot = self.queues.with(|q| q.take_data_and_status(run_id));
                let items = snapshot.len();
                (items, contain(self.executor.flush_data_and_status(snapshot)).await)
            }
            FlushCycle::FastStatus => {
                let snapshot = self.queues.with(|q| q.take_fast_status(run_id));
                let items = snapshot.len();
                (items, contain(self.executor.flush_fast_status(snapshot)).await)
            }
            FlushCycle::ChargeDetailRecords => {
                let snapshot = self.queues.with(|q| q.take_charge_detail_records(run_id));
                let items = snapshot.len();
                (items, contain(self.executor.flush_charge_detail_records(snapshot)).await)
            }
        };

        let runtime = clock.elapsed();
        let outcome = match result {
            Ok(report) => {
                if !report.warnings.is_empty() {
                    warn!(
                        "{}: {} flush #{} reported {} warnings",
                        self.sender_id,
                        cycle,
                        run_id,
                        report.warnings.len()
                    );
                    self.events.emit(AdapterEvent::Warnings {
                        timestamp: Utc::now(),
                        component: self.sender_id.clone(),
                        method: cycle.method_name().to_string(),
                        warnings: report.warnings.clone(),
                    });
                }
                CycleOutcome::Completed {
                    run_id,
                    items,
                    runtime,
                    warnings: report.warnings,
                }
            }
            Err(message) => {
                error!(
                    "{}: {} flush #{} failed: {}",
                    self.sender_id, cycle, run_id, message
                );
                self.events.emit(AdapterEvent::Exception {
                    timestamp: Utc::now(),
                    sender: self.sender_id.clone(),
                    cycle,
                    run_id,
                    message: message.clone(),
                });
                CycleOutcome::Failed {
                    run_id,
                    items,
                    runtime,
                    error: message,
                }
            }
        };

        self.events.emit(AdapterEvent::FlushFinished {
            sender: self.sender_id.clone(),
            cycle,
            started,
            finished: Utc::now(),
            duration: runtime,
            period: state.period,
            run_id,
            items,
        });

        debug!(
            "{}: {} flush #{} done, {} items in {:?}",
            self.sender_id, cycle, run_id, items, runtime
        );

        state.run_id.fetch_add(1, Ordering::AcqRel);
        self.rearm_if_pending(cycle);
        outcome
    }

    /// On-demand cycles keep firing while their lanes hold items
    fn rearm_if_pending(&self, cycle: FlushCycle) {
        if !cycle.is_recurring() && self.queues.pending().for_cycle(cycle) > 0 {
            self.arm(cycle);
        }
    }
}

/// Await an executor future, turning errors and panics into a message
async fn contain<F>(flush: F) -> Result<FlushReport, String>
where
    F: std::future::Future<Output = Result<FlushReport, BoxError>>,
{
    match AssertUnwindSafe(flush).catch_unwind().await {
        Ok(Ok(report)) => Ok(report),
        Ok(Err(e)) => Err(root_cause(e.as_ref()).to_string()),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("executor panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("executor panicked: {}", message)
    } else {
        "executor panicked".to_string()
    }
}

// ============================================================================
// Timers
// ============================================================================

/// Owner of the three timer tasks
pub struct FlushScheduler {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl FlushScheduler {
    /// Spawn one timer task per cycle
    pub fn start(flusher: Arc<Flusher>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handles = FlushCycle::ALL
            .into_iter()
            .map(|cycle| {
                let flusher = flusher.clone();
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(run_timer(flusher, cycle, shutdown_rx))
            })
            .collect();

        info!("{}: flush timers started", flusher.sender_id);

        Self {
            shutdown_tx,
            handles,
        }
    }

    /// Stop all timers and wait for their tasks to exit
    ///
    /// Runs already spawned finish on their own and release their locks.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        for handle in std::mem::take(&mut self.handles) {
            if let Err(e) = handle.await {
                warn!("Flush timer task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

async fn run_timer(flusher: Arc<Flusher>, cycle: FlushCycle, mut shutdown: watch::Receiver<bool>) {
    let period = flusher.period(cycle);
    let mut deadline = cycle.is_recurring().then(|| Instant::now() + period);

    loop {
        if *shutdown.borrow() {
            break;
        }

        if deadline.is_none() && flusher.is_armed(cycle) {
            deadline = Some(Instant::now() + period);
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            _ = flusher.state(cycle).wake.notified() => continue,
            _ = sleep_until_deadline(deadline) => {}
        }

        deadline = cycle.is_recurring().then(|| Instant::now() + period);
        flusher.state(cycle).armed.store(false, Ordering::Release);

        let run = flusher.clone();
        tokio::spawn(async move {
            run.run_cycle(cycle).await;
        });
    }

    debug!("{}: {} timer stopped", flusher.sender_id, cycle);
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queues::{CdrSnapshot, DataAndStatusSnapshot, FastStatusSnapshot};
    use async_trait::async_trait;
    use chrono::Utc;
    use roam_core::{
        ChargeDetailRecord, Evse, EvseId, EvseStatusType, StatusUpdate, Timestamped,
    };
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingExecutor {
        cdr_calls: AtomicUsize,
        fail_cdrs: bool,
        panic_cdrs: bool,
    }

    #[async_trait]
    impl FlushExecutor for CountingExecutor {
        async fn flush_data_and_status(
            &self,
            _snapshot: DataAndStatusSnapshot,
        ) -> Result<FlushReport, BoxError> {
            Ok(FlushReport::ok())
        }

        async fn flush_fast_status(
            &self,
            _snapshot: FastStatusSnapshot,
        ) -> Result<FlushReport, BoxError> {
            Ok(FlushReport::ok())
        }

        async fn flush_charge_detail_records(
            &self,
            snapshot: CdrSnapshot,
        ) -> Result<FlushReport, BoxError> {
            self.cdr_calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_cdrs {
                panic!("billing backend exploded");
            }
            if self.fail_cdrs {
                return Err(format!("{} records rejected", snapshot.len()).into());
            }
            Ok(FlushReport::ok().with_warning(Warning::new("partner is slow")))
        }
    }

    fn flusher(executor: CountingExecutor) -> (Arc<Flusher>, Arc<QueueLock>, Arc<CountingExecutor>) {
        let queues = Arc::new(QueueLock::new());
        let executor = Arc::new(executor);
        let flusher = Arc::new(Flusher::new(
            &AdapterConfig::default(),
            queues.clone(),
            executor.clone(),
            EventBus::new(16),
        ));
        (flusher, queues, executor)
    }

    fn queue_cdr(queues: &QueueLock) {
        let now = Utc::now();
        queues.with(|q| {
            q.enqueue_charge_detail_records([ChargeDetailRecord::new(
                EvseId::new("E1").unwrap(),
                "s-1",
                now,
                now,
                3.0,
            )])
        });
    }

    #[test]
    fn test_cycle_properties() {
        assert!(FlushCycle::DataAndStatus.is_recurring());
        assert!(!FlushCycle::FastStatus.is_recurring());
        assert_eq!(FlushCycle::FastStatus.to_string(), "fast status");
        assert_eq!(FlushCycle::ALL.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_queue_is_skipped_by_default_predicate() {
        let (flusher, _queues, executor) = flusher(CountingExecutor::default());

        let outcome = flusher.run_cycle(FlushCycle::ChargeDetailRecords).await;

        assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::Predicate));
        assert_eq!(executor.cdr_calls.load(Ordering::SeqCst), 0);
        assert_eq!(flusher.run_id(FlushCycle::ChargeDetailRecords), 0);
    }

    #[tokio::test]
    async fn test_completed_run_increments_run_id() {
        let (flusher, queues, executor) = flusher(CountingExecutor::default());
        queue_cdr(&queues);

        let outcome = flusher.run_cycle(FlushCycle::ChargeDetailRecords).await;

        match outcome {
            CycleOutcome::Completed { run_id, items, warnings, .. } => {
                assert_eq!(run_id, 0);
                assert_eq!(items, 1);
                assert_eq!(warnings.len(), 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(executor.cdr_calls.load(Ordering::SeqCst), 1);
        assert_eq!(flusher.run_id(FlushCycle::ChargeDetailRecords), 1);
        assert!(!flusher.is_running(FlushCycle::ChargeDetailRecords));
    }

    #[tokio::test]
    async fn test_failed_run_releases_lock_and_drops_items() {
        let (flusher, queues, _executor) = flusher(CountingExecutor {
            fail_cdrs: true,
            ..Default::default()
        });
        queue_cdr(&queues);

        let outcome = flusher.run_cycle(FlushCycle::ChargeDetailRecords).await;

        assert!(matches!(
            outcome,
            CycleOutcome::Failed { ref error, .. } if error == "1 records rejected"
        ));
        assert!(!flusher.is_running(FlushCycle::ChargeDetailRecords));
        assert_eq!(queues.pending().charge_detail_records, 0);
        assert_eq!(flusher.run_id(FlushCycle::ChargeDetailRecords), 1);
    }

    #[tokio::test]
    async fn test_panicking_executor_is_contained() {
        let (flusher, queues, _executor) = flusher(CountingExecutor {
            panic_cdrs: true,
            ..Default::default()
        });
        queue_cdr(&queues);

        let outcome = flusher.run_cycle(FlushCycle::ChargeDetailRecords).await;

        assert!(matches!(
            outcome,
            CycleOutcome::Failed { ref error, .. } if error.contains("billing backend exploded")
        ));

        // The next run proceeds normally
        queue_cdr(&queues);
        let outcome = flusher.run_cycle(FlushCycle::ChargeDetailRecords).await;
        assert!(matches!(outcome, CycleOutcome::Failed { run_id: 1, .. }));
    }

    fn queue_fast_status(queues: &QueueLock) {
        queues.with(|q| {
            q.kind_mut::<Evse>().enqueue_status(
                StatusUpdate::new(
                    EvseId::new("E1").unwrap(),
                    Timestamped::now(EvseStatusType::Available),
                    Timestamped::now(EvseStatusType::Charging),
                ),
                true,
            )
        });
    }

    #[tokio::test]
    async fn test_busy_fast_tick_rearms_while_items_pending() {
        let (flusher, queues, _executor) = flusher(CountingExecutor::default());
        queue_fast_status(&queues);

        let held = flusher.state(FlushCycle::FastStatus).lock.lock().await;
        let outcome = flusher.run_cycle(FlushCycle::FastStatus).await;
        drop(held);

        assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::Busy));
        assert!(flusher.is_armed(FlushCycle::FastStatus));
    }

    #[tokio::test]
    async fn test_busy_tick_with_empty_lanes_stays_disarmed() {
        let (flusher, _queues, _executor) = flusher(CountingExecutor::default());

        let held = flusher.state(FlushCycle::FastStatus).lock.lock().await;
        let outcome = flusher.run_cycle(FlushCycle::FastStatus).await;
        drop(held);

        assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::Busy));
        assert!(!flusher.is_armed(FlushCycle::FastStatus));
    }

    #[tokio::test]
    async fn test_running_flag_tracks_an_active_run() {
        let (flusher, queues, _executor) = flusher(CountingExecutor::default());
        queue_fast_status(&queues);

        let observed = {
            let state = flusher.state(FlushCycle::FastStatus);
            let _guard = state.lock.lock().await;
            let _running = RunningFlag::raise(&state.running);
            flusher.is_running(FlushCycle::FastStatus)
        };

        assert!(observed);
        assert!(!flusher.is_running(FlushCycle::FastStatus));
    }

    #[tokio::test]
    async fn test_arm_is_coalesced() {
        let (flusher, _queues, _executor) = flusher(CountingExecutor::default());

        assert!(!flusher.is_armed(FlushCycle::FastStatus));
        flusher.arm(FlushCycle::FastStatus);
        flusher.arm(FlushCycle::FastStatus);
        assert!(flusher.is_armed(FlushCycle::FastStatus));
    }
}
