//! Partner-specific flush executors
//!
//! The scheduler decides *when* a cycle runs and hands over a drained
//! snapshot; the executor decides *how* that snapshot reaches the partner
//! (batching, protocol calls, retries). Whatever the executor does with the
//! snapshot, the core never requeues it.

use async_trait::async_trait;
use roam_core::Warning;

use crate::error::BoxError;
use crate::queues::{CdrSnapshot, DataAndStatusSnapshot, FastStatusSnapshot, PendingCounts};
use crate::scheduler::FlushCycle;

/// What an executor reports back after a flush
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub warnings: Vec<Warning>,
}

impl FlushReport {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_warning(mut self, warning: Warning) -> Self {
        self.warnings.push(warning);
        self
    }
}

/// Synchronization strategy of one roaming partner
#[async_trait]
pub trait FlushExecutor: Send + Sync + 'static {
    /// Whether `cycle` should skip this tick; default: nothing to flush
    fn skip_flush(&self, cycle: FlushCycle, pending: &PendingCounts) -> bool {
        pending.for_cycle(cycle) == 0
    }

    async fn flush_data_and_status(
        &self,
        snapshot: DataAndStatusSnapshot,
    ) -> Result<FlushReport, BoxError>;

    async fn flush_fast_status(&self, snapshot: FastStatusSnapshot) -> Result<FlushReport, BoxError>;

    async fn flush_charge_detail_records(&self, snapshot: CdrSnapshot)
        -> Result<FlushReport, BoxError>;
}
