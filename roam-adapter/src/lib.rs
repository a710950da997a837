//! # Roaming Adapter
//!
//! Queued, batched, timer-driven synchronization of charging infrastructure
//! toward a remote roaming partner.
//!
//! ## Architecture
//!
//! ```text
//! Entity model (many producers)
//!       │ add / update / remove / status / CDRs
//!       ▼
//! ┌──────────────────────────────────────┐
//! │    RoamingAdapter                    │
//! │  disable switches ─► filters         │
//! │         │                            │
//! │         ▼  coarse lock               │
//! │  ┌────────────────────────────────┐  │
//! │  │ QueueSet                       │  │
//! │  │ add │ update │ remove          │  │
//! │  │ fast lanes │ delayed lanes     │  │
//! │  │ charge detail records          │  │
//! │  └────────────────────────────────┘  │
//! │         │ snapshot-and-clear         │
//! │  ┌──────┴───────┬───────────────┐    │
//! │  │ data+status  │ fast status   │ CDR│
//! │  │ 31s          │ 3s, on demand │ 15s│
//! │  └──────────────┴───────────────┘    │
//! └─────────┬────────────────────────────┘
//!           │ snapshots          ▲ FlushStarted / FlushFinished
//!           ▼                    │ Exception / Warnings
//! ┌──────────────────────┐       │
//! │ FlushExecutor        │   event subscribers
//! │ (partner protocol)   │
//! └──────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use roam_adapter::{
//!     AdapterConfig, BoxError, CdrSnapshot, DataAndStatusSnapshot, FastStatusSnapshot,
//!     FlushExecutor, FlushReport, IncludeFilters, RoamingAdapter,
//! };
//! use roam_core::{ChargingStationId, Evse, EvseId, TransmissionType};
//!
//! struct Partner;
//!
//! #[async_trait::async_trait]
//! impl FlushExecutor for Partner {
//!     async fn flush_data_and_status(&self, _: DataAndStatusSnapshot) -> Result<FlushReport, BoxError> {
//!         Ok(FlushReport::ok())
//!     }
//!     async fn flush_fast_status(&self, _: FastStatusSnapshot) -> Result<FlushReport, BoxError> {
//!         Ok(FlushReport::ok())
//!     }
//!     async fn flush_charge_detail_records(&self, _: CdrSnapshot) -> Result<FlushReport, BoxError> {
//!         Ok(FlushReport::ok())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = RoamingAdapter::new(
//!         AdapterConfig::new("hubject", "Hubject"),
//!         IncludeFilters::new(),
//!         Arc::new(Partner),
//!     )?;
//!     adapter.start()?;
//!
//!     let evse = Evse::new(EvseId::new("DE*GEF*E1")?, ChargingStationId::new("DE*GEF*S1")?);
//!     adapter.add(evse, TransmissionType::Enqueue, None).await;
//!
//!     adapter.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod filters;
pub mod kinds;
pub mod queues;
pub mod scheduler;

pub use adapter::RoamingAdapter;
pub use config::AdapterConfig;
pub use error::{root_cause, AdapterError, BoxError};
pub use events::{AdapterEvent, EventBus};
pub use executor::{FlushExecutor, FlushReport};
pub use filters::{CdrFilterDecision, EntityFilter, IncludeFilters};
pub use kinds::Synchronized;
pub use queues::{
    CdrSnapshot, DataAndStatusSnapshot, EntityChanges, FastStatusSnapshot, Lane, PendingCounts,
    QueueSet, StatusChanges,
};
pub use scheduler::{CycleOutcome, FlushCycle, SkipReason};
