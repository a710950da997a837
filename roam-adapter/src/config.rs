//! Configuration for the roaming adapter
//!
//! Flush periods per cycle and the per-category disable switches. Admission
//! filters are closures and live in [`crate::filters::IncludeFilters`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::AdapterError;
use crate::scheduler::FlushCycle;

/// Complete adapter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Adapter identity, used as sender in results and events
    pub id: String,

    /// Display name of the roaming partner
    pub name: String,

    /// Period of the data+status flush cycle
    #[serde(with = "duration_ms")]
    pub data_flush_every: Duration,

    /// Period of the fast status flush cycle
    #[serde(with = "duration_ms")]
    pub status_flush_every: Duration,

    /// Period of the charge detail record flush cycle
    #[serde(with = "duration_ms")]
    pub cdr_flush_every: Duration,

    /// Upper bound a direct transmission waits for its flush
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,

    /// Buffered events per subscriber before it starts lagging
    pub event_capacity: usize,

    pub disable_push_data: bool,
    pub disable_push_admin_status: bool,
    pub disable_push_status: bool,
    pub disable_push_energy_status: bool,
    pub disable_send_charge_detail_records: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            id: "roaming-adapter".to_string(),
            name: "Roaming Adapter".to_string(),
            data_flush_every: Duration::from_secs(31),
            status_flush_every: Duration::from_secs(3),
            cdr_flush_every: Duration::from_secs(15),
            request_timeout: Duration::from_secs(60),
            event_capacity: 256,
            disable_push_data: false,
            disable_push_admin_status: false,
            disable_push_status: false,
            disable_push_energy_status: false,
            disable_send_charge_detail_records: false,
        }
    }
}

impl AdapterConfig {
    /// Create config with an id and name, defaults elsewhere
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a JSON document, missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, AdapterError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> Result<(), AdapterError> {
        if self.id.trim().is_empty() {
            return Err(AdapterError::InvalidConfig("adapter id must not be empty".into()));
        }

        for cycle in FlushCycle::ALL {
            if self.flush_period(cycle).is_zero() {
                return Err(AdapterError::InvalidConfig(format!(
                    "{} flush period must be greater than zero",
                    cycle
                )));
            }
        }

        if self.request_timeout.is_zero() {
            return Err(AdapterError::InvalidConfig(
                "request timeout must be greater than zero".into(),
            ));
        }

        if self.event_capacity == 0 {
            return Err(AdapterError::InvalidConfig(
                "event capacity must be greater than zero".into(),
            ));
        }

        Ok(())
    }

    /// Configured period of a flush cycle
    pub fn flush_period(&self, cycle: FlushCycle) -> Duration {
        match cycle {
            FlushCycle::DataAndStatus => self.data_flush_every,
            FlushCycle::FastStatus => self.status_flush_every,
            FlushCycle::ChargeDetailRecords => self.cdr_flush_every,
        }
    }

    /// Set all three flush periods
    pub fn with_flush_periods(mut self, data: Duration, status: Duration, cdr: Duration) -> Self {
        self.data_flush_every = data;
        self.status_flush_every = status;
        self.cdr_flush_every = cdr;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Refuse entity add/update/remove pushes
    pub fn without_push_data(mut self) -> Self {
        self.disable_push_data = true;
        self
    }

    pub fn without_push_admin_status(mut self) -> Self {
        self.disable_push_admin_status = true;
        self
    }

    pub fn without_push_status(mut self) -> Self {
        self.disable_push_status = true;
        self
    }

    pub fn without_push_energy_status(mut self) -> Self {
        self.disable_push_energy_status = true;
        self
    }

    pub fn without_charge_detail_records(mut self) -> Self {
        self.disable_send_charge_detail_records = true;
        self
    }
}

/// Durations as integer milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
