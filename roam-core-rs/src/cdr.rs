//! Charge detail records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ChargeDetailRecordId, ChargingStationOperatorId, EvseId};

/// Billing record of one finished charging session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeDetailRecord {
    pub id: ChargeDetailRecordId,
    pub evse_id: EvseId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<ChargingStationOperatorId>,
    pub session_id: String,
    pub started: DateTime<Utc>,
    pub stopped: DateTime<Utc>,
    pub energy_kwh: f64,
}

impl ChargeDetailRecord {
    pub fn new(
        evse_id: EvseId,
        session_id: impl Into<String>,
        started: DateTime<Utc>,
        stopped: DateTime<Utc>,
        energy_kwh: f64,
    ) -> Self {
        Self {
            id: ChargeDetailRecordId::generate(),
            evse_id,
            operator_id: None,
            session_id: session_id.into(),
            started,
            stopped,
            energy_kwh,
        }
    }

    pub fn with_operator(mut self, operator_id: ChargingStationOperatorId) -> Self {
        self.operator_id = Some(operator_id);
        self
    }

    pub fn duration(&self) -> chrono::Duration {
        self.stopped.signed_duration_since(self.started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cdr_duration() {
        let started = Utc::now();
        let stopped = started + chrono::Duration::minutes(45);
        let cdr = ChargeDetailRecord::new(EvseId::new("E1").unwrap(), "s-1", started, stopped, 12.5);

        assert_eq!(cdr.duration().num_minutes(), 45);
        assert!(cdr.operator_id.is_none());
    }
}
