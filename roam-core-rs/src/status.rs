//! Status values carried by roaming entities
//!
//! Dynamic status (occupancy, faults) and admin status (operator controlled
//! availability) are kept as separate enums per entity kind. Every status
//! travels wrapped in [`Timestamped`] so two observations of the same entity
//! can be ordered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Timestamped values
// ============================================================================

/// A value observed at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamped<T> {
    pub value: T,
    pub timestamp: DateTime<Utc>,
}

impl<T> Timestamped<T> {
    pub fn at(value: T, timestamp: DateTime<Utc>) -> Self {
        Self { value, timestamp }
    }

    pub fn now(value: T) -> Self {
        Self::at(value, Utc::now())
    }

    /// Merge two observations: the later timestamp wins, a tie keeps `self`
    pub fn latest(self, other: Self) -> Self {
        if other.timestamp > self.timestamp {
            other
        } else {
            self
        }
    }

    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.timestamp > other.timestamp
    }
}

// ============================================================================
// EVSE
// ============================================================================

/// Dynamic EVSE status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EvseStatusType {
    Available,
    Reserved,
    Charging,
    Blocked,
    Faulted,
    Offline,
    OutOfService,
    Unknown,
}

/// Operator controlled EVSE availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EvseAdminStatusType {
    Operational,
    InternalUse,
    OutOfService,
    Planned,
    InDeployment,
    Deleted,
    Unknown,
}

/// Energy meter readings reported for an EVSE
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyStatus {
    pub power_kw: f64,
    pub energy_kwh: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soc_percent: Option<f64>,
}

// ============================================================================
// Charging station
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ChargingStationStatusType {
    Available,
    PartiallyAvailable,
    Occupied,
    Faulted,
    Offline,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ChargingStationAdminStatusType {
    Operational,
    InternalUse,
    OutOfService,
    Planned,
    Deleted,
    Unknown,
}

// ============================================================================
// Charging pool
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ChargingPoolStatusType {
    Available,
    PartiallyAvailable,
    Occupied,
    Charging,
    Faulted,
    Offline,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ChargingPoolAdminStatusType {
    Operational,
    InternalUse,
    OutOfService,
    Planned,
    Deleted,
    Unknown,
}

// ============================================================================
// Charging station operator
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum OperatorStatusType {
    Available,
    Degraded,
    Offline,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum OperatorAdminStatusType {
    Operational,
    OutOfService,
    Deleted,
    Unknown,
}

// ============================================================================
// Roaming network
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RoamingNetworkStatusType {
    Available,
    Degraded,
    Offline,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RoamingNetworkAdminStatusType {
    Operational,
    OutOfService,
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_latest_prefers_later_timestamp() {
        let t0 = Utc::now();
        let older = Timestamped::at(EvseStatusType::Available, t0);
        let newer = Timestamped::at(EvseStatusType::Charging, t0 + Duration::seconds(5));

        assert_eq!(older.latest(newer).value, EvseStatusType::Charging);
        assert_eq!(newer.latest(older).value, EvseStatusType::Charging);
        assert!(newer.is_newer_than(&older));
    }

    #[test]
    fn test_latest_tie_keeps_first() {
        let t0 = Utc::now();
        let a = Timestamped::at(EvseStatusType::Available, t0);
        let b = Timestamped::at(EvseStatusType::Faulted, t0);

        assert_eq!(a.latest(b).value, EvseStatusType::Available);
    }

    #[test]
    fn test_status_serializes_pascal_case() {
        let json = serde_json::to_string(&EvseAdminStatusType::OutOfService).unwrap();
        assert_eq!(json, "\"OutOfService\"");
    }
}
