//! Change records emitted by the entity model
//!
//! A change record describes one observed change: a property edit, a status
//! transition or an admin-status transition. Records are immutable once
//! built; the adapter queues them as-is.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::entities::{
    ChargingPool, ChargingStation, ChargingStationOperator, Evse, RoamingEntity,
};
use crate::ids::{EvseId, RoamingNetworkId};
use crate::status::*;

/// Errors raised when building change records
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    #[error("property name must not be empty")]
    EmptyPropertyName,
}

/// How a change should reach the roaming partner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransmissionType {
    /// Flush the relevant queue right away and report the outcome
    Direct,
    /// Queue the change for the next scheduled flush
    #[default]
    Enqueue,
}

// ============================================================================
// Property updates
// ============================================================================

/// One property edit on an entity, kept in the per-entity update log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyUpdateInfo {
    property_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    old_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_source: Option<String>,
}

impl PropertyUpdateInfo {
    pub fn new(
        property_name: impl Into<String>,
        old_value: Option<Value>,
        new_value: Option<Value>,
    ) -> Result<Self, UpdateError> {
        let property_name = property_name.into();
        if property_name.trim().is_empty() {
            return Err(UpdateError::EmptyPropertyName);
        }

        Ok(Self {
            property_name,
            old_value,
            new_value,
            data_source: None,
        })
    }

    pub fn with_data_source(mut self, data_source: impl Into<String>) -> Self {
        self.data_source = Some(data_source.into());
        self
    }

    pub fn property_name(&self) -> &str {
        &self.property_name
    }

    pub fn old_value(&self) -> Option<&Value> {
        self.old_value.as_ref()
    }

    pub fn new_value(&self) -> Option<&Value> {
        self.new_value.as_ref()
    }

    pub fn data_source(&self) -> Option<&str> {
        self.data_source.as_deref()
    }
}

// ============================================================================
// Status updates
// ============================================================================

/// A status transition of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate<I, T> {
    id: I,
    old_status: Timestamped<T>,
    new_status: Timestamped<T>,
}

impl<I, T> StatusUpdate<I, T> {
    pub fn new(id: I, old_status: Timestamped<T>, new_status: Timestamped<T>) -> Self {
        Self {
            id,
            old_status,
            new_status,
        }
    }

    pub fn id(&self) -> &I {
        &self.id
    }

    pub fn old_status(&self) -> &Timestamped<T> {
        &self.old_status
    }

    pub fn new_status(&self) -> &Timestamped<T> {
        &self.new_status
    }
}

impl<I, T: PartialEq> StatusUpdate<I, T> {
    /// True when old and new carry the same value
    pub fn is_unchanged(&self) -> bool {
        self.old_status.value == self.new_status.value
    }
}

/// Status update of entity kind `E`
pub type EntityStatusUpdate<E> =
    StatusUpdate<<E as RoamingEntity>::Id, <E as RoamingEntity>::Status>;

/// Admin-status update of entity kind `E`
pub type EntityAdminStatusUpdate<E> =
    StatusUpdate<<E as RoamingEntity>::Id, <E as RoamingEntity>::AdminStatus>;

pub type EvseStatusUpdate = EntityStatusUpdate<Evse>;
pub type EvseAdminStatusUpdate = EntityAdminStatusUpdate<Evse>;
pub type ChargingStationStatusUpdate = EntityStatusUpdate<ChargingStation>;
pub type ChargingStationAdminStatusUpdate = EntityAdminStatusUpdate<ChargingStation>;
pub type ChargingPoolStatusUpdate = EntityStatusUpdate<ChargingPool>;
pub type ChargingPoolAdminStatusUpdate = EntityAdminStatusUpdate<ChargingPool>;
pub type OperatorStatusUpdate = EntityStatusUpdate<ChargingStationOperator>;
pub type OperatorAdminStatusUpdate = EntityAdminStatusUpdate<ChargingStationOperator>;
pub type RoamingNetworkStatusUpdate = StatusUpdate<RoamingNetworkId, RoamingNetworkStatusType>;
pub type RoamingNetworkAdminStatusUpdate =
    StatusUpdate<RoamingNetworkId, RoamingNetworkAdminStatusType>;

/// Energy meter change of one EVSE
pub type EnergyStatusUpdate = StatusUpdate<EvseId, EnergyStatus>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_property_update_requires_name() {
        assert_eq!(
            PropertyUpdateInfo::new(" ", None, None),
            Err(UpdateError::EmptyPropertyName)
        );

        let info = PropertyUpdateInfo::new("max_power_kw", Some(json!(22.0)), Some(json!(50.0)))
            .unwrap()
            .with_data_source("backend");
        assert_eq!(info.property_name(), "max_power_kw");
        assert_eq!(info.new_value(), Some(&json!(50.0)));
        assert_eq!(info.data_source(), Some("backend"));
    }

    #[test]
    fn test_status_update_accessors() {
        let id = EvseId::new("E1").unwrap();
        let update: EvseStatusUpdate = StatusUpdate::new(
            id.clone(),
            Timestamped::now(EvseStatusType::Available),
            Timestamped::now(EvseStatusType::Charging),
        );

        assert_eq!(update.id(), &id);
        assert_eq!(update.new_status().value, EvseStatusType::Charging);
        assert!(!update.is_unchanged());
    }

    #[test]
    fn test_transmission_defaults_to_enqueue() {
        assert_eq!(TransmissionType::default(), TransmissionType::Enqueue);
    }
}
