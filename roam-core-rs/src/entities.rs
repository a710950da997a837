//! Minimal entity model synchronized toward roaming partners
//!
//! These structs are the data carriers handed to the adapter queues: an id,
//! the parent id, the current status pair and a few descriptive fields. The
//! full operator/pool/station object graph lives outside this crate.

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::hash::Hash;

use crate::ids::*;
use crate::status::*;

/// Kind of entity an item belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Evse,
    ChargingStation,
    ChargingPool,
    ChargingStationOperator,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Evse => write!(f, "EVSE"),
            EntityKind::ChargingStation => write!(f, "charging station"),
            EntityKind::ChargingPool => write!(f, "charging pool"),
            EntityKind::ChargingStationOperator => write!(f, "charging station operator"),
        }
    }
}

/// An entity that can be pushed to a roaming partner
pub trait RoamingEntity: Clone + Debug + Send + Sync + 'static {
    type Id: Clone + Debug + Display + Eq + Hash + Ord + Send + Sync + 'static;
    type Status: Clone + Copy + Debug + PartialEq + Send + Sync + 'static;
    type AdminStatus: Clone + Copy + Debug + PartialEq + Send + Sync + 'static;

    const KIND: EntityKind;

    fn id(&self) -> &Self::Id;
}

// ============================================================================
// EVSE
// ============================================================================

/// A single charge point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evse {
    pub id: EvseId,
    pub station_id: ChargingStationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub max_power_kw: f64,
    pub admin_status: Timestamped<EvseAdminStatusType>,
    pub status: Timestamped<EvseStatusType>,
}

impl Evse {
    pub fn new(id: EvseId, station_id: ChargingStationId) -> Self {
        Self {
            id,
            station_id,
            description: None,
            max_power_kw: 22.0,
            admin_status: Timestamped::now(EvseAdminStatusType::Operational),
            status: Timestamped::now(EvseStatusType::Available),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_max_power(mut self, max_power_kw: f64) -> Self {
        self.max_power_kw = max_power_kw;
        self
    }

    pub fn with_status(mut self, status: EvseStatusType) -> Self {
        self.status = Timestamped::now(status);
        self
    }
}

impl RoamingEntity for Evse {
    type Id = EvseId;
    type Status = EvseStatusType;
    type AdminStatus = EvseAdminStatusType;

    const KIND: EntityKind = EntityKind::Evse;

    fn id(&self) -> &EvseId {
        &self.id
    }
}

// ============================================================================
// Charging station
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingStation {
    pub id: ChargingStationId,
    pub pool_id: ChargingPoolId,
    pub name: String,
    pub evse_ids: Vec<EvseId>,
    pub admin_status: Timestamped<ChargingStationAdminStatusType>,
    pub status: Timestamped<ChargingStationStatusType>,
}

impl ChargingStation {
    pub fn new(id: ChargingStationId, pool_id: ChargingPoolId, name: impl Into<String>) -> Self {
        Self {
            id,
            pool_id,
            name: name.into(),
            evse_ids: Vec::new(),
            admin_status: Timestamped::now(ChargingStationAdminStatusType::Operational),
            status: Timestamped::now(ChargingStationStatusType::Available),
        }
    }

    pub fn with_evse(mut self, evse_id: EvseId) -> Self {
        self.evse_ids.push(evse_id);
        self
    }
}

impl RoamingEntity for ChargingStation {
    type Id = ChargingStationId;
    type Status = ChargingStationStatusType;
    type AdminStatus = ChargingStationAdminStatusType;

    const KIND: EntityKind = EntityKind::ChargingStation;

    fn id(&self) -> &ChargingStationId {
        &self.id
    }
}

// ============================================================================
// Charging pool
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingPool {
    pub id: ChargingPoolId,
    pub operator_id: ChargingStationOperatorId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub admin_status: Timestamped<ChargingPoolAdminStatusType>,
    pub status: Timestamped<ChargingPoolStatusType>,
}

impl ChargingPool {
    pub fn new(
        id: ChargingPoolId,
        operator_id: ChargingStationOperatorId,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            operator_id,
            name: name.into(),
            address: None,
            admin_status: Timestamped::now(ChargingPoolAdminStatusType::Operational),
            status: Timestamped::now(ChargingPoolStatusType::Available),
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

impl RoamingEntity for ChargingPool {
    type Id = ChargingPoolId;
    type Status = ChargingPoolStatusType;
    type AdminStatus = ChargingPoolAdminStatusType;

    const KIND: EntityKind = EntityKind::ChargingPool;

    fn id(&self) -> &ChargingPoolId {
        &self.id
    }
}

// ============================================================================
// Charging station operator
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingStationOperator {
    pub id: ChargingStationOperatorId,
    pub name: String,
    pub admin_status: Timestamped<OperatorAdminStatusType>,
    pub status: Timestamped<OperatorStatusType>,
}

impl ChargingStationOperator {
    pub fn new(id: ChargingStationOperatorId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            admin_status: Timestamped::now(OperatorAdminStatusType::Operational),
            status: Timestamped::now(OperatorStatusType::Available),
        }
    }
}

impl RoamingEntity for ChargingStationOperator {
    type Id = ChargingStationOperatorId;
    type Status = OperatorStatusType;
    type AdminStatus = OperatorAdminStatusType;

    const KIND: EntityKind = EntityKind::ChargingStationOperator;

    fn id(&self) -> &ChargingStationOperatorId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ids_and_kinds() {
        let evse = Evse::new(
            EvseId::new("DE*GEF*E1*1").unwrap(),
            ChargingStationId::new("DE*GEF*S1").unwrap(),
        )
        .with_max_power(50.0);

        assert_eq!(evse.id().as_str(), "DE*GEF*E1*1");
        assert_eq!(Evse::KIND, EntityKind::Evse);
        assert_eq!(evse.max_power_kw, 50.0);
        assert_eq!(ChargingPool::KIND.to_string(), "charging pool");
    }

    #[test]
    fn test_station_builder_collects_evses() {
        let station = ChargingStation::new(
            ChargingStationId::new("S1").unwrap(),
            ChargingPoolId::new("P1").unwrap(),
            "Main street",
        )
        .with_evse(EvseId::new("E1").unwrap())
        .with_evse(EvseId::new("E2").unwrap());

        assert_eq!(station.evse_ids.len(), 2);
        assert_eq!(station.status.value, ChargingStationStatusType::Available);
    }
}
