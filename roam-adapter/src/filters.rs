//! Admission filters
//!
//! Filters decide which entities a roaming partner gets to see at all. An
//! entity or update failing its filter is dropped silently before it reaches
//! any queue; this is partial exposure of the network, not validation.

use std::sync::Arc;

use roam_core::{
    ChargeDetailRecord, ChargingPool, ChargingStation, ChargingStationOperator, Evse,
    RoamingEntity,
};

use crate::kinds::Synchronized;

/// Predicate over an entity id
pub type IdPredicate<I> = Arc<dyn Fn(&I) -> bool + Send + Sync>;

/// Predicate over a whole entity
pub type EntityPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Decision of the charge detail record filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdrFilterDecision {
    Forward,
    Filter,
}

/// Predicate over a charge detail record
pub type CdrPredicate = Arc<dyn Fn(&ChargeDetailRecord) -> CdrFilterDecision + Send + Sync>;

/// Id and entity predicates of one entity kind, both default to "include"
pub struct EntityFilter<E: RoamingEntity> {
    include_id: Option<IdPredicate<E::Id>>,
    include_entity: Option<EntityPredicate<E>>,
}

impl<E: RoamingEntity> Default for EntityFilter<E> {
    fn default() -> Self {
        Self {
            include_id: None,
            include_entity: None,
        }
    }
}

impl<E: RoamingEntity> Clone for EntityFilter<E> {
    fn clone(&self) -> Self {
        Self {
            include_id: self.include_id.clone(),
            include_entity: self.include_entity.clone(),
        }
    }
}

impl<E: RoamingEntity> EntityFilter<E> {
    /// Check the id predicate only
    pub fn admits_id(&self, id: &E::Id) -> bool {
        self.include_id.as_ref().map_or(true, |include| include(id))
    }

    /// Check the id predicate, then the entity predicate
    pub fn admits(&self, entity: &E) -> bool {
        self.admits_id(entity.id())
            && self
                .include_entity
                .as_ref()
                .map_or(true, |include| include(entity))
    }

    pub fn is_restricted(&self) -> bool {
        self.include_id.is_some() || self.include_entity.is_some()
    }
}

/// All admission filters of one adapter
#[derive(Clone, Default)]
pub struct IncludeFilters {
    pub(crate) evses: EntityFilter<Evse>,
    pub(crate) stations: EntityFilter<ChargingStation>,
    pub(crate) pools: EntityFilter<ChargingPool>,
    pub(crate) operators: EntityFilter<ChargingStationOperator>,
    pub(crate) cdrs: Option<CdrPredicate>,
}

impl IncludeFilters {
    /// Filters admitting everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Only admit ids of kind `E` matching the predicate
    pub fn include_ids<E: Synchronized>(
        mut self,
        include: impl Fn(&E::Id) -> bool + Send + Sync + 'static,
    ) -> Self {
        E::filter_mut(&mut self).include_id = Some(Arc::new(include));
        self
    }

    /// Only admit entities of kind `E` matching the predicate
    pub fn include_entities<E: Synchronized>(
        mut self,
        include: impl Fn(&E) -> bool + Send + Sync + 'static,
    ) -> Self {
        E::filter_mut(&mut self).include_entity = Some(Arc::new(include));
        self
    }

    /// Decide per charge detail record whether it is forwarded
    pub fn charge_detail_record_filter(
        mut self,
        filter: impl Fn(&ChargeDetailRecord) -> CdrFilterDecision + Send + Sync + 'static,
    ) -> Self {
        self.cdrs = Some(Arc::new(filter));
        self
    }

    /// Filter of entity kind `E`
    pub fn for_kind<E: Synchronized>(&self) -> &EntityFilter<E> {
        E::filter(self)
    }

    pub fn cdr_decision(&self, cdr: &ChargeDetailRecord) -> CdrFilterDecision {
        self.cdrs
            .as_ref()
            .map_or(CdrFilterDecision::Forward, |filter| filter(cdr))
    }
}

impl std::fmt::Debug for IncludeFilters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncludeFilters")
            .field("evses", &self.evses.is_restricted())
            .field("stations", &self.stations.is_restricted())
            .field("pools", &self.pools.is_restricted())
            .field("operators", &self.operators.is_restricted())
            .field("cdrs", &self.cdrs.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use roam_core::{ChargingPoolId, ChargingStationId, ChargingStationOperatorId, EvseId};

    fn evse(id: &str, max_power_kw: f64) -> Evse {
        Evse::new(EvseId::new(id).unwrap(), ChargingStationId::new("S1").unwrap())
            .with_max_power(max_power_kw)
    }

    #[test]
    fn test_default_admits_everything() {
        let filters = IncludeFilters::new();

        assert!(filters.for_kind::<Evse>().admits(&evse("E1", 11.0)));
        assert!(filters
            .for_kind::<ChargingPool>()
            .admits_id(&ChargingPoolId::new("P1").unwrap()));
        assert!(!filters.for_kind::<Evse>().is_restricted());
    }

    #[test]
    fn test_id_and_entity_predicates_combine() {
        let filters = IncludeFilters::new()
            .include_ids::<Evse>(|id| id.as_str().starts_with("DE*"))
            .include_entities::<Evse>(|e| e.max_power_kw >= 50.0);
        let evses = filters.for_kind::<Evse>();

        assert!(evses.admits(&evse("DE*E1", 150.0)));
        assert!(!evses.admits(&evse("DE*E2", 22.0)));
        assert!(!evses.admits(&evse("FR*E3", 150.0)));
        assert!(!evses.admits_id(&EvseId::new("FR*E3").unwrap()));

        // Other kinds are unaffected
        assert!(filters
            .for_kind::<ChargingStationOperator>()
            .admits_id(&ChargingStationOperatorId::new("FR*OP").unwrap()));
    }

    #[test]
    fn test_cdr_filter() {
        let filters = IncludeFilters::new().charge_detail_record_filter(|cdr| {
            if cdr.energy_kwh > 0.0 {
                CdrFilterDecision::Forward
            } else {
                CdrFilterDecision::Filter
            }
        });
        let now = Utc::now();
        let empty = ChargeDetailRecord::new(EvseId::new("E1").unwrap(), "s-1", now, now, 0.0);
        let billed = ChargeDetailRecord::new(EvseId::new("E1").unwrap(), "s-2", now, now, 7.2);

        assert_eq!(filters.cdr_decision(&empty), CdrFilterDecision::Filter);
        assert_eq!(filters.cdr_decision(&billed), CdrFilterDecision::Forward);
        assert_eq!(IncludeFilters::new().cdr_decision(&empty), CdrFilterDecision::Forward);
    }
}
