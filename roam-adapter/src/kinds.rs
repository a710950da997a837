//! Entity kinds the adapter synchronizes
//!
//! Maps each [`RoamingEntity`] to its slot in the queue set and in the
//! admission filters, so the enqueue API can be written once for all kinds.

use roam_core::{ChargingPool, ChargingStation, ChargingStationOperator, Evse, RoamingEntity};

use crate::filters::{EntityFilter, IncludeFilters};
use crate::queues::{KindQueues, QueueSet};

/// An entity kind with its own queues and filter
pub trait Synchronized: RoamingEntity {
    fn queues(set: &QueueSet) -> &KindQueues<Self>;
    fn queues_mut(set: &mut QueueSet) -> &mut KindQueues<Self>;
    fn filter(filters: &IncludeFilters) -> &EntityFilter<Self>;
    fn filter_mut(filters: &mut IncludeFilters) -> &mut EntityFilter<Self>;
}

macro_rules! synchronized {
    ($entity:ty, $field:ident) => {
        impl Synchronized for $entity {
            fn queues(set: &QueueSet) -> &KindQueues<Self> {
                &set.$field
            }

            fn queues_mut(set: &mut QueueSet) -> &mut KindQueues<Self> {
                &mut set.$field
            }

            fn filter(filters: &IncludeFilters) -> &EntityFilter<Self> {
                &filters.$field
            }

            fn filter_mut(filters: &mut IncludeFilters) -> &mut EntityFilter<Self> {
                &mut filters.$field
            }
        }
    };
}

synchronized!(Evse, evses);
synchronized!(ChargingStation, stations);
synchronized!(ChargingPool, pools);
synchronized!(ChargingStationOperator, operators);
