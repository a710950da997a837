//! Property tests for the queue set
//!
//! Tests invariants for:
//! - Add/update/remove intents: mutually exclusive per id, cancellation
//! - Update absorption into a pending add
//! - Lane routing of status changes
//! - Filter opt-out through the adapter

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;
use roam_adapter::{
    AdapterConfig, BoxError, CdrSnapshot, DataAndStatusSnapshot, FastStatusSnapshot,
    FlushExecutor, FlushReport, IncludeFilters, Lane, QueueSet, RoamingAdapter,
};
use roam_core::{
    ChargingStationId, Evse, EvseAdminStatusType, EvseId, EvseStatusType, PropertyUpdateInfo,
    StatusUpdate, Timestamped, TransmissionType,
};
use serde_json::json;

// ============================================================================
// Strategies
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Add(u8, u16),
    Update(u8, u16),
    Remove(u8),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Intent {
    Add(u16),
    Update(u16),
    Remove,
}

fn evse_index() -> impl Strategy<Value = u8> {
    0u8..4
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (evse_index(), 1u16..350).prop_map(|(i, kw)| Op::Add(i, kw)),
        (evse_index(), 1u16..350).prop_map(|(i, kw)| Op::Update(i, kw)),
        evse_index().prop_map(Op::Remove),
    ]
}

fn evse_id(index: u8) -> EvseId {
    EvseId::new(format!("DE*GEF*E{}", index)).unwrap()
}

fn evse(index: u8, max_power_kw: u16) -> Evse {
    Evse::new(evse_id(index), ChargingStationId::new("DE*GEF*S1").unwrap())
        .with_max_power(f64::from(max_power_kw))
}

fn power_update(max_power_kw: u16) -> PropertyUpdateInfo {
    PropertyUpdateInfo::new("max_power_kw", None, Some(json!(max_power_kw))).unwrap()
}

fn apply(queues: &mut QueueSet, model: &mut HashMap<u8, Intent>, op: &Op) {
    let evses = queues.kind_mut::<Evse>();
    match *op {
        Op::Add(i, kw) => {
            evses.enqueue_add(evse(i, kw));
            model.insert(i, Intent::Add(kw));
        }
        Op::Update(i, kw) => {
            evses.enqueue_update(evse(i, kw), power_update(kw));
            let intent = match model.get(&i) {
                Some(Intent::Add(_)) => Intent::Add(kw),
                _ => Intent::Update(kw),
            };
            model.insert(i, intent);
        }
        Op::Remove(i) => {
            evses.enqueue_remove(evse_id(i));
            if let Some(Intent::Add(_)) = model.get(&i) {
                model.remove(&i);
            } else {
                model.insert(i, Intent::Remove);
            }
        }
    }
}

// ============================================================================
// Intent Property Tests
// ============================================================================

proptest! {
    /// CORE INVARIANT: after any sequence, each id sits in at most one of
    /// add/update/remove, and exactly where the intent model says
    #[test]
    fn intents_match_model(ops in prop::collection::vec(op(), 0..40)) {
        let mut queues = QueueSet::new();
        let mut model = HashMap::new();

        for op in &ops {
            apply(&mut queues, &mut model, op);
        }

        let evses = queues.kind::<Evse>();
        for i in 0..4u8 {
            let id = evse_id(i);
            let places = [
                evses.contains_add(&id),
                evses.contains_update(&id),
                evses.contains_remove(&id),
            ];
            prop_assert!(
                places.iter().filter(|p| **p).count() <= 1,
                "{} is queued in more than one intent: {:?}", id, places
            );

            match model.get(&i) {
                Some(Intent::Add(kw)) => {
                    let pending = evses.pending_add(&id).map(|e| e.max_power_kw);
                    prop_assert_eq!(pending, Some(f64::from(*kw)));
                }
                Some(Intent::Update(kw)) => {
                    let pending = evses.pending_update(&id).map(|e| e.max_power_kw);
                    prop_assert_eq!(pending, Some(f64::from(*kw)));
                }
                Some(Intent::Remove) => {
                    prop_assert!(evses.contains_remove(&id));
                }
                None => {
                    prop_assert_eq!(places, [false, false, false]);
                }
            }
        }
    }

    /// Add followed by remove before any flush is a net no-op,
    /// whatever was queued for the id before
    #[test]
    fn add_then_remove_leaves_no_trace(
        before in prop::collection::vec(op(), 0..10),
        index in evse_index(),
        kw in 1u16..350
    ) {
        let mut queues = QueueSet::new();
        let mut model = HashMap::new();
        for op in &before {
            apply(&mut queues, &mut model, op);
        }

        queues.kind_mut::<Evse>().enqueue_add(evse(index, kw));
        let cancelled = queues.kind_mut::<Evse>().enqueue_remove(evse_id(index));

        let evses = queues.kind::<Evse>();
        let id = evse_id(index);
        prop_assert!(cancelled);
        prop_assert!(!evses.contains_add(&id));
        prop_assert!(!evses.contains_update(&id));
        prop_assert!(!evses.contains_remove(&id));
    }

    /// Updates of a pending add only refresh the add entry
    #[test]
    fn updates_are_absorbed_by_pending_add(
        index in evse_index(),
        powers in prop::collection::vec(1u16..350, 1..10)
    ) {
        let mut queues = QueueSet::new();
        let evses = queues.kind_mut::<Evse>();
        evses.enqueue_add(evse(index, 11));
        for kw in &powers {
            evses.enqueue_update(evse(index, *kw), power_update(*kw));
        }

        let id = evse_id(index);
        let last = powers[powers.len() - 1];
        prop_assert!(!evses.contains_update(&id));
        prop_assert_eq!(
            evses.pending_add(&id).map(|e| e.max_power_kw),
            Some(f64::from(last))
        );
        prop_assert_eq!(evses.property_updates(&id).len(), powers.len());
    }
}

// ============================================================================
// Lane Property Tests
// ============================================================================

proptest! {
    /// Status of a pending add goes delayed, anything else fast,
    /// and the fast lane keeps arrival order
    #[test]
    fn status_lane_routing(
        added in prop::collection::hash_set(evse_index(), 0..4),
        changes in prop::collection::vec(evse_index(), 1..20)
    ) {
        let mut queues = QueueSet::new();
        for i in &added {
            queues.kind_mut::<Evse>().enqueue_add(evse(*i, 22));
        }

        let mut expected_fast = Vec::new();
        for i in &changes {
            let lane = queues.kind_mut::<Evse>().enqueue_admin_status(
                StatusUpdate::new(
                    evse_id(*i),
                    Timestamped::now(EvseAdminStatusType::Operational),
                    Timestamped::now(EvseAdminStatusType::OutOfService),
                ),
                true,
            );
            if added.contains(i) {
                prop_assert_eq!(lane, Lane::Delayed);
            } else {
                prop_assert_eq!(lane, Lane::Fast);
                expected_fast.push(evse_id(*i));
            }
        }

        let fast: Vec<EvseId> = queues
            .kind::<Evse>()
            .admin_status_lanes()
            .fast()
            .iter()
            .map(|u| u.id().clone())
            .collect();
        prop_assert_eq!(&fast, &expected_fast);

        // Draining the adds does not move anything already classified
        let delayed_before = queues.kind::<Evse>().admin_status_lanes().delayed().len();
        let fast_snapshot = queues.take_fast_status(0);
        prop_assert_eq!(
            queues.kind::<Evse>().admin_status_lanes().delayed().len(),
            delayed_before
        );
        let drained: Vec<EvseId> = fast_snapshot
            .evses
            .admin_status
            .iter()
            .map(|u| u.id().clone())
            .collect();
        prop_assert_eq!(drained, expected_fast);
    }
}

// ============================================================================
// Filter Property Tests
// ============================================================================

struct Discard;

#[async_trait]
impl FlushExecutor for Discard {
    async fn flush_data_and_status(&self, _: DataAndStatusSnapshot) -> Result<FlushReport, BoxError> {
        Ok(FlushReport::ok())
    }

    async fn flush_fast_status(&self, _: FastStatusSnapshot) -> Result<FlushReport, BoxError> {
        Ok(FlushReport::ok())
    }

    async fn flush_charge_detail_records(&self, _: CdrSnapshot) -> Result<FlushReport, BoxError> {
        Ok(FlushReport::ok())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// An id refused by the id predicate never reaches any queue
    #[test]
    fn excluded_id_never_queued(ops in prop::collection::vec(op(), 1..30)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let excluded = evse_id(0);

        runtime.block_on(async {
            let blocked = excluded.clone();
            let adapter = RoamingAdapter::new(
                AdapterConfig::new("prop", "Property"),
                IncludeFilters::new().include_ids::<Evse>(move |id| *id != blocked),
                Arc::new(Discard),
            )
            .unwrap();

            for op in &ops {
                match *op {
                    Op::Add(i, kw) => {
                        adapter.add(evse(i, kw), TransmissionType::Enqueue, None).await;
                    }
                    Op::Update(i, kw) => {
                        adapter
                            .update(evse(i, kw), power_update(kw), TransmissionType::Enqueue, None)
                            .await;
                    }
                    Op::Remove(i) => {
                        adapter.remove::<Evse>(evse_id(i), TransmissionType::Enqueue, None).await;
                    }
                }
                adapter
                    .update_status::<Evse>(
                        StatusUpdate::new(
                            excluded.clone(),
                            Timestamped::now(EvseStatusType::Available),
                            Timestamped::now(EvseStatusType::Charging),
                        ),
                        TransmissionType::Enqueue,
                        None,
                    )
                    .await;
            }

            adapter.inspect(|q| {
                let evses = q.kind::<Evse>();
                assert!(!evses.contains_add(&excluded));
                assert!(!evses.contains_update(&excluded));
                assert!(!evses.contains_remove(&excluded));
                assert!(evses.status_lanes().fast().is_empty());
                assert!(evses.status_lanes().delayed().is_empty());
                assert!(evses.property_updates(&excluded).is_empty());
            });
        });
    }
}
