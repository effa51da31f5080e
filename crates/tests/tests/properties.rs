//! Property tests: random caller churn against the engine and random
//! acquire/release sequences against the registrar ring.

use std::collections::{HashMap, VecDeque};

use glam::Vec3;
use proptest::prelude::*;
use swell_query::{QueryEngineConfig, SegmentRegistrarRingBuffer};
use swell_tests::{BatchState, ScriptedExecutor, caller, scripted_engine, tick_at};

#[derive(Debug, Clone)]
enum Action {
    Submit { caller: u64, count: usize, normals: bool },
    Remove(u64),
    CompleteAll,
    FailOldest,
    Compact,
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        8 => (0u64..12, 1usize..9, any::<bool>())
            .prop_map(|(caller, count, normals)| Action::Submit { caller, count, normals }),
        3 => (0u64..12).prop_map(Action::Remove),
        2 => Just(Action::CompleteAll),
        1 => Just(Action::FailOldest),
        1 => Just(Action::Compact),
    ]
}

/// Positions unique to a caller and the tick they were submitted on.
fn positions(caller: u64, count: usize, tick: usize) -> Vec<Vec3> {
    (0..count)
        .map(|i| Vec3::new(caller as f32 * 10.0 + i as f32, tick as f32, 0.0))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Registrations stay packed and every uploaded segment carries its
    /// caller's latest points, however callers come and go.
    #[test]
    fn churn_keeps_segments_packed_and_data_aligned(
        ticks in prop::collection::vec(prop::collection::vec(action(), 0..12), 1..40),
        max_in_flight in 1usize..6,
    ) {
        let config = QueryEngineConfig {
            max_in_flight_requests: max_in_flight,
            ..Default::default()
        };
        let mut engine = scripted_engine(config, ScriptedExecutor::flat());
        let mut latest: HashMap<u64, Vec<Vec3>> = HashMap::new();

        for (tick, actions) in ticks.iter().enumerate() {
            for action in actions {
                match *action {
                    Action::Submit { caller: id, count, normals } => {
                        let points = positions(id, count, tick);
                        let result = engine.submit(caller(id), &points, normals);
                        prop_assert!(result.is_ok(), "submit failed: {:?}", result);
                        latest.insert(id, points);
                    }
                    Action::Remove(id) => {
                        engine.remove(caller(id));
                        latest.remove(&id);
                    }
                    Action::CompleteAll => engine.executor_mut().complete_all(),
                    Action::FailOldest => {
                        let executor = engine.executor_mut();
                        let oldest = (0..executor.submitted()).find(|&id| {
                            executor.batch(id).map(|b| &b.state) == Some(&BatchState::Held)
                        });
                        if let Some(id) = oldest {
                            executor.fail(id, "dropped");
                        }
                    }
                    Action::Compact => engine.compact(),
                }
            }

            let slot = engine.ring().current_index();
            engine.executor_mut().set_time(tick as f64);
            let outcome = engine.tick(tick as f64);

            prop_assert!(engine.current_registrar().is_disjoint());
            prop_assert!(engine.request_count() <= max_in_flight);
            prop_assert!(!engine.is_stalled());

            if outcome.submitted {
                prop_assert!(engine.current_registrar().is_dense());

                let batch_id = engine.executor().last_batch();
                let batch = batch_id.and_then(|id| engine.executor().batch(id));
                let registrar = engine.ring().slot(slot);
                if let (Some(batch), Some(registrar)) = (batch, registrar) {
                    prop_assert_eq!(batch.points.len(), registrar.total_points());
                    for (id, segment) in registrar.iter() {
                        let Some(expected) = latest.get(&id.raw()) else {
                            continue;
                        };
                        let uploaded: Vec<Vec3> = batch.points
                            [segment.start..segment.start + segment.point_count()]
                            .iter()
                            .map(|p| p.position)
                            .collect();
                        prop_assert_eq!(&uploaded, expected, "caller {}", id);
                    }
                }
            }
        }
    }

    /// The queue bound holds even when nothing ever completes.
    #[test]
    fn queue_is_bounded_without_completions(
        max_in_flight in 1usize..8,
        ticks in 1usize..60,
    ) {
        let config = QueryEngineConfig {
            max_in_flight_requests: max_in_flight,
            ..Default::default()
        };
        let mut engine = scripted_engine(config, ScriptedExecutor::flat());
        let points = positions(1, 3, 0);

        for tick in 0..ticks {
            prop_assert!(engine.submit(caller(1), &points, false).is_ok());
            tick_at(&mut engine, tick as f64);
            prop_assert!(engine.request_count() <= max_in_flight);
            prop_assert!(engine.ring_occupancy() <= max_in_flight);
        }
        let evicted = ticks.saturating_sub(max_in_flight) as u64;
        prop_assert_eq!(engine.stats().requests_evicted, evicted);
    }
}

#[derive(Debug, Clone, Copy)]
enum RingOp {
    Acquire,
    ReleaseOldest,
    ReleaseAt(usize),
}

fn ring_op() -> impl Strategy<Value = RingOp> {
    prop_oneof![
        4 => Just(RingOp::Acquire),
        2 => Just(RingOp::ReleaseOldest),
        1 => (0usize..16).prop_map(RingOp::ReleaseAt),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// The acquire cursor meets the release cursor only when nothing is
    /// held, and pending slots are never handed out twice.
    #[test]
    fn ring_cursors_never_collide(
        max_in_flight in 1usize..6,
        extra in 0usize..3,
        ops in prop::collection::vec(ring_op(), 1..200),
    ) {
        let mut ring = SegmentRegistrarRingBuffer::new(max_in_flight + extra + 1);
        let mut pending: VecDeque<usize> = VecDeque::new();

        for (tick, op) in ops.into_iter().enumerate() {
            match op {
                RingOp::Acquire => {
                    if pending.len() >= max_in_flight {
                        if let Some(oldest) = pending.pop_front() {
                            prop_assert!(ring.release(oldest));
                        }
                    }
                    let slot = ring.current_index();
                    let could = ring.can_acquire();
                    let acquired = ring.acquire_new(tick as u64, 10, |_, _| {});
                    prop_assert_eq!(acquired, could);
                    if acquired {
                        prop_assert!(!pending.contains(&slot));
                        pending.push_back(slot);
                    } else {
                        prop_assert_eq!(ring.held_count(), ring.capacity() - 1);
                    }
                }
                RingOp::ReleaseOldest => {
                    if let Some(oldest) = pending.pop_front() {
                        prop_assert!(ring.release(oldest));
                    }
                }
                RingOp::ReleaseAt(i) => {
                    if !pending.is_empty() {
                        let slot = pending.remove(i % pending.len());
                        if let Some(slot) = slot {
                            prop_assert!(ring.release(slot));
                        }
                    }
                }
            }

            let empty = ring.held_count() == 0;
            prop_assert_eq!(ring.current_index() == ring.release_index(), empty);
            prop_assert!(ring.held_count() >= pending.len());
            for &slot in &pending {
                prop_assert!(ring.is_held(slot));
                prop_assert_ne!(slot, ring.current_index());
            }
        }
    }
}
