//! End-to-end behaviour of the query engine against a scripted executor.
//!
//! Each test drives whole ticks (submit, tick, retrieve) and resolves
//! batches by hand, so every completion order is reproducible.

use glam::Vec3;
use swell_query::{
    DeferredExecutor, EngineStats, QueryEngine, QueryEngineConfig, QueryError, QueryInput,
    QueryOutput, QueryStatus, SampleHeightHelper,
};
use swell_tests::{
    BatchState, ScriptedExecutor, caller, points_along_x, scripted_engine, tick_at,
};

/// Field whose vertical displacement is the batch time.
fn time_field() -> ScriptedExecutor {
    ScriptedExecutor::new(|_, t| Vec3::new(0.0, t as f32, 0.0))
}

fn config_with_in_flight(max_in_flight_requests: usize) -> QueryEngineConfig {
    QueryEngineConfig {
        max_in_flight_requests,
        ..Default::default()
    }
}

fn ys(values: &[f32]) -> Vec<Vec3> {
    values.iter().map(|&y| Vec3::new(0.0, y, 0.0)).collect()
}

/// Two callers, two overlapping batches, results arriving a tick apart.
#[test]
fn two_callers_two_batches() {
    let a = caller(1);
    let b = caller(2);
    let mut engine = scripted_engine(config_with_in_flight(2), ScriptedExecutor::flat());

    // tick 1: A registers three points
    engine.submit(a, &points_along_x(0.0, 3), false).unwrap();
    assert_eq!(engine.current_registrar().get(a).unwrap().range(), 0..3);
    tick_at(&mut engine, 1.0);
    let h1 = engine.executor().last_batch().unwrap();
    assert_eq!(engine.executor().batch(h1).unwrap().points.len(), 3);

    // tick 2: A carried forward, B appended
    engine.submit(b, &points_along_x(10.0, 2), false).unwrap();
    assert_eq!(engine.current_registrar().get(a).unwrap().range(), 0..3);
    assert_eq!(engine.current_registrar().get(b).unwrap().range(), 3..5);
    tick_at(&mut engine, 2.0);
    let h2 = engine.executor().last_batch().unwrap();
    assert_eq!(engine.executor().batch(h2).unwrap().points.len(), 5);
    assert_eq!(engine.request_count(), 2);

    // tick 3: H1 lands while H2 is still out
    engine.executor_mut().complete_with(h1, ys(&[1.0, 2.0, 3.0]));
    tick_at(&mut engine, 3.0);
    assert_eq!(engine.retrieve(a).unwrap().heights, vec![1.0, 2.0, 3.0]);
    assert!(engine.retrieve(b).is_none());
    assert_eq!(engine.request_count(), 2);
    assert_eq!(engine.stats().requests_evicted, 0);

    // tick 4: H2 lands; both callers resolve and A has a velocity
    engine
        .executor_mut()
        .complete_with(h2, ys(&[4.0, 6.0, 8.0, 20.0, 30.0]));
    tick_at(&mut engine, 4.0);
    assert_eq!(engine.retrieve(a).unwrap().heights, vec![4.0, 6.0, 8.0]);
    assert_eq!(engine.retrieve(b).unwrap().heights, vec![20.0, 30.0]);

    let mut velocity = vec![Vec3::ZERO; 3];
    assert_eq!(engine.velocity(a, &mut velocity), QueryStatus::OK);
    // dt = t(H2) - t(H1) = 1.0
    assert_eq!(velocity, ys(&[3.0, 4.0, 5.0]));
}

/// A batch that takes exactly as many ticks as the queue holds still
/// lands: it is accepted before that tick's upload enforces the bound.
#[test]
fn latency_equal_to_in_flight_bound_is_delivered() {
    let a = caller(1);
    let points = points_along_x(0.0, 2);

    for bound in [1, 2, 7] {
        let exec = DeferredExecutor::new(|_, t| Vec3::new(0.0, t as f32, 0.0))
            .with_latency(bound as u32);
        let mut engine = QueryEngine::new(config_with_in_flight(bound), exec).unwrap();

        let mut retrieved = 0;
        for tick in 0..50 {
            engine.submit(a, &points, false).unwrap();
            engine.executor_mut().set_time(tick as f64);
            engine.tick(tick as f64);
            if engine.retrieve(a).is_some() {
                retrieved += 1;
            }
            assert!(engine.request_count() <= bound);
        }

        assert_eq!(retrieved, 50 - bound, "bound {bound}");
        assert_eq!(engine.stats().requests_evicted, 0, "bound {bound}");
        assert_eq!(engine.stats().results_accepted, (50 - bound) as u64);
        assert_eq!(
            engine.retrieve(a).unwrap().heights,
            vec![(49 - bound) as f32; 2]
        );
    }
}

#[test]
fn steady_callers_keep_their_segments() {
    let callers: Vec<_> = (1..=4).map(caller).collect();
    let sizes = [3, 1, 5, 2];
    let mut engine = scripted_engine(
        QueryEngineConfig::default(),
        ScriptedExecutor::flat().with_auto_complete(),
    );

    let mut first_ranges = Vec::new();
    for tick in 0..30 {
        for (&id, &size) in callers.iter().zip(&sizes) {
            engine.submit(id, &points_along_x(0.0, size), false).unwrap();
        }
        let ranges: Vec<_> = callers
            .iter()
            .map(|&id| engine.current_registrar().get(id).unwrap().range())
            .collect();
        if tick == 0 {
            first_ranges = ranges;
        } else {
            assert_eq!(ranges, first_ranges, "segments moved on tick {tick}");
        }
        tick_at(&mut engine, tick as f64 * 0.1);
    }
}

#[test]
fn intermittent_caller_survives_until_stale() {
    let a = caller(1);
    let b = caller(2);
    let mut engine = scripted_engine(QueryEngineConfig::default(), ScriptedExecutor::flat());
    let staleness = engine.config().staleness_ticks;

    engine.submit(a, &points_along_x(0.0, 2), false).unwrap();
    for tick in 0..=staleness {
        engine.submit(b, &points_along_x(5.0, 1), false).unwrap();
        tick_at(&mut engine, tick as f64);
        engine.executor_mut().complete_all();

        let present = engine.current_registrar().contains(a);
        assert_eq!(present, tick < staleness, "tick {tick}");
    }
    assert!(engine.current_registrar().contains(b));
    assert!(engine.current_registrar().is_dense());
}

#[test]
fn queue_never_exceeds_in_flight_bound() {
    let a = caller(1);
    let mut engine = scripted_engine(config_with_in_flight(4), ScriptedExecutor::flat());

    for tick in 0..50 {
        engine.submit(a, &points_along_x(0.0, 4), false).unwrap();
        tick_at(&mut engine, tick as f64);
        assert!(engine.request_count() <= 4);
        assert!(!engine.is_stalled());
    }
    assert_eq!(engine.stats().batches_submitted, 50);
    assert_eq!(engine.stats().requests_evicted, 46);

    // Only the surviving batches can still deliver.
    let newest = engine.executor().last_batch().unwrap();
    engine.executor_mut().complete(newest);
    tick_at(&mut engine, 50.0);
    assert!(engine.retrieve(a).is_some());
}

#[test]
fn freshest_completed_batch_wins() {
    let a = caller(1);
    let mut engine = scripted_engine(QueryEngineConfig::default(), time_field());

    engine.submit(a, &points_along_x(0.0, 2), false).unwrap();
    tick_at(&mut engine, 1.0);
    tick_at(&mut engine, 2.0);

    // The second batch finishes first.
    engine.executor_mut().complete(1);
    tick_at(&mut engine, 3.0);
    assert_eq!(engine.retrieve(a).unwrap().heights, vec![2.0, 2.0]);

    // The first batch left the queue with the accepted one.
    engine.executor_mut().complete(0);
    tick_at(&mut engine, 4.0);
    assert_eq!(engine.retrieve(a).unwrap().heights, vec![2.0, 2.0]);
    assert_eq!(engine.stats().results_accepted, 1);
}

#[test]
fn older_completed_batches_are_discarded() {
    let a = caller(1);
    let mut engine = scripted_engine(QueryEngineConfig::default(), time_field());

    engine.submit(a, &points_along_x(0.0, 1), false).unwrap();
    tick_at(&mut engine, 1.0);
    tick_at(&mut engine, 2.0);
    engine.executor_mut().complete_all();
    tick_at(&mut engine, 3.0);

    assert_eq!(engine.retrieve(a).unwrap().heights, vec![2.0]);
    assert_eq!(engine.stats().completed_discarded, 1);
    assert_eq!(engine.request_count(), 1);
}

#[test]
fn failed_batches_release_their_slots() {
    let a = caller(1);
    let mut engine = scripted_engine(QueryEngineConfig::default(), time_field());

    engine.submit(a, &points_along_x(0.0, 2), false).unwrap();
    tick_at(&mut engine, 1.0);
    let first = engine.executor().last_batch().unwrap();
    engine.executor_mut().fail(first, "device lost");
    engine.executor_mut().set_auto_complete(true);
    tick_at(&mut engine, 2.0);
    assert_eq!(engine.stats().requests_failed, 1);
    assert!(engine.retrieve(a).is_none());

    tick_at(&mut engine, 3.0);
    assert_eq!(engine.retrieve(a).unwrap().heights, vec![2.0, 2.0]);
    // only the batch uploaded this tick is still out
    assert_eq!(engine.request_count(), 1);
    assert_eq!(engine.ring_occupancy(), 1);
}

#[test]
fn short_result_counts_as_failure() {
    let a = caller(1);
    let mut engine = scripted_engine(QueryEngineConfig::default(), ScriptedExecutor::flat());

    engine.submit(a, &points_along_x(0.0, 3), false).unwrap();
    tick_at(&mut engine, 1.0);
    engine.executor_mut().complete_with(0, ys(&[1.0]));
    tick_at(&mut engine, 2.0);

    assert!(engine.retrieve(a).is_none());
    assert_eq!(engine.stats().requests_failed, 1);
    assert!(matches!(
        engine.executor().batch(0).map(|b| &b.state),
        Some(BatchState::Done(_))
    ));
}

#[test]
fn rejected_submission_keeps_registrations() {
    let a = caller(1);
    let mut engine = scripted_engine(
        QueryEngineConfig::default(),
        ScriptedExecutor::flat().with_auto_complete(),
    );

    engine.submit(a, &points_along_x(0.0, 2), false).unwrap();
    engine.executor_mut().set_reject_submissions(true);
    tick_at(&mut engine, 1.0);
    assert_eq!(engine.stats().submit_failures, 1);
    assert!(engine.current_registrar().contains(a));
    assert!(engine.retrieve(a).is_none());

    engine.executor_mut().set_reject_submissions(false);
    tick_at(&mut engine, 2.0);
    tick_at(&mut engine, 3.0);
    assert!(engine.retrieve(a).is_some());
}

#[test]
fn removed_gap_is_repacked_with_point_data() {
    let (a, b, c) = (caller(1), caller(2), caller(3));
    let c_points = points_along_x(100.0, 2);
    let mut engine = scripted_engine(QueryEngineConfig::default(), ScriptedExecutor::flat());

    engine.submit(a, &points_along_x(0.0, 3), false).unwrap();
    engine.submit(b, &points_along_x(50.0, 4), false).unwrap();
    engine.submit(c, &c_points, false).unwrap();
    tick_at(&mut engine, 0.0);

    engine.remove(b);
    tick_at(&mut engine, 1.0);
    assert_eq!(engine.current_registrar().get(c).unwrap().range(), 3..5);

    // C never resubmitted; its uploaded points moved with its segment.
    tick_at(&mut engine, 2.0);
    let batch = engine.executor().batch(2).unwrap();
    assert_eq!(batch.points.len(), 5);
    let uploaded: Vec<_> = batch.points[3..5].iter().map(|p| p.position).collect();
    assert_eq!(uploaded, c_points);
}

#[test]
fn removed_caller_is_not_resubmitted() {
    let (a, b) = (caller(1), caller(2));
    let mut engine = scripted_engine(
        QueryEngineConfig::default(),
        ScriptedExecutor::flat().with_auto_complete(),
    );

    engine.submit(a, &points_along_x(0.0, 2), false).unwrap();
    engine.submit(b, &points_along_x(0.0, 2), false).unwrap();
    tick_at(&mut engine, 0.0);
    tick_at(&mut engine, 1.0);
    assert!(engine.retrieve(b).is_some());

    // the batch already uploaded with B still lands
    engine.remove(b);
    tick_at(&mut engine, 2.0);
    assert!(engine.retrieve(b).is_some());

    tick_at(&mut engine, 3.0);
    assert!(engine.retrieve(b).is_none());
    assert!(engine.retrieve(a).is_some());
    assert_eq!(engine.registered_callers(), 1);
}

#[test]
fn capacity_and_caller_limits_are_local() {
    let config = QueryEngineConfig {
        max_query_count: 8,
        max_callers: 2,
        ..Default::default()
    };
    let mut engine = scripted_engine(config, ScriptedExecutor::flat().with_auto_complete());

    // two points plus three probes each fill the buffer exactly
    engine.submit(caller(1), &points_along_x(0.0, 2), true).unwrap();
    let err = engine
        .submit(caller(2), &points_along_x(0.0, 1), false)
        .unwrap_err();
    assert!(matches!(
        err,
        QueryError::CapacityExceeded {
            requested: 1,
            available: 0
        }
    ));

    engine.compact();
    engine.submit(caller(1), &points_along_x(0.0, 1), false).unwrap();
    engine.submit(caller(2), &points_along_x(0.0, 1), false).unwrap();
    let err = engine
        .submit(caller(3), &points_along_x(0.0, 1), false)
        .unwrap_err();
    assert!(matches!(err, QueryError::TooManyCallers { max: 2 }));

    tick_at(&mut engine, 0.0);
    tick_at(&mut engine, 1.0);
    assert!(engine.retrieve(caller(1)).is_some());
    assert!(engine.retrieve(caller(2)).is_some());
}

#[test]
fn flat_water_normals_point_up() {
    let a = caller(1);
    let mut engine = scripted_engine(
        QueryEngineConfig::default(),
        ScriptedExecutor::flat().with_auto_complete(),
    );
    let points = points_along_x(0.0, 3);
    let input = QueryInput::new(&points).with_normals();
    let mut output = QueryOutput::default();

    let status = engine.query(a, &input, &mut output);
    assert!(status.contains(QueryStatus::RETRIEVE_FAILED));
    assert!(!status.contains(QueryStatus::POST_FAILED));

    tick_at(&mut engine, 0.0);
    tick_at(&mut engine, 1.0);
    let status = engine.query(a, &input, &mut output);
    assert!(status.is_ok());
    assert_eq!(output.result.normals.len(), 3);
    for normal in &output.result.normals {
        assert!((*normal - Vec3::Y).length() < 1e-6, "normal: {normal:?}");
    }
}

#[test]
fn velocity_matches_analytic_field() {
    let a = caller(1);
    // displacement = (x * t, 0, 0), so velocity = (x, 0, 0)
    let exec = ScriptedExecutor::new(|p, t| Vec3::new(p.position.x * t as f32, 0.0, 0.0))
        .with_auto_complete();
    let mut engine = scripted_engine(QueryEngineConfig::default(), exec);
    let points = points_along_x(1.0, 4);
    let input = QueryInput::new(&points).with_velocities();
    let mut output = QueryOutput::default();

    engine.query(a, &input, &mut output);
    tick_at(&mut engine, 0.5);
    engine.query(a, &input, &mut output);
    tick_at(&mut engine, 0.75);
    let status = engine.query(a, &input, &mut output);
    assert!(status.contains(QueryStatus::NOT_ENOUGH_DATA_FOR_VELS));
    assert!(!status.contains(QueryStatus::RETRIEVE_FAILED));

    tick_at(&mut engine, 1.0);
    let status = engine.query(a, &input, &mut output);
    assert!(status.is_ok(), "status: {status}");
    for (velocity, point) in output.velocities.iter().zip(&points) {
        assert!((*velocity - Vec3::new(point.x, 0.0, 0.0)).length() < 1e-4);
    }
}

#[test]
fn velocity_reports_shape_change_and_tiny_dt() {
    let a = caller(1);
    let mut engine = scripted_engine(
        QueryEngineConfig::default(),
        ScriptedExecutor::flat().with_auto_complete(),
    );
    let mut out = vec![Vec3::ZERO; 3];

    engine.submit(a, &points_along_x(0.0, 2), false).unwrap();
    tick_at(&mut engine, 1.0);
    engine.submit(a, &points_along_x(0.0, 3), false).unwrap();
    tick_at(&mut engine, 2.0);
    engine.submit(a, &points_along_x(0.0, 3), false).unwrap();
    tick_at(&mut engine, 2.0);
    assert_eq!(
        engine.velocity(a, &mut out),
        QueryStatus::VELOCITY_DATA_INVALIDATED
    );

    tick_at(&mut engine, 3.0);
    assert_eq!(
        engine.velocity(a, &mut out),
        QueryStatus::INVALID_DT_FOR_VELOCITY
    );

    assert_eq!(engine.velocity(caller(9), &mut out), QueryStatus::RETRIEVE_FAILED);
}

#[test]
fn single_point_helper_samples_height() {
    let exec = ScriptedExecutor::new(|_, _| Vec3::new(0.0, 1.5, 0.0)).with_auto_complete();
    let config = QueryEngineConfig {
        sea_level: 2.0,
        ..Default::default()
    };
    let mut engine = scripted_engine(config, exec);
    let mut helper = SampleHeightHelper::new(caller(7));

    for tick in 0..2 {
        helper.init(&engine, Vec3::new(3.0, 0.0, 4.0), 1.0);
        assert_eq!(helper.sample_height(&mut engine), None);
        tick_at(&mut engine, tick as f64);
    }

    helper.init(&engine, Vec3::new(3.0, 0.0, 4.0), 1.0);
    assert_eq!(helper.sample_height(&mut engine), Some(3.5));
    let batch = engine.executor().batch(0).unwrap();
    assert_eq!(batch.points[0].min_grid_size, 0.25);
}

#[test]
fn cleanup_is_idempotent_and_engine_recovers() {
    let a = caller(1);
    let mut engine = scripted_engine(QueryEngineConfig::default(), ScriptedExecutor::flat());

    engine.submit(a, &points_along_x(0.0, 2), false).unwrap();
    tick_at(&mut engine, 0.0);
    tick_at(&mut engine, 1.0);
    engine.executor_mut().complete_all();
    tick_at(&mut engine, 2.0);
    assert!(engine.retrieve(a).is_some());

    engine.cleanup();
    engine.cleanup();
    assert_eq!(engine.request_count(), 0);
    assert_eq!(engine.result_caller_count(), 0);
    assert_eq!(engine.registered_callers(), 0);
    assert_eq!(engine.ring_occupancy(), 0);
    assert_eq!(engine.stats(), EngineStats::default());
    assert!(engine.retrieve(a).is_none());

    engine.executor_mut().set_auto_complete(true);
    engine.submit(a, &points_along_x(0.0, 2), false).unwrap();
    tick_at(&mut engine, 3.0);
    tick_at(&mut engine, 4.0);
    assert!(engine.retrieve(a).is_some());
}
