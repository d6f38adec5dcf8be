use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use chrono::{DateTime, TimeZone as _, Utc};
use metric_aggregation::{
    aggregators::fields, telemetry::AggregateTelemetry, AggregationCycleManager, AggregatorConfiguration, ConsumerKind,
    MetricIdFilter, MetricSeries, TrackedValue,
};

fn t(seconds: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, seconds).unwrap()
}

#[test]
fn no_values_lost_across_cycles() {
    let manager = Arc::new(AggregationCycleManager::new());
    let tracked = manager
        .get_or_create_series(
            MetricSeries::new("app", "requests"),
            Some(AggregatorConfiguration::bounded_integer()),
        )
        .unwrap();
    manager.start_or_cycle_aggregators(ConsumerKind::Default, t(0), None);

    let writers_done = Arc::new(AtomicBool::new(false));
    let writers = (0..4)
        .map(|_| {
            let tracked = Arc::clone(&tracked);
            thread::spawn(move || {
                for _ in 0..10_000 {
                    tracked.track_value(1.0).unwrap();
                }
            })
        })
        .collect::<Vec<_>>();

    // Cycle repeatedly while the writers are running: every value must land in exactly one period.
    let cycler = {
        let manager = Arc::clone(&manager);
        let writers_done = Arc::clone(&writers_done);
        thread::spawn(move || {
            let mut total = 0i64;
            let mut second = 1;
            while !writers_done.load(Ordering::Acquire) {
                let summary = manager.start_or_cycle_aggregators(ConsumerKind::Default, t(second % 60), None);
                total += summary
                    .aggregates()
                    .map(|aggregate| aggregate.get(fields::COUNT).and_then(|v| v.as_i64()).unwrap())
                    .sum::<i64>();
                second += 1;
                thread::sleep(Duration::from_millis(1));
            }
            total
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    writers_done.store(true, Ordering::Release);
    let mut total = cycler.join().unwrap();

    let summary = manager.stop_aggregators(ConsumerKind::Default, t(59));
    total += summary
        .aggregates()
        .map(|aggregate| aggregate.get(fields::COUNT).and_then(|v| v.as_i64()).unwrap())
        .sum::<i64>();

    assert_eq!(total, 40_000);
}

#[test]
fn consumers_see_independent_views() {
    let manager = AggregationCycleManager::new();
    let lifetime = AggregatorConfiguration::statistics().with_persistent(true);

    let latency = manager
        .get_or_create_series(MetricSeries::new("app", "db.latency"), Some(lifetime))
        .unwrap();
    let users = manager
        .get_or_create_series(
            MetricSeries::new("app", "users").with_dimension("region", "eu"),
            Some(AggregatorConfiguration::distinct_count().with_case_sensitive(false)),
        )
        .unwrap();

    manager.start_or_cycle_aggregators(ConsumerKind::Default, t(0), None);
    manager.start_or_cycle_aggregators(
        ConsumerKind::Diagnostics,
        t(0),
        Some(Arc::new(MetricIdFilter::new().with_prefix("db."))),
    );

    for value in [3.0, 5.0] {
        latency.track_value(value).unwrap();
    }
    for user in ["alice", "Alice", "bob"] {
        users.track_object(&TrackedValue::from(user)).unwrap();
    }

    let summary = manager.start_or_cycle_aggregators(ConsumerKind::Default, t(10), None);
    assert_eq!(summary.persistent_aggregates().len(), 1);
    assert_eq!(summary.periodic_aggregates().len(), 1);

    let users_telemetry = AggregateTelemetry::try_from_aggregate(&summary.periodic_aggregates()[0]).unwrap();
    assert_eq!(users_telemetry.name(), "users");
    assert_eq!(users_telemetry.count(), 3);
    assert_eq!(users_telemetry.sum(), 2.0);
    assert_eq!(users_telemetry.properties()["region"], "eu");
    assert_eq!(users_telemetry.properties()["_AggregationIntervalMs"], "10000");

    latency.track_value(7.0).unwrap();

    // The default consumer keeps the lifetime view of the latency series...
    let summary = manager.start_or_cycle_aggregators(ConsumerKind::Default, t(20), None);
    let latency_telemetry = AggregateTelemetry::try_from_aggregate(&summary.persistent_aggregates()[0]).unwrap();
    assert_eq!(latency_telemetry.count(), 3);
    assert_eq!(latency_telemetry.sum(), 15.0);
    assert_eq!(latency_telemetry.timestamp(), t(0));
    assert_eq!(latency_telemetry.properties()["_AggregationIntervalMs"], "20000");

    // ...while diagnostics sees everything since it started, windowed, and filtered down to the latency series.
    let summary = manager.stop_aggregators(ConsumerKind::Diagnostics, t(20));
    assert!(summary.persistent_aggregates().is_empty());
    for aggregate in summary.periodic_aggregates() {
        let telemetry = AggregateTelemetry::try_from_aggregate(aggregate).unwrap();
        match telemetry.name() {
            "db.latency" => {
                assert_eq!(telemetry.count(), 3);
                assert_eq!(telemetry.max(), 7.0);
                assert_eq!(telemetry.min(), 3.0);
            }
            "users" => assert_eq!(telemetry.count(), 0),
            other => panic!("unexpected series: {}", other),
        }
    }
}
