use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge, Counter, Gauge};
use snafu::OptionExt as _;
use tracing::{debug, error, trace, warn};

use crate::{
    create_aggregator,
    error::{ConflictingSeriesConfiguration, MissingConfiguration},
    AggregatorConfiguration, ConfigurationError, ConsumerKind, MetricAggregate, MetricAggregator, MetricSeries,
    TrackedSeries, ValueFilter,
};

/// Aggregates harvested at the end of an aggregation period.
///
/// Aggregates are grouped by the lifetime of the aggregator that produced them: persistent aggregates cover everything
/// tracked since the consumer kind was started, while periodic aggregates only cover the period that just ended.
#[derive(Clone, Debug, Default)]
pub struct AggregationPeriodSummary {
    persistent_aggregates: Vec<Arc<MetricAggregate>>,
    periodic_aggregates: Vec<Arc<MetricAggregate>>,
}

impl AggregationPeriodSummary {
    /// Returns the aggregates produced by persistent aggregators.
    pub fn persistent_aggregates(&self) -> &[Arc<MetricAggregate>] {
        &self.persistent_aggregates
    }

    /// Returns the aggregates produced by periodic aggregators.
    pub fn periodic_aggregates(&self) -> &[Arc<MetricAggregate>] {
        &self.periodic_aggregates
    }

    /// Returns an iterator over all aggregates, persistent ones first.
    pub fn aggregates(&self) -> impl Iterator<Item = &Arc<MetricAggregate>> {
        self.persistent_aggregates.iter().chain(self.periodic_aggregates.iter())
    }

    /// Returns the total number of aggregates.
    pub fn len(&self) -> usize {
        self.persistent_aggregates.len() + self.periodic_aggregates.len()
    }

    /// Returns `true` if no aggregates were harvested.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, aggregator: &dyn MetricAggregator, period_end: DateTime<Utc>) {
        let aggregate = aggregator.complete_aggregation(period_end);
        if aggregator.is_persistent() {
            self.persistent_aggregates.push(aggregate);
        } else {
            self.periodic_aggregates.push(aggregate);
        }
    }
}

struct ConsumerState {
    active: bool,
    period_start: DateTime<Utc>,
    filter: Option<Arc<dyn ValueFilter>>,
}

impl ConsumerState {
    fn inactive() -> Self {
        Self {
            active: false,
            period_start: DateTime::default(),
            filter: None,
        }
    }
}

struct Registry {
    series: AHashMap<Arc<MetricSeries>, Arc<TrackedSeries>>,
    consumers: [ConsumerState; ConsumerKind::COUNT],
}

struct Telemetry {
    series_created: Counter,
    series_registered: Gauge,
    cycles: [Counter; ConsumerKind::COUNT],
}

impl Telemetry {
    fn new() -> Self {
        Self {
            series_created: counter!("aggregation_series_created_total"),
            series_registered: gauge!("aggregation_series_registered"),
            cycles: ConsumerKind::ALL.map(|kind| counter!("aggregation_cycles_total", "consumer_kind" => kind.as_str())),
        }
    }
}

/// Drives aggregation periods for every series.
///
/// The manager owns the registry of series, and tracks, for each [`ConsumerKind`], whether that kind is active along
/// with the start and filter of its current aggregation period. Starting a kind subscribes every registered series to
/// it, cycling a kind harvests the aggregates of the period that just ended and opens the next one, and stopping a kind
/// harvests the final period and unsubscribes every series.
///
/// Series registered while a consumer kind is active are subscribed to it immediately, using the kind's current period
/// start and filter.
///
/// ## Concurrency
///
/// Values are tracked directly against [`TrackedSeries`] and never touch the manager. Registration and cycling
/// serialize on an internal lock, so a cycle observes a consistent set of series.
pub struct AggregationCycleManager {
    registry: Mutex<Registry>,
    telemetry: Telemetry,
}

impl AggregationCycleManager {
    /// Creates a new `AggregationCycleManager` with no series and no active consumer kinds.
    ///
    /// Internal telemetry handles are registered against the current `metrics` recorder at creation.
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                series: AHashMap::new(),
                consumers: [ConsumerState::inactive(), ConsumerState::inactive(), ConsumerState::inactive()],
            }),
            telemetry: Telemetry::new(),
        }
    }

    /// Gets the series with the given identity, creating it if it does not yet exist.
    ///
    /// When the series already exists, passing `None` as the configuration returns it regardless of how it was
    /// configured. Otherwise, the configuration must match the one the series was created with.
    ///
    /// A newly-created series is subscribed to every active consumer kind.
    ///
    /// # Errors
    ///
    /// If the series does not exist and no configuration is given, or if it exists with a different configuration than
    /// the one given, an error is returned.
    pub fn get_or_create_series(
        &self, series: MetricSeries, configuration: Option<AggregatorConfiguration>,
    ) -> Result<Arc<TrackedSeries>, ConfigurationError> {
        let mut registry = self.registry.lock().unwrap();

        if let Some(existing) = registry.series.get(&series) {
            return match configuration {
                Some(requested) if requested != existing.configuration() => {
                    warn!(
                        series = %series,
                        existing = ?existing.configuration(),
                        ?requested,
                        "Series requested with conflicting configuration."
                    );
                    ConflictingSeriesConfiguration {
                        metric_id: series.metric_id(),
                        existing: existing.configuration(),
                        requested,
                    }
                    .fail()
                }
                _ => Ok(Arc::clone(existing)),
            };
        }

        let configuration = configuration.context(MissingConfiguration)?;
        let tracked = Arc::new(TrackedSeries::new(series, configuration));

        for kind in ConsumerKind::ALL {
            let state = &registry.consumers[kind.index()];
            if state.active {
                subscribe(&tracked, kind, state.period_start, state.filter.clone());
            }
        }

        registry
            .series
            .insert(Arc::clone(tracked.series()), Arc::clone(&tracked));

        self.telemetry.series_created.increment(1);
        self.telemetry.series_registered.set(registry.series.len() as f64);
        debug!(series = %tracked.series(), ?configuration, "Registered series.");

        Ok(tracked)
    }

    /// Removes the series with the given identity.
    ///
    /// The series is unsubscribed from every consumer kind, and its aggregators are dropped without being harvested.
    /// Values tracked against it afterwards are ignored. Returns the removed series, if it existed.
    pub fn remove_series(&self, series: &MetricSeries) -> Option<Arc<TrackedSeries>> {
        let mut registry = self.registry.lock().unwrap();
        let tracked = registry.series.remove(series)?;

        for kind in ConsumerKind::ALL {
            tracked.replace_active(kind, None);
            tracked.store_spare(kind, None);
        }

        self.telemetry.series_registered.set(registry.series.len() as f64);
        debug!(series = %tracked.series(), "Removed series.");

        Some(tracked)
    }

    /// Returns the number of registered series.
    pub fn series_count(&self) -> usize {
        self.registry.lock().unwrap().series.len()
    }

    /// Returns `true` if the given consumer kind has been started and not stopped since.
    pub fn is_cycle_active(&self, kind: ConsumerKind) -> bool {
        self.registry.lock().unwrap().consumers[kind.index()].active
    }

    /// Starts or cycles the aggregators of the given consumer kind.
    ///
    /// For every registered series:
    ///
    /// - if the series has no aggregator for this kind yet, one is created and opened at `period_start` with
    ///   `future_filter`
    /// - if the series has a persistent aggregator, it is snapshotted at `period_start` and keeps accumulating
    /// - if the series has a periodic aggregator, a fresh (or recycled) aggregator is opened at `period_start` with
    ///   `future_filter` and swapped in, and the previous one is completed at `period_start` and then recycled
    ///
    /// The aggregates of the period that ended at `period_start` are returned. The first call for a consumer kind
    /// returns an empty summary, as there is no previous period to harvest.
    pub fn start_or_cycle_aggregators(
        &self, kind: ConsumerKind, period_start: DateTime<Utc>, future_filter: Option<Arc<dyn ValueFilter>>,
    ) -> AggregationPeriodSummary {
        let mut registry = self.registry.lock().unwrap();
        let mut summary = AggregationPeriodSummary::default();

        for tracked in registry.series.values() {
            match tracked.aggregator(kind) {
                None => subscribe(tracked, kind, period_start, future_filter.clone()),
                Some(current) if current.is_persistent() => summary.push(current.as_ref(), period_start),
                Some(_) => {
                    let Some(next) = tracked.take_spare(kind).or_else(|| build_aggregator(tracked, kind)) else {
                        continue;
                    };
                    next.reset(period_start, future_filter.clone());

                    // Swapping waits for in-flight tracking calls on the previous aggregator to finish, so completing it
                    // afterwards captures everything tracked during its period.
                    if let Some(previous) = tracked.replace_active(kind, Some(next)) {
                        summary.push(previous.as_ref(), period_start);
                        if previous.try_recycle() {
                            trace!(series = %tracked.series(), consumer_kind = %kind, "Recycled aggregator.");
                            tracked.store_spare(kind, Some(previous));
                        }
                    }
                }
            }
        }

        let state = &mut registry.consumers[kind.index()];
        let was_active = std::mem::replace(&mut state.active, true);
        state.period_start = period_start;
        state.filter = future_filter;

        self.telemetry.cycles[kind.index()].increment(1);
        debug!(
            consumer_kind = %kind,
            %period_start,
            started = !was_active,
            persistent = summary.persistent_aggregates.len(),
            periodic = summary.periodic_aggregates.len(),
            "Cycled aggregators."
        );

        summary
    }

    /// Stops the aggregators of the given consumer kind.
    ///
    /// Every aggregator of this kind is completed at `period_end` and unsubscribed from its series, and the kind is
    /// marked as inactive. The final aggregates are returned. Stopping an inactive consumer kind returns an empty
    /// summary.
    pub fn stop_aggregators(&self, kind: ConsumerKind, period_end: DateTime<Utc>) -> AggregationPeriodSummary {
        let mut registry = self.registry.lock().unwrap();
        let mut summary = AggregationPeriodSummary::default();

        for tracked in registry.series.values() {
            if let Some(aggregator) = tracked.replace_active(kind, None) {
                summary.push(aggregator.as_ref(), period_end);
            }
            tracked.store_spare(kind, None);
        }

        registry.consumers[kind.index()] = ConsumerState::inactive();

        debug!(
            consumer_kind = %kind,
            %period_end,
            persistent = summary.persistent_aggregates.len(),
            periodic = summary.periodic_aggregates.len(),
            "Stopped aggregators."
        );

        summary
    }
}

fn build_aggregator(tracked: &TrackedSeries, kind: ConsumerKind) -> Option<Arc<dyn MetricAggregator>> {
    match create_aggregator(&tracked.configuration_for(kind), Some(Arc::clone(tracked.series()))) {
        Ok(aggregator) => Some(aggregator),
        Err(e) => {
            error!(series = %tracked.series(), consumer_kind = %kind, error = %e, "Failed to create aggregator.");
            None
        }
    }
}

fn subscribe(
    tracked: &TrackedSeries, kind: ConsumerKind, period_start: DateTime<Utc>, filter: Option<Arc<dyn ValueFilter>>,
) {
    if let Some(aggregator) = build_aggregator(tracked, kind) {
        aggregator.reset(period_start, filter);
        tracked.replace_active(kind, Some(aggregator));
    }
}
