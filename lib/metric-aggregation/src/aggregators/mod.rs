//! Aggregators.
//!
//! Every aggregator follows the same lifecycle, described by [`MetricAggregator`], and differs only in how it folds
//! values into its running state. The lifecycle itself is implemented once, by [`SeriesAggregator`], which is generic
//! over the folding strategy ([`AggregationAlgorithm`]).
use std::{
    sync::{
        atomic::{AtomicBool, Ordering::*},
        Arc, Mutex, RwLock,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use snafu::{ensure, OptionExt as _};

use crate::{
    error::{MismatchedConfiguration, MissingConfiguration},
    AggregatorConfiguration, ConfigurationError, MetricAggregate, MetricSeries, TrackValueError, TrackedValue,
    ValueFilter,
};

mod atomic;

mod distinct;
pub use self::distinct::DistinctCount;

mod statistics;
pub use self::statistics::{BoundedInteger, Statistics};

/// Names of the data fields written to aggregates.
pub mod fields {
    /// Number of values tracked.
    pub const COUNT: &str = "count";

    /// Sum of the values tracked, or the number of distinct values for distinct counts.
    pub const SUM: &str = "sum";

    /// Smallest value tracked.
    pub const MIN: &str = "min";

    /// Largest value tracked.
    pub const MAX: &str = "max";

    /// Population standard deviation of the values tracked.
    pub const STD_DEV: &str = "std_dev";

    /// Number of distinct values tracked.
    pub const DISTINCT_COUNT: &str = "distinct_count";
}

/// Aggregator over running statistics of `f64` values.
pub type StatisticsAggregator = SeriesAggregator<Statistics>;

/// Aggregator over running statistics of unsigned 32-bit integer values.
pub type BoundedIntegerAggregator = SeriesAggregator<BoundedInteger>;

/// Aggregator counting total and distinct values.
pub type DistinctCountAggregator = SeriesAggregator<DistinctCount>;

/// The aggregator lifecycle.
///
/// An aggregator accumulates the values tracked for one series, on behalf of one consumer, over an aggregation period.
/// Aggregators come in two flavors, depending on their configuration:
///
/// - **periodic** aggregators cover a single period: [`reset`][Self::reset] opens the period, and
///   [`complete_aggregation`][Self::complete_aggregation] closes it, after which the aggregator ignores further values
///   until it is reset or recycled
/// - **persistent** aggregators never close: completing them only takes a snapshot, and they keep accumulating across
///   every period for their whole lifetime
///
/// Aggregators never decide when a period ends. That is the job of whoever drives them, usually the
/// [`AggregationCycleManager`][crate::AggregationCycleManager].
///
/// ## Concurrency
///
/// Values can be tracked from any number of threads at once. The remaining lifecycle methods are meant to be called
/// from a single driving thread, but remain safe to call while values are being tracked elsewhere.
pub trait MetricAggregator: Send + Sync {
    /// Returns the configuration of this aggregator.
    fn configuration(&self) -> AggregatorConfiguration;

    /// Returns the series this aggregator is bound to, if any.
    fn series(&self) -> Option<&Arc<MetricSeries>>;

    /// Returns `true` if this aggregator accumulates across aggregation periods.
    fn is_persistent(&self) -> bool {
        self.configuration().is_persistent()
    }

    /// Clears all accumulated state and opens a new aggregation period starting at `period_start`.
    ///
    /// The given filter replaces the current one. When `None`, every value is accepted.
    fn reset(&self, period_start: DateTime<Utc>, filter: Option<Arc<dyn ValueFilter>>);

    /// Tracks a value.
    ///
    /// Periodic aggregators that have completed their period ignore the value. Otherwise, the value is offered to the
    /// filter, and if accepted, folded into the running state.
    ///
    /// # Errors
    ///
    /// If the value is not valid for this aggregator, an error is returned and the accumulated state is unchanged.
    fn track_value(&self, value: f64) -> Result<(), TrackValueError>;

    /// Tracks an arbitrary value.
    ///
    /// Numeric-compatible values are offered to the filter as `f64`, and all other values as-is. See
    /// [`track_value`][Self::track_value] for details.
    ///
    /// # Errors
    ///
    /// If the value is of an unsupported type, or is not valid for this aggregator, an error is returned and the
    /// accumulated state is unchanged.
    fn track_object(&self, value: &TrackedValue<'_>) -> Result<(), TrackValueError>;

    /// Creates a snapshot of the state accumulated so far, for a period ending at `period_end`.
    ///
    /// The aggregator itself is left untouched, so this can be called any number of times.
    ///
    /// **The snapshot is approximate when values are being tracked concurrently.** Each field of the running state is
    /// read individually and without stopping writers, so a value that is in flight while the snapshot is taken may be
    /// reflected in some fields and not in others. Consistency across fields is traded away to keep the tracking path
    /// free of locks.
    ///
    /// Once a periodic aggregator has completed, this returns the aggregate cached at completion.
    fn create_snapshot(&self, period_end: DateTime<Utc>) -> Arc<MetricAggregate>;

    /// Completes the aggregation period at `period_end`, returning its aggregate.
    ///
    /// For periodic aggregators, the first call snapshots the state and marks the aggregator as completed: from then
    /// on, tracked values are ignored, and every call to this method or to
    /// [`create_snapshot`][Self::create_snapshot] returns that same aggregate. For persistent aggregators, this is
    /// equivalent to `create_snapshot`.
    fn complete_aggregation(&self, period_end: DateTime<Utc>) -> Arc<MetricAggregate>;

    /// Attempts to clear the aggregator so that it can be reused for another period.
    ///
    /// Periodic aggregators are cleared back to their initial state, including a period start of the Unix epoch and no
    /// filter, and `true` is returned. Persistent aggregators are never cleared, and `false` is returned.
    fn try_recycle(&self) -> bool;
}

/// A strategy for folding tracked values into running state.
///
/// All methods take `&self`: implementations must use interior mutability that is safe to use from many threads at
/// once, and should avoid holding locks for longer than it takes to update their state.
pub trait AggregationAlgorithm: Send + Sync + Sized + 'static {
    /// Moniker of the aggregation kind.
    ///
    /// Written to every aggregate, and used to match the algorithm against a configuration's
    /// [`algorithm_name`][AggregatorConfiguration::algorithm_name].
    const MONIKER: &'static str;

    /// Creates the algorithm's initial state from the given configuration.
    fn from_configuration(configuration: &AggregatorConfiguration) -> Self;

    /// Folds a numeric value into the state.
    ///
    /// # Errors
    ///
    /// If the value is not valid for this algorithm, an error is returned and the state must be unchanged.
    fn fold_value(&self, value: f64) -> Result<(), TrackValueError>;

    /// Folds an arbitrary value into the state.
    ///
    /// # Errors
    ///
    /// If the value is not valid for this algorithm, an error is returned and the state must be unchanged.
    fn fold_object(&self, value: &TrackedValue<'_>) -> Result<(), TrackValueError>;

    /// Writes the current state to the given aggregate's data fields.
    fn write_data(&self, aggregate: &mut MetricAggregate);

    /// Clears the state back to its initial values.
    fn clear(&self);
}

/// An aggregator bound to a series.
///
/// Implements the [`MetricAggregator`] lifecycle on top of an [`AggregationAlgorithm`].
pub struct SeriesAggregator<A> {
    series: Option<Arc<MetricSeries>>,
    configuration: AggregatorConfiguration,
    filter: RwLock<Option<Arc<dyn ValueFilter>>>,
    period_start: Mutex<DateTime<Utc>>,
    completed: AtomicBool,
    completed_aggregate: Mutex<Option<Arc<MetricAggregate>>>,
    algorithm: A,
}

impl<A: AggregationAlgorithm> SeriesAggregator<A> {
    /// Creates a new `SeriesAggregator` for the given series.
    ///
    /// The aggregator starts out open, with a period start of the Unix epoch and no filter.
    ///
    /// # Errors
    ///
    /// If no configuration is given, or the configuration selects a different algorithm, an error is returned.
    pub fn new(
        configuration: Option<&AggregatorConfiguration>, series: Option<Arc<MetricSeries>>,
    ) -> Result<Self, ConfigurationError> {
        let configuration = *configuration.context(MissingConfiguration)?;
        ensure!(
            configuration.algorithm_name() == A::MONIKER,
            MismatchedConfiguration {
                aggregator: A::MONIKER,
                configuration: configuration.algorithm_name(),
            }
        );

        Ok(Self {
            series,
            configuration,
            filter: RwLock::new(None),
            period_start: Mutex::new(DateTime::default()),
            completed: AtomicBool::new(false),
            completed_aggregate: Mutex::new(None),
            algorithm: A::from_configuration(&configuration),
        })
    }

    fn is_frozen(&self) -> bool {
        !self.configuration.is_persistent() && self.completed.load(Acquire)
    }

    fn accepts<F>(&self, check: F) -> bool
    where
        F: FnOnce(&dyn ValueFilter, Option<&MetricSeries>) -> bool,
    {
        match self.filter.read().unwrap().as_deref() {
            Some(filter) => check(filter, self.series.as_deref()),
            None => true,
        }
    }

    fn build_aggregate(&self, period_end: DateTime<Utc>) -> Arc<MetricAggregate> {
        let period_start = *self.period_start.lock().unwrap();

        let mut aggregate = match self.series.as_deref() {
            Some(series) => {
                let mut aggregate = MetricAggregate::new(series.namespace(), series.metric_id(), A::MONIKER);
                aggregate.dimensions_mut().extend(
                    series
                        .dimensions()
                        .iter()
                        .map(|(name, value)| (name.clone(), value.clone())),
                );
                aggregate.properties_mut().extend(
                    series
                        .properties()
                        .iter()
                        .map(|(name, value)| (name.clone(), value.clone())),
                );
                aggregate
            }
            None => MetricAggregate::new("", "", A::MONIKER),
        };
        self.algorithm.write_data(&mut aggregate);

        // Periods ending before they start are treated as empty.
        let period_duration = (period_end - period_start).to_std().unwrap_or(Duration::ZERO);
        aggregate.set_period(period_start, period_duration);

        Arc::new(aggregate)
    }
}

impl<A: AggregationAlgorithm> MetricAggregator for SeriesAggregator<A> {
    fn configuration(&self) -> AggregatorConfiguration {
        self.configuration
    }

    fn series(&self) -> Option<&Arc<MetricSeries>> {
        self.series.as_ref()
    }

    fn reset(&self, period_start: DateTime<Utc>, filter: Option<Arc<dyn ValueFilter>>) {
        self.algorithm.clear();
        *self.filter.write().unwrap() = filter;
        *self.period_start.lock().unwrap() = period_start;
        *self.completed_aggregate.lock().unwrap() = None;

        // Reopen last, so that values are only accepted once everything else is in place.
        self.completed.store(false, Release);
    }

    fn track_value(&self, value: f64) -> Result<(), TrackValueError> {
        if self.is_frozen() || !self.accepts(|filter, series| filter.will_consume(series, value)) {
            return Ok(());
        }

        self.algorithm.fold_value(value)
    }

    fn track_object(&self, value: &TrackedValue<'_>) -> Result<(), TrackValueError> {
        if self.is_frozen() {
            return Ok(());
        }

        let accepted = match value.as_number() {
            Some(number) => self.accepts(|filter, series| filter.will_consume(series, number)),
            None => self.accepts(|filter, series| filter.will_consume_object(series, value)),
        };
        if !accepted {
            return Ok(());
        }

        self.algorithm.fold_object(value)
    }

    fn create_snapshot(&self, period_end: DateTime<Utc>) -> Arc<MetricAggregate> {
        if !self.configuration.is_persistent() {
            if let Some(aggregate) = self.completed_aggregate.lock().unwrap().as_ref() {
                return Arc::clone(aggregate);
            }
        }

        self.build_aggregate(period_end)
    }

    fn complete_aggregation(&self, period_end: DateTime<Utc>) -> Arc<MetricAggregate> {
        if self.configuration.is_persistent() {
            return self.build_aggregate(period_end);
        }

        let mut completed_aggregate = self.completed_aggregate.lock().unwrap();
        if let Some(aggregate) = completed_aggregate.as_ref() {
            return Arc::clone(aggregate);
        }

        // Stop accepting values before taking the final snapshot.
        self.completed.store(true, Release);

        let aggregate = self.build_aggregate(period_end);
        *completed_aggregate = Some(Arc::clone(&aggregate));
        aggregate
    }

    fn try_recycle(&self) -> bool {
        if self.configuration.is_persistent() {
            return false;
        }

        self.reset(DateTime::default(), None);
        true
    }
}

/// Creates an aggregator for the given configuration.
///
/// The algorithm is picked based on the configuration:
///
/// - statistics restricted to unsigned 32-bit integers: [`BoundedIntegerAggregator`]
/// - statistics: [`StatisticsAggregator`]
/// - distinct count: [`DistinctCountAggregator`]
///
/// # Errors
///
/// If the aggregator cannot be built from the configuration, an error is returned.
pub fn create_aggregator(
    configuration: &AggregatorConfiguration, series: Option<Arc<MetricSeries>>,
) -> Result<Arc<dyn MetricAggregator>, ConfigurationError> {
    let aggregator: Arc<dyn MetricAggregator> = match configuration {
        AggregatorConfiguration::Statistics { restrict_to_u32: true, .. } => {
            Arc::new(BoundedIntegerAggregator::new(Some(configuration), series)?)
        }
        AggregatorConfiguration::Statistics { .. } => Arc::new(StatisticsAggregator::new(Some(configuration), series)?),
        AggregatorConfiguration::DistinctCount { .. } => {
            Arc::new(DistinctCountAggregator::new(Some(configuration), series)?)
        }
    };

    Ok(aggregator)
}
