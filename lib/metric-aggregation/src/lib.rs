//! Metric series aggregation.
//!
//! This crate turns a high-frequency stream of raw metric values into periodic statistical summaries. Values are
//! tracked against a [`TrackedSeries`], which fans them out to one [`MetricAggregator`] per subscribed
//! [`ConsumerKind`]. An [`AggregationCycleManager`] owns every series and decides when aggregation periods begin and
//! end, harvesting a [`MetricAggregate`] from each aggregator at the end of every period.

mod aggregate;
pub use self::aggregate::{AggregateData, MetricAggregate};

pub mod aggregators;
pub use self::aggregators::{
    create_aggregator, BoundedIntegerAggregator, DistinctCountAggregator, MetricAggregator, StatisticsAggregator,
};

mod config;
pub use self::config::AggregatorConfiguration;

mod consumer;
pub use self::consumer::ConsumerKind;

mod cycle;
pub use self::cycle::{AggregationCycleManager, AggregationPeriodSummary};

mod error;
pub use self::error::{ConfigurationError, TelemetryError, TrackValueError};

mod filter;
pub use self::filter::{MetricIdFilter, ValueFilter};

mod series;
pub use self::series::{MetricSeries, TrackedSeries};

pub mod telemetry;

mod value;
pub use self::value::TrackedValue;
