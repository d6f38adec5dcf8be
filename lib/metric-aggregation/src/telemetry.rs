//! Telemetry conversion.
//!
//! Aggregates are the engine's internal representation of a harvested period. Before leaving the engine, they are
//! flattened into [`AggregateTelemetry`] records, which carry the statistics every supported aggregation kind can be
//! rendered into, and handed to an [`AggregateExporter`].
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use snafu::{ensure, OptionExt as _};

use crate::{
    aggregators::{fields, AggregationAlgorithm as _, BoundedInteger, DistinctCount, Statistics},
    error::{MissingField, UnknownAggregationKind},
    AggregationPeriodSummary, MetricAggregate, TelemetryError,
};

/// Property holding the length of the aggregation period, in milliseconds.
pub const AGGREGATION_INTERVAL_MS_PROPERTY: &str = "_AggregationIntervalMs";

/// Name used for aggregates that are not bound to a metric.
const UNNAMED_METRIC: &str = "null";

const KNOWN_MONIKERS: [&str; 3] = [Statistics::MONIKER, BoundedInteger::MONIKER, DistinctCount::MONIKER];

/// A flattened aggregate, ready to be exported.
///
/// The timestamp is the start of the aggregation period. The period length is carried in the
/// [`AGGREGATION_INTERVAL_MS_PROPERTY`] property, alongside the dimensions and context properties of the series.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AggregateTelemetry {
    name: String,
    count: i64,
    sum: f64,
    max: f64,
    min: f64,
    std_dev: f64,
    timestamp: DateTime<Utc>,
    properties: BTreeMap<String, String>,
}

impl AggregateTelemetry {
    /// Converts an aggregate to telemetry.
    ///
    /// # Errors
    ///
    /// If the aggregate was produced by an unknown aggregation kind, or is missing any of the statistics fields, an
    /// error is returned.
    pub fn try_from_aggregate(aggregate: &MetricAggregate) -> Result<Self, TelemetryError> {
        let moniker = aggregate.aggregation_kind_moniker();
        ensure!(
            KNOWN_MONIKERS.iter().any(|known| *known == moniker),
            UnknownAggregationKind { moniker }
        );

        let count = aggregate
            .get(fields::COUNT)
            .and_then(|value| value.as_i64())
            .context(MissingField {
                moniker,
                field: fields::COUNT,
            })?;
        let float_field = |field: &'static str| aggregate.get_f64(field).context(MissingField { moniker, field });

        let name = match aggregate.metric_id() {
            "" => UNNAMED_METRIC.to_string(),
            metric_id => metric_id.to_string(),
        };

        // Context properties take precedence over dimensions of the same name, and the interval over both.
        let mut properties = aggregate.dimensions().clone();
        properties.extend(
            aggregate
                .properties()
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        properties.insert(
            AGGREGATION_INTERVAL_MS_PROPERTY.to_string(),
            aggregate.period_duration().as_millis().to_string(),
        );

        Ok(Self {
            name,
            count,
            sum: float_field(fields::SUM)?,
            max: float_field(fields::MAX)?,
            min: float_field(fields::MIN)?,
            std_dev: float_field(fields::STD_DEV)?,
            timestamp: aggregate.period_start(),
            properties,
        })
    }

    /// Returns the metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of values tracked.
    pub fn count(&self) -> i64 {
        self.count
    }

    /// Returns the sum of the values tracked.
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Returns the largest value tracked.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Returns the smallest value tracked.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Returns the standard deviation of the values tracked.
    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }

    /// Returns the start of the aggregation period.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the properties.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }
}

impl TryFrom<&MetricAggregate> for AggregateTelemetry {
    type Error = TelemetryError;

    fn try_from(aggregate: &MetricAggregate) -> Result<Self, Self::Error> {
        Self::try_from_aggregate(aggregate)
    }
}

/// A destination for harvested aggregates.
pub trait AggregateExporter {
    /// Error type returned when exporting fails.
    type Error;

    /// Exports the aggregates of a period summary.
    ///
    /// # Errors
    ///
    /// If the summary cannot be exported, an error is returned.
    fn export(&mut self, summary: &AggregationPeriodSummary) -> Result<(), Self::Error>;
}
