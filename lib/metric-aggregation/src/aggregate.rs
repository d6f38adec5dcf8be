use std::{collections::BTreeMap, sync::Mutex, time::Duration};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{ser::SerializeStruct as _, Serialize, Serializer};

/// A single data field of a metric aggregate.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AggregateData {
    /// An integer value, such as a count.
    Integer(i64),

    /// A floating-point value, such as a sum.
    Float(f64),

    /// A string value.
    String(String),
}

impl AggregateData {
    /// Returns the value as an `f64`, if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::String(_) => None,
        }
    }

    /// Returns the value as an `i64`, if it is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i64> for AggregateData {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for AggregateData {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for AggregateData {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct AggregatePeriod {
    start: DateTime<Utc>,
    duration: Duration,
}

/// A snapshot of the statistics accumulated by an aggregator over an aggregation period.
///
/// Aggregates are built by their owning aggregator, and are shared read-only once handed out. The period bounds are
/// the exception: they sit behind a single lock so that they can be read and updated from different threads.
#[derive(Debug)]
pub struct MetricAggregate {
    namespace: String,
    metric_id: String,
    aggregation_kind_moniker: String,
    period: Mutex<AggregatePeriod>,
    dimensions: BTreeMap<String, String>,
    properties: BTreeMap<String, String>,
    data: IndexMap<String, AggregateData>,
}

impl MetricAggregate {
    /// Creates a new, empty `MetricAggregate`.
    pub fn new<N, M, K>(namespace: N, metric_id: M, aggregation_kind_moniker: K) -> Self
    where
        N: Into<String>,
        M: Into<String>,
        K: Into<String>,
    {
        Self {
            namespace: namespace.into(),
            metric_id: metric_id.into(),
            aggregation_kind_moniker: aggregation_kind_moniker.into(),
            period: Mutex::new(AggregatePeriod::default()),
            dimensions: BTreeMap::new(),
            properties: BTreeMap::new(),
            data: IndexMap::new(),
        }
    }

    /// Returns the namespace of the metric.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the ID of the metric.
    ///
    /// Empty if the aggregate was produced by an aggregator not bound to any series.
    pub fn metric_id(&self) -> &str {
        &self.metric_id
    }

    /// Returns the moniker of the aggregation kind that produced this aggregate.
    pub fn aggregation_kind_moniker(&self) -> &str {
        &self.aggregation_kind_moniker
    }

    /// Returns the start of the aggregation period.
    pub fn period_start(&self) -> DateTime<Utc> {
        self.period.lock().unwrap().start
    }

    /// Returns the length of the aggregation period.
    pub fn period_duration(&self) -> Duration {
        self.period.lock().unwrap().duration
    }

    /// Sets the bounds of the aggregation period.
    pub fn set_period(&self, start: DateTime<Utc>, duration: Duration) {
        let mut period = self.period.lock().unwrap();
        period.start = start;
        period.duration = duration;
    }

    /// Returns the dimensions of the series.
    pub fn dimensions(&self) -> &BTreeMap<String, String> {
        &self.dimensions
    }

    /// Returns a mutable reference to the dimensions of the series.
    pub fn dimensions_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.dimensions
    }

    /// Returns the context properties of the series.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Returns a mutable reference to the context properties of the series.
    pub fn properties_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.properties
    }

    /// Returns the data fields.
    pub fn data(&self) -> &IndexMap<String, AggregateData> {
        &self.data
    }

    /// Returns the data field with the given name, if it exists.
    pub fn get(&self, field: &str) -> Option<&AggregateData> {
        self.data.get(field)
    }

    /// Returns the data field with the given name as an `f64`, if it exists and is numeric.
    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(AggregateData::as_f64)
    }

    /// Sets a data field, replacing any existing value.
    pub fn set<F, V>(&mut self, field: F, value: V)
    where
        F: Into<String>,
        V: Into<AggregateData>,
    {
        self.data.insert(field.into(), value.into());
    }
}

impl Clone for MetricAggregate {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            metric_id: self.metric_id.clone(),
            aggregation_kind_moniker: self.aggregation_kind_moniker.clone(),
            period: Mutex::new(*self.period.lock().unwrap()),
            dimensions: self.dimensions.clone(),
            properties: self.properties.clone(),
            data: self.data.clone(),
        }
    }
}

impl PartialEq for MetricAggregate {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }

        // Copy each period out before comparing so we never hold both locks at once.
        let self_period = *self.period.lock().unwrap();
        let other_period = *other.period.lock().unwrap();

        self_period == other_period
            && self.namespace == other.namespace
            && self.metric_id == other.metric_id
            && self.aggregation_kind_moniker == other.aggregation_kind_moniker
            && self.dimensions == other.dimensions
            && self.properties == other.properties
            && self.data == other.data
    }
}

impl Serialize for MetricAggregate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let period = *self.period.lock().unwrap();

        let mut state = serializer.serialize_struct("MetricAggregate", 8)?;
        state.serialize_field("namespace", &self.namespace)?;
        state.serialize_field("metric_id", &self.metric_id)?;
        state.serialize_field("aggregation_kind", &self.aggregation_kind_moniker)?;
        state.serialize_field("period_start", &period.start)?;
        state.serialize_field("period_duration_ms", &(period.duration.as_millis() as u64))?;
        state.serialize_field("dimensions", &self.dimensions)?;
        state.serialize_field("properties", &self.properties)?;
        state.serialize_field("data", &self.data)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    #[test]
    fn period_defaults_to_epoch() {
        let aggregate = MetricAggregate::new("ns", "id", "statistics");
        assert_eq!(aggregate.period_start(), DateTime::<Utc>::default());
        assert_eq!(aggregate.period_duration(), Duration::ZERO);
    }

    #[test]
    fn period_can_be_set_through_shared_reference() {
        let aggregate = MetricAggregate::new("ns", "id", "statistics");
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        aggregate.set_period(start, Duration::from_secs(60));
        assert_eq!(aggregate.period_start(), start);
        assert_eq!(aggregate.period_duration(), Duration::from_secs(60));
    }

    #[test]
    fn clone_is_equal() {
        let mut aggregate = MetricAggregate::new("ns", "id", "statistics");
        aggregate.dimensions_mut().insert("region".into(), "east".into());
        aggregate.set("count", 3i64);
        aggregate.set("sum", 4.5);

        let cloned = aggregate.clone();
        assert_eq!(aggregate, cloned);
        assert_eq!(cloned.get_f64("count"), Some(3.0));
        assert_eq!(cloned.get("sum").and_then(AggregateData::as_i64), None);
    }
}
