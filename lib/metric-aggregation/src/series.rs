use std::{
    collections::BTreeMap,
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, Mutex, RwLock},
};

use metrics::counter;
use serde::Serialize;

use crate::{AggregatorConfiguration, ConsumerKind, MetricAggregator, TrackValueError, TrackedValue};

/// Identity of a metric series.
///
/// A series is identified by its namespace, metric ID, and dimensions. It may also carry context properties, which are
/// copied onto every aggregate produced for the series but which do not take part in its identity: two series that
/// differ only in their properties are the same series.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MetricSeries {
    namespace: String,
    metric_id: String,
    dimensions: BTreeMap<String, String>,
    properties: BTreeMap<String, String>,
}

impl MetricSeries {
    /// Creates a new `MetricSeries` with no dimensions.
    pub fn new<N, M>(namespace: N, metric_id: M) -> Self
    where
        N: Into<String>,
        M: Into<String>,
    {
        Self {
            namespace: namespace.into(),
            metric_id: metric_id.into(),
            dimensions: BTreeMap::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Adds a dimension to the series.
    pub fn with_dimension<K, V>(mut self, name: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.dimensions.insert(name.into(), value.into());
        self
    }

    /// Adds a context property to the series.
    pub fn with_property<K, V>(mut self, name: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Returns the namespace of the metric.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the ID of the metric.
    pub fn metric_id(&self) -> &str {
        &self.metric_id
    }

    /// Returns the dimensions of the series.
    pub fn dimensions(&self) -> &BTreeMap<String, String> {
        &self.dimensions
    }

    /// Returns the context properties of the series.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }
}

impl PartialEq for MetricSeries {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.metric_id == other.metric_id && self.dimensions == other.dimensions
    }
}

impl Eq for MetricSeries {}

impl Hash for MetricSeries {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.metric_id.hash(state);
        self.dimensions.hash(state);
    }
}

impl fmt::Display for MetricSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.namespace.is_empty() {
            write!(f, "{}.", self.namespace)?;
        }
        f.write_str(&self.metric_id)?;

        if !self.dimensions.is_empty() {
            f.write_str("{")?;
            for (i, (name, value)) in self.dimensions.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}={}", name, value)?;
            }
            f.write_str("}")?;
        }

        Ok(())
    }
}

#[derive(Default)]
struct AggregatorSlot {
    active: RwLock<Option<Arc<dyn MetricAggregator>>>,
    spare: Mutex<Option<Arc<dyn MetricAggregator>>>,
}

/// A series that values can be tracked against.
///
/// Holds one aggregator slot per consumer kind. Tracking a value offers it to the aggregator in every occupied slot;
/// slots are filled and emptied by the [`AggregationCycleManager`][crate::AggregationCycleManager] as consumer kinds
/// start, cycle, and stop.
///
/// ## Persistence
///
/// Persistence only applies to the [`Default`][ConsumerKind::Default] consumer kind. Other consumer kinds are live
/// views, and always aggregate the series periodically, even when it is configured as persistent. This allows a
/// lifetime counter to be exported as-is while also being watched in short windows.
pub struct TrackedSeries {
    series: Arc<MetricSeries>,
    configuration: AggregatorConfiguration,
    slots: [AggregatorSlot; ConsumerKind::COUNT],
}

impl TrackedSeries {
    pub(crate) fn new(series: MetricSeries, configuration: AggregatorConfiguration) -> Self {
        Self {
            series: Arc::new(series),
            configuration,
            slots: Default::default(),
        }
    }

    /// Returns the identity of the series.
    pub fn series(&self) -> &Arc<MetricSeries> {
        &self.series
    }

    /// Returns the configuration the series was created with.
    pub fn configuration(&self) -> AggregatorConfiguration {
        self.configuration
    }

    /// Returns the aggregator configuration used for the given consumer kind.
    pub fn configuration_for(&self, kind: ConsumerKind) -> AggregatorConfiguration {
        match kind {
            ConsumerKind::Default => self.configuration,
            _ => self.configuration.with_persistent(false),
        }
    }

    /// Returns the active aggregator for the given consumer kind, if any.
    pub fn aggregator(&self, kind: ConsumerKind) -> Option<Arc<dyn MetricAggregator>> {
        self.slots[kind.index()].active.read().unwrap().clone()
    }

    /// Tracks a value.
    ///
    /// The value is offered to every active aggregator of the series. All of them are given the chance to consume the
    /// value even if one of them rejects it.
    ///
    /// # Errors
    ///
    /// If any aggregator rejects the value as invalid, the first such error is returned.
    pub fn track_value(&self, value: f64) -> Result<(), TrackValueError> {
        self.track_with(|aggregator| aggregator.track_value(value))
    }

    /// Tracks an arbitrary value.
    ///
    /// See [`track_value`][Self::track_value] for details.
    ///
    /// # Errors
    ///
    /// If any aggregator rejects the value as invalid, the first such error is returned.
    pub fn track_object(&self, value: &TrackedValue<'_>) -> Result<(), TrackValueError> {
        self.track_with(|aggregator| aggregator.track_object(value))
    }

    fn track_with<F>(&self, track: F) -> Result<(), TrackValueError>
    where
        F: Fn(&dyn MetricAggregator) -> Result<(), TrackValueError>,
    {
        let mut result = Ok(());

        for slot in &self.slots {
            let active = slot.active.read().unwrap();
            if let Some(aggregator) = active.as_deref() {
                if let Err(e) = track(aggregator) {
                    counter!("aggregation_values_rejected_total").increment(1);
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }

        result
    }

    pub(crate) fn replace_active(
        &self, kind: ConsumerKind, aggregator: Option<Arc<dyn MetricAggregator>>,
    ) -> Option<Arc<dyn MetricAggregator>> {
        let mut active = self.slots[kind.index()].active.write().unwrap();
        std::mem::replace(&mut *active, aggregator)
    }

    pub(crate) fn take_spare(&self, kind: ConsumerKind) -> Option<Arc<dyn MetricAggregator>> {
        self.slots[kind.index()].spare.lock().unwrap().take()
    }

    pub(crate) fn store_spare(&self, kind: ConsumerKind, aggregator: Option<Arc<dyn MetricAggregator>>) {
        *self.slots[kind.index()].spare.lock().unwrap() = aggregator;
    }
}

impl fmt::Debug for TrackedSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active = ConsumerKind::ALL
            .iter()
            .filter(|kind| self.aggregator(**kind).is_some())
            .collect::<Vec<_>>();

        f.debug_struct("TrackedSeries")
            .field("series", &self.series)
            .field("configuration", &self.configuration)
            .field("active", &active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn identity_ignores_properties() {
        let a = MetricSeries::new("ns", "requests")
            .with_dimension("route", "/home")
            .with_property("host", "a");
        let b = MetricSeries::new("ns", "requests")
            .with_dimension("route", "/home")
            .with_property("host", "b");
        let c = MetricSeries::new("ns", "requests").with_dimension("route", "/about");

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set = [a, b, c].into_iter().collect::<HashSet<_>>();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn dimension_order_does_not_matter() {
        let a = MetricSeries::new("ns", "requests")
            .with_dimension("route", "/home")
            .with_dimension("method", "GET");
        let b = MetricSeries::new("ns", "requests")
            .with_dimension("method", "GET")
            .with_dimension("route", "/home");

        assert_eq!(a, b);
        assert_eq!(a.to_string(), "ns.requests{method=GET,route=/home}");
    }

    #[test]
    fn untracked_series_accepts_values() {
        let tracked = TrackedSeries::new(MetricSeries::new("ns", "id"), AggregatorConfiguration::bounded_integer());

        // With no active aggregators, nothing can reject the value.
        assert!(tracked.track_value(-1.0).is_ok());
        assert!(tracked.aggregator(ConsumerKind::Default).is_none());
    }

    #[test]
    fn persistence_only_applies_to_default_consumer() {
        let config = AggregatorConfiguration::statistics().with_persistent(true);
        let tracked = TrackedSeries::new(MetricSeries::new("ns", "id"), config);

        assert!(tracked.configuration_for(ConsumerKind::Default).is_persistent());
        assert!(!tracked.configuration_for(ConsumerKind::Diagnostics).is_persistent());
        assert!(!tracked.configuration_for(ConsumerKind::Custom).is_persistent());
    }
}
