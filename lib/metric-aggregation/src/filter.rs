use crate::{MetricSeries, TrackedValue};

/// A per-value filter applied by an aggregator.
///
/// Before a tracked value is folded into an aggregator, the aggregator's filter (if it has one) decides whether the
/// value counts towards the current aggregation period. Numeric-compatible values are offered through
/// [`will_consume`][Self::will_consume] after being coerced to `f64`, and every other value through
/// [`will_consume_object`][Self::will_consume_object] as-is. Exactly one of the two methods is called per tracked value.
///
/// Filters are called on the hot path, from whichever thread is tracking the value, and should be cheap and free of
/// side effects. An aggregator without a filter accepts every value.
pub trait ValueFilter: Send + Sync {
    /// Returns `true` if the numeric value should be consumed.
    fn will_consume(&self, series: Option<&MetricSeries>, value: f64) -> bool;

    /// Returns `true` if the non-numeric value should be consumed.
    fn will_consume_object(&self, series: Option<&MetricSeries>, value: &TrackedValue<'_>) -> bool;
}

/// A filter that only accepts values for series with specific metric IDs.
///
/// Series are matched by exact metric ID or by metric ID prefix. Values tracked by an aggregator not bound to any series
/// are never accepted. This is typically used to narrow down a diagnostics consumer to a handful of interesting series.
#[derive(Clone, Debug, Default)]
pub struct MetricIdFilter {
    metric_ids: Vec<String>,
    prefixes: Vec<String>,
}

impl MetricIdFilter {
    /// Creates a new, empty `MetricIdFilter`, which accepts nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts series with the given metric ID.
    pub fn with_metric_id<S: Into<String>>(mut self, metric_id: S) -> Self {
        self.metric_ids.push(metric_id.into());
        self
    }

    /// Accepts series whose metric ID starts with the given prefix.
    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    fn matches(&self, series: Option<&MetricSeries>) -> bool {
        let Some(series) = series else {
            return false;
        };

        let metric_id = series.metric_id();
        self.metric_ids.iter().any(|id| id == metric_id)
            || self.prefixes.iter().any(|prefix| metric_id.starts_with(prefix.as_str()))
    }
}

impl ValueFilter for MetricIdFilter {
    fn will_consume(&self, series: Option<&MetricSeries>, _: f64) -> bool {
        self.matches(series)
    }

    fn will_consume_object(&self, series: Option<&MetricSeries>, _: &TrackedValue<'_>) -> bool {
        self.matches(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_exact_ids_and_prefixes() {
        let filter = MetricIdFilter::new().with_metric_id("requests").with_prefix("db.");

        let requests = MetricSeries::new("ns", "requests");
        let requests_total = MetricSeries::new("ns", "requests_total");
        let db_calls = MetricSeries::new("ns", "db.calls");

        assert!(filter.will_consume(Some(&requests), 1.0));
        assert!(!filter.will_consume(Some(&requests_total), 1.0));
        assert!(filter.will_consume_object(Some(&db_calls), &TrackedValue::from("x")));
        assert!(!filter.will_consume(None, 1.0));
    }

    #[test]
    fn empty_filter_accepts_nothing() {
        let filter = MetricIdFilter::new();
        assert!(!filter.will_consume(Some(&MetricSeries::new("ns", "requests")), 1.0));
    }
}
