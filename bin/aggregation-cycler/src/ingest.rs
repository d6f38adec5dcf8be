use metric_aggregation::{AggregationCycleManager, AggregatorConfiguration, MetricSeries, TrackedValue};
use tracing::{debug, warn};

/// A single parsed input line.
///
/// Lines take the form `<metric_id>:<value>`, optionally followed by `|<name>=<value>,...` dimensions. For example,
/// `requests:1`, `latency:12.5|route=/home,method=GET`, or `users:alice`.
#[derive(Debug, PartialEq)]
pub struct Sample<'a> {
    pub metric_id: &'a str,
    pub value: &'a str,
    pub dimensions: Vec<(&'a str, &'a str)>,
}

impl<'a> Sample<'a> {
    /// Parses a line, returning `None` if it is malformed.
    pub fn parse(line: &'a str) -> Option<Self> {
        let (sample, dimensions) = match line.split_once('|') {
            Some((sample, dimensions)) => (sample, Some(dimensions)),
            None => (line, None),
        };

        let (metric_id, value) = sample.split_once(':')?;
        let metric_id = metric_id.trim();
        if metric_id.is_empty() {
            return None;
        }

        let dimensions = match dimensions {
            Some(dimensions) => dimensions
                .split(',')
                .filter(|dimension| !dimension.trim().is_empty())
                .map(|dimension| {
                    dimension
                        .split_once('=')
                        .map(|(name, value)| (name.trim(), value.trim()))
                })
                .collect::<Option<Vec<_>>>()?,
            None => Vec::new(),
        };

        Some(Self {
            metric_id,
            value,
            dimensions,
        })
    }

    fn series(&self, namespace: &str) -> MetricSeries {
        self.dimensions
            .iter()
            .fold(MetricSeries::new(namespace, self.metric_id), |series, (name, value)| {
                series.with_dimension(*name, *value)
            })
    }

    fn tracked_value(&self) -> TrackedValue<'a> {
        // Anything that parses as a number is tracked as one, so that distinct counts normalize numeric spellings.
        match self.value.trim().parse::<f64>() {
            Ok(value) => TrackedValue::F64(value),
            Err(_) => TrackedValue::Str(self.value),
        }
    }
}

/// Tracks a single input line.
///
/// Malformed lines and rejected values are logged and otherwise ignored.
pub fn ingest_line(
    manager: &AggregationCycleManager, namespace: &str, configuration: AggregatorConfiguration, line: &str,
) {
    if line.trim().is_empty() {
        return;
    }

    let Some(sample) = Sample::parse(line) else {
        warn!(line, "Ignoring malformed input line.");
        return;
    };

    let tracked = match manager.get_or_create_series(sample.series(namespace), Some(configuration)) {
        Ok(tracked) => tracked,
        Err(e) => {
            warn!(error = %e, "Failed to get series.");
            return;
        }
    };

    let value = sample.tracked_value();
    let result = match value {
        TrackedValue::F64(value) => tracked.track_value(value),
        other => tracked.track_object(&other),
    };

    match result {
        Ok(()) => debug!(series = %tracked.series(), %value, "Tracked value."),
        Err(e) => warn!(series = %tracked.series(), error = %e, "Rejected value."),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use metric_aggregation::{aggregators::fields, ConsumerKind};

    use super::*;

    #[test]
    fn parse_samples() {
        assert_eq!(
            Sample::parse("requests:1"),
            Some(Sample {
                metric_id: "requests",
                value: "1",
                dimensions: vec![],
            })
        );
        assert_eq!(
            Sample::parse("latency:12.5|route=/home, method=GET"),
            Some(Sample {
                metric_id: "latency",
                value: "12.5",
                dimensions: vec![("route", "/home"), ("method", "GET")],
            })
        );

        // Values may themselves contain colons.
        assert_eq!(Sample::parse("users:a:b").map(|s| s.value), Some("a:b"));
    }

    #[test]
    fn parse_malformed() {
        assert_eq!(Sample::parse("requests"), None);
        assert_eq!(Sample::parse(":1"), None);
        assert_eq!(Sample::parse("requests:1|route"), None);
    }

    #[test]
    fn ingest_tracks_values() {
        let manager = AggregationCycleManager::new();
        let configuration = AggregatorConfiguration::statistics();
        manager.start_or_cycle_aggregators(ConsumerKind::Default, Utc::now(), None);

        for line in ["latency:1|route=/home", "latency:2|route=/home", "latency:x|route=/home", "", "garbage"] {
            ingest_line(&manager, "app", configuration, line);
        }
        ingest_line(&manager, "app", configuration, "latency:10|route=/about");

        assert_eq!(manager.series_count(), 2);

        let summary = manager.stop_aggregators(ConsumerKind::Default, Utc::now());
        let home = summary
            .aggregates()
            .find(|aggregate| aggregate.dimensions().get("route").map(String::as_str) == Some("/home"))
            .unwrap();
        assert_eq!(home.namespace(), "app");
        assert_eq!(home.get_f64(fields::COUNT), Some(2.0));
        assert_eq!(home.get_f64(fields::SUM), Some(3.0));
    }
}
