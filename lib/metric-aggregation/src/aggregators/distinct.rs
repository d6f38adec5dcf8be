use std::sync::{
    atomic::{AtomicU64, Ordering::*},
    Mutex,
};

use ahash::AHashSet;

use super::{fields, AggregationAlgorithm};
use crate::{AggregatorConfiguration, MetricAggregate, TrackValueError, TrackedValue};

/// Counts of total and distinct values.
///
/// Every tracked value is turned into a string key, and the number of distinct keys is counted alongside the total
/// number of values tracked. Keys are derived as follows:
///
/// - numeric-compatible values are converted to `f64` and formatted, so `-42`, `-42.0`, and `-42i8` all share a key
/// - strings are trimmed of surrounding whitespace, but otherwise kept as-is, so `"-42"` shares a key with the number
///   `-42` while `"-42.0"` does not
/// - null values use the key `null`
/// - any other value is formatted and trimmed
///
/// When configured to be case-insensitive, keys are lowercased before being counted.
///
/// Aggregates carry the total count in `count`, and the distinct count in both `distinct_count` and `sum`. The remaining
/// statistics fields are always zero.
pub struct DistinctCount {
    case_sensitive: bool,
    count: AtomicU64,
    values: Mutex<AHashSet<String>>,
}

impl DistinctCount {
    fn record(&self, key: &str) {
        let key = if self.case_sensitive {
            key.to_string()
        } else {
            key.to_lowercase()
        };

        self.values.lock().unwrap().insert(key);
        self.count.fetch_add(1, Release);
    }
}

impl AggregationAlgorithm for DistinctCount {
    const MONIKER: &'static str = "distinct_count";

    fn from_configuration(configuration: &AggregatorConfiguration) -> Self {
        Self {
            case_sensitive: configuration.case_sensitive_distinct_values(),
            count: AtomicU64::new(0),
            values: Mutex::new(AHashSet::new()),
        }
    }

    fn fold_value(&self, value: f64) -> Result<(), TrackValueError> {
        self.record(&value.to_string());
        Ok(())
    }

    fn fold_object(&self, value: &TrackedValue<'_>) -> Result<(), TrackValueError> {
        match value {
            TrackedValue::Str(s) => self.record(s.trim()),
            other => match other.as_number() {
                Some(number) => return self.fold_value(number),
                None => self.record(other.to_string().trim()),
            },
        }

        Ok(())
    }

    fn write_data(&self, aggregate: &mut MetricAggregate) {
        let count = self.count.load(Acquire);
        let distinct_count = self.values.lock().unwrap().len();

        aggregate.set(fields::COUNT, count as i64);
        aggregate.set(fields::DISTINCT_COUNT, distinct_count as i64);
        aggregate.set(fields::SUM, distinct_count as f64);
        aggregate.set(fields::MIN, 0.0);
        aggregate.set(fields::MAX, 0.0);
        aggregate.set(fields::STD_DEV, 0.0);
    }

    fn clear(&self) {
        self.count.store(0, Release);
        self.values.lock().unwrap().clear();
    }
}
