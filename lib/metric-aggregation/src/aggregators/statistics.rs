use std::sync::atomic::{AtomicU64, Ordering::*};

use snafu::OptionExt as _;

use super::{atomic::AtomicF64, fields, AggregationAlgorithm};
use crate::{
    error::{NotAnInteger, NotFinite, OutOfRange, Unparsable, UnsupportedType},
    AggregatorConfiguration, MetricAggregate, TrackValueError, TrackedValue,
};

/// How far a value may be from the nearest integer and still be considered an integer.
const INTEGER_TOLERANCE: f64 = 1e-6;

/// Clamps infinities to the largest finite value of the same sign.
fn saturate(value: f64) -> f64 {
    value.clamp(-f64::MAX, f64::MAX)
}

/// Running count, sum, sum of squares, minimum, and maximum.
///
/// ## Saturation
///
/// Infinite values are folded in as `±f64::MAX`, and the running sums are clamped to `±f64::MAX` after every addition
/// instead of overflowing to infinity. This has a few surprising consequences at extreme magnitudes:
///
/// - once the sum has saturated, finite values no longer move it
/// - a saturated sum can be brought back towards zero by a value of the opposite sign that is itself saturated, such
///   as an infinity: `+inf` followed by `-inf` sums to exactly zero
///
/// Sums and standard deviations should be treated as approximate once values get anywhere near `f64::MAX`.
struct RunningStatistics {
    count: AtomicU64,
    sum: AtomicF64,
    sum_of_squares: AtomicF64,
    min: AtomicF64,
    max: AtomicF64,
}

impl RunningStatistics {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum: AtomicF64::new(0.0),
            sum_of_squares: AtomicF64::new(0.0),
            min: AtomicF64::new(f64::MAX),
            max: AtomicF64::new(-f64::MAX),
        }
    }

    fn fold(&self, value: f64) {
        let value = saturate(value);

        self.min.update(|min| min.min(value));
        self.max.update(|max| max.max(value));
        self.sum.update(|sum| saturate(sum + value));
        self.sum_of_squares
            .update(|sum_of_squares| saturate(sum_of_squares + value * value));

        // The count is bumped last, so that a snapshot which observes it also observes the rest of this value.
        self.count.fetch_add(1, Release);
    }

    fn clear(&self) {
        self.count.store(0, Release);
        self.sum.store(0.0);
        self.sum_of_squares.store(0.0);
        self.min.store(f64::MAX);
        self.max.store(-f64::MAX);
    }

    fn write_data(&self, aggregate: &mut MetricAggregate) {
        let count = self.count.load(Acquire);
        let (sum, min, max, std_dev) = if count == 0 {
            (0.0, 0.0, 0.0, 0.0)
        } else {
            let sum = self.sum.load();
            let sum_of_squares = self.sum_of_squares.load();

            let n = count as f64;
            let mean = sum / n;
            let variance = sum_of_squares / n - mean * mean;
            let std_dev = if variance > 0.0 {
                saturate(variance.sqrt())
            } else {
                // Rounding can push the variance of (nearly) identical values slightly below zero, and saturated sums
                // can push it to negative infinity or NaN.
                0.0
            };

            (sum, self.min.load(), self.max.load(), std_dev)
        };

        aggregate.set(fields::COUNT, count as i64);
        aggregate.set(fields::SUM, sum);
        aggregate.set(fields::MIN, min);
        aggregate.set(fields::MAX, max);
        aggregate.set(fields::STD_DEV, std_dev);
    }
}

fn parse_number(input: &str) -> Result<f64, TrackValueError> {
    input.trim().parse::<f64>().ok().context(Unparsable { input })
}

/// Running statistics over `f64` values.
///
/// Tracks the count, sum, minimum, maximum, and population standard deviation of every value tracked. NaN values are
/// silently ignored, and infinite values saturate (see below).
///
/// Accepts every numeric-compatible value, as well as strings that parse as a number. Null values are ignored.
///
/// ## Saturation
///
/// Infinite values are folded in as `±f64::MAX`, and the running sum is clamped to `±f64::MAX` rather than overflowing.
/// Once the sum has saturated, finite values no longer move it, though a later value of the opposite sign that is
/// itself saturated (such as the opposite infinity) can bring it back towards zero. Results at such magnitudes are
/// approximate.
pub struct Statistics {
    statistics: RunningStatistics,
}

impl AggregationAlgorithm for Statistics {
    const MONIKER: &'static str = "statistics";

    fn from_configuration(_: &AggregatorConfiguration) -> Self {
        Self {
            statistics: RunningStatistics::new(),
        }
    }

    fn fold_value(&self, value: f64) -> Result<(), TrackValueError> {
        if !value.is_nan() {
            self.statistics.fold(value);
        }

        Ok(())
    }

    fn fold_object(&self, value: &TrackedValue<'_>) -> Result<(), TrackValueError> {
        match value {
            TrackedValue::Null => Ok(()),
            TrackedValue::Str(s) => self.fold_value(parse_number(s)?),
            other => match other.as_number() {
                Some(number) => self.fold_value(number),
                None => UnsupportedType {
                    aggregator: Self::MONIKER,
                    type_name: other.type_name(),
                }
                .fail(),
            },
        }
    }

    fn write_data(&self, aggregate: &mut MetricAggregate) {
        self.statistics.write_data(aggregate);
    }

    fn clear(&self) {
        self.statistics.clear();
    }
}

/// Running statistics over unsigned 32-bit integer values.
///
/// Behaves like [`Statistics`], but validates every value before folding it in: the value must be within `1e-6` of an
/// integer in `[0, u32::MAX]`, and is rounded to that integer. NaN and infinite values are rejected, not ignored.
///
/// Object values are accepted as follows:
///
/// - unsigned integers (`u8` through `u64`): accepted, subject to the range check
/// - signed integers (`i8` through `i64`): accepted if non-negative, subject to the range check
/// - floating-point values: accepted if within tolerance of an integer in range
/// - strings: parsed as a number, then validated like a floating-point value
/// - null: ignored
/// - `bool`, `char`, `isize`, and `usize`: rejected
pub struct BoundedInteger {
    statistics: RunningStatistics,
}

impl BoundedInteger {
    fn validate(value: f64) -> Result<u32, TrackValueError> {
        if !value.is_finite() {
            return NotFinite { value }.fail();
        }

        let rounded = value.round();
        if (value - rounded).abs() > INTEGER_TOLERANCE {
            return NotAnInteger { value }.fail();
        }

        if rounded < 0.0 || rounded > f64::from(u32::MAX) {
            return OutOfRange { value }.fail();
        }

        Ok(rounded as u32)
    }
}

impl AggregationAlgorithm for BoundedInteger {
    const MONIKER: &'static str = "bounded_integer";

    fn from_configuration(_: &AggregatorConfiguration) -> Self {
        Self {
            statistics: RunningStatistics::new(),
        }
    }

    fn fold_value(&self, value: f64) -> Result<(), TrackValueError> {
        let value = Self::validate(value)?;
        self.statistics.fold(f64::from(value));
        Ok(())
    }

    fn fold_object(&self, value: &TrackedValue<'_>) -> Result<(), TrackValueError> {
        match value {
            TrackedValue::Null => Ok(()),
            TrackedValue::Str(s) => self.fold_value(parse_number(s)?),
            TrackedValue::Bool(_) | TrackedValue::Char(_) | TrackedValue::Isize(_) | TrackedValue::Usize(_) => {
                UnsupportedType {
                    aggregator: Self::MONIKER,
                    type_name: value.type_name(),
                }
                .fail()
            }
            other => match other.as_number() {
                Some(number) => self.fold_value(number),
                None => UnsupportedType {
                    aggregator: Self::MONIKER,
                    type_name: other.type_name(),
                }
                .fail(),
            },
        }
    }

    fn write_data(&self, aggregate: &mut MetricAggregate) {
        self.statistics.write_data(aggregate);
    }

    fn clear(&self) {
        self.statistics.clear();
    }
}
