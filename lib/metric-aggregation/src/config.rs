use serde::{Deserialize, Serialize};

const fn default_case_sensitive() -> bool {
    true
}

/// Aggregator configuration.
///
/// Describes which aggregation algorithm a series uses, and how it behaves:
///
/// - `persistent`: whether the aggregator is a "lifetime" aggregator, accumulating across every aggregation period
///   instead of starting over at each one
/// - `restrict_to_u32`: whether values must be integers representable as an unsigned 32-bit integer (statistics only)
/// - `case_sensitive`: whether distinct values differing only in case are counted separately (distinct count only)
///
/// Two configurations are equal if, and only if, they are the same variant and all of their flags match.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregatorConfiguration {
    /// Running count, sum, minimum, maximum, and standard deviation.
    Statistics {
        /// Whether the aggregator accumulates across aggregation periods.
        #[serde(default)]
        persistent: bool,

        /// Whether values are restricted to integers in `[0, u32::MAX]`.
        #[serde(default)]
        restrict_to_u32: bool,
    },

    /// Count of observations and of distinct values.
    DistinctCount {
        /// Whether the aggregator accumulates across aggregation periods.
        #[serde(default)]
        persistent: bool,

        /// Whether values differing only in case are distinct.
        ///
        /// Defaults to `true`.
        #[serde(default = "default_case_sensitive")]
        case_sensitive: bool,
    },
}

impl AggregatorConfiguration {
    /// Creates a periodic statistics configuration over unrestricted `f64` values.
    pub const fn statistics() -> Self {
        Self::Statistics {
            persistent: false,
            restrict_to_u32: false,
        }
    }

    /// Creates a periodic statistics configuration restricted to unsigned 32-bit integers.
    pub const fn bounded_integer() -> Self {
        Self::Statistics {
            persistent: false,
            restrict_to_u32: true,
        }
    }

    /// Creates a periodic, case-sensitive distinct count configuration.
    pub const fn distinct_count() -> Self {
        Self::DistinctCount {
            persistent: false,
            case_sensitive: true,
        }
    }

    /// Sets whether the aggregator is persistent.
    pub const fn with_persistent(self, persistent: bool) -> Self {
        match self {
            Self::Statistics { restrict_to_u32, .. } => Self::Statistics {
                persistent,
                restrict_to_u32,
            },
            Self::DistinctCount { case_sensitive, .. } => Self::DistinctCount {
                persistent,
                case_sensitive,
            },
        }
    }

    /// Sets whether distinct values are compared case-sensitively.
    ///
    /// Has no effect on statistics configurations.
    pub const fn with_case_sensitive(self, case_sensitive: bool) -> Self {
        match self {
            Self::DistinctCount { persistent, .. } => Self::DistinctCount {
                persistent,
                case_sensitive,
            },
            other => other,
        }
    }

    /// Returns `true` if the aggregator accumulates across aggregation periods.
    pub const fn is_persistent(&self) -> bool {
        match self {
            Self::Statistics { persistent, .. } | Self::DistinctCount { persistent, .. } => *persistent,
        }
    }

    /// Returns `true` if values are restricted to unsigned 32-bit integers.
    pub const fn restrict_to_u32(&self) -> bool {
        matches!(
            self,
            Self::Statistics {
                restrict_to_u32: true,
                ..
            }
        )
    }

    /// Returns `true` if distinct values are compared case-sensitively.
    ///
    /// Always `true` for statistics configurations.
    pub const fn case_sensitive_distinct_values(&self) -> bool {
        match self {
            Self::Statistics { .. } => true,
            Self::DistinctCount { case_sensitive, .. } => *case_sensitive,
        }
    }

    /// Returns the name of the aggregation algorithm this configuration selects.
    ///
    /// This matches the aggregation kind moniker of the aggregates produced by that algorithm.
    pub const fn algorithm_name(&self) -> &'static str {
        match self {
            Self::Statistics { restrict_to_u32: false, .. } => "statistics",
            Self::Statistics { restrict_to_u32: true, .. } => "bounded_integer",
            Self::DistinctCount { .. } => "distinct_count",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_covers_every_flag() {
        assert_eq!(AggregatorConfiguration::statistics(), AggregatorConfiguration::statistics());
        assert_ne!(
            AggregatorConfiguration::statistics(),
            AggregatorConfiguration::statistics().with_persistent(true)
        );
        assert_ne!(
            AggregatorConfiguration::statistics(),
            AggregatorConfiguration::bounded_integer()
        );
        assert_ne!(
            AggregatorConfiguration::distinct_count(),
            AggregatorConfiguration::distinct_count().with_case_sensitive(false)
        );
    }

    #[test]
    fn flags() {
        let config = AggregatorConfiguration::bounded_integer().with_persistent(true);
        assert!(config.is_persistent());
        assert!(config.restrict_to_u32());
        assert!(config.case_sensitive_distinct_values());

        // Case sensitivity only applies to distinct counts.
        let config = AggregatorConfiguration::statistics().with_case_sensitive(false);
        assert_eq!(config, AggregatorConfiguration::statistics());

        let config = AggregatorConfiguration::distinct_count().with_case_sensitive(false);
        assert!(!config.is_persistent());
        assert!(!config.restrict_to_u32());
        assert!(!config.case_sensitive_distinct_values());
    }

    #[test]
    fn algorithm_names() {
        assert_eq!(AggregatorConfiguration::statistics().algorithm_name(), "statistics");
        assert_eq!(AggregatorConfiguration::bounded_integer().algorithm_name(), "bounded_integer");
        assert_eq!(AggregatorConfiguration::distinct_count().algorithm_name(), "distinct_count");
    }
}
