use snafu::Snafu;

use crate::AggregatorConfiguration;

/// An aggregator or series configuration error.
///
/// These are raised synchronously when building an aggregator or requesting a series, and prevent the aggregator or
/// series from being created.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum ConfigurationError {
    /// No configuration was provided.
    #[snafu(display("An aggregator configuration is required, but none was provided."))]
    MissingConfiguration,

    /// The configuration variant does not match the aggregator being built.
    #[snafu(display(
        "The {} aggregator cannot be built from a '{}' configuration.",
        aggregator,
        configuration
    ))]
    MismatchedConfiguration {
        /// Name of the aggregator being built.
        aggregator: &'static str,

        /// Name of the configuration variant that was provided.
        configuration: &'static str,
    },

    /// A series was requested with a configuration that differs from the one it was created with.
    #[snafu(display(
        "Series '{}' already exists with configuration {:?}, which conflicts with the requested configuration {:?}.",
        metric_id,
        existing,
        requested
    ))]
    ConflictingSeriesConfiguration {
        /// Metric ID of the series.
        metric_id: String,

        /// Configuration the series was created with.
        existing: AggregatorConfiguration,

        /// Configuration that was requested.
        requested: AggregatorConfiguration,
    },
}

/// A tracked value failed validation.
///
/// When returned from a tracking call, the value was not folded into the aggregator, and any previously accumulated
/// state is unchanged.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum TrackValueError {
    /// The value's type cannot be tracked by this aggregator.
    #[snafu(display("The {} aggregator cannot track values of type '{}'.", aggregator, type_name))]
    UnsupportedType {
        /// Name of the aggregator.
        aggregator: &'static str,

        /// Name of the rejected value's type.
        type_name: &'static str,
    },

    /// The value is NaN or infinite.
    #[snafu(display("Value {} is not a finite number.", value))]
    NotFinite {
        /// The rejected value.
        value: f64,
    },

    /// The value is not integral.
    #[snafu(display("Value {} is not an integer.", value))]
    NotAnInteger {
        /// The rejected value.
        value: f64,
    },

    /// The value lies outside the range of an unsigned 32-bit integer.
    #[snafu(display("Value {} is outside the range [0, {}].", value, u32::MAX))]
    OutOfRange {
        /// The rejected value.
        value: f64,
    },

    /// A string value could not be parsed as a number.
    #[snafu(display("Value '{}' cannot be parsed as a number.", input))]
    Unparsable {
        /// The rejected input.
        input: String,
    },
}

/// An aggregate could not be converted to telemetry.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum TelemetryError {
    /// The aggregate was produced by an aggregation kind that has no telemetry mapping.
    #[snafu(display("No telemetry mapping exists for aggregation kind '{}'.", moniker))]
    UnknownAggregationKind {
        /// Moniker of the aggregation kind.
        moniker: String,
    },

    /// A data field required by the mapping is missing or not numeric.
    #[snafu(display("Aggregate of kind '{}' is missing numeric field '{}'.", moniker, field))]
    MissingField {
        /// Moniker of the aggregation kind.
        moniker: String,

        /// Name of the missing field.
        field: &'static str,
    },
}
