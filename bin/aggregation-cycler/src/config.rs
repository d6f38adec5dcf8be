use std::{path::Path, time::Duration};

use anyhow::{bail, Context as _};
use figment::{
    providers::{Env, Format as _, Serialized, Yaml},
    Figment,
};
use metric_aggregation::{AggregatorConfiguration, MetricIdFilter};
use serde::{Deserialize, Serialize};

const ENVIRONMENT_PREFIX: &str = "CYCLER_";

/// Cycler configuration.
///
/// Loaded from, in increasing order of precedence: built-in defaults, an optional YAML file, and `CYCLER_`-prefixed
/// environment variables (for example, `CYCLER_FLUSH_INTERVAL=30`).
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CyclerConfiguration {
    /// Log filtering directives, in `EnvFilter` syntax.
    pub log_level: String,

    /// Whether logs are formatted as JSON.
    pub log_format_json: bool,

    /// Length of each aggregation period, in seconds.
    pub flush_interval: u64,

    /// Whether the default consumer aggregates series over the lifetime of the process.
    pub persistent: bool,

    /// Whether values are restricted to unsigned 32-bit integers.
    pub restrict_to_u32: bool,

    /// Whether series count distinct values instead of computing statistics.
    pub distinct_count: bool,

    /// Whether distinct values differing only in case are counted separately.
    pub case_sensitive: bool,

    /// Namespace of every series.
    pub metric_namespace: String,

    /// Metric ID prefixes watched by the diagnostics consumer.
    ///
    /// When empty, the diagnostics consumer is not started.
    pub diagnostics_prefixes: Vec<String>,
}

impl Default for CyclerConfiguration {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format_json: false,
            flush_interval: 10,
            persistent: false,
            restrict_to_u32: false,
            distinct_count: false,
            case_sensitive: true,
            metric_namespace: "default".to_string(),
            diagnostics_prefixes: Vec::new(),
        }
    }
}

impl CyclerConfiguration {
    /// Loads the configuration.
    ///
    /// # Errors
    ///
    /// If the YAML file cannot be read, or the resulting configuration is invalid, an error is returned.
    pub fn load(path: Option<&Path>) -> Result<Self, anyhow::Error> {
        Self::load_with_prefix(path, ENVIRONMENT_PREFIX)
    }

    fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self, anyhow::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            if !path.exists() {
                bail!("Configuration file '{}' does not exist.", path.display());
            }
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed(prefix));

        Self::from_figment(figment)
    }

    fn from_figment(figment: Figment) -> Result<Self, anyhow::Error> {
        let config: Self = figment.extract().context("Failed to load configuration.")?;
        if config.flush_interval == 0 {
            bail!("Flush interval must be at least one second.");
        }

        Ok(config)
    }

    /// Returns the length of each aggregation period.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval)
    }

    /// Returns the aggregator configuration used for new series.
    pub fn aggregator_configuration(&self) -> AggregatorConfiguration {
        let config = if self.distinct_count {
            AggregatorConfiguration::distinct_count().with_case_sensitive(self.case_sensitive)
        } else if self.restrict_to_u32 {
            AggregatorConfiguration::bounded_integer()
        } else {
            AggregatorConfiguration::statistics()
        };

        config.with_persistent(self.persistent)
    }

    /// Returns the filter used by the diagnostics consumer, if it is enabled.
    pub fn diagnostics_filter(&self) -> Option<MetricIdFilter> {
        if self.diagnostics_prefixes.is_empty() {
            return None;
        }

        let filter = self
            .diagnostics_prefixes
            .iter()
            .fold(MetricIdFilter::new(), |filter, prefix| filter.with_prefix(prefix.as_str()));
        Some(filter)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn defaults() {
        let config = CyclerConfiguration::from_figment(Figment::from(Serialized::defaults(
            CyclerConfiguration::default(),
        )))
        .unwrap();

        assert_eq!(config.log_level, "info");
        assert_eq!(config.flush_interval(), Duration::from_secs(10));
        assert_eq!(config.aggregator_configuration(), AggregatorConfiguration::statistics());
        assert!(config.diagnostics_filter().is_none());
    }

    #[test]
    fn yaml_file_then_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "flush_interval: 30\ndistinct_count: true\ncase_sensitive: false\ndiagnostics_prefixes: [\"db.\"]"
        )
        .unwrap();

        std::env::set_var("CYCLER_TEST_LAYERING_FLUSH_INTERVAL", "5");
        std::env::set_var("CYCLER_TEST_LAYERING_PERSISTENT", "true");
        let config = CyclerConfiguration::load_with_prefix(Some(file.path()), "CYCLER_TEST_LAYERING_").unwrap();

        assert_eq!(config.flush_interval, 5);
        assert_eq!(
            config.aggregator_configuration(),
            AggregatorConfiguration::distinct_count()
                .with_case_sensitive(false)
                .with_persistent(true)
        );
        assert!(config.diagnostics_filter().is_some());
    }

    #[test]
    fn bounded_integer_selection() {
        let figment = Figment::from(Serialized::defaults(CyclerConfiguration::default()))
            .merge(Yaml::string("restrict_to_u32: true"));
        let config = CyclerConfiguration::from_figment(figment).unwrap();

        assert_eq!(config.aggregator_configuration(), AggregatorConfiguration::bounded_integer());
    }

    #[test]
    fn invalid_configuration() {
        let figment = Figment::from(Serialized::defaults(CyclerConfiguration::default()))
            .merge(Yaml::string("flush_interval: 0"));
        assert!(CyclerConfiguration::from_figment(figment).is_err());

        let figment = Figment::from(Serialized::defaults(CyclerConfiguration::default()))
            .merge(Yaml::string("flush_interval: soon"));
        assert!(CyclerConfiguration::from_figment(figment).is_err());

        let missing = Path::new("/nonexistent/aggregation-cycler.yaml");
        assert!(CyclerConfiguration::load_with_prefix(Some(missing), "CYCLER_TEST_MISSING_").is_err());
    }
}
