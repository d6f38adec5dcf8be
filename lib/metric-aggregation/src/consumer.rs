use std::fmt;

use serde::{Deserialize, Serialize};

/// An independent consumer of aggregated metrics.
///
/// Each consumer kind gets its own aggregator for every series it is subscribed to, and its own aggregation cycle. This
/// allows the same stream of values to be summarized in different ways at the same time: for example, the default
/// exporter might view a series as a lifetime counter while a diagnostics viewer looks at the same series in short,
/// periodic windows.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerKind {
    /// The default consumer, typically feeding a telemetry exporter.
    Default,

    /// A live diagnostics viewer.
    Diagnostics,

    /// A custom, user-defined consumer.
    Custom,
}

impl ConsumerKind {
    /// Number of consumer kinds.
    pub const COUNT: usize = 3;

    /// All consumer kinds, in slot order.
    pub const ALL: [ConsumerKind; Self::COUNT] = [Self::Default, Self::Diagnostics, Self::Custom];

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Default => 0,
            Self::Diagnostics => 1,
            Self::Custom => 2,
        }
    }

    /// Returns the name of this consumer kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Diagnostics => "diagnostics",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ConsumerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
