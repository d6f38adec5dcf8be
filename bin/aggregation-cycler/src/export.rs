use std::io::Write;

use anyhow::Context as _;
use metric_aggregation::{
    telemetry::{AggregateExporter, AggregateTelemetry},
    AggregationPeriodSummary, ConsumerKind,
};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Serialize)]
struct Record<'a> {
    consumer: ConsumerKind,
    persistent: bool,
    #[serde(flatten)]
    telemetry: &'a AggregateTelemetry,
}

/// Writes harvested aggregates as JSON, one aggregate per line.
pub struct JsonLinesExporter<W> {
    consumer: ConsumerKind,
    writer: W,
}

impl<W: Write> JsonLinesExporter<W> {
    /// Creates a new `JsonLinesExporter` for the given consumer kind.
    pub fn new(consumer: ConsumerKind, writer: W) -> Self {
        Self { consumer, writer }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.writer
    }

    fn write_record(&mut self, telemetry: &AggregateTelemetry, persistent: bool) -> Result<(), anyhow::Error> {
        let record = Record {
            consumer: self.consumer,
            persistent,
            telemetry,
        };

        serde_json::to_writer(&mut self.writer, &record).context("Failed to serialize aggregate.")?;
        self.writer.write_all(b"\n").context("Failed to write aggregate.")?;
        Ok(())
    }
}

impl<W: Write> AggregateExporter for JsonLinesExporter<W> {
    type Error = anyhow::Error;

    fn export(&mut self, summary: &AggregationPeriodSummary) -> Result<(), Self::Error> {
        let lifetimes = [
            (true, summary.persistent_aggregates()),
            (false, summary.periodic_aggregates()),
        ];

        for (persistent, aggregates) in lifetimes {
            for aggregate in aggregates {
                match AggregateTelemetry::try_from_aggregate(aggregate) {
                    Ok(telemetry) => self.write_record(&telemetry, persistent)?,
                    Err(e) => warn!(error = %e, metric_id = aggregate.metric_id(), "Skipping aggregate."),
                }
            }
        }

        self.writer.flush().context("Failed to flush aggregates.")?;
        debug!(consumer_kind = %self.consumer, aggregates = summary.len(), "Exported aggregates.");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone as _, Utc};
    use metric_aggregation::{AggregationCycleManager, AggregatorConfiguration, MetricSeries};
    use serde_json::Value;

    use super::*;

    #[test]
    fn exports_one_line_per_aggregate() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap();

        let manager = AggregationCycleManager::new();
        let series = ["a", "b"].map(|metric_id| {
            manager
                .get_or_create_series(
                    MetricSeries::new("ns", metric_id).with_dimension("host", "web-1"),
                    Some(AggregatorConfiguration::statistics()),
                )
                .unwrap()
        });

        manager.start_or_cycle_aggregators(ConsumerKind::Default, t0, None);
        for tracked in &series {
            tracked.track_value(4.0).unwrap();
        }
        let summary = manager.start_or_cycle_aggregators(ConsumerKind::Default, t1, None);

        let mut exporter = JsonLinesExporter::new(ConsumerKind::Default, Vec::new());
        exporter.export(&summary).unwrap();
        let output = String::from_utf8(exporter.into_inner()).unwrap();

        let records = output
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(records.len(), 2);

        for record in &records {
            assert_eq!(record["consumer"], "default");
            assert_eq!(record["persistent"], false);
            assert_eq!(record["count"], 1);
            assert_eq!(record["sum"], 4.0);
            assert_eq!(record["properties"]["host"], "web-1");
            assert_eq!(record["properties"]["_AggregationIntervalMs"], "10000");
        }
    }
}
