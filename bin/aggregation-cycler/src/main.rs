//! Aggregation cycler.
//!
//! Reads metric samples from standard input, one per line, aggregates them per series, and writes the aggregates of
//! every aggregation period to standard output as JSON lines. When input ends, the final period is flushed before
//! exiting.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use chrono::Utc;
use clap::Parser;
use metric_aggregation::{telemetry::AggregateExporter as _, AggregationCycleManager, ConsumerKind, ValueFilter};
use tokio::{
    io::{AsyncBufReadExt as _, BufReader},
    select,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{error, info};

mod config;
use self::config::CyclerConfiguration;

mod export;
use self::export::JsonLinesExporter;

mod ingest;
use self::ingest::ingest_line;

mod logging;
use self::logging::{fatal_and_exit, initialize_logging};

#[derive(Parser)]
#[command(about = "Aggregates metric samples read from standard input.")]
struct Cli {
    /// Path to a YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

struct Consumer {
    kind: ConsumerKind,
    filter: Option<Arc<dyn ValueFilter>>,
    exporter: JsonLinesExporter<std::io::Stdout>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let config = CyclerConfiguration::load(cli.config.as_deref())
        .unwrap_or_else(|e| fatal_and_exit(format!("failed to load configuration: {:#}", e)));

    if let Err(e) = initialize_logging(&config) {
        fatal_and_exit(format!("failed to initialize logging: {:#}", e));
    }

    match run(config).await {
        Ok(()) => info!("Aggregation cycler stopped."),
        Err(e) => {
            error!("{:?}", e);
            std::process::exit(1);
        }
    }
}

async fn run(config: CyclerConfiguration) -> Result<(), anyhow::Error> {
    let manager = AggregationCycleManager::new();
    let aggregator_configuration = config.aggregator_configuration();

    let mut consumers = vec![Consumer {
        kind: ConsumerKind::Default,
        filter: None,
        exporter: JsonLinesExporter::new(ConsumerKind::Default, std::io::stdout()),
    }];
    if let Some(filter) = config.diagnostics_filter() {
        consumers.push(Consumer {
            kind: ConsumerKind::Diagnostics,
            filter: Some(Arc::new(filter)),
            exporter: JsonLinesExporter::new(ConsumerKind::Diagnostics, std::io::stdout()),
        });
    }

    let started = Utc::now();
    for consumer in &consumers {
        manager.start_or_cycle_aggregators(consumer.kind, started, consumer.filter.clone());
    }

    info!(
        flush_interval_secs = config.flush_interval,
        configuration = ?aggregator_configuration,
        consumers = consumers.len(),
        "Aggregation cycler started."
    );

    let flush_interval = config.flush_interval();
    let mut flush = interval_at(Instant::now() + flush_interval, flush_interval);
    flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        select! {
            _ = flush.tick() => {
                let period_start = Utc::now();
                for consumer in &mut consumers {
                    let summary = manager.start_or_cycle_aggregators(consumer.kind, period_start, consumer.filter.clone());
                    consumer.exporter.export(&summary)?;
                }
            },
            line = lines.next_line() => match line.context("Failed to read from standard input.")? {
                Some(line) => ingest_line(&manager, &config.metric_namespace, aggregator_configuration, &line),
                None => break,
            },
        }
    }

    info!("Input ended. Flushing final aggregation period.");

    let period_end = Utc::now();
    for consumer in &mut consumers {
        let summary = manager.stop_aggregators(consumer.kind, period_end);
        consumer.exporter.export(&summary)?;
    }

    Ok(())
}
