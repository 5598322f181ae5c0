//! CLI for running the MESHJOIN pipeline over JSON-lines files.

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use std::path::PathBuf;

use meshstream::meshstream::datasource::{JsonlMaster, JsonlSink, JsonlSource};
use meshstream::{JoinDriver, JoinMetrics, MeshJoinConfig, MeshResult, RecordShape};

#[derive(Parser)]
#[command(name = "meshstream")]
#[command(about = "MESHJOIN - enrich a transactional fact stream from a dimension relation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the enrichment pipeline
    Run {
        /// Stream (fact) records, one JSON object per line
        #[arg(long)]
        stream: PathBuf,

        /// Master (dimension) records, one JSON object per line
        #[arg(long)]
        master: PathBuf,

        /// Output path for enriched records
        #[arg(long)]
        sink: PathBuf,

        /// W: maximum buffered stream tuples
        #[arg(long, default_value = "1000")]
        buffer_capacity: usize,

        /// P: master tuples per resident partition
        #[arg(long, default_value = "100")]
        partition_size: usize,

        /// B: enriched tuples per sink write
        #[arg(long, default_value = "64")]
        batch_size: usize,

        /// Equi-join attribute, present on both sides
        #[arg(long, default_value = "product_id")]
        join_key: String,

        /// Measure attribute of stream records
        #[arg(long, default_value = "quantity")]
        measure: String,

        /// Identity attribute of stream records
        #[arg(long, default_value = "order_id")]
        order_id: String,

        /// Master attribute multiplied with the measure (e.g. product_price)
        #[arg(long)]
        derived_from: Option<String>,

        /// Output field for the derived measure
        #[arg(long, default_value = "total_sale")]
        derived_as: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(metrics) => {
            info!(
                "clean termination: {} emitted, {} expired",
                metrics.emitted, metrics.expired_unmatched
            );
        }
        Err(err) => {
            error!("fatal: {}", err);
            std::process::exit(1);
        }
    }
}

async fn run(command: Commands) -> MeshResult<JoinMetrics> {
    let Commands::Run {
        stream,
        master,
        sink,
        buffer_capacity,
        partition_size,
        batch_size,
        join_key,
        measure,
        order_id,
        derived_from,
        derived_as,
    } = command;

    let shape = RecordShape {
        order_id_field: order_id,
        join_key_field: join_key,
        measure_field: measure,
    };
    let mut config =
        MeshJoinConfig::new(buffer_capacity, partition_size, batch_size).with_shape(shape);
    if let Some(master_field) = derived_from {
        config = config.with_derived(master_field, derived_as);
    }

    let source = JsonlSource::open(&stream, config.shape.clone())?;
    let master = JsonlMaster::open(&master, config.shape.join_key_field.clone())?;
    let sink = JsonlSink::create(&sink)?;

    let driver = JoinDriver::open(config, source, master, sink).await?;

    let stop = driver.stop_controller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.request_stop();
        }
    });

    driver.run().await
}
