// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Sensorwatch - streaming sensor anomaly detection
//!
//! `run` starts the pipeline and the WebSocket observer server until Ctrl+C.
//! `train` fits the default Isolation Forest model for every sensor type.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sensorwatch::analysis::{model_file_name, train_sensor_model, ForestParams, ModelFile};
use sensorwatch::config::ChannelBackend;
use sensorwatch::streaming::WebSocketServer;
use sensorwatch::{Config, Pipeline, SensorType, VERSION};

/// Sensorwatch - streaming sensor anomaly detection
#[derive(Parser, Debug)]
#[command(name = "sensorwatch")]
#[command(version = VERSION)]
#[command(about = "Score live sensor readings for anomalies, persist them and stream them out")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// WebSocket server port
    #[arg(long)]
    ws_port: Option<u16>,

    /// MQTT broker address; switches the event channel to MQTT
    #[arg(long)]
    mqtt_broker: Option<String>,

    /// Data output directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline (default)
    Run,

    /// Train the default model for every sensor type
    Train {
        /// Output directory, defaults to <data_dir>/models
        #[arg(long)]
        out: Option<PathBuf>,

        /// Training seed
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)
        .with_context(|| format!("loading configuration from {:?}", config_path))?;

    // Initialize logging; RUST_LOG wins over flags and config
    let log_level = if args.trace {
        "trace"
    } else if args.debug {
        "debug"
    } else {
        config.log_level.as_str()
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Sensorwatch v{}", VERSION);

    // Override with command line args
    if let Some(data_dir) = args.data_dir {
        config.database.dir = data_dir.join("db");
        config.data_dir = data_dir;
    }
    if let Some(port) = args.ws_port {
        config.live.websocket_port = port;
    }
    if let Some(mqtt) = args.mqtt_broker {
        config.channel.backend = ChannelBackend::Mqtt;
        config.channel.mqtt_broker = mqtt;
    }
    config.validate()?;

    info!("Configuration loaded from {:?}", config_path);

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run(config))
        }
        Command::Train { out, seed } => {
            let out = out.unwrap_or_else(|| config.data_dir.join("models"));
            train(&config, &out, seed)
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let live = config.live.clone();
    let pipeline = Pipeline::start(config).await?;

    if live.websocket_enabled {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, live.websocket_port));
        let server = WebSocketServer::new(addr, live.max_clients, pipeline.fanout());
        server.start(pipeline.token()).await?;
    }

    info!("Sensorwatch running, press Ctrl+C to shutdown");

    let mut report = tokio::time::interval(Duration::from_secs(60));
    report.tick().await;

    loop {
        tokio::select! {
            _ = report.tick() => {
                let stats = pipeline.stats();
                info!(
                    "Uptime {}s: {} emitted, {} scored, {} anomalies, {} observers",
                    pipeline.uptime(),
                    stats.readings_emitted,
                    stats.messages_scored,
                    stats.anomalies_detected,
                    pipeline.fanout().observer_count()
                );
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        }
    }

    info!("Shutdown signal received, cleaning up...");
    pipeline.shutdown().await;
    info!("Sensorwatch shutdown complete");

    Ok(())
}

fn train(config: &Config, out: &std::path::Path, seed: u64) -> Result<()> {
    let params = ForestParams {
        seed,
        ..ForestParams::default()
    };

    for sensor in SensorType::ALL {
        let forest = train_sensor_model(sensor, config.sensors.get(sensor), &params)?;
        let path = out.join(model_file_name(sensor));
        ModelFile::IsolationForest(forest).save(&path)?;
        info!("Set sensors.{}.model = {:?} to use it", sensor, path);
    }

    Ok(())
}
