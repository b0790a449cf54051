mod cli;
mod fixtures;
mod shutdown;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use worker_engine::engine::{self, EngineConfig, EngineDeps};

use crate::cli::Cli;
use crate::fixtures::{
    AlwaysValidPointSetCache, FilesystemGridObjectStore, ImmediateNetworkPreloader, LinearDecay,
    ZeroRoutingEngine,
};
use crate::shutdown::{spawn_ctrl_c_handler, ShutdownController, ShutdownEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if cli.compute_threads == 0 {
        anyhow::bail!("--compute-threads must be >= 1");
    }

    let state_dir = std::env::temp_dir().join("worker-grids");

    let deps = EngineDeps {
        preloader: Arc::new(ImmediateNetworkPreloader::new()),
        routing: Arc::new(ZeroRoutingEngine),
        point_sets: Arc::new(AlwaysValidPointSetCache),
        store: Arc::new(FilesystemGridObjectStore::new(state_dir)),
        decay: Arc::new(LinearDecay),
        geotiff: None,
    };

    let config = EngineConfig {
        broker_address: cli.broker_address.clone(),
        broker_port: cli.broker_port,
        initial_graph_id: cli.initial_graph_id.clone(),
        listen_for_single_point: cli.listen_for_single_point,
        single_point_listen_addr: cli.single_point_listen_addr,
        machine_id: cli.machine_id.clone(),
        worker_version: cli.worker_version.clone(),
        compute_threads: cli.compute_threads as usize,
        test_task_redelivery: cli.test_task_redelivery,
    };

    tracing::info!(
        machine_id = %cli.machine_id,
        broker_address = %cli.broker_address,
        broker_port = cli.broker_port,
        compute_threads = cli.compute_threads,
        "starting worker"
    );

    let handle = engine::start(config, deps);

    let shutdown = Arc::new(ShutdownController::new());
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::unbounded_channel::<ShutdownEvent>();
    spawn_ctrl_c_handler(shutdown, shutdown_tx);

    loop {
        match shutdown_rx.recv().await {
            Some(ShutdownEvent::Graceful) => {
                tracing::info!("shutdown requested, finishing in-flight work");
                handle.request_stop();
                break;
            }
            Some(ShutdownEvent::Immediate) => {
                tracing::warn!("shutdown requested twice, exiting immediately");
                std::process::exit(130);
            }
            None => break,
        }
    }

    handle.wait().await;
    Ok(())
}
