use clap::Parser;

fn default_compute_threads() -> u16 {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(512) as u16
}

fn default_machine_id() -> String {
    hostname_or_fallback()
}

fn hostname_or_fallback() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "worker-unknown".to_string())
}

/// Configuration from environment or file (spec §6): `brokerAddress`,
/// `brokerPort`, `initialGraphId`, `listenForSinglePoint`, and
/// `testTaskRedelivery` are the core contract's only runtime knobs;
/// `machineId`/`workerVersion`/`computeThreads`/`logLevel` are wiring the
/// core needs to run as a process but aren't new domain behavior.
#[derive(Debug, Clone, Parser)]
#[command(name = "worker", version, about = "Transit-accessibility compute worker")]
pub struct Cli {
    #[arg(long, env = "BROKER_ADDRESS", default_value = "127.0.0.1")]
    pub broker_address: String,

    #[arg(long, env = "BROKER_PORT", default_value_t = 7080)]
    pub broker_port: u16,

    #[arg(long, env = "INITIAL_GRAPH_ID")]
    pub initial_graph_id: String,

    #[arg(long, env = "LISTEN_FOR_SINGLE_POINT", default_value_t = true)]
    pub listen_for_single_point: bool,

    #[arg(long, env = "SINGLE_POINT_LISTEN_ADDR", default_value = "0.0.0.0:7081")]
    pub single_point_listen_addr: std::net::SocketAddr,

    /// Redeliver every task unconditionally, as if the broker never received
    /// a result; exists for exercising the queue's reject-on-full path and
    /// the assembler's idempotence guarantee under load.
    #[arg(long, env = "TEST_TASK_REDELIVERY", default_value_t = false)]
    pub test_task_redelivery: bool,

    #[arg(long, env = "MACHINE_ID", default_value_t = default_machine_id())]
    pub machine_id: String,

    #[arg(long, env = "WORKER_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub worker_version: String,

    #[arg(
        long,
        env = "COMPUTE_THREADS",
        default_value_t = default_compute_threads(),
        value_parser = clap::value_parser!(u16).range(1..=512)
    )]
    pub compute_threads: u16,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}
