//! Wires the polling loop, compute pool, and single-point listener into one
//! running worker (spec §2 control flow, §5 scheduling model).

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use worker_core::{DecayFunction, GeotiffEncoder, GridObjectStore, NetworkPreloader, PointSetCache, RoutingEngine};

use crate::broker_client::BrokerClient;
use crate::compute_pool;
use crate::http_server;
use crate::polling::{PollingLoop, PollingLoopConfig};
use crate::regional::RegionalHandler;
use crate::result_buffer::ResultBuffer;
use crate::single_point::SinglePointHandler;
use crate::task_queue::TaskQueue;
use crate::throughput::ThroughputTracker;

pub struct EngineConfig {
    pub broker_address: String,
    pub broker_port: u16,
    pub initial_graph_id: String,
    pub listen_for_single_point: bool,
    pub single_point_listen_addr: std::net::SocketAddr,
    pub machine_id: String,
    pub worker_version: String,
    pub compute_threads: usize,
    pub test_task_redelivery: bool,
}

/// The external collaborators a running engine needs, bundled so callers
/// don't thread five generic type parameters through every function by
/// hand (§1: each is a capability the core invokes, not implements).
pub struct EngineDeps<N, R, C, S, D>
where
    N: NetworkPreloader,
    R: RoutingEngine<Graph = N::Graph>,
    C: PointSetCache,
    S: GridObjectStore,
    D: DecayFunction,
{
    pub preloader: Arc<N>,
    pub routing: Arc<R>,
    pub point_sets: Arc<C>,
    pub store: Arc<S>,
    pub decay: Arc<D>,
    pub geotiff: Option<Arc<dyn GeotiffEncoder>>,
}

pub struct EngineHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    pub results: Arc<ResultBuffer>,
    pub queue: Arc<TaskQueue>,
}

impl EngineHandle {
    /// Signals the polling loop and HTTP listener to stop. Compute-pool
    /// workers finish their current task and exit once the channel drains.
    pub fn request_stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn wait(self) {
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// Starts the engine: one polling-loop task, `compute_threads` compute-pool
/// tasks, and (if configured) the single-point HTTP listener on its own
/// socket (§5 scheduling model).
pub fn start<N, R, C, S, D>(config: EngineConfig, deps: EngineDeps<N, R, C, S, D>) -> EngineHandle
where
    N: NetworkPreloader + 'static,
    R: RoutingEngine<Graph = N::Graph> + 'static,
    C: PointSetCache + 'static,
    S: GridObjectStore + 'static,
    D: DecayFunction + Send + Sync + 'static,
{
    let results = Arc::new(ResultBuffer::new());
    let tracker = Arc::new(ThroughputTracker::new());
    let (queue, receiver) = TaskQueue::new(config.compute_threads);
    let queue = Arc::new(queue);
    let loaded_network_id = Arc::new(Mutex::new(Some(config.initial_graph_id.clone())));

    let broker_url_str = format!("http://{}:{}/", config.broker_address, config.broker_port);
    let broker_url = broker_url_str
        .parse()
        .expect("broker address and port must form a valid URL");
    let broker = Arc::new(BrokerClient::new(broker_url).expect("failed to build broker HTTP client"));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    let polling_loop = PollingLoop::new(
        broker,
        results.clone(),
        queue.clone(),
        tracker.clone(),
        PollingLoopConfig {
            machine_id: config.machine_id.clone(),
            worker_version: config.worker_version.clone(),
            compute_threads: config.compute_threads,
        },
        loaded_network_id,
    );
    let polling_shutdown_rx = shutdown_rx.clone();
    tasks.push(tokio::spawn(async move {
        polling_loop.run(polling_shutdown_rx).await;
    }));

    let regional_handler = Arc::new(RegionalHandler::new(
        deps.preloader.clone(),
        deps.routing.clone(),
        deps.point_sets.clone(),
        deps.store.clone(),
        deps.decay.clone(),
        results.clone(),
        tracker.clone(),
    ));
    tasks.extend(compute_pool::spawn(receiver, regional_handler, config.compute_threads));

    if config.listen_for_single_point {
        let single_point_handler = Arc::new(SinglePointHandler::new(
            deps.preloader,
            deps.routing,
            deps.point_sets,
            deps.geotiff,
            tracker,
        ));
        let router = http_server::router(single_point_handler);
        let addr = config.single_point_listen_addr;
        let mut http_shutdown_rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!(error = %e, %addr, "failed to bind single-point listener");
                    return;
                }
            };
            let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                let _ = http_shutdown_rx.changed().await;
            });
            if let Err(e) = server.await {
                tracing::error!(error = %e, "single-point HTTP server exited with an error");
            }
        }));
    }

    if config.test_task_redelivery {
        tracing::warn!("testTaskRedelivery is enabled: the broker is expected to redeliver tasks for testing");
    }

    EngineHandle {
        shutdown_tx,
        tasks,
        results,
        queue,
    }
}
