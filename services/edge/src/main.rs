// edgekv-edge: runs one edge node, syncing to a center over a Bus and
// serving a local IPC surface other processes on the device use.

use std::sync::Arc;

use tracing::{error, info};

use edgekv::EdgeNode;

/// Exit codes per §6: 0 success, 1 configuration missing, 2 bus/store
/// unreachable.
const EXIT_CONFIG: i32 = 1;
const EXIT_UNREACHABLE: i32 = 2;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "edge starting");

    let cfg = match edgekv_edge::config::load_config() {
        Ok(cfg) => {
            info!(edge_id = %cfg.edge_id, store_uri = %cfg.store_uri, bus_uri = %cfg.bus_uri, "config loaded");
            cfg
        }
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(EXIT_CONFIG);
        }
    };

    let store_registry = edgekv_stores::default_registry();
    let mut bus_registry = edgekv::bus::BusRegistry::new();
    edgekv_bus::MqttBus::register(&mut bus_registry);

    let store = match store_registry.open(&cfg.store_uri) {
        Ok(s) => s,
        Err(e) => {
            error!(store_uri = %cfg.store_uri, error = %e, "failed to open store");
            std::process::exit(EXIT_UNREACHABLE);
        }
    };
    let bus = match bus_registry.open(&cfg.bus_uri) {
        Ok(b) => b,
        Err(e) => {
            error!(bus_uri = %cfg.bus_uri, error = %e, "failed to open bus");
            std::process::exit(EXIT_UNREACHABLE);
        }
    };

    let edge = match EdgeNode::new(cfg.edge_id.clone(), store, bus) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            error!(error = %e, "failed to construct edge node");
            std::process::exit(EXIT_CONFIG);
        }
    };

    if let Err(e) = edge.run().await {
        error!(error = %e, "failed to start edge node");
        std::process::exit(EXIT_UNREACHABLE);
    }

    let app = edgekv_edge::ipc::router(Arc::clone(&edge));

    let socket_path = std::path::Path::new(&cfg.ipc.socket_path);
    if let Some(parent) = socket_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::remove_file(socket_path);

    let listener = match tokio::net::UnixListener::bind(socket_path) {
        Ok(l) => l,
        Err(e) => {
            error!(socket = %socket_path.display(), error = %e, "failed to bind IPC socket");
            std::process::exit(EXIT_UNREACHABLE);
        }
    };
    info!(socket = %socket_path.display(), "IPC listener ready");

    let shutdown_edge = Arc::clone(&edge);
    let shutdown = async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        let _ = shutdown_edge.shutdown().await;
    };

    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        error!(error = %e, "IPC server error");
        std::process::exit(EXIT_UNREACHABLE);
    }
}
