// edgekv-center: aggregates every edge's state behind one namespaced
// store, rebroadcasts changes over the Bus, and serves the admin HTTP
// surface (§6) plus center-initiated Bind streams (§4.9) to every
// configured edge.

use std::sync::Arc;

use tracing::{error, info};

use edgekv::CenterNode;

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

    info!(version = env!("CARGO_PKG_VERSION"), "center starting");

    let cfg = match edgekv_center::config::load_config() {
        Ok(cfg) => {
            info!(store_uri = %cfg.store_uri, bus_uri = %cfg.bus_uri, edges = cfg.edges.len(), "config loaded");
            cfg
        }
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(EXIT_CONFIG);
        }
    };

    let store = match edgekv_stores::open_center_store(&cfg.store_uri) {
        Ok(s) => s,
        Err(e) => {
            error!(store_uri = %cfg.store_uri, error = %e, "failed to open store");
            std::process::exit(EXIT_UNREACHABLE);
        }
    };

    let mut bus_registry = edgekv::bus::BusRegistry::new();
    edgekv_bus::MqttBus::register(&mut bus_registry);
    let bus = match bus_registry.open(&cfg.bus_uri) {
        Ok(b) => b,
        Err(e) => {
            error!(bus_uri = %cfg.bus_uri, error = %e, "failed to open bus");
            std::process::exit(EXIT_UNREACHABLE);
        }
    };

    let center = Arc::new(CenterNode::new(store, bus));
    if let Err(e) = center.run().await {
        error!(error = %e, "failed to start center node");
        std::process::exit(EXIT_UNREACHABLE);
    }

    // Eagerly open a standing Bind stream to every configured edge
    // (§4.9); an edge that's down at startup is logged and simply has no
    // bind client until the center is restarted against a live address.
    let bind_clients = Arc::new(edgekv_center::bind_client::BindClients::connect_all(&cfg.edges).await);

    let app = edgekv_center::http::router(Arc::clone(&center), Arc::clone(&bind_clients));

    let listener = match tokio::net::TcpListener::bind(&cfg.http.bind).await {
        Ok(l) => l,
        Err(e) => {
            error!(addr = %cfg.http.bind, error = %e, "failed to bind HTTP listener");
            std::process::exit(EXIT_UNREACHABLE);
        }
    };
    info!(addr = %cfg.http.bind, "HTTP listener ready");

    let shutdown_center = Arc::clone(&center);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_center))
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "HTTP server error");
            std::process::exit(EXIT_UNREACHABLE);
        });
    info!("center shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C, then drives the center's cooperative
/// shutdown (§5: Dispatcher first, then Bus) before returning to let
/// axum finish draining in-flight HTTP requests.
async fn shutdown_signal(center: Arc<CenterNode>) {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }

    let _ = center.shutdown().await;
}
