// A runnable demonstration of §4.8's CenterNode: wires a namespaced store
// + bus from flags and runs until interrupted. Supplements the distilled
// spec's `examples/centerserver/main.go` the same way the full
// `services/center` binary does, minus the admin HTTP surface and Bind
// clients — this is the bare node loop.

use std::sync::Arc;

use clap::{Arg, Command};
use tracing::info;

use edgekv::CenterNode;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let matches = Command::new("center-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Runs a single EdgeKV center node against a store and bus URI")
        .arg(
            Arg::new("store")
                .help("Store URI (mem://, sqlite:///path/to/db, redis://host)")
                .short('s')
                .long("store")
                .default_value("mem://"),
        )
        .arg(
            Arg::new("bus")
                .help("Bus URI (mqtt://host[:port]/prefix)")
                .short('b')
                .long("bus")
                .required(true),
        )
        .get_matches();

    let store_uri = matches.get_one::<String>("store").expect("has default").clone();
    let bus_uri = matches.get_one::<String>("bus").expect("required").clone();

    let store = edgekv_stores::open_center_store(&store_uri).unwrap_or_else(|e| {
        eprintln!("failed to open store '{store_uri}': {e}");
        std::process::exit(2);
    });

    let mut bus_registry = edgekv::bus::BusRegistry::new();
    edgekv_bus::MqttBus::register(&mut bus_registry);
    let bus = bus_registry.open(&bus_uri).unwrap_or_else(|e| {
        eprintln!("failed to open bus '{bus_uri}': {e}");
        std::process::exit(2);
    });

    let center = Arc::new(CenterNode::new(store, bus));
    center.run().await.unwrap_or_else(|e| {
        eprintln!("failed to start center node: {e}");
        std::process::exit(2);
    });

    info!("center node running, press Ctrl+C to stop");
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
    let _ = center.shutdown().await;
}
