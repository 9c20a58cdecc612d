// A runnable demonstration of §4.7's EdgeNode: wires a store + bus from
// flags instead of a config file and runs until interrupted. Supplements
// the distilled spec's `examples/edgeserver/main.go` the same way the
// full `services/edge` binary does, minus the IPC surface — this is the
// bare node loop, for seeing the sync flow work end to end from a shell.

use std::sync::Arc;

use clap::{Arg, Command};
use tracing::info;

use edgekv::EdgeNode;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let matches = Command::new("edge-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Runs a single EdgeKV edge node against a store and bus URI")
        .arg(
            Arg::new("edge_id")
                .help("This edge's EdgeID")
                .short('e')
                .long("edge-id")
                .required(true),
        )
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

    let edge_id = matches.get_one::<String>("edge_id").expect("required").clone();
    let store_uri = matches.get_one::<String>("store").expect("has default").clone();
    let bus_uri = matches.get_one::<String>("bus").expect("required").clone();

    let store_registry = edgekv_stores::default_registry();
    let mut bus_registry = edgekv::bus::BusRegistry::new();
    edgekv_bus::MqttBus::register(&mut bus_registry);

    let store = store_registry.open(&store_uri).unwrap_or_else(|e| {
        eprintln!("failed to open store '{store_uri}': {e}");
        std::process::exit(2);
    });
    let bus = bus_registry.open(&bus_uri).unwrap_or_else(|e| {
        eprintln!("failed to open bus '{bus_uri}': {e}");
        std::process::exit(2);
    });

    let edge = Arc::new(EdgeNode::new(edge_id, store, bus).unwrap_or_else(|e| {
        eprintln!("failed to construct edge node: {e}");
        std::process::exit(1);
    }));

    edge.run().await.unwrap_or_else(|e| {
        eprintln!("failed to start edge node: {e}");
        std::process::exit(2);
    });

    info!(edge_id = %edge.id(), "edge node running, press Ctrl+C to stop");
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
    let _ = edge.shutdown().await;
}
