// edgekv-center: center process entry point.
// Exposes modules for integration testing.

pub mod bind_client;
pub mod config;
pub mod http;
