//! Cost agent internals: configuration, HTTP API and cluster adapters

pub mod api;
pub mod config;
pub mod metrics_server;
pub mod watch;
