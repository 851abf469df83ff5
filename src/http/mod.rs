//! HTTP server loop.
//!
//! Binds the configured address, serves the router until a shutdown signal
//! arrives, then drains in-flight probe requests:
//! - SIGTERM/SIGINT: stop accepting, wait up to `shutdown_timeout_seconds`

mod server;
mod shutdown;

pub use server::{start_server, ServerError};
