//! es-monitor: HTTP front end for Elasticsearch health-check probes.
//!
//! A request to `GET /?mode=<mode>` runs the external health-check
//! executable with a fixed argument for that mode, bounded by a wall-clock
//! timeout and a concurrency limit, and returns its exit code and output.

pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod middleware;
pub mod probe;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use routes::create_router;
pub use state::AppState;
