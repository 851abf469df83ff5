//! Liveness endpoint for container orchestration.
//!
//! Returns 200 OK whenever the process can answer HTTP. It never runs the
//! probe, so uptime checkers can tell "monitor is down" apart from
//! "cluster is unhealthy".

/// Liveness handler.
pub async fn health() -> &'static str {
    "ok"
}
