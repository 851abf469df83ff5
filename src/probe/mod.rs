//! Probe orchestration.
//!
//! - [`mode`]: maps the untrusted `mode` query value to a fixed probe argument
//! - [`governor`]: bounded pool of slots limiting concurrent probe processes
//! - [`executor`]: spawns the probe, enforces the timeout, captures output
//! - [`service`]: ties the three together for the request handler

pub mod executor;
pub mod governor;
pub mod mode;
pub mod service;

pub use executor::{ExecutionError, ProbeExecutor, ProbeInvocation, ProbeResult};
pub use governor::{AdmissionPolicy, ConcurrencyGovernor, Overloaded, ProbeSlot};
pub use mode::ProbeMode;
pub use service::{ProbeError, ProbeService};
