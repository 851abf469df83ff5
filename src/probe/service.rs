//! Probe service: one slot, one probe run, one result.

use std::time::Duration;

use crate::config::AppConfig;

use super::executor::{ExecutionError, ProbeExecutor, ProbeInvocation, ProbeResult};
use super::governor::{ConcurrencyGovernor, Overloaded};
use super::mode::ProbeMode;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error(transparent)]
    Overloaded(#[from] Overloaded),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Shared by all handlers; cloning shares the same slot pool.
#[derive(Clone, Debug)]
pub struct ProbeService {
    governor: ConcurrencyGovernor,
    executor: ProbeExecutor,
    timeout: Duration,
}

impl ProbeService {
    pub fn new(governor: ConcurrencyGovernor, executor: ProbeExecutor, timeout: Duration) -> Self {
        Self {
            governor,
            executor,
            timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            ConcurrencyGovernor::from_config(&config.governor),
            ProbeExecutor::from_config(&config.probe),
            config.probe.timeout(),
        )
    }

    /// Run the probe for `mode` while holding a slot. Never retries.
    pub async fn run(&self, mode: ProbeMode) -> Result<ProbeResult, ProbeError> {
        let invocation = ProbeInvocation::new(mode, self.timeout);
        let slot = self.governor.acquire().await?;

        let outcome = self
            .executor
            .run(invocation.argument, invocation.timeout)
            .await;
        slot.release();

        match &outcome {
            Ok(result) if result.timed_out => tracing::warn!(
                mode = %invocation.mode,
                duration_ms = result.duration_ms,
                "Probe timed out"
            ),
            Ok(result) => tracing::info!(
                mode = %invocation.mode,
                exit_code = ?result.exit_code,
                duration_ms = result.duration_ms,
                "Probe finished"
            ),
            Err(e) => tracing::error!(mode = %invocation.mode, error = %e, "Probe could not be run"),
        }

        outcome.map_err(ProbeError::from)
    }

    pub fn governor(&self) -> &ConcurrencyGovernor {
        &self.governor
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::probe::governor::AdmissionPolicy;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn service(dir: &TempDir, body: &str, limit: usize) -> ProbeService {
        let path = dir.path().join("probe.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        ProbeService::new(
            ConcurrencyGovernor::new(limit, AdmissionPolicy::FailFast),
            ProbeExecutor::new(path).with_kill_grace(Duration::from_millis(100)),
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn test_run_passes_mode_argument() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, "echo \"$1\"", 1);

        let result = service.run(ProbeMode::Heap).await.unwrap();
        assert_eq!(result.stdout, "heap\n");
        assert_eq!(service.governor().available(), 1);
    }

    #[tokio::test]
    async fn test_slot_released_after_spawn_failure() {
        let dir = TempDir::new().unwrap();
        let service = ProbeService::new(
            ConcurrencyGovernor::new(1, AdmissionPolicy::FailFast),
            ProbeExecutor::new(dir.path().join("missing")),
            Duration::from_secs(1),
        );

        assert!(matches!(
            service.run(ProbeMode::All).await,
            Err(ProbeError::Execution(_))
        ));
        assert_eq!(service.governor().available(), 1);
    }

    #[tokio::test]
    async fn test_slot_released_after_timeout() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, "sleep 10", 1);

        let result = service.run(ProbeMode::All).await.unwrap();
        assert!(result.timed_out);
        assert_eq!(service.governor().available(), 1);
    }

    #[tokio::test]
    async fn test_overloaded_when_pool_exhausted() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, "exit 0", 1);

        let _held = service.governor().acquire().await.unwrap();
        assert!(matches!(
            service.run(ProbeMode::All).await,
            Err(ProbeError::Overloaded(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_run_releases_slot() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, "sleep 10", 1);

        let run = service.run(ProbeMode::All);
        let cancelled = tokio::time::timeout(Duration::from_millis(100), run).await;
        assert!(cancelled.is_err());
        assert_eq!(service.governor().available(), 1);
    }
}
