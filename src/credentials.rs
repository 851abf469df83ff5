//! Startup handling of the probe's credential file.
//!
//! The probe authenticates to the cluster with a key file that must not be
//! group or world readable. Permissions are tightened once, before the
//! server starts accepting requests.

use std::io;
use std::path::Path;

/// Owner read/write only
pub const CREDENTIAL_FILE_MODE: u32 = 0o600;

/// Restrict `path` to owner read/write if it exists.
///
/// Returns `Ok(true)` if permissions were set, `Ok(false)` if there is no
/// such file (or the platform has no Unix permission bits).
pub fn tighten_permissions(path: &Path) -> io::Result<bool> {
    if !path.exists() {
        return Ok(false);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(CREDENTIAL_FILE_MODE))?;
        Ok(true)
    }

    #[cfg(not(unix))]
    {
        Ok(false)
    }
}

/// Run the startup step for an optional credential path. Failures are logged, not fatal.
pub fn prepare(path: Option<&Path>) {
    let Some(path) = path else {
        tracing::debug!("No credential file configured");
        return;
    };

    match tighten_permissions(path) {
        Ok(true) => tracing::info!(path = %path.display(), "Restricted credential file permissions"),
        Ok(false) => tracing::debug!(path = %path.display(), "Credential file not present"),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Failed to restrict credential file permissions"
        ),
    }
}
