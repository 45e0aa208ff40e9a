// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers, grounded on the teacher's own
//! `subprocess::run_with_timeout` helper.

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Discovery calls (`list_devices`, `find_booted`, `get_app_info`) (§5).
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// `ensure_booted` (§5).
pub const BOOT_TIMEOUT: Duration = Duration::from_secs(30);

/// Graceful `stop()` (§5).
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on polling for a device to finish booting (§4.1).
pub const BOOT_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Poll interval while waiting for a device to finish booting (§4.1).
pub const BOOT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Run a subprocess command with a timeout.
///
/// Wraps `Command::output()` with `tokio::time::timeout`, converting
/// timeout expiration into a descriptive error message. The child process
/// is killed automatically if the timeout elapses (via the tokio `Child`
/// drop implementation).
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, String> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(format!("{description} failed: {io_err}")),
        Err(_elapsed) => Err(format!(
            "{description} timed out after {}s",
            timeout.as_secs()
        )),
    }
}
