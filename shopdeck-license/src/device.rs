//! Device fingerprinting for license binding.
//!
//! Derives a stable identifier for this installation from environment
//! signals. The value survives restarts and OS updates but differs
//! across installations, which is what lets the validator notice a
//! license record copied to another machine.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;

/// Information about the current device, for diagnostics display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Operating system name.
    pub os_name: String,
    /// Operating system version.
    pub os_version: String,
    /// Hostname.
    pub hostname: String,
    /// CPU architecture.
    pub arch: String,
}

impl DeviceInfo {
    /// Collects information about the current device.
    #[must_use]
    pub fn collect() -> Self {
        Self {
            os_name: env::consts::OS.to_string(),
            os_version: get_os_version(),
            hostname: get_hostname(),
            arch: env::consts::ARCH.to_string(),
        }
    }
}

/// A stable fingerprint identifying this installation.
///
/// Equality of the [`value`](Self::value) is what binding checks compare;
/// `generated_at` only records when the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    value: String,
    generated_at: DateTime<Utc>,
}

impl DeviceFingerprint {
    /// Generates a fingerprint for the current installation.
    ///
    /// Hashes the composite of OS, architecture, hostname, platform
    /// machine id, username and install directory. Signals that cannot
    /// be read are skipped rather than failing, so the fingerprint
    /// degrades instead of erroring on locked-down machines.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_value(digest_signals(&collect_signals()))
    }

    /// Wraps a known fingerprint value, e.g. one replayed from a stored
    /// binding or pinned by a test.
    #[must_use]
    pub fn from_value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            generated_at: Utc::now(),
        }
    }

    /// Returns the fingerprint value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// When this fingerprint snapshot was taken.
    #[must_use]
    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Validates that this fingerprint matches the current installation.
    #[must_use]
    pub fn matches_current(&self) -> bool {
        self.value == Self::generate().value
    }
}

/// Source of the current device fingerprint. Injected into the service
/// so tests can pin fingerprints and simulate device changes.
pub trait FingerprintProvider: Send + Sync {
    /// Returns the fingerprint of the current installation.
    fn current(&self) -> DeviceFingerprint;
}

/// Provider backed by the real environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFingerprint;

impl FingerprintProvider for SystemFingerprint {
    fn current(&self) -> DeviceFingerprint {
        DeviceFingerprint::generate()
    }
}

fn digest_signals(signals: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signals.join("|").as_bytes());
    let hash = hasher.finalize();
    // First 16 bytes are plenty for a binding check.
    BASE64.encode(&hash[..16])
}

/// Collects the signals that feed the fingerprint hash.
///
/// The OS version is deliberately excluded: it changes on routine
/// updates and would break the binding for paying users.
fn collect_signals() -> Vec<String> {
    let mut signals = Vec::new();

    signals.push(env::consts::OS.to_string());
    signals.push(env::consts::ARCH.to_string());
    signals.push(get_hostname());

    if let Some(machine_id) = get_machine_id() {
        signals.push(machine_id);
    }

    if let Ok(user) = env::var("USER").or_else(|_| env::var("USERNAME")) {
        signals.push(user);
    }

    // Install directory distinguishes side-by-side installs on one box.
    if let Some(install_dir) = get_install_dir() {
        signals.push(install_dir);
    }

    signals
}

fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

fn get_install_dir() -> Option<String> {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.to_string_lossy().into_owned()))
}

/// Gets the OS version string.
fn get_os_version() -> String {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("sw_vers")
            .arg("-productVersion")
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    #[cfg(target_os = "windows")]
    {
        // Registry lookup lands with the Windows build of the POS shell.
        "windows".to_string()
    }

    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|line| line.starts_with("VERSION_ID="))
                    .map(|line| {
                        line.trim_start_matches("VERSION_ID=")
                            .trim_matches('"')
                            .to_string()
                    })
            })
            .unwrap_or_else(|| "unknown".to_string())
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        "unknown".to_string()
    }
}

/// Gets the platform machine id, the most stable signal available.
fn get_machine_id() -> Option<String> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|line| line.contains("IOPlatformUUID"))
                    .and_then(|line| line.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
    }

    #[cfg(target_os = "windows")]
    {
        // Registry MachineGuid lands with the Windows build.
        None
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        None
    }
}
