//! vm-osal: host operating system abstraction
//!
//! Answers the questions the launcher asks about the machine it runs on:
//! which OS family, which CPU architecture, and whether the kernel
//! virtualization device is usable by the current user.

use std::fmt;
use std::path::Path;

// ============================================================================
// Platform detection
// ============================================================================

/// Host operating system family as seen by the launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOs {
    Linux,
    Windows,
    MacOS,
    Unknown,
}

impl HostOs {
    /// Get current host OS
    pub fn current() -> Self {
        #[cfg(target_os = "linux")]
        return HostOs::Linux;

        #[cfg(target_os = "windows")]
        return HostOs::Windows;

        #[cfg(target_os = "macos")]
        return HostOs::MacOS;

        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            log::warn!(
                "Unrecognized OS platform '{}', defaulting to generic behavior",
                std::env::consts::OS
            );
            HostOs::Unknown
        }
    }

    /// Lower-case tag used in settings keys (`linux`, `windows`, `macos`, `unknown`).
    pub fn tag(&self) -> &'static str {
        match self {
            HostOs::Linux => "linux",
            HostOs::Windows => "windows",
            HostOs::MacOS => "macos",
            HostOs::Unknown => "unknown",
        }
    }

    /// Suffix appended to executable names on this OS.
    pub fn exe_suffix(&self) -> &'static str {
        match self {
            HostOs::Windows => ".exe",
            _ => "",
        }
    }
}

impl fmt::Display for HostOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostOs::Linux => "Linux",
            HostOs::Windows => "Windows",
            HostOs::MacOS => "macOS",
            HostOs::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

pub fn host_arch() -> &'static str {
    std::env::consts::ARCH
}

// ============================================================================
// Hardware capability probes
// ============================================================================

/// Path of the Linux kernel virtualization device.
pub const KVM_DEVICE: &str = "/dev/kvm";

/// Whether `/dev/kvm` exists and is readable and writable by the current user.
pub fn kvm_device_usable() -> bool {
    device_rw_accessible(Path::new(KVM_DEVICE))
}

#[cfg(unix)]
fn device_rw_accessible(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    if !path.exists() {
        return false;
    }
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
    unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::W_OK) == 0 }
}

#[cfg(not(unix))]
fn device_rw_accessible(_path: &Path) -> bool {
    false
}

/// Snapshot of the host facts the platform resolver depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostProbe {
    pub os: HostOs,
    pub kvm_usable: bool,
}

impl HostProbe {
    /// Probe the running host.
    pub fn detect() -> Self {
        let os = HostOs::current();
        let kvm_usable = os == HostOs::Linux && kvm_device_usable();
        log::debug!("Host probe: os={} kvm_usable={}", os.tag(), kvm_usable);
        Self { os, kvm_usable }
    }

    pub fn new(os: HostOs, kvm_usable: bool) -> Self {
        Self { os, kvm_usable }
    }
}
