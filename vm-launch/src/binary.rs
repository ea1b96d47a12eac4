//! Executable lookup for `qemu-system-*` and `qemu-img`.

use std::path::{Path, PathBuf};

use log::debug;
use vm_common::GlobalSettings;
use vm_error::ToolKind;
use vm_osal::{HostOs, host_arch};

/// Finds a usable executable for a tool on a host OS.
pub trait BinaryResolver {
    fn resolve(&self, kind: ToolKind, os: HostOs) -> Option<PathBuf>;

    /// What the resolver would try, for error messages.
    fn candidate(&self, kind: ToolKind, os: HostOs) -> String {
        default_executable_name(kind, os)
    }
}

/// `qemu-system-<host arch>` or `qemu-img`, with `.exe` on Windows.
pub fn default_executable_name(kind: ToolKind, os: HostOs) -> String {
    let stem = match kind {
        ToolKind::System => format!("qemu-system-{}", host_arch()),
        ToolKind::Image => "qemu-img".to_string(),
    };
    format!("{stem}{}", os.exe_suffix())
}

/// Resolves executables from global settings, then from `PATH`.
///
/// Lookup order: configured value as an existing file (canonicalised), the
/// configured value found on `PATH`, the default name found on `PATH`.
pub struct SettingsBinaryResolver<'a> {
    settings: &'a GlobalSettings,
}

impl<'a> SettingsBinaryResolver<'a> {
    pub fn new(settings: &'a GlobalSettings) -> Self {
        Self { settings }
    }
}

impl BinaryResolver for SettingsBinaryResolver<'_> {
    fn resolve(&self, kind: ToolKind, os: HostOs) -> Option<PathBuf> {
        if let Some(configured) = self.settings.executable(kind, os) {
            let path = Path::new(configured);
            if path.is_file() {
                return Some(path.canonicalize().unwrap_or_else(|_| path.to_path_buf()));
            }
            if which::which(configured).is_ok() {
                return Some(PathBuf::from(configured));
            }
            debug!("Configured {} executable '{}' not usable", kind, configured);
        }

        let default = default_executable_name(kind, os);
        match which::which(&default) {
            Ok(found) => Some(found),
            Err(_) => {
                debug!("Default {} executable '{}' not found on PATH", kind, default);
                None
            }
        }
    }

    fn candidate(&self, kind: ToolKind, os: HostOs) -> String {
        self.settings
            .executable(kind, os)
            .map(str::to_string)
            .unwrap_or_else(|| default_executable_name(kind, os))
    }
}
