//! Unified error handling for the launcher
//!
//! Fatal conditions stop a compilation or a disk creation and surface here.
//! Everything recoverable is reported as a warning by the caller instead.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which companion executable a lookup was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// The hypervisor launcher (`qemu-system-*`).
    System,
    /// The disk-image tool (`qemu-img`).
    Image,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::System => "system",
            ToolKind::Image => "image",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while loading, validating or saving configuration documents.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse {file}: {source}")]
    Parse {
        file: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: toml::ser::Error,
    },

    #[error("invalid configuration for VM '{vm}': {field} {reason}")]
    Invalid {
        vm: String,
        field: &'static str,
        reason: String,
    },

    #[error("VM id '{0}' already exists")]
    DuplicateVm(String),
}

/// Unified error type for the launcher crates.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("VM configuration '{0}' not found")]
    UnknownVm(String),

    #[error("{kind} executable ('{candidate}') not found, check global settings or PATH")]
    BinaryNotFound { kind: ToolKind, candidate: String },

    #[error("launch aborted due to missing primary disk: {}", .0.display())]
    PrimaryDiskMissing(PathBuf),

    #[error("cannot create disk '{}': {reason}", .path.display())]
    DiskCreation { path: PathBuf, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl LaunchError {
    /// Wrap an I/O error with a description of what was being attempted.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        LaunchError::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether the error means the VM cannot run at all, as opposed to a
    /// failure of a side operation like disk creation.
    pub fn is_launch_blocking(&self) -> bool {
        matches!(
            self,
            LaunchError::UnknownVm(_)
                | LaunchError::BinaryNotFound {
                    kind: ToolKind::System,
                    ..
                }
                | LaunchError::PrimaryDiskMissing(_)
        )
    }
}

/// Result type alias for launcher operations
pub type LaunchResult<T> = Result<T, LaunchError>;
