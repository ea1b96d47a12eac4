//! Non-fatal conditions met while compiling a launch command.
//!
//! Each one is logged at `warn` level when raised and also returned with the
//! compiled command.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LaunchWarning {
    /// The primary disk is absent and the caller chose to continue without it.
    PrimaryDiskMissing { path: PathBuf },
    /// Creating the primary disk was attempted and failed.
    PrimaryDiskCreationFailed { path: PathBuf, reason: String },
    /// Creation was due but the creator is a dry run.
    PrimaryDiskCreationSkipped { path: PathBuf },
    /// `shared_disks` is not a list of disk records.
    MalformedSharedDisks,
    /// A shared disk entry has no path. `position` is zero-based in the list.
    SharedDiskWithoutPath { position: usize },
    SharedDiskNotFound { position: usize, path: PathBuf },
    IsoNotFound { path: PathBuf },
    FloppyNotFound { path: PathBuf },
    UnsupportedNetworkType { network_type: String },
    /// The passthrough string could not be split into words.
    PassthroughUnparsable { reason: String },
    /// Audio tokens remain in the final vector although audio is disabled.
    AudioSurvivedFiltering { tokens: Vec<String> },
}

impl fmt::Display for LaunchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchWarning::PrimaryDiskMissing { path } => {
                write!(f, "primary disk '{}' is missing, launching without it", path.display())
            }
            LaunchWarning::PrimaryDiskCreationFailed { path, reason } => {
                write!(f, "failed to create primary disk '{}': {}", path.display(), reason)
            }
            LaunchWarning::PrimaryDiskCreationSkipped { path } => write!(
                f,
                "primary disk '{}' does not exist yet and would be created on launch",
                path.display()
            ),
            LaunchWarning::MalformedSharedDisks => {
                write!(f, "'shared_disks' is not a list of disks, skipping shared disks")
            }
            LaunchWarning::SharedDiskWithoutPath { position } => {
                write!(f, "shared disk #{} has no path, skipping", position + 1)
            }
            LaunchWarning::SharedDiskNotFound { position, path } => write!(
                f,
                "shared disk #{} '{}' not found, skipping",
                position + 1,
                path.display()
            ),
            LaunchWarning::IsoNotFound { path } => {
                write!(f, "ISO image '{}' not found", path.display())
            }
            LaunchWarning::FloppyNotFound { path } => {
                write!(f, "floppy image '{}' not found", path.display())
            }
            LaunchWarning::UnsupportedNetworkType { network_type } => write!(
                f,
                "network type '{network_type}' is not supported, no network device attached"
            ),
            LaunchWarning::PassthroughUnparsable { reason } => {
                write!(f, "extra QEMU arguments could not be parsed ({reason}), ignoring them")
            }
            LaunchWarning::AudioSurvivedFiltering { tokens } => write!(
                f,
                "audio is disabled but audio arguments remain in the command: {}",
                tokens.join(" ")
            ),
        }
    }
}

/// Collects warnings and logs each one as it arrives.
#[derive(Debug, Default)]
pub(crate) struct WarningSink {
    warnings: Vec<LaunchWarning>,
}

impl WarningSink {
    pub(crate) fn push(&mut self, warning: LaunchWarning) {
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub(crate) fn into_vec(self) -> Vec<LaunchWarning> {
        self.warnings
    }
}
