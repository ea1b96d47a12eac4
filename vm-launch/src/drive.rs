//! Disk attachment planner
//!
//! Produces one [`ResolvedDrive`] per attached disk: the primary disk first,
//! then shared disks in list order. Indices are handed out only to disks
//! that are actually attached, so they stay contiguous from 0.

use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Serialize;
use vm_common::{DEFAULT_DISK_INTERFACE, GlobalSettings, PrimaryDiskSpec, SharedDiskList, resolve_against};
use vm_error::{LaunchError, LaunchResult};

use crate::image::{DiskCreator, DiskPreparation, prepare_primary_disk};
use crate::warning::{LaunchWarning, WarningSink};

/// Asks the user (or a policy) what to do when the primary disk is absent.
pub trait LaunchPrompt {
    /// `true` to launch without the disk, `false` to abort the compilation.
    fn continue_without_primary_disk(&self, path: &Path) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveRole {
    Primary,
    Shared,
}

/// A disk ready to be attached with `-drive`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedDrive {
    pub path: PathBuf,
    pub interface: String,
    pub index: u32,
    pub format: Option<String>,
    pub readonly: bool,
    pub role: DriveRole,
}

impl ResolvedDrive {
    /// Comma-joined `-drive` parameters: `file=`, optional `format=`, `if=`,
    /// `index=`, `media=disk`, optional `readonly=on`.
    pub fn params(&self) -> String {
        let mut params = vec![format!("file={}", self.path.display())];
        if let Some(format) = &self.format {
            params.push(format!("format={format}"));
        }
        params.push(format!("if={}", self.interface));
        params.push(format!("index={}", self.index));
        params.push("media=disk".to_string());
        if self.readonly {
            params.push("readonly=on".to_string());
        }
        params.join(",")
    }

    pub fn to_args(&self) -> [String; 2] {
        ["-drive".to_string(), self.params()]
    }
}

fn interface_or_default(interface: &str) -> String {
    let trimmed = interface.trim();
    if trimmed.is_empty() {
        DEFAULT_DISK_INTERFACE.to_string()
    } else {
        trimmed.to_string()
    }
}

fn non_empty(format: &str) -> Option<String> {
    let trimmed = format.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub(crate) struct DrivePlanner<'a> {
    settings: &'a GlobalSettings,
    disks: &'a dyn DiskCreator,
    prompt: &'a dyn LaunchPrompt,
    next_index: u32,
    drives: Vec<ResolvedDrive>,
}

impl<'a> DrivePlanner<'a> {
    pub(crate) fn new(
        settings: &'a GlobalSettings,
        disks: &'a dyn DiskCreator,
        prompt: &'a dyn LaunchPrompt,
    ) -> Self {
        Self {
            settings,
            disks,
            prompt,
            next_index: 0,
            drives: Vec::new(),
        }
    }

    fn attach(
        &mut self,
        path: PathBuf,
        interface: &str,
        format: &str,
        readonly: bool,
        role: DriveRole,
    ) {
        let drive = ResolvedDrive {
            path,
            interface: interface_or_default(interface),
            index: self.next_index,
            format: non_empty(format),
            readonly,
            role,
        };
        self.next_index += 1;
        self.drives.push(drive);
    }

    /// Attach the primary disk, creating it first if configured to.
    ///
    /// Returns `PrimaryDiskMissing` if the disk is still absent and the
    /// prompt declines to continue.
    pub(crate) fn plan_primary(
        &mut self,
        vm_name: &str,
        spec: Option<&PrimaryDiskSpec>,
        sink: &mut WarningSink,
    ) -> LaunchResult<()> {
        let Some(spec) = spec else {
            return Ok(());
        };
        let Some(configured) = spec.path() else {
            return Ok(());
        };

        let path = resolve_against(self.settings.storage_root(), configured);
        if !path.exists() {
            let skipped = spec.create_if_missing && self.disks.is_dry_run();
            if skipped {
                sink.push(LaunchWarning::PrimaryDiskCreationSkipped { path: path.clone() });
            } else if spec.create_if_missing {
                info!("Primary disk '{}' for '{}' not found", path.display(), vm_name);
                let created = prepare_primary_disk(spec, self.settings).and_then(|prep| match prep {
                    DiskPreparation::Exists(_) => Ok(()),
                    DiskPreparation::Create(request) => self.disks.create_disk(&request),
                });
                if let Err(e) = created {
                    sink.push(LaunchWarning::PrimaryDiskCreationFailed {
                        path: path.clone(),
                        reason: e.to_string(),
                    });
                }
            } else {
                warn!(
                    "Primary disk image '{}' not found and not set to auto-create",
                    path.display()
                );
            }

            if !path.exists() {
                if !self.prompt.continue_without_primary_disk(&path) {
                    return Err(LaunchError::PrimaryDiskMissing(path));
                }
                if !skipped {
                    sink.push(LaunchWarning::PrimaryDiskMissing { path });
                }
                return Ok(());
            }
        }

        self.attach(path, &spec.interface, &spec.format, false, DriveRole::Primary);
        Ok(())
    }

    /// Attach every shared disk that has a path and exists; skip the rest.
    pub(crate) fn plan_shared(&mut self, shared: &SharedDiskList, sink: &mut WarningSink) {
        let Some(disks) = shared.disks() else {
            sink.push(LaunchWarning::MalformedSharedDisks);
            return;
        };

        for (position, disk) in disks.iter().enumerate() {
            let Some(configured) = disk.path() else {
                sink.push(LaunchWarning::SharedDiskWithoutPath { position });
                continue;
            };
            let path = resolve_against(self.settings.storage_root(), configured);
            if !path.exists() {
                sink.push(LaunchWarning::SharedDiskNotFound { position, path });
                continue;
            }

            let index = self.next_index;
            self.attach(path, &disk.interface, &disk.format, disk.readonly, DriveRole::Shared);
            info!(
                "Attaching shared disk '{}' at index {} (format: {}, read-only: {})",
                configured,
                index,
                non_empty(&disk.format).as_deref().unwrap_or("auto-detect"),
                disk.readonly
            );
        }
    }

    pub(crate) fn finish(self) -> Vec<ResolvedDrive> {
        self.drives
    }
}
