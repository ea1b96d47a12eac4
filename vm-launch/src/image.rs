//! Disk-image creation
//!
//! Builds the `qemu-img create` command for a primary disk and runs it. The
//! compiler only ever reaches this through the [`DiskCreator`] seam, so
//! callers decide whether creation needs confirmation first.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};
use serde::Serialize;
use vm_common::{GlobalSettings, PrimaryDiskSpec, resolve_against};
use vm_error::{LaunchError, LaunchResult};

/// Everything `qemu-img create` needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskImageRequest {
    pub path: PathBuf,
    pub format: String,
    pub size: String,
}

impl DiskImageRequest {
    /// `<image_tool> create -f <format> <path> <size>`
    pub fn command(&self, image_tool: &Path) -> Vec<String> {
        vec![
            image_tool.display().to_string(),
            "create".to_string(),
            "-f".to_string(),
            self.format.clone(),
            self.path.display().to_string(),
            self.size.clone(),
        ]
    }
}

/// Outcome of checking a primary disk before creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskPreparation {
    /// Nothing to do, the image is already there.
    Exists(PathBuf),
    Create(DiskImageRequest),
}

/// Decide whether the primary disk needs to be created.
///
/// Fails if the descriptor has no path, is not marked `create_if_missing`, or
/// lacks a size. An empty format falls back to the global default.
pub fn prepare_primary_disk(
    spec: &PrimaryDiskSpec,
    settings: &GlobalSettings,
) -> LaunchResult<DiskPreparation> {
    let Some(configured) = spec.path() else {
        return Err(LaunchError::DiskCreation {
            path: PathBuf::new(),
            reason: "disk path not specified in VM config".to_string(),
        });
    };
    let path = resolve_against(settings.storage_root(), configured);
    if path.exists() {
        info!("Disk image '{}' already exists", path.display());
        return Ok(DiskPreparation::Exists(path));
    }
    if !spec.create_if_missing {
        return Err(LaunchError::DiskCreation {
            path,
            reason: "disk not found and not set to auto-create".to_string(),
        });
    }

    let format = if spec.format.trim().is_empty() {
        info!(
            "No format specified for new disk, using global default: {}",
            settings.default_disk_format
        );
        settings.default_disk_format.clone()
    } else {
        spec.format.clone()
    };
    let Some(size) = spec.size.clone().filter(|s| !s.trim().is_empty()) else {
        return Err(LaunchError::DiskCreation {
            path,
            reason: "disk size not specified".to_string(),
        });
    };

    Ok(DiskPreparation::Create(DiskImageRequest { path, format, size }))
}

/// Creates disk images on behalf of the compiler.
pub trait DiskCreator {
    fn create_disk(&self, request: &DiskImageRequest) -> LaunchResult<()>;

    /// A dry-run creator is never asked to create anything; the compiler
    /// reports the disk as skipped instead.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Run the image tool synchronously, creating the parent directory first.
pub fn run_image_tool(image_tool: &Path, request: &DiskImageRequest) -> LaunchResult<()> {
    if let Some(parent) = request.path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| LaunchError::io(format!("creating {}", parent.display()), e))?;
    }

    let command = request.command(image_tool);
    info!("Executing: {}", command.join(" "));
    let output = Command::new(&command[0])
        .args(&command[1..])
        .output()
        .map_err(|e| LaunchError::io(format!("running {}", image_tool.display()), e))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        debug!("{}", stdout.trim());
    }
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(LaunchError::DiskCreation {
            path: request.path.clone(),
            reason: format!("{} exited with {}: {}", image_tool.display(), output.status, stderr.trim()),
        });
    }
    info!("Disk '{}' created successfully", request.path.display());
    Ok(())
}
