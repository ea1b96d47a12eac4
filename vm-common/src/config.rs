//! VM configuration records
//!
//! `VmConfig` and `GlobalSettings` are what the config store hands to the
//! launch compiler. Absent keys fall back to the values the compiler would
//! assume anyway, so a hand-written document only needs the fields it cares
//! about.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use vm_error::{ConfigError, ToolKind};
use vm_osal::HostOs;

/// Interface used for disks that do not name one.
pub const DEFAULT_DISK_INTERFACE: &str = "virtio";

const BOOT_DEVICES: &str = "acdn";

fn default_interface() -> String {
    DEFAULT_DISK_INTERFACE.to_string()
}

/// Primary disk descriptor. The path may be relative to the storage root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryDiskSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Empty means auto-detect when attaching.
    #[serde(default)]
    pub format: String,
    /// Only needed when the disk has to be created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default)]
    pub create_if_missing: bool,
}

impl PrimaryDiskSpec {
    /// The configured path, treating an empty string as unset.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref().filter(|p| !p.is_empty())
    }
}

impl Default for PrimaryDiskSpec {
    fn default() -> Self {
        Self {
            path: None,
            format: String::new(),
            size: None,
            interface: default_interface(),
            create_if_missing: false,
        }
    }
}

/// Additional disk attached after the primary one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedDiskSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub format: String,
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default)]
    pub readonly: bool,
}

impl SharedDiskSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            format: String::new(),
            interface: default_interface(),
            readonly: false,
        }
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref().filter(|p| !p.is_empty())
    }
}

/// The `shared_disks` value as found in the document.
///
/// Anything that is not an array of tables is kept as `Malformed` so that
/// loading still succeeds and the compiler can report it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SharedDiskList {
    Disks(Vec<SharedDiskSpec>),
    Malformed(toml::Value),
}

impl Default for SharedDiskList {
    fn default() -> Self {
        SharedDiskList::Disks(Vec::new())
    }
}

impl SharedDiskList {
    pub fn disks(&self) -> Option<&[SharedDiskSpec]> {
        match self {
            SharedDiskList::Disks(d) => Some(d),
            SharedDiskList::Malformed(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.disks().is_none_or(|d| d.is_empty())
    }
}

impl From<Vec<SharedDiskSpec>> for SharedDiskList {
    fn from(disks: Vec<SharedDiskSpec>) -> Self {
        SharedDiskList::Disks(disks)
    }
}

/// Accept both `cpu_cores = 2` and `cpu_cores = "2"`.
fn deserialize_cores<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Cores {
        Int(u32),
        Text(String),
    }

    match Cores::deserialize(deserializer)? {
        Cores::Int(n) => Ok(n),
        Cores::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Declarative description of one virtual machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    pub name: String,
    pub description: String,
    pub os_type: String,
    pub iso_path: String,
    pub floppy_path: String,
    pub ram: String,
    #[serde(deserialize_with = "deserialize_cores")]
    pub cpu_cores: u32,
    pub machine_type: String,
    /// `auto` or an explicit `-accel` value.
    pub accelerator: String,
    pub graphics: String,
    pub usb_tablet: bool,
    pub boot_order: String,
    pub network_enabled: bool,
    pub network_type: String,
    pub audio_enabled: bool,
    pub audio_device_model: String,
    /// `auto`, `none` or an explicit `-audiodev` driver.
    pub audio_backend: String,
    pub extra_qemu_args: String,
    // Table-valued fields stay last so the TOML output keeps plain keys first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_image: Option<PrimaryDiskSpec>,
    pub shared_disks: SharedDiskList,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            os_type: "generic".to_string(),
            iso_path: String::new(),
            floppy_path: String::new(),
            disk_image: None,
            shared_disks: SharedDiskList::default(),
            ram: "1G".to_string(),
            cpu_cores: 1,
            machine_type: "q35".to_string(),
            accelerator: "auto".to_string(),
            graphics: "std".to_string(),
            usb_tablet: true,
            boot_order: "c".to_string(),
            network_enabled: false,
            network_type: "user".to_string(),
            audio_enabled: false,
            audio_device_model: "none".to_string(),
            audio_backend: "none".to_string(),
            extra_qemu_args: String::new(),
        }
    }
}

impl VmConfig {
    /// Starting point for a freshly created VM.
    pub fn template(name: &str, id: &str) -> Self {
        let format = "qcow2";
        Self {
            name: name.to_string(),
            description: "A new virtual machine".to_string(),
            disk_image: Some(PrimaryDiskSpec {
                path: Some(format!("{id}_disk.{format}")),
                format: format.to_string(),
                size: Some("20G".to_string()),
                interface: default_interface(),
                create_if_missing: true,
            }),
            ram: "2G".to_string(),
            cpu_cores: 2,
            graphics: "virtio".to_string(),
            boot_order: "dc".to_string(),
            network_enabled: true,
            audio_enabled: true,
            audio_device_model: "ich9-intel-hda".to_string(),
            audio_backend: "auto".to_string(),
            ..Default::default()
        }
    }

    /// Display name, falling back to the id.
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        if self.name.is_empty() { id } else { &self.name }
    }

    /// Schema checks applied after parsing and before saving.
    pub fn validate(&self, id: &str) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| ConfigError::Invalid {
            vm: id.to_string(),
            field,
            reason: reason.to_string(),
        };

        if !is_valid_vm_id(id) {
            return Err(invalid("id", "must be non-empty and use only [A-Za-z0-9_-]"));
        }
        if self.ram.trim().is_empty() {
            return Err(invalid("ram", "must not be empty"));
        }
        if self.cpu_cores == 0 {
            return Err(invalid("cpu_cores", "must be at least 1"));
        }
        if self.boot_order.is_empty() {
            return Err(invalid("boot_order", "must not be empty"));
        }
        if let Some(bad) = self.boot_order.chars().find(|c| !BOOT_DEVICES.contains(*c)) {
            return Err(invalid(
                "boot_order",
                &format!("contains unknown device '{bad}' (expected a, c, d or n)"),
            ));
        }
        if let Some(disk) = &self.disk_image
            && disk.path().is_some()
            && disk.create_if_missing
            && disk.size.as_deref().is_none_or(|s| s.trim().is_empty())
        {
            return Err(invalid("disk_image.size", "is required when create_if_missing is set"));
        }
        Ok(())
    }
}

/// VM ids are used as table keys and in disk file names.
pub fn is_valid_vm_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Settings shared by every VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    pub qemu_system_exe_windows: String,
    pub qemu_system_exe_linux: String,
    pub qemu_system_exe_macos: String,
    pub qemu_img_exe_windows: String,
    pub qemu_img_exe_linux: String,
    pub qemu_img_exe_macos: String,
    /// Format used when creating a disk that does not name one.
    pub default_disk_format: String,
    /// Root that relative disk paths are resolved against.
    pub default_vm_storage_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remember_last_iso_dir: Option<PathBuf>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            qemu_system_exe_windows: "qemu-system-x86_64.exe".to_string(),
            qemu_system_exe_linux: "qemu-system-x86_64".to_string(),
            qemu_system_exe_macos: "qemu-system-x86_64".to_string(),
            qemu_img_exe_windows: "qemu-img.exe".to_string(),
            qemu_img_exe_linux: "qemu-img".to_string(),
            qemu_img_exe_macos: "qemu-img".to_string(),
            default_disk_format: "qcow2".to_string(),
            default_vm_storage_dir: PathBuf::from("virtual_machines_storage"),
            remember_last_iso_dir: None,
        }
    }
}

impl GlobalSettings {
    /// Configured executable for a tool on a host OS. Unknown hosts use the
    /// linux entry; empty entries count as unset.
    pub fn executable(&self, kind: ToolKind, os: HostOs) -> Option<&str> {
        let value = match (kind, os) {
            (ToolKind::System, HostOs::Windows) => &self.qemu_system_exe_windows,
            (ToolKind::System, HostOs::MacOS) => &self.qemu_system_exe_macos,
            (ToolKind::System, HostOs::Linux | HostOs::Unknown) => &self.qemu_system_exe_linux,
            (ToolKind::Image, HostOs::Windows) => &self.qemu_img_exe_windows,
            (ToolKind::Image, HostOs::MacOS) => &self.qemu_img_exe_macos,
            (ToolKind::Image, HostOs::Linux | HostOs::Unknown) => &self.qemu_img_exe_linux,
        };
        Some(value.as_str()).filter(|v| !v.trim().is_empty())
    }

    pub fn storage_root(&self) -> &std::path::Path {
        &self.default_vm_storage_dir
    }
}
