//! TOML-backed configuration store
//!
//! Layout of the configuration directory:
//!
//! ```text
//! <dir>/settings.toml   GlobalSettings
//! <dir>/vms.toml        [vms.<id>] tables, one VmConfig each
//! ```
//!
//! Documents are parsed into typed records and validated; nothing stored is
//! ever executed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use vm_error::{ConfigError, LaunchError, LaunchResult};

use crate::config::{GlobalSettings, VmConfig, is_valid_vm_id};

pub const SETTINGS_FILE_NAME: &str = "settings.toml";
pub const VMS_FILE_NAME: &str = "vms.toml";

/// Environment variable overriding the configuration directory.
pub const HOME_ENV: &str = "QEMU_LAUNCHER_HOME";

#[derive(Debug, Default, Serialize, Deserialize)]
struct VmTable {
    #[serde(default)]
    vms: BTreeMap<String, VmConfig>,
}

/// Loaded settings plus every VM configuration, keyed by id.
#[derive(Debug)]
pub struct ConfigStore {
    dir: PathBuf,
    settings: GlobalSettings,
    vms: BTreeMap<String, VmConfig>,
}

impl ConfigStore {
    /// `$QEMU_LAUNCHER_HOME`, or `.meta` under the working directory.
    pub fn default_dir() -> PathBuf {
        match std::env::var_os(HOME_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => PathBuf::from(".meta"),
        }
    }

    /// Load the store from `dir`, writing a default settings file if none exists.
    ///
    /// A relative storage root is anchored at `dir` and created if missing.
    pub fn open(dir: impl Into<PathBuf>) -> LaunchResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| LaunchError::io(format!("creating config dir {}", dir.display()), e))?;

        let settings_path = dir.join(SETTINGS_FILE_NAME);
        let mut settings = if settings_path.exists() {
            read_document::<GlobalSettings>(&settings_path)?
        } else {
            info!("No settings found, writing defaults to {}", settings_path.display());
            let defaults = GlobalSettings::default();
            write_document(&settings_path, "global settings", &defaults)?;
            defaults
        };

        if settings.default_vm_storage_dir.is_relative() {
            settings.default_vm_storage_dir = dir.join(&settings.default_vm_storage_dir);
        }
        let storage = &settings.default_vm_storage_dir;
        if let Err(e) = fs::create_dir_all(storage) {
            warn!("Could not create VM storage directory {}: {}", storage.display(), e);
        } else if let Ok(canonical) = storage.canonicalize() {
            settings.default_vm_storage_dir = canonical;
        }

        let vms_path = dir.join(VMS_FILE_NAME);
        let vms = if vms_path.exists() {
            read_document::<VmTable>(&vms_path)?.vms
        } else {
            BTreeMap::new()
        };
        for (id, vm) in &vms {
            vm.validate(id)?;
        }
        debug!("Loaded {} VM configuration(s) from {}", vms.len(), dir.display());

        Ok(Self { dir, settings, vms })
    }

    /// Store that lives only in memory until `save` is called on a real dir.
    pub fn in_memory(dir: impl Into<PathBuf>, settings: GlobalSettings) -> Self {
        Self {
            dir: dir.into(),
            settings,
            vms: BTreeMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.settings
    }

    pub fn get(&self, id: &str) -> Option<&VmConfig> {
        self.vms.get(id)
    }

    /// Look up a VM, failing with `UnknownVm` if it is not configured.
    pub fn require(&self, id: &str) -> LaunchResult<&VmConfig> {
        self.vms
            .get(id)
            .ok_or_else(|| LaunchError::UnknownVm(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VmConfig)> {
        self.vms.iter().map(|(id, vm)| (id.as_str(), vm))
    }

    pub fn len(&self) -> usize {
        self.vms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vms.is_empty()
    }

    /// Insert or replace a VM after validating it.
    pub fn upsert(&mut self, id: &str, vm: VmConfig) -> Result<(), ConfigError> {
        vm.validate(id)?;
        self.vms.insert(id.to_string(), vm);
        Ok(())
    }

    /// Insert a VM that must not exist yet.
    pub fn insert_new(&mut self, id: &str, vm: VmConfig) -> Result<(), ConfigError> {
        if self.vms.contains_key(id) {
            return Err(ConfigError::DuplicateVm(id.to_string()));
        }
        self.upsert(id, vm)
    }

    pub fn remove(&mut self, id: &str) -> Option<VmConfig> {
        self.vms.remove(id)
    }

    /// Derive an unused id from a display name: lower-cased, anything outside
    /// `[a-z0-9_-]` replaced by `_`, then `_01`, `_02`, ... on collision.
    pub fn unique_id(&self, name: &str) -> String {
        let mut base: String = name
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        if !is_valid_vm_id(&base) {
            base = "vm".to_string();
        }

        let mut candidate = base.clone();
        let mut counter = 1u32;
        while self.vms.contains_key(&candidate) {
            candidate = format!("{base}_{counter:02}");
            counter += 1;
        }
        candidate
    }

    /// Resolve a disk path from configuration against the storage root.
    pub fn resolve_storage_path(&self, path: &str) -> PathBuf {
        resolve_against(self.settings.storage_root(), path)
    }

    /// Write both documents back to the configuration directory.
    pub fn save(&self) -> LaunchResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            LaunchError::io(format!("creating config dir {}", self.dir.display()), e)
        })?;
        write_document(&self.dir.join(SETTINGS_FILE_NAME), "global settings", &self.settings)?;
        let table = VmTable {
            vms: self.vms.clone(),
        };
        write_document(&self.dir.join(VMS_FILE_NAME), "VM configurations", &table)?;
        debug!("Saved {} VM configuration(s) to {}", self.vms.len(), self.dir.display());
        Ok(())
    }
}

/// Join a relative path onto `root` and make it absolute. Absolute paths pass through.
///
/// Existing paths are canonicalised. Paths that do not exist yet are
/// normalised lexically, so `.` and `..` never reach the command line.
pub fn resolve_against(root: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    match joined.canonicalize() {
        Ok(canonical) => canonical,
        Err(_) => {
            let absolute = std::path::absolute(&joined).unwrap_or(joined);
            normalize_lexically(&absolute)
        }
    }
}

/// Fold `.` and `..` components without touching the filesystem. `..` at the
/// root stays at the root.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn read_document<T: for<'de> Deserialize<'de>>(path: &Path) -> LaunchResult<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| LaunchError::io(format!("reading {}", path.display()), e))?;
    toml::from_str(&content).map_err(|source| {
        ConfigError::Parse {
            file: path.to_path_buf(),
            source,
        }
        .into()
    })
}

fn write_document<T: Serialize>(path: &Path, what: &'static str, value: &T) -> LaunchResult<()> {
    let content =
        toml::to_string_pretty(value).map_err(|source| ConfigError::Serialize { what, source })?;
    fs::write(path, content).map_err(|e| LaunchError::io(format!("writing {}", path.display()), e))
}
