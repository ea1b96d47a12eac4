//! Command assembler
//!
//! Compiles one [`VmConfig`] into the argument vector for the hypervisor
//! launcher. The order is fixed: base arguments, filtered passthrough
//! arguments, then the launcher's own audio arguments.

use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Serialize;
use vm_common::{ConfigStore, GlobalSettings, VmConfig};
use vm_error::{LaunchError, LaunchResult, ToolKind};
use vm_osal::HostProbe;

use crate::audio::{AudioDecision, RemovedArg, filter_passthrough, find_active_audio, tokenize_passthrough};
use crate::binary::BinaryResolver;
use crate::drive::{DrivePlanner, LaunchPrompt, ResolvedDrive};
use crate::image::DiskCreator;
use crate::platform::{KVM_IOMMU_DEVICE, resolve_accelerator};
use crate::warning::{LaunchWarning, WarningSink};

/// The only network type that produces arguments.
pub const USER_NETWORK: &str = "user";

/// Result of a successful compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledCommand {
    pub vm_id: String,
    pub binary: PathBuf,
    /// Full command vector; the first element is the binary.
    pub args: Vec<String>,
    pub drives: Vec<ResolvedDrive>,
    pub audio: AudioDecision,
    /// Passthrough options dropped by audio filtering.
    pub removed_passthrough: Vec<RemovedArg>,
    pub warnings: Vec<LaunchWarning>,
}

impl CompiledCommand {
    pub fn program(&self) -> &Path {
        &self.binary
    }

    /// Everything after the binary.
    pub fn arguments(&self) -> &[String] {
        self.args.get(1..).unwrap_or_default()
    }

    /// Human-readable command line. Arguments containing spaces that are
    /// not options are double-quoted.
    pub fn display_line(&self) -> String {
        self.args
            .iter()
            .map(|arg| {
                if arg.contains(' ') && !arg.starts_with('-') {
                    format!("\"{arg}\"")
                } else {
                    arg.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Launch command compiler bound to its collaborators.
pub struct LaunchCompiler<'a> {
    settings: &'a GlobalSettings,
    host: HostProbe,
    binaries: &'a dyn BinaryResolver,
    disks: &'a dyn DiskCreator,
    prompt: &'a dyn LaunchPrompt,
}

impl<'a> LaunchCompiler<'a> {
    pub fn new(
        settings: &'a GlobalSettings,
        host: HostProbe,
        binaries: &'a dyn BinaryResolver,
        disks: &'a dyn DiskCreator,
        prompt: &'a dyn LaunchPrompt,
    ) -> Self {
        Self {
            settings,
            host,
            binaries,
            disks,
            prompt,
        }
    }

    /// Look up `id` in the store and compile it.
    pub fn compile_by_id(&self, store: &ConfigStore, id: &str) -> LaunchResult<CompiledCommand> {
        let config = store.require(id)?;
        self.compile(id, config)
    }

    /// Compile a configuration. No partial vector is returned on failure.
    pub fn compile(&self, id: &str, config: &VmConfig) -> LaunchResult<CompiledCommand> {
        let name = config.display_name(id);
        let mut sink = WarningSink::default();

        let binary = self
            .binaries
            .resolve(ToolKind::System, self.host.os)
            .ok_or_else(|| LaunchError::BinaryNotFound {
                kind: ToolKind::System,
                candidate: self.binaries.candidate(ToolKind::System, self.host.os),
            })?;

        let mut args = vec![binary.display().to_string()];
        push_pair(&mut args, "-m", &config.ram);
        push_pair(&mut args, "-smp", &config.cpu_cores.to_string());
        push_pair(&mut args, "-machine", &config.machine_type);

        let accel = resolve_accelerator(&config.accelerator, &self.host);
        if accel.iommu {
            push_pair(&mut args, "-device", KVM_IOMMU_DEVICE);
        }
        push_pair(&mut args, "-accel", &accel.accel);

        push_pair(&mut args, "-vga", &config.graphics);
        if config.graphics != "none" {
            push_pair(&mut args, "-display", "default,show-cursor=on");
        }
        if config.usb_tablet {
            args.push("-usb".to_string());
            push_pair(&mut args, "-device", "usb-tablet");
        }

        let mut planner = DrivePlanner::new(self.settings, self.disks, self.prompt);
        planner.plan_primary(name, config.disk_image.as_ref(), &mut sink)?;
        planner.plan_shared(&config.shared_disks, &mut sink);
        let drives = planner.finish();
        for drive in &drives {
            args.extend(drive.to_args());
        }

        push_media(&mut args, "-cdrom", &config.iso_path, &mut sink, |path| {
            LaunchWarning::IsoNotFound { path }
        });
        push_media(&mut args, "-fda", &config.floppy_path, &mut sink, |path| {
            LaunchWarning::FloppyNotFound { path }
        });

        push_pair(&mut args, "-boot", &format!("order={}", config.boot_order));

        if config.network_enabled {
            if config.network_type.eq_ignore_ascii_case(USER_NETWORK) {
                push_pair(&mut args, "-netdev", "user,id=net0");
                push_pair(&mut args, "-device", "e1000,netdev=net0");
            } else {
                sink.push(LaunchWarning::UnsupportedNetworkType {
                    network_type: config.network_type.clone(),
                });
            }
        }

        let audio = AudioDecision::decide(config, self.host.os);
        let passthrough = match tokenize_passthrough(&config.extra_qemu_args) {
            Ok(tokens) => tokens,
            Err(e) => {
                sink.push(LaunchWarning::PassthroughUnparsable {
                    reason: e.to_string(),
                });
                Vec::new()
            }
        };
        let filtered = filter_passthrough(&audio, &passthrough);
        args.extend(filtered.kept);
        args.extend(audio.arguments());

        if audio.is_disabled() {
            let survivors = find_active_audio(&args);
            if survivors.is_empty() {
                info!(
                    "Audio is disabled for '{}', relying on the absence of audio devices",
                    name
                );
            } else {
                sink.push(LaunchWarning::AudioSurvivedFiltering { tokens: survivors });
            }
        }

        debug!("Compiled {} argument(s) for '{}'", args.len(), id);
        Ok(CompiledCommand {
            vm_id: id.to_string(),
            binary,
            args,
            drives,
            audio,
            removed_passthrough: filtered.removed,
            warnings: sink.into_vec(),
        })
    }
}

fn push_pair(args: &mut Vec<String>, flag: &str, value: &str) {
    args.push(flag.to_string());
    args.push(value.to_string());
}

fn push_media(
    args: &mut Vec<String>,
    flag: &str,
    configured: &str,
    sink: &mut WarningSink,
    missing: impl FnOnce(PathBuf) -> LaunchWarning,
) {
    if configured.is_empty() {
        return;
    }
    let path = Path::new(configured);
    if path.is_file() {
        push_pair(args, flag, configured);
    } else {
        sink.push(missing(path.to_path_buf()));
    }
}
