//! Subcommand implementations. Each returns the process exit code.

use std::fs;
use std::process::Command;

use anyhow::{Context as _, Result, bail};
use log::{info, warn};
use vm_common::{ConfigStore, VmConfig};
use vm_error::ToolKind;
use vm_launch::{
    BinaryResolver, CompiledCommand, DiskCreator, DiskPreparation, LaunchCompiler, SettingsBinaryResolver,
    prepare_primary_disk,
};
use vm_osal::HostProbe;

use crate::prompt::{DryRun, ImageToolCreator, StdinPrompt};

pub struct Session {
    pub store: ConfigStore,
    pub host: HostProbe,
    pub prompt: StdinPrompt,
}

impl Session {
    fn compile(&self, id: &str, dry_run: bool) -> Result<CompiledCommand> {
        let settings = self.store.settings();
        let resolver = SettingsBinaryResolver::new(settings);
        let compiled = if dry_run {
            LaunchCompiler::new(settings, self.host, &resolver, &DryRun, &DryRun)
                .compile_by_id(&self.store, id)?
        } else {
            let creator = ImageToolCreator::new(settings, self.host.os, &self.prompt);
            LaunchCompiler::new(settings, self.host, &resolver, &creator, &self.prompt)
                .compile_by_id(&self.store, id)?
        };
        Ok(compiled)
    }
}

pub fn list(session: &Session) -> Result<i32> {
    if session.store.is_empty() {
        println!("No VMs configured. Create one with `qemu-launcher new <name>`.");
        return Ok(0);
    }
    for (id, vm) in session.store.iter() {
        if vm.description.is_empty() {
            println!("{:<20} {}", id, vm.display_name(id));
        } else {
            println!("{:<20} {} - {}", id, vm.display_name(id), vm.description);
        }
    }
    Ok(0)
}

pub fn show(session: &Session, id: &str, json: bool) -> Result<i32> {
    let compiled = session.compile(id, true)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&compiled.args)?);
    } else {
        println!("{}", compiled.display_line());
        for warning in &compiled.warnings {
            println!("warning: {warning}");
        }
    }
    Ok(0)
}

pub fn launch(session: &Session, id: &str) -> Result<i32> {
    let compiled = session.compile(id, false)?;
    println!("Launching: {}", compiled.display_line());

    let status = Command::new(compiled.program())
        .args(compiled.arguments())
        .status()
        .with_context(|| format!("failed to start {}", compiled.program().display()))?;

    let code = status.code().unwrap_or(1);
    if status.success() {
        info!("VM '{}' exited normally", id);
    } else {
        warn!("VM '{}' exited with {}", id, status);
    }
    println!("QEMU exited with code {code}");
    Ok(code)
}

pub fn create_disk(session: &Session, id: &str) -> Result<i32> {
    let vm = session.store.require(id)?;
    let Some(spec) = &vm.disk_image else {
        bail!("VM '{id}' has no primary disk configured");
    };

    let settings = session.store.settings();
    match prepare_primary_disk(spec, settings)? {
        DiskPreparation::Exists(path) => {
            println!("Disk '{}' already exists", path.display());
        }
        DiskPreparation::Create(request) => {
            let creator = ImageToolCreator::new(settings, session.host.os, &session.prompt);
            creator.create_disk(&request)?;
            println!("Created '{}'", request.path.display());
        }
    }
    Ok(0)
}

pub fn new_vm(session: &mut Session, name: &str) -> Result<i32> {
    let id = session.store.unique_id(name);
    session.store.insert_new(&id, VmConfig::template(name, &id))?;
    session.store.save()?;
    println!("Created VM '{}' with id '{}'", name, id);
    Ok(0)
}

/// Remove a VM. Both the VM and its disk need an explicit yes.
pub fn delete(session: &mut Session, id: &str, with_disk: bool) -> Result<i32> {
    let vm = session.store.require(id)?.clone();
    let question = format!("Delete VM '{}'? This cannot be undone.", vm.display_name(id));
    if !session.prompt.confirm_default(&question, false) {
        println!("Aborted");
        return Ok(1);
    }

    if with_disk && let Some(path) = vm.disk_image.as_ref().and_then(|d| d.path()) {
        let path = session.store.resolve_storage_path(path);
        let question = format!("Also delete the primary disk image '{}'?", path.display());
        if !path.exists() {
            info!("Primary disk '{}' does not exist, nothing to remove", path.display());
        } else if session.prompt.confirm_default(&question, false) {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove disk {}", path.display()))?;
            println!("Removed disk '{}'", path.display());
        } else {
            println!("Keeping disk '{}'", path.display());
        }
    }

    session.store.remove(id);
    session.store.save()?;
    println!("Deleted VM '{id}'");
    Ok(0)
}

pub fn settings(session: &Session) -> Result<i32> {
    println!("# {}", session.store.dir().display());
    print!("{}", toml::to_string_pretty(session.store.settings())?);
    Ok(0)
}

/// Report whether both executables resolve. Fails if the system emulator is missing.
pub fn check(session: &Session) -> Result<i32> {
    let resolver = SettingsBinaryResolver::new(session.store.settings());
    let os = session.host.os;
    println!("Host: {} ({}), KVM usable: {}", os, vm_osal::host_arch(), session.host.kvm_usable);

    let mut code = 0;
    for kind in [ToolKind::System, ToolKind::Image] {
        match resolver.resolve(kind, os) {
            Some(path) => println!("{:<8} {}", kind.as_str(), path.display()),
            None => {
                println!("{:<8} not found (tried '{}')", kind.as_str(), resolver.candidate(kind, os));
                if kind == ToolKind::System {
                    code = 1;
                }
            }
        }
    }
    Ok(code)
}
