//! Shared fixtures for launch compiler integration tests.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use vm_common::GlobalSettings;
use vm_error::{LaunchError, LaunchResult, ToolKind};
use vm_launch::{BinaryResolver, CompiledCommand, DiskCreator, DiskImageRequest, LaunchCompiler, LaunchPrompt};
use vm_osal::{HostOs, HostProbe};

pub const QEMU: &str = "/usr/bin/qemu-system-x86_64";

/// Resolver that always answers with a fixed path, or never answers.
pub struct FixedResolver(pub Option<PathBuf>);

impl FixedResolver {
    pub fn qemu() -> Self {
        FixedResolver(Some(PathBuf::from(QEMU)))
    }
}

impl BinaryResolver for FixedResolver {
    fn resolve(&self, _kind: ToolKind, _os: HostOs) -> Option<PathBuf> {
        self.0.clone()
    }
}

/// Records requests; writes an empty file when `succeed` is set.
#[derive(Default)]
pub struct RecordingCreator {
    pub succeed: bool,
    pub dry_run: bool,
    pub requests: RefCell<Vec<DiskImageRequest>>,
}

impl RecordingCreator {
    pub fn succeeding() -> Self {
        Self {
            succeed: true,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Default::default()
        }
    }
}

impl DiskCreator for RecordingCreator {
    fn create_disk(&self, request: &DiskImageRequest) -> LaunchResult<()> {
        self.requests.borrow_mut().push(request.clone());
        if self.succeed {
            fs::write(&request.path, b"").map_err(|e| LaunchError::io("fake create", e))
        } else {
            Err(LaunchError::DiskCreation {
                path: request.path.clone(),
                reason: "declined".to_string(),
            })
        }
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

/// Prompt with a fixed answer that counts how often it was asked.
pub struct ScriptedPrompt {
    pub answer: bool,
    pub asked: Cell<u32>,
}

impl ScriptedPrompt {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            asked: Cell::new(0),
        }
    }
}

impl LaunchPrompt for ScriptedPrompt {
    fn continue_without_primary_disk(&self, _path: &Path) -> bool {
        self.asked.set(self.asked.get() + 1);
        self.answer
    }
}

/// Temporary storage root plus settings pointing at it.
pub struct Fixture {
    pub dir: TempDir,
    pub root: PathBuf,
    pub settings: GlobalSettings,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().canonicalize().expect("canonical tempdir");
        let settings = GlobalSettings {
            default_vm_storage_dir: root.clone(),
            ..Default::default()
        };
        Self { dir, root, settings }
    }

    /// Create an empty file under the storage root and return its absolute path.
    pub fn touch(&self, name: &str) -> PathBuf {
        let path = self.root.join(name);
        fs::write(&path, b"").expect("write fixture file");
        path
    }

    pub fn compile_with(
        &self,
        host: HostProbe,
        creator: &RecordingCreator,
        prompt: &ScriptedPrompt,
        config: &vm_common::VmConfig,
    ) -> LaunchResult<CompiledCommand> {
        let resolver = FixedResolver::qemu();
        LaunchCompiler::new(&self.settings, host, &resolver, creator, prompt).compile("test_vm", config)
    }

    /// Compile on a Linux host without KVM, with a succeeding creator and a
    /// prompt that continues.
    pub fn compile(&self, config: &vm_common::VmConfig) -> LaunchResult<CompiledCommand> {
        self.compile_with(
            linux_tcg(),
            &RecordingCreator::succeeding(),
            &ScriptedPrompt::answering(true),
            config,
        )
    }
}

pub fn linux_tcg() -> HostProbe {
    HostProbe::new(HostOs::Linux, false)
}

pub fn linux_kvm() -> HostProbe {
    HostProbe::new(HostOs::Linux, true)
}

/// Count occurrences of an adjacent `flag value` pair.
pub fn count_pair(args: &[String], flag: &str, value: &str) -> usize {
    args.windows(2)
        .filter(|w| w[0] == flag && w[1] == value)
        .count()
}

pub fn drive_values(args: &[String]) -> Vec<String> {
    args.windows(2)
        .filter(|w| w[0] == "-drive")
        .map(|w| w[1].clone())
        .collect()
}
