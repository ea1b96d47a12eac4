//! Interactive collaborators for the launch compiler.

use std::io::{self, BufRead, Write};
use std::path::Path;

use log::{info, warn};
use vm_common::GlobalSettings;
use vm_error::{LaunchError, LaunchResult, ToolKind};
use vm_launch::{BinaryResolver, DiskCreator, DiskImageRequest, LaunchPrompt, SettingsBinaryResolver, run_image_tool};
use vm_osal::HostOs;

/// Yes/no questions on the terminal.
///
/// With `assume_yes` every question is answered yes without reading stdin.
pub struct StdinPrompt {
    assume_yes: bool,
}

impl StdinPrompt {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }

    /// Ask a question whose default answer is yes.
    pub fn confirm(&self, question: &str) -> bool {
        self.confirm_default(question, true)
    }

    /// Ask a question; empty input, EOF and I/O errors all take `default`.
    pub fn confirm_default(&self, question: &str, default: bool) -> bool {
        if self.assume_yes {
            info!("{question} {}: y (--yes)", hint(default));
            return true;
        }

        print!("{question} {}: ", hint(default));
        if io::stdout().flush().is_err() {
            return default;
        }
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => {
                println!();
                default
            }
            Ok(_) => parse_answer(&answer, default),
        }
    }
}

fn hint(default: bool) -> &'static str {
    if default { "[Y/n]" } else { "[y/N]" }
}

fn parse_answer(answer: &str, default: bool) -> bool {
    match answer.trim().to_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    }
}

impl LaunchPrompt for StdinPrompt {
    fn continue_without_primary_disk(&self, path: &Path) -> bool {
        self.confirm(&format!(
            "Primary disk '{}' is unavailable. Continue without it?",
            path.display()
        ))
    }
}

/// Creates disks with `qemu-img` after asking for confirmation.
pub struct ImageToolCreator<'a> {
    settings: &'a GlobalSettings,
    os: HostOs,
    prompt: &'a StdinPrompt,
}

impl<'a> ImageToolCreator<'a> {
    pub fn new(settings: &'a GlobalSettings, os: HostOs, prompt: &'a StdinPrompt) -> Self {
        Self { settings, os, prompt }
    }
}

impl DiskCreator for ImageToolCreator<'_> {
    fn create_disk(&self, request: &DiskImageRequest) -> LaunchResult<()> {
        let question = format!(
            "Create disk image '{}' ({}, {})?",
            request.path.display(),
            request.size,
            request.format
        );
        if !self.prompt.confirm(&question) {
            return Err(LaunchError::DiskCreation {
                path: request.path.clone(),
                reason: "declined by user".to_string(),
            });
        }

        let resolver = SettingsBinaryResolver::new(self.settings);
        let tool = resolver
            .resolve(ToolKind::Image, self.os)
            .ok_or_else(|| LaunchError::BinaryNotFound {
                kind: ToolKind::Image,
                candidate: resolver.candidate(ToolKind::Image, self.os),
            })?;
        run_image_tool(&tool, request)
    }
}

/// Used by `show`: never touches the disk and never asks.
pub struct DryRun;

impl DiskCreator for DryRun {
    fn is_dry_run(&self) -> bool {
        true
    }

    fn create_disk(&self, request: &DiskImageRequest) -> LaunchResult<()> {
        warn!("Dry run, not creating '{}'", request.path.display());
        Err(LaunchError::DiskCreation {
            path: request.path.clone(),
            reason: "dry run".to_string(),
        })
    }
}

impl LaunchPrompt for DryRun {
    fn continue_without_primary_disk(&self, _path: &Path) -> bool {
        true
    }
}
