//! Audio arbitration
//!
//! The launcher always owns audio configuration: it either emits its own
//! `-audiodev`/`-device` pair or emits nothing, and in both cases strips
//! audio options out of the user's passthrough arguments. Silence is
//! achieved by omission only; no explicit "no audio" flag is added.

use log::{debug, info};
use serde::Serialize;
use vm_common::VmConfig;
use vm_osal::HostOs;

use crate::platform::resolve_audio_backend;

/// Identifier tying the generated device to its backend.
pub const AUDIO_ID: &str = "audio0";

/// QEMU sound device drivers recognised when filtering `-device` options.
pub const AUDIO_DEVICE_DRIVERS: [&str; 9] = [
    "ich9-intel-hda",
    "intel-hda",
    "hda-duplex",
    "ac97",
    "es1370",
    "sb16",
    "adlib",
    "cs4231a",
    "gus",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AudioDecision {
    ScriptManaged { backend: String, model: String },
    Disabled,
}

impl AudioDecision {
    /// Audio is on only if enabled and neither model nor backend is `none`.
    pub fn decide(config: &VmConfig, os: HostOs) -> Self {
        let model = config.audio_device_model.trim().to_lowercase();
        let backend = config.audio_backend.trim().to_lowercase();

        if !config.audio_enabled || model == "none" || backend == "none" {
            return AudioDecision::Disabled;
        }
        AudioDecision::ScriptManaged {
            backend: resolve_audio_backend(&backend, os),
            model,
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, AudioDecision::Disabled)
    }

    /// Tokens appended at the very end of the command.
    pub fn arguments(&self) -> Vec<String> {
        match self {
            AudioDecision::ScriptManaged { backend, model } => vec![
                "-audiodev".to_string(),
                format!("{backend},id={AUDIO_ID}"),
                "-device".to_string(),
                format!("{model},audiodev={AUDIO_ID}"),
            ],
            AudioDecision::Disabled => Vec::new(),
        }
    }
}

/// Whether a `-device` value configures a sound device.
pub fn is_audio_device_value(value: &str) -> bool {
    let lowered = value.to_lowercase();
    let driver = lowered.split(',').next().unwrap_or_default();
    lowered.contains("audiodev=") || AUDIO_DEVICE_DRIVERS.contains(&driver)
}

/// Split the passthrough string the way a POSIX shell would.
pub fn tokenize_passthrough(extra: &str) -> Result<Vec<String>, shell_words::ParseError> {
    shell_words::split(extra)
}

/// An option pair taken out of the passthrough arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedArg {
    pub flag: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    pub kept: Vec<String>,
    pub removed: Vec<RemovedArg>,
}

/// Remove `-soundhw X`, `-audiodev X` and audio `-device X` pairs from the
/// passthrough tokens. Every other token is kept in its original order.
///
/// A trailing `-soundhw`/`-audiodev` with no value is removed on its own; a
/// `-device` without a non-empty value is left alone.
pub fn filter_passthrough(decision: &AudioDecision, tokens: &[String]) -> FilterOutcome {
    let reason = match decision {
        AudioDecision::ScriptManaged { .. } => "launcher-managed audio",
        AudioDecision::Disabled => "audio disabled by launcher",
    };

    let mut outcome = FilterOutcome::default();
    let mut i = 0;
    while i < tokens.len() {
        let arg = &tokens[i];
        let next = tokens.get(i + 1);

        let consumed = match arg.as_str() {
            "-soundhw" | "-audiodev" => Some(if next.is_some() { 2 } else { 1 }),
            "-device" => match next {
                Some(value) if !value.is_empty() && is_audio_device_value(value) => Some(2),
                _ => None,
            },
            _ => None,
        };

        match consumed {
            Some(n) => {
                let value = if n == 2 { next.cloned() } else { None };
                info!(
                    "Filtering '{} {}' from extra QEMU arguments ({})",
                    arg,
                    value.as_deref().unwrap_or_default(),
                    reason
                );
                outcome.removed.push(RemovedArg {
                    flag: arg.clone(),
                    value,
                });
                i += n;
            }
            None => {
                outcome.kept.push(arg.clone());
                i += 1;
            }
        }
    }
    outcome
}

/// Audio options still active in an assembled command. Used as a
/// consistency check when the decision is `Disabled`.
pub fn find_active_audio(command: &[String]) -> Vec<String> {
    let mut found = Vec::new();
    for (i, arg) in command.iter().enumerate() {
        let next = command.get(i + 1);
        match arg.as_str() {
            "-audiodev" => found.push(join_pair(arg, next)),
            "-soundhw" => {
                if next.is_some_and(|v| !v.eq_ignore_ascii_case("none")) {
                    found.push(join_pair(arg, next));
                }
            }
            "-device" => {
                if next.is_some_and(|v| is_audio_device_value(v)) {
                    found.push(join_pair(arg, next));
                }
            }
            _ => {}
        }
    }
    if found.is_empty() {
        debug!("No active audio configuration in command");
    }
    found
}

fn join_pair(flag: &str, value: Option<&String>) -> String {
    match value {
        Some(v) => format!("{flag} {v}"),
        None => flag.to_string(),
    }
}
