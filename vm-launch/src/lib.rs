//! QEMU launch command compiler
//!
//! Turns a declarative [`vm_common::VmConfig`] into:
//! - the argument vector for `qemu-system-*`
//! - the `qemu-img create` command for its primary disk
//!
//! Pipeline: platform resolver -> disk attachment planner -> audio
//! arbitration -> command assembler. Interactive decisions, disk creation
//! and executable lookup are delegated to the traits re-exported here.

pub mod assembler;
pub mod audio;
pub mod binary;
pub mod drive;
pub mod image;
pub mod platform;
pub mod warning;

pub use assembler::{CompiledCommand, LaunchCompiler};
pub use audio::{AUDIO_DEVICE_DRIVERS, AudioDecision, FilterOutcome, RemovedArg, filter_passthrough};
pub use binary::{BinaryResolver, SettingsBinaryResolver, default_executable_name};
pub use drive::{DriveRole, LaunchPrompt, ResolvedDrive};
pub use image::{DiskCreator, DiskImageRequest, DiskPreparation, prepare_primary_disk, run_image_tool};
pub use platform::{AccelChoice, resolve_accelerator, resolve_audio_backend};
pub use warning::LaunchWarning;
