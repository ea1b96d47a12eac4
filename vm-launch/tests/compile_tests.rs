//! End-to-end compilation against a temporary storage root.

mod common;

use common::*;
use vm_common::{ConfigStore, PrimaryDiskSpec, SharedDiskList, SharedDiskSpec, VmConfig};
use vm_error::{LaunchError, ToolKind};
use vm_launch::{AudioDecision, DriveRole, LaunchCompiler, LaunchWarning};
use vm_osal::{HostOs, HostProbe};

fn disk(path: &str) -> PrimaryDiskSpec {
    PrimaryDiskSpec {
        path: Some(path.to_string()),
        format: "qcow2".to_string(),
        ..Default::default()
    }
}

fn quiet_config() -> VmConfig {
    VmConfig {
        accelerator: "tcg".to_string(),
        ..Default::default()
    }
}

#[test]
fn test_basic_vector_exact() {
    let fx = Fixture::new();
    let primary = fx.touch("disk.qcow2");
    let config = VmConfig {
        ram: "2G".to_string(),
        cpu_cores: 2,
        disk_image: Some(disk("disk.qcow2")),
        ..quiet_config()
    };

    let cmd = fx.compile(&config).unwrap();
    let expected = vec![
        QEMU.to_string(),
        "-m".into(),
        "2G".into(),
        "-smp".into(),
        "2".into(),
        "-machine".into(),
        "q35".into(),
        "-accel".into(),
        "tcg".into(),
        "-vga".into(),
        "std".into(),
        "-display".into(),
        "default,show-cursor=on".into(),
        "-usb".into(),
        "-device".into(),
        "usb-tablet".into(),
        "-drive".into(),
        format!("file={},format=qcow2,if=virtio,index=0,media=disk", primary.display()),
        "-boot".into(),
        "order=c".into(),
    ];
    assert_eq!(cmd.args, expected);
    assert_eq!(cmd.audio, AudioDecision::Disabled);
    assert!(cmd.warnings.is_empty());
    assert!(cmd.removed_passthrough.is_empty());
}

#[test]
fn test_create_if_missing_attaches_created_disk() {
    let fx = Fixture::new();
    let config = VmConfig {
        disk_image: Some(PrimaryDiskSpec {
            path: Some("new.qcow2".into()),
            format: "qcow2".into(),
            size: Some("10G".into()),
            create_if_missing: true,
            ..Default::default()
        }),
        ..quiet_config()
    };
    let creator = RecordingCreator::succeeding();
    let prompt = ScriptedPrompt::answering(false);

    let cmd = fx.compile_with(linux_tcg(), &creator, &prompt, &config).unwrap();

    let requests = creator.requests.borrow();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, fx.root.join("new.qcow2"));
    assert_eq!(requests[0].size, "10G");
    assert_eq!(prompt.asked.get(), 0);

    assert_eq!(cmd.drives.len(), 1);
    assert_eq!(cmd.drives[0].index, 0);
    assert_eq!(cmd.drives[0].role, DriveRole::Primary);
    let drives = drive_values(&cmd.args);
    assert_eq!(
        drives,
        vec![format!(
            "file={},format=qcow2,if=virtio,index=0,media=disk",
            fx.root.join("new.qcow2").display()
        )]
    );
}

#[test]
fn test_creation_failure_then_abort() {
    let fx = Fixture::new();
    let config = VmConfig {
        disk_image: Some(PrimaryDiskSpec {
            size: Some("1G".into()),
            create_if_missing: true,
            ..disk("never.qcow2")
        }),
        ..quiet_config()
    };
    let prompt = ScriptedPrompt::answering(false);

    let err = fx
        .compile_with(linux_tcg(), &RecordingCreator::failing(), &prompt, &config)
        .unwrap_err();
    assert!(matches!(err, LaunchError::PrimaryDiskMissing(p) if p == fx.root.join("never.qcow2")));
    assert_eq!(prompt.asked.get(), 1);
}

#[test]
fn test_creation_failure_then_continue() {
    let fx = Fixture::new();
    let shared = fx.touch("data.img");
    let missing_iso = fx.root.join("missing.iso");
    let config = VmConfig {
        disk_image: Some(PrimaryDiskSpec {
            size: Some("1G".into()),
            create_if_missing: true,
            ..disk("never.qcow2")
        }),
        shared_disks: vec![SharedDiskSpec::new("data.img")].into(),
        iso_path: missing_iso.display().to_string(),
        ..quiet_config()
    };
    let creator = RecordingCreator::failing();
    let prompt = ScriptedPrompt::answering(true);

    let cmd = fx.compile_with(linux_tcg(), &creator, &prompt, &config).unwrap();

    let primary = fx.root.join("never.qcow2");
    assert_eq!(creator.requests.borrow().len(), 1);
    assert_eq!(prompt.asked.get(), 1);
    assert!(matches!(
        &cmd.warnings[0],
        LaunchWarning::PrimaryDiskCreationFailed { path, .. } if *path == primary
    ));
    assert!(cmd.warnings.contains(&LaunchWarning::PrimaryDiskMissing { path: primary }));
    assert!(cmd.warnings.contains(&LaunchWarning::IsoNotFound { path: missing_iso }));

    assert_eq!(cmd.drives.len(), 1);
    assert_eq!(cmd.drives[0].role, DriveRole::Shared);
    assert_eq!(cmd.drives[0].index, 0);
    assert_eq!(cmd.drives[0].path, shared);
    assert!(!cmd.args.iter().any(|a| a == "-cdrom"));
}

#[test]
fn test_dry_run_skips_creation() {
    let fx = Fixture::new();
    let config = VmConfig {
        disk_image: Some(PrimaryDiskSpec {
            size: Some("1G".into()),
            create_if_missing: true,
            ..disk("later.qcow2")
        }),
        ..quiet_config()
    };
    let creator = RecordingCreator::dry_run();
    let prompt = ScriptedPrompt::answering(true);

    let cmd = fx.compile_with(linux_tcg(), &creator, &prompt, &config).unwrap();

    assert!(creator.requests.borrow().is_empty());
    assert_eq!(
        cmd.warnings,
        vec![LaunchWarning::PrimaryDiskCreationSkipped {
            path: fx.root.join("later.qcow2")
        }]
    );
    assert!(cmd.drives.is_empty());
    assert!(!fx.root.join("later.qcow2").exists());
}

#[test]
fn test_missing_primary_continue_reports_warning() {
    let fx = Fixture::new();
    fx.touch("data.img");
    let config = VmConfig {
        disk_image: Some(disk("absent.qcow2")),
        shared_disks: vec![SharedDiskSpec::new("data.img")].into(),
        ..quiet_config()
    };
    let creator = RecordingCreator::succeeding();
    let prompt = ScriptedPrompt::answering(true);

    let cmd = fx.compile_with(linux_tcg(), &creator, &prompt, &config).unwrap();

    // Not marked create_if_missing, so nothing is created.
    assert!(creator.requests.borrow().is_empty());
    assert!(cmd.warnings.contains(&LaunchWarning::PrimaryDiskMissing {
        path: fx.root.join("absent.qcow2")
    }));
    assert_eq!(cmd.drives.len(), 1);
    assert_eq!(cmd.drives[0].role, DriveRole::Shared);
    assert_eq!(cmd.drives[0].index, 0);
}

#[test]
fn test_shared_disk_indices_skip_unusable_entries() {
    let fx = Fixture::new();
    fx.touch("disk.qcow2");
    let a = fx.touch("a.img");
    let c = fx.touch("c.img");
    let config = VmConfig {
        disk_image: Some(disk("disk.qcow2")),
        shared_disks: vec![
            SharedDiskSpec::new("a.img"),
            SharedDiskSpec {
                path: None,
                ..SharedDiskSpec::new("")
            },
            SharedDiskSpec::new("missing.img"),
            SharedDiskSpec {
                readonly: true,
                format: "raw".into(),
                interface: "ide".into(),
                ..SharedDiskSpec::new(c.display().to_string())
            },
        ]
        .into(),
        ..quiet_config()
    };

    let cmd = fx.compile(&config).unwrap();
    let indices: Vec<u32> = cmd.drives.iter().map(|d| d.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert_eq!(cmd.drives[1].path, a);
    assert_eq!(
        cmd.drives[2].params(),
        format!("file={},format=raw,if=ide,index=2,media=disk,readonly=on", c.display())
    );
    assert!(cmd.warnings.contains(&LaunchWarning::SharedDiskWithoutPath { position: 1 }));
    assert!(cmd.warnings.contains(&LaunchWarning::SharedDiskNotFound {
        position: 2,
        path: fx.root.join("missing.img"),
    }));
}

#[test]
fn test_shared_disks_start_at_zero_without_primary() {
    let fx = Fixture::new();
    fx.touch("only.img");
    let config = VmConfig {
        shared_disks: vec![SharedDiskSpec::new("only.img")].into(),
        ..quiet_config()
    };
    let cmd = fx.compile(&config).unwrap();
    assert_eq!(cmd.drives.len(), 1);
    assert_eq!(cmd.drives[0].index, 0);
}

#[test]
fn test_malformed_shared_disks_warn() {
    let fx = Fixture::new();
    let config = VmConfig {
        shared_disks: SharedDiskList::Malformed(toml::Value::String("oops".into())),
        ..quiet_config()
    };
    let cmd = fx.compile(&config).unwrap();
    assert!(cmd.drives.is_empty());
    assert_eq!(cmd.warnings, vec![LaunchWarning::MalformedSharedDisks]);
}

#[test]
fn test_linux_auto_audio_emitted_once_at_end() {
    let fx = Fixture::new();
    let config = VmConfig {
        audio_enabled: true,
        audio_device_model: "ich9-intel-hda".into(),
        audio_backend: "auto".into(),
        extra_qemu_args: "-audiodev sdl,id=x -device ich9-intel-hda,audiodev=x -cpu host".into(),
        ..quiet_config()
    };

    let cmd = fx.compile(&config).unwrap();
    let args = &cmd.args;
    assert_eq!(args.iter().filter(|a| *a == "-audiodev").count(), 1);
    assert_eq!(count_pair(args, "-audiodev", "pa,id=audio0"), 1);
    assert_eq!(count_pair(args, "-device", "ich9-intel-hda,audiodev=audio0"), 1);
    assert_eq!(
        args[args.len() - 6..],
        ["-cpu", "host", "-audiodev", "pa,id=audio0", "-device", "ich9-intel-hda,audiodev=audio0"]
    );
    assert_eq!(cmd.removed_passthrough.len(), 2);
}

#[test]
fn test_passthrough_audio_removed_under_both_decisions() {
    let fx = Fixture::new();
    for enabled in [true, false] {
        let config = VmConfig {
            audio_enabled: enabled,
            audio_device_model: "ac97".into(),
            audio_backend: "alsa".into(),
            extra_qemu_args: "-soundhw all -device hda-duplex,audiodev=foo -name guest".into(),
            ..quiet_config()
        };
        let cmd = fx.compile(&config).unwrap();
        assert_eq!(count_pair(&cmd.args, "-device", "hda-duplex,audiodev=foo"), 0);
        assert!(!cmd.args.iter().any(|a| a == "-soundhw"));
        assert_eq!(count_pair(&cmd.args, "-name", "guest"), 1);
        assert_eq!(cmd.audio.is_disabled(), !enabled);
    }
}

#[test]
fn test_model_none_disables_audio() {
    let fx = Fixture::new();
    let config = VmConfig {
        audio_enabled: true,
        audio_device_model: "none".into(),
        audio_backend: "pa".into(),
        ..quiet_config()
    };
    let cmd = fx.compile(&config).unwrap();
    assert_eq!(cmd.audio, AudioDecision::Disabled);
    assert!(!cmd.args.iter().any(|a| a == "-audiodev"));
    assert!(cmd.warnings.is_empty());
}

#[test]
fn test_disabled_audio_flags_surviving_value_collision() {
    // `-device` followed by `-soundhw` is kept; once `-soundhw v` is removed
    // the kept `-device` sits next to `ac97`.
    let fx = Fixture::new();
    let config = VmConfig {
        extra_qemu_args: "-device -soundhw v ac97".into(),
        ..quiet_config()
    };
    let cmd = fx.compile(&config).unwrap();
    assert!(matches!(
        cmd.warnings.as_slice(),
        [LaunchWarning::AudioSurvivedFiltering { tokens }] if tokens == &vec!["-device ac97".to_string()]
    ));
}

#[test]
fn test_auto_accel_with_kvm_adds_iommu_before_accel() {
    let fx = Fixture::new();
    let config = VmConfig::default();
    let cmd = fx
        .compile_with(
            linux_kvm(),
            &RecordingCreator::succeeding(),
            &ScriptedPrompt::answering(true),
            &config,
        )
        .unwrap();
    let device = cmd
        .args
        .iter()
        .position(|a| a == "intel-iommu,intremap=on,caching-mode=on")
        .unwrap();
    let accel = cmd.args.iter().position(|a| a == "-accel").unwrap();
    assert_eq!(cmd.args[accel + 1], "kvm");
    assert_eq!(device + 1, accel);
}

#[test]
fn test_auto_accel_per_host() {
    let fx = Fixture::new();
    for (os, accel) in [
        (HostOs::Windows, "whpx,kernel-irqchip=on"),
        (HostOs::MacOS, "hvf"),
        (HostOs::Unknown, "tcg"),
    ] {
        let cmd = fx
            .compile_with(
                HostProbe::new(os, false),
                &RecordingCreator::succeeding(),
                &ScriptedPrompt::answering(true),
                &VmConfig::default(),
            )
            .unwrap();
        assert_eq!(count_pair(&cmd.args, "-accel", accel), 1, "{os}");
    }
}

#[test]
fn test_media_and_network() {
    let fx = Fixture::new();
    let iso = fx.touch("install.iso");
    let config = VmConfig {
        iso_path: iso.display().to_string(),
        floppy_path: fx.root.join("nope.img").display().to_string(),
        graphics: "none".into(),
        usb_tablet: false,
        boot_order: "dc".into(),
        network_enabled: true,
        ..quiet_config()
    };
    let cmd = fx.compile(&config).unwrap();
    assert_eq!(count_pair(&cmd.args, "-cdrom", &iso.display().to_string()), 1);
    assert!(!cmd.args.iter().any(|a| a == "-fda" || a == "-display" || a == "-usb"));
    assert_eq!(count_pair(&cmd.args, "-netdev", "user,id=net0"), 1);
    assert_eq!(count_pair(&cmd.args, "-device", "e1000,netdev=net0"), 1);
    assert_eq!(count_pair(&cmd.args, "-boot", "order=dc"), 1);
    assert_eq!(
        cmd.warnings,
        vec![LaunchWarning::FloppyNotFound {
            path: fx.root.join("nope.img")
        }]
    );
}

#[test]
fn test_unsupported_network_type_warns() {
    let fx = Fixture::new();
    let config = VmConfig {
        network_enabled: true,
        network_type: "tap".into(),
        ..quiet_config()
    };
    let cmd = fx.compile(&config).unwrap();
    assert!(!cmd.args.iter().any(|a| a == "-netdev"));
    assert_eq!(
        cmd.warnings,
        vec![LaunchWarning::UnsupportedNetworkType {
            network_type: "tap".into()
        }]
    );
}

#[test]
fn test_unparsable_passthrough_is_dropped() {
    let fx = Fixture::new();
    let config = VmConfig {
        extra_qemu_args: "-name \"broken".into(),
        ..quiet_config()
    };
    let cmd = fx.compile(&config).unwrap();
    assert!(!cmd.args.iter().any(|a| a == "-name"));
    assert!(matches!(
        cmd.warnings.as_slice(),
        [LaunchWarning::PassthroughUnparsable { .. }]
    ));
}

#[test]
fn test_missing_binary_fails() {
    let fx = Fixture::new();
    let resolver = FixedResolver(None);
    let creator = RecordingCreator::succeeding();
    let prompt = ScriptedPrompt::answering(true);
    let compiler = LaunchCompiler::new(&fx.settings, linux_tcg(), &resolver, &creator, &prompt);

    let err = compiler.compile("vm", &VmConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        LaunchError::BinaryNotFound {
            kind: ToolKind::System,
            ..
        }
    ));
}

#[test]
fn test_unknown_vm_id() {
    let fx = Fixture::new();
    let store = ConfigStore::open(fx.dir.path().join("meta")).unwrap();
    let resolver = FixedResolver::qemu();
    let creator = RecordingCreator::succeeding();
    let prompt = ScriptedPrompt::answering(true);
    let compiler = LaunchCompiler::new(store.settings(), linux_tcg(), &resolver, &creator, &prompt);

    let err = compiler.compile_by_id(&store, "ghost").unwrap_err();
    assert!(matches!(err, LaunchError::UnknownVm(id) if id == "ghost"));
}

#[test]
fn test_compilation_is_idempotent() {
    let fx = Fixture::new();
    fx.touch("disk.qcow2");
    fx.touch("s.img");
    let config = VmConfig {
        disk_image: Some(disk("disk.qcow2")),
        shared_disks: vec![SharedDiskSpec::new("s.img"), SharedDiskSpec::new("gone.img")].into(),
        audio_enabled: true,
        audio_device_model: "ac97".into(),
        audio_backend: "auto".into(),
        extra_qemu_args: "-soundhw all -rtc base=localtime".into(),
        ..quiet_config()
    };
    let first = fx.compile(&config).unwrap();
    let second = fx.compile(&config).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_compiled_command_serializes() {
    let fx = Fixture::new();
    let cmd = fx.compile(&quiet_config()).unwrap();
    let json = serde_json::to_value(&cmd).unwrap();
    assert_eq!(json["vm_id"], "test_vm");
    assert_eq!(json["audio"]["state"], "disabled");
    assert_eq!(json["args"][0], QEMU);
}
