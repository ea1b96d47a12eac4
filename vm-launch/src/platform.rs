//! Platform resolver
//!
//! Turns `auto` selectors into concrete accelerator and audio backend tokens
//! for the host. Resolution never fails; it degrades to `tcg` and `sdl`.

use log::info;
use vm_osal::{HostOs, HostProbe};

/// Extra device added whenever KVM is picked automatically.
pub const KVM_IOMMU_DEVICE: &str = "intel-iommu,intremap=on,caching-mode=on";

/// Accelerator token plus whether the IOMMU device should accompany it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccelChoice {
    pub accel: String,
    pub iommu: bool,
}

fn is_auto(selector: &str) -> bool {
    let trimmed = selector.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto")
}

/// Resolve the `-accel` value. Explicit selectors pass through verbatim.
pub fn resolve_accelerator(selector: &str, host: &HostProbe) -> AccelChoice {
    if !is_auto(selector) {
        return AccelChoice {
            accel: selector.to_string(),
            iommu: false,
        };
    }

    let choice = match host.os {
        HostOs::Linux if host.kvm_usable => AccelChoice {
            accel: "kvm".to_string(),
            iommu: true,
        },
        HostOs::Windows => AccelChoice {
            accel: "whpx,kernel-irqchip=on".to_string(),
            iommu: false,
        },
        HostOs::MacOS => AccelChoice {
            accel: "hvf".to_string(),
            iommu: false,
        },
        _ => AccelChoice {
            accel: "tcg".to_string(),
            iommu: false,
        },
    };
    info!("Auto-selected accelerator: {}", choice.accel);
    choice
}

/// Resolve the `-audiodev` driver. Explicit selectors pass through verbatim.
pub fn resolve_audio_backend(selector: &str, os: HostOs) -> String {
    if !is_auto(selector) {
        return selector.to_string();
    }
    let backend = match os {
        HostOs::Windows => "wasapi",
        HostOs::Linux => "pa",
        HostOs::MacOS => "coreaudio",
        HostOs::Unknown => "sdl",
    };
    info!("Auto-selected audio backend: {}", backend);
    backend.to_string()
}
