//! VM common library
//!
//! Configuration records shared by the launcher crates, the TOML store they
//! are persisted in, and logger setup.

pub mod config;
pub mod logging;
pub mod store;

pub use config::{
    GlobalSettings, PrimaryDiskSpec, SharedDiskList, SharedDiskSpec, VmConfig,
    DEFAULT_DISK_INTERFACE,
};
pub use logging::{init_logging, level_from_verbosity};
pub use store::{ConfigStore, resolve_against};
