// Logger bootstrap
//
// Everything logs through the `log` facade; binaries call `init_logging` once.

use log::LevelFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Initialise `env_logger` from `RUST_LOG`, falling back to `default_level`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(default_level: LevelFilter) {
    let default = match default_level {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => DEFAULT_FILTER,
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", default))
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}

/// Map `-v`/`-q` counts onto a level, starting from `info`.
pub fn level_from_verbosity(verbose: u8, quiet: u8) -> LevelFilter {
    let levels = [
        LevelFilter::Error,
        LevelFilter::Warn,
        LevelFilter::Info,
        LevelFilter::Debug,
        LevelFilter::Trace,
    ];
    let index = (2 + i32::from(verbose) - i32::from(quiet)).clamp(0, 4) as usize;
    levels[index]
}
