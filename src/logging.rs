//! Logger setup.
//!
//! The agent logs through the `log` facade; `env_logger` writes records to
//! stderr. `PLAYOUT_LOG` takes an env_logger filter and, when set, wins over
//! the `verbose` option.

use std::io::Write;

use log::LevelFilter;

pub const LOG_ENV: &str = "PLAYOUT_LOG";

/// Installs the logger. Safe to call more than once; later calls are no-ops.
pub fn init() {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(LevelFilter::Info)
        .parse_env(LOG_ENV)
        .format(|buf, record| writeln!(buf, "[playout] {}: {}", record.level(), record.args()));

    if builder.try_init().is_ok() && std::env::var_os(LOG_ENV).is_none() {
        log::set_max_level(LevelFilter::Warn);
    }
}

/// Raises the level to `info` for `verbose` runs unless `PLAYOUT_LOG` is set.
pub fn set_verbose(verbose: bool) {
    if verbose && std::env::var_os(LOG_ENV).is_none() {
        log::set_max_level(LevelFilter::Info);
    }
}
