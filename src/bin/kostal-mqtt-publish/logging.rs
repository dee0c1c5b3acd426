use std::io::Write;

use chrono::Local;
use env_logger::{Builder, Env};

/// Logs go to stderr; stdout carries the JSON records. `RUST_LOG` overrides the level.
pub fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };

    Builder::from_env(Env::default().default_filter_or(default_level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();
}
