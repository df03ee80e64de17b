//! Logging setup
//!
//! Every record carries the emitting thread's name, which for window code is
//! the name of its execution context.

use std::io::Write;

/// Initialize logging at `info`, unless `RUST_LOG` says otherwise
pub fn init() {
    init_with_level("info");
}

/// Initialize logging with `level` as the default filter
///
/// `RUST_LOG` still takes precedence. Calling this more than once is harmless;
/// only the first call installs a logger.
pub fn init_with_level(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    let installed = env_logger::Builder::from_env(env)
        .format(|buf, record| {
            let thread = std::thread::current();
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                buf.timestamp_millis(),
                record.level(),
                thread.name().unwrap_or("unnamed"),
                record.args()
            )
        })
        .try_init();

    if installed.is_err() {
        log::debug!("Logger already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        init_with_level("debug");
        init();
        log::info!("still logging");
    }
}
