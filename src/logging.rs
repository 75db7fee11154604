//! A minimal stderr logger for the `log` facade, in the same spirit as the
//! one bundled with the networking stack this crate is modeled on, but
//! without pulling in a terminal-coloring or time-formatting dependency —
//! this crate's binaries are meant to run headless under a test harness as
//! often as at an interactive terminal.

use std::time::{SystemTime, UNIX_EPOCH};

use log::{Level, LevelFilter, Metadata, Record};

struct Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        eprintln!(
            "[{:>10}.{:03}] {:5} {}: {}",
            elapsed.as_secs(),
            elapsed.subsec_millis(),
            level_label(record.level()),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

fn level_label(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRACE",
        Level::Debug => "DEBUG",
        Level::Info => "INFO",
        Level::Warn => "WARN",
        Level::Error => "ERROR",
    }
}

static LOGGER: Logger = Logger;

/// Install this crate's stderr logger as the global `log` sink at `level`.
/// Safe to call once at process startup; a second call is a no-op.
pub fn init(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
