//! Stderr logging for the `camcal` binary and tools.
//!
//! Library code only talks to the `log` facade. Binaries install
//! [`init_with_level`] once at startup; `RUST_LOG` (a bare level name such
//! as `debug`) overrides the requested level. With the `tracing` feature,
//! [`init_tracing`] installs a `tracing-subscriber` instead.

use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// `-v` count to level: none is `info`, one `debug`, more `trace`.
pub fn level_from_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Level requested through `RUST_LOG`, if it holds a plain level name.
fn env_level() -> Option<LevelFilter> {
    let value = std::env::var("RUST_LOG").ok()?;
    LevelFilter::from_str(value.trim()).ok()
}

/// One log line: `[  1.234s  WARN camcal_solver] message`.
///
/// Only the crate part of the target is kept.
fn format_line(elapsed_secs: f64, record: &Record<'_>) -> String {
    let target = record.target();
    let crate_name = target.split("::").next().unwrap_or(target);
    format!(
        "[{:7.3}s {:>5} {}] {}",
        elapsed_secs,
        record.level(),
        crate_name,
        record.args()
    )
}

struct StderrLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let line = format_line(self.started.elapsed().as_secs_f64(), record);
            let _ = writeln!(std::io::stderr().lock(), "{line}");
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger at `level`, or at the `RUST_LOG` level when
/// that is set.
///
/// Only the first call installs anything; later calls return `Ok(())`.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let level = env_level().unwrap_or(level);
    let logger = LOGGER.get_or_init(|| StderrLogger {
        level,
        started: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// Install a `tracing` subscriber filtered by `RUST_LOG`, falling back to
/// `default`.
///
/// With `json = true` events are flattened JSON objects, one per line.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool, default: LevelFilter) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default.to_string().to_lowercase()));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}
