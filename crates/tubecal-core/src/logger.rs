//! Stderr logger for calibration runs.
//!
//! Lines look like `[  0.125s  WARN tubecal] rear-module00-tube02: ...`. The
//! elapsed prefix counts from installation, so stage transitions logged by
//! the orchestrator read as a coarse timeline of the run.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

struct RunLogger {
    level: LevelFilter,
    started: Instant,
}

/// Crate name of a log target (`tubecal_fit::fitter` -> `tubecal_fit`).
fn crate_of(target: &str) -> &str {
    target.split("::").next().unwrap_or(target)
}

fn format_line(elapsed: f64, level: Level, target: &str, message: &std::fmt::Arguments<'_>) -> String {
    format!("[{elapsed:8.3}s {level:>5} {}] {message}", crate_of(target))
}

impl Log for RunLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(
            self.started.elapsed().as_secs_f64(),
            record.level(),
            record.target(),
            record.args(),
        );
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<RunLogger> = OnceLock::new();

/// Install the run logger at `level`.
///
/// Only the first call installs anything; later calls return `Ok(())`.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| RunLogger {
        level,
        started: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// Parse a level name (`off`, `error`, `warn`, `info`, `debug`, `trace`).
///
/// Unknown names fall back to `Info`.
pub fn parse_level(name: &str) -> LevelFilter {
    name.parse().unwrap_or(LevelFilter::Info)
}

/// Install a `tracing` subscriber filtered by `RUST_LOG` (default `info`).
///
/// `json` selects one JSON object per event; otherwise events are printed
/// with an uptime timer. Span close events carry the time spent in each
/// instrumented stage. `log` records are forwarded to the subscriber.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    use tracing_subscriber::fmt::{self, format::FmtSpan};
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = if json {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed()
    } else {
        fmt::layer()
            .with_timer(fmt::time::Uptime::default())
            .with_span_events(FmtSpan::CLOSE)
            .boxed()
    };
    let _ = tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_levels_and_defaults_to_info() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level("WARN"), LevelFilter::Warn);
        assert_eq!(parse_level("off"), LevelFilter::Off);
        assert_eq!(parse_level("chatty"), LevelFilter::Info);
    }

    #[test]
    fn lines_carry_elapsed_level_and_crate() {
        let line = format_line(
            1.5,
            Level::Warn,
            "tubecal_fit::fitter",
            &format_args!("fit at {} failed", 12),
        );
        assert_eq!(line, "[   1.500s  WARN tubecal_fit] fit at 12 failed");
        assert_eq!(crate_of("tubecal"), "tubecal");
    }
}
