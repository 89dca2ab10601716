//! Logging setup shared by the CLI, the examples and the tests.
//!
//! Without the `tracing` feature a small stderr sink for the `log` facade is
//! installed with [`init_with_level`]. Lines look like
//! `  0.412s  INFO aruco::detector: 3 markers`.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, fmt::format::FmtSpan, util::SubscriberInitExt, EnvFilter};

const CRATE_PREFIX: &str = "marker_pose_";

/// `marker_pose_aruco::detector` -> `aruco::detector`.
fn short_target(target: &str) -> &str {
    target.strip_prefix(CRATE_PREFIX).unwrap_or(target)
}

struct StderrSink {
    max: LevelFilter,
    t0: Instant,
}

impl Log for StderrSink {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "{:7.3}s {:>5} {}: {}\n",
            self.t0.elapsed().as_secs_f64(),
            record.level(),
            short_target(record.target()),
            record.args()
        );
        // a failed write to stderr has nowhere else to go
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static SINK: OnceLock<StderrSink> = OnceLock::new();

/// Route `log` records at or above `level` to stderr.
///
/// Only the first call installs the sink; later calls keep it and succeed.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    let mut fresh = false;
    let sink = SINK.get_or_init(|| {
        fresh = true;
        StderrSink {
            max: level,
            t0: Instant::now(),
        }
    });
    if fresh {
        log::set_logger(sink)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Install a `tracing` subscriber on stderr, filtered by `RUST_LOG`
/// (`info` when unset). Span closings are reported with their timings.
///
/// With `json` every event is one flattened JSON object per line.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    init_tracing_with_level(json, LevelFilter::Info);
}

/// `EnvFilter` directive for a `log` level, e.g. `Warn` -> `warn`.
#[cfg(feature = "tracing")]
fn level_directive(level: LevelFilter) -> String {
    level.as_str().to_ascii_lowercase()
}

/// Like [`init_tracing`], with `level` used when `RUST_LOG` is unset.
/// A set `RUST_LOG` takes precedence.
#[cfg(feature = "tracing")]
pub fn init_tracing_with_level(json: bool, level: LevelFilter) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(level)));
    let base = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    let installed = if json {
        base.json().flatten_event(true).finish().try_init()
    } else {
        base.with_target(true).compact().finish().try_init()
    };
    // a subscriber installed earlier (tests, embedding apps) wins
    drop(installed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_prefix_is_dropped_from_targets() {
        assert_eq!(short_target("marker_pose_aruco::detector"), "aruco::detector");
        assert_eq!(short_target("marker_pose::pipeline"), "marker_pose::pipeline");
        assert_eq!(short_target("other"), "other");
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn log_levels_become_filter_directives() {
        assert_eq!(level_directive(LevelFilter::Warn), "warn");
        assert_eq!(level_directive(LevelFilter::Off), "off");
        assert!(EnvFilter::try_new(level_directive(LevelFilter::Debug)).is_ok());
    }

    #[test]
    fn repeated_init_is_harmless() {
        init_with_level(LevelFilter::Warn).expect("first");
        init_with_level(LevelFilter::Debug).expect("second");
    }
}
