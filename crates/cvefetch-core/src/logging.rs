//! Logging with indicatif integration and an optional per-run log file

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use indicatif::MultiProgress;

/// Targets at or below this prefix are logged to the file at debug level
const CRATE_TARGET_PREFIX: &str = "cvefetch";

/// ANSI color code and padded label for a log level.
fn level_style(level: log::Level, color: bool) -> (&'static str, &'static str, &'static str) {
    let label = match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    };
    if !color {
        return ("", label, "");
    }
    let ansi = match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    };
    (ansi, label, "\x1b[0m")
}

/// Whether a record goes to the log file: debug for our crates, info for dependencies
fn file_enabled(metadata: &log::Metadata) -> bool {
    let max = if metadata.target().starts_with(CRATE_TARGET_PREFIX) {
        log::Level::Debug
    } else {
        log::Level::Info
    };
    metadata.level() <= max
}

/// Timestamped log file name, unique per run
pub fn log_file_name(now: chrono::DateTime<chrono::Local>) -> String {
    format!("cvefetch_{}.log", now.format("%Y-%m-%dT%H-%M-%S-%6f"))
}

/// Console logger that prints through `MultiProgress` on a TTY so log lines
/// do not tear progress bars, and mirrors records into a log file when one is open.
pub struct CliLogger {
    console: env_logger::Logger,
    multi: Option<MultiProgress>,
    file: Option<Mutex<BufWriter<File>>>,
}

impl CliLogger {
    pub fn new(console: env_logger::Logger, multi: Option<MultiProgress>) -> Self {
        Self {
            console,
            multi,
            file: None,
        }
    }

    pub fn with_file(mut self, file: File) -> Self {
        self.file = Some(Mutex::new(BufWriter::new(file)));
        self
    }

    fn max_level(&self) -> log::LevelFilter {
        if self.file.is_some() {
            self.console.filter().max(log::LevelFilter::Debug)
        } else {
            self.console.filter()
        }
    }

    fn write_console(&self, record: &log::Record) {
        match &self.multi {
            Some(multi) => {
                let (pre, label, post) = level_style(record.level(), true);
                let line = format!("[{pre}{label}{post}] {}", record.args());
                multi.suspend(|| eprintln!("{line}"));
            }
            None => {
                // Non-TTY: no ANSI colors
                let (_, label, _) = level_style(record.level(), false);
                eprintln!("[{label}] {}", record.args());
            }
        }
    }

    fn write_file(&self, record: &log::Record) {
        let Some(file) = &self.file else { return };
        let mut out = file.lock().unwrap_or_else(|e| e.into_inner());
        let (_, label, _) = level_style(record.level(), false);
        // Losing a log line is not worth failing the run over
        let _ = writeln!(
            out,
            "{} [{label}] {}: {}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
            record.target(),
            record.args()
        );
    }
}

impl log::Log for CliLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.console.enabled(metadata) || (self.file.is_some() && file_enabled(metadata))
    }

    fn log(&self, record: &log::Record) {
        if self.console.enabled(record.metadata()) {
            self.write_console(record);
        }
        if file_enabled(record.metadata()) {
            self.write_file(record);
        }
    }

    fn flush(&self) {
        self.console.flush();
        if let Some(file) = &self.file {
            let _ = file.lock().unwrap_or_else(|e| e.into_inner()).flush();
        }
    }
}

/// Initialize logging.
///
/// Console level is `debug` with `debug`, `warn` with `quiet`, `info` otherwise;
/// `RUST_LOG` overrides it. With `multi` (TTY mode) lines are routed around the
/// progress bars. With `log_dir` a timestamped log file is created there and its
/// path returned.
pub fn init_logging(
    quiet: bool,
    debug: bool,
    multi: Option<&MultiProgress>,
    log_dir: Option<&Path>,
) -> io::Result<Option<PathBuf>> {
    let default_level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };

    let console =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .build();
    let mut logger = CliLogger::new(console, multi.cloned());

    let mut log_path = None;
    if let Some(dir) = log_dir {
        fs::create_dir_all(dir)?;
        let path = dir.join(log_file_name(chrono::Local::now()));
        logger = logger.with_file(File::create(&path)?);
        log_path = Some(path);
    }

    let max_level = logger.max_level();
    log::set_boxed_logger(Box::new(logger)).map_err(io::Error::other)?;
    log::set_max_level(max_level);
    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use log::Log;

    fn metadata(target: &str, level: log::Level) -> log::Metadata<'_> {
        log::Metadata::builder().target(target).level(level).build()
    }

    #[test]
    fn file_filter_by_target() {
        assert!(file_enabled(&metadata("cvefetch_nvd::runner", log::Level::Debug)));
        assert!(file_enabled(&metadata("cvefetch_core", log::Level::Info)));
        assert!(!file_enabled(&metadata("cvefetch_core", log::Level::Trace)));
        assert!(file_enabled(&metadata("reqwest::connect", log::Level::Info)));
        assert!(!file_enabled(&metadata("reqwest::connect", log::Level::Debug)));
    }

    #[test]
    fn log_file_name_is_timestamped() {
        let at = chrono::Local
            .with_ymd_and_hms(2024, 3, 5, 14, 7, 9)
            .single()
            .unwrap();
        assert_eq!(log_file_name(at), "cvefetch_2024-03-05T14-07-09-000000.log");
    }

    #[test]
    fn level_labels_are_padded() {
        for level in [
            log::Level::Error,
            log::Level::Warn,
            log::Level::Info,
            log::Level::Debug,
            log::Level::Trace,
        ] {
            assert_eq!(level_style(level, false).1.len(), 5);
        }
        assert_eq!(level_style(log::Level::Warn, false).0, "");
        assert_eq!(level_style(log::Level::Error, true).0, "\x1b[31m");
    }

    #[test]
    fn file_receives_debug_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let console = env_logger::Builder::new()
            .filter_level(log::LevelFilter::Warn)
            .build();
        let logger = CliLogger::new(console, None).with_file(File::create(&path).unwrap());
        assert_eq!(logger.max_level(), log::LevelFilter::Debug);

        logger.log(
            &log::Record::builder()
                .target("cvefetch_nvd::runner")
                .level(log::Level::Debug)
                .args(format_args!("page fetched"))
                .build(),
        );
        logger.log(
            &log::Record::builder()
                .target("hyper::proto")
                .level(log::Level::Debug)
                .args(format_args!("connection noise"))
                .build(),
        );
        logger.flush();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[DEBUG] cvefetch_nvd::runner: page fetched"));
        assert!(!content.contains("connection noise"));
    }
}
