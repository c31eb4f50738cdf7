//! Logging with indicatif integration and an optional run log file

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use indicatif::MultiProgress;

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

/// Logger for a batching run.
///
/// Console lines go through indicatif `MultiProgress` when a TTY is attached
/// (so they do not tear progress bars), plain stderr otherwise. The run log
/// file, when configured, has its own level floor: a quiet console still
/// leaves every stage on disk.
pub struct RunLogger {
    inner: env_logger::Logger,
    multi: Option<MultiProgress>,
    file: Option<FileSink>,
}

struct FileSink {
    file: Mutex<File>,
    level: log::LevelFilter,
}

impl RunLogger {
    pub fn new(inner: env_logger::Logger, multi: Option<MultiProgress>) -> Self {
        Self {
            inner,
            multi,
            file: None,
        }
    }

    /// Also append uncolored lines at or above `level` to `file`.
    pub fn with_file(mut self, file: File, level: log::LevelFilter) -> Self {
        self.file = Some(FileSink {
            file: Mutex::new(file),
            level,
        });
        self
    }

    /// Most verbose level either sink accepts.
    pub fn max_level(&self) -> log::LevelFilter {
        let file_level = self.file.as_ref().map_or(log::LevelFilter::Off, |f| f.level);
        self.inner.filter().max(file_level)
    }

    fn file_enabled(&self, metadata: &log::Metadata) -> bool {
        self.file.as_ref().is_some_and(|f| metadata.level() <= f.level)
    }
}

impl log::Log for RunLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata) || self.file_enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.inner.enabled(record.metadata()) {
            match &self.multi {
                Some(multi) => {
                    let (pre, label, post) = level_style(record.level(), true);
                    let line = format!("[{pre}{label}{post}] {}", record.args());
                    multi.suspend(|| eprintln!("{line}"));
                }
                None => {
                    let (_, label, _) = level_style(record.level(), false);
                    eprintln!("[{label}] {}", record.args());
                }
            }
        }
        if let Some(sink) = self.file.as_ref().filter(|_| self.file_enabled(record.metadata())) {
            let (_, label, _) = level_style(record.level(), false);
            if let Ok(mut f) = sink.file.lock() {
                let _ = writeln!(f, "[{label}] {}", record.args());
            }
        }
    }

    fn flush(&self) {
        if let Some(sink) = &self.file {
            if let Ok(mut f) = sink.file.lock() {
                let _ = f.flush();
            }
        }
    }
}

/// Initialize logging.
///
/// `multi` enables TTY mode (indicatif integration). `log_file` is appended
/// to (created if needed) at `info`, or `debug` with `debug`, whatever the
/// console level.
pub fn init_logging(
    quiet: bool,
    debug: bool,
    multi: Option<&MultiProgress>,
    log_file: Option<&Path>,
) -> std::io::Result<()> {
    let default_level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };

    let inner =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .build();
    let mut logger = RunLogger::new(inner, multi.cloned());
    if let Some(path) = log_file {
        let file = File::options().create(true).append(true).open(path)?;
        let file_level = if debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        logger = logger.with_file(file, file_level);
    }
    let max_level = logger.max_level();

    log::set_boxed_logger(Box::new(logger)).map_err(std::io::Error::other)?;
    log::set_max_level(max_level);
    Ok(())
}
