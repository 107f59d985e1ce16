//! Logging setup: env_logger, optionally routed through indicatif or a file

use std::fs::File;
use std::path::Path;

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

/// Logger that prints through indicatif MultiProgress to avoid tearing worker bars.
pub struct IndicatifLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl IndicatifLogger {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { inner, multi }
    }
}

impl log::Log for IndicatifLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.inner.enabled(record.metadata()) {
            let (pre, label, post) = level_style(record.level(), true);
            let line = format!("[{pre}{label}{post}] {}", record.args());
            self.multi.suspend(|| eprintln!("{line}"));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Where and how loudly to log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOptions<'a> {
    pub quiet: bool,
    pub debug: bool,
    /// Write the log stream to this file instead of stderr
    pub file: Option<&'a Path>,
}

impl LogOptions<'_> {
    fn default_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

/// Initialize logging.
///
/// - `file`: timestamped lines with thread names, appended to the file
/// - TTY (`multi` given): colored lines printed above the progress bars
/// - otherwise: plain `[LEVEL] message` lines on stderr
pub fn init_logging(options: LogOptions<'_>, multi: Option<&MultiProgress>) -> std::io::Result<()> {
    use std::io::Write;

    let env = env_logger::Env::default().default_filter_or(options.default_level());

    if let Some(path) = options.file {
        let file = File::options().create(true).append(true).open(path)?;
        env_logger::Builder::from_env(env)
            .format(|buf, record| {
                let (_, label, _) = level_style(record.level(), false);
                let thread = std::thread::current();
                writeln!(
                    buf,
                    "{} [{label}] ({}) {}",
                    buf.timestamp_millis(),
                    thread.name().unwrap_or("worker"),
                    record.args()
                )
            })
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
    } else if let Some(multi) = multi {
        let logger = env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .build();
        let max_level = logger.filter();

        log::set_boxed_logger(Box::new(IndicatifLogger::new(logger, multi.clone())))
            .map_err(std::io::Error::other)?;
        log::set_max_level(max_level);
    } else {
        env_logger::Builder::from_env(env)
            .format(|buf, record| {
                let (_, label, _) = level_style(record.level(), false);
                writeln!(buf, "[{label}] {}", record.args())
            })
            .init();
    }
    Ok(())
}
