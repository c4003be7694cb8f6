use std::env;
use std::io::Write;
use std::str::FromStr;

use fern::Output;
use indicatif::{ProgressBar, WeakProgressBar};
use log::{debug, error, info};
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::cli::VerbosityLevel;

/// Writer that suspends the current progress bar while log lines are written
#[derive(Debug)]
pub struct ProgressHandler<T: Write + Send>(T);

/// The progress bar of the current batch, if any
static CURRENT_PROGRESS_BAR: Lazy<RwLock<Option<WeakProgressBar>>> =
    Lazy::new(|| RwLock::new(None));

impl<T: Write + Send> ProgressHandler<T> {
    fn handle<F: FnOnce(&mut Self) -> R, R>(&mut self, inner_function: F) -> R {
        match get_progress_bar() {
            Some(pb) => pb.suspend(|| inner_function(self)),
            None => inner_function(self),
        }
    }

    pub fn new(pipe: T) -> Self {
        Self(pipe)
    }
}

impl<T: Write + Send + 'static> ProgressHandler<T> {
    pub fn into_output(self) -> Output {
        let boxed: Box<dyn Write + Send + 'static> = Box::new(self);
        boxed.into()
    }
}

impl<T: Write + Send> Write for ProgressHandler<T> {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.handle(|this| this.0.write(buf))
    }

    #[inline]
    fn flush(&mut self) -> std::io::Result<()> {
        self.handle(|this| this.0.flush())
    }
}

/// Sets the reference to the current progress bar for the writer
pub(crate) fn set_progress_bar(pb: Option<WeakProgressBar>) {
    *CURRENT_PROGRESS_BAR.write() = pb;
}

/// Returns the current progress bar, if it is still alive
pub(crate) fn get_progress_bar() -> Option<ProgressBar> {
    CURRENT_PROGRESS_BAR.read().as_ref()?.upgrade()
}

/// Prints an anyhow error and its full error chain using the log::error macro
pub(crate) fn log_error(err: &anyhow::Error) {
    error!("Error occurred: {}", err);
    err.chain()
        .skip(1)
        .for_each(|cause| error!("  caused by: {}", cause));
}

/// Parses the level set in the `RUST_LOG` env variable, `Err` contains the unrecognized value
fn level_from_env() -> Option<Result<log::LevelFilter, String>> {
    let value = env::var_os("RUST_LOG")?;
    let value = value.to_string_lossy().trim().to_ascii_lowercase();
    Some(log::LevelFilter::from_str(&value).map_err(|_| value))
}

/// Initializes logging with fern
///
/// Quiet mode disables logging, otherwise the verbosity level takes precedence over `RUST_LOG`.
/// If a logger was already installed in this process (e.g. by an earlier call), it is kept.
pub(crate) fn initialize_logging(
    verbosity: VerbosityLevel,
    quiet_mode: bool,
) {
    let mut unknown_log_filter_level = None;
    let log_filter_level = if quiet_mode {
        log::LevelFilter::Off
    } else if let Some(level) = verbosity.into_filter() {
        level
    } else {
        match level_from_env() {
            Some(Ok(level)) => level,
            Some(Err(value)) => {
                unknown_log_filter_level = Some(value);
                log::LevelFilter::Info
            }
            None => log::LevelFilter::Info,
        }
    };

    let applied = if verbosity == VerbosityLevel::None {
        build_logger(log_filter_level, |out, message, record| {
            out.finish(format_args!(
                "[{}][{}] {}",
                chrono::Local::now().format("%T%.3f"),
                record.level(),
                message
            ))
        })
    } else {
        build_logger(log_filter_level, |out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, false),
                record.target(),
                record.level(),
                message
            ))
        })
    };

    if let Err(err) = applied {
        // Another logger is already active, only adjust the level
        log::set_max_level(log_filter_level);
        debug!("Keeping existing logger ({})", err);
    }

    if let Some(filter_level) = unknown_log_filter_level {
        error!(
            "Unknown log filter level '{}' defined in 'RUST_LOG' env variable, using INFO instead.",
            filter_level
        );
    }
}

fn build_logger<F>(
    log_filter_level: log::LevelFilter,
    formatter: F,
) -> Result<(), log::SetLoggerError>
where
    F: Fn(fern::FormatCallback, &std::fmt::Arguments, &log::Record) + Sync + Send + 'static,
{
    fern::Dispatch::new()
        .format(formatter)
        .level(log_filter_level)
        .chain(ProgressHandler::new(std::io::stdout()).into_output())
        .apply()
}

/// Prints program name, version and the command line to the log
pub(crate) fn log_program_info() {
    info!(
        "{} v{} ({})",
        env::args().next().unwrap_or_else(|| "gprmesh".to_string()),
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_NAME")
    );
    info!(
        "Called with command line: {}",
        env::args().collect::<Vec<_>>().join(" ")
    );
}
