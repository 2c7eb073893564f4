use clap::ValueEnum;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Logs to stderr, or to a daily rolling file under `log_path` when given.
/// Keep the returned guard alive for the lifetime of the program.
pub fn init_tracing(
    log_path: Option<&str>,
    file_name: &str,
    log_level: LogLevel,
) -> Option<WorkerGuard> {
    if let Some(log_path) = log_path {
        println!("Logging into: {}/{}", log_path, file_name);
        let file_appender = tracing_appender::rolling::daily(log_path, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        tracing_subscriber::fmt()
            .with_writer(non_blocking)
            .with_max_level(Level::from(log_level))
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(Level::from(log_level))
            .init();
        None
    }
}

pub fn setup_ansi_support() {
    #[cfg(target_os = "windows")]
    if let Err(e) = ansi_term::enable_ansi_support() {
        eprintln!("Failed to enable ANSI support: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_maps_to_tracing_level() {
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
        assert!(LogLevel::Debug < LogLevel::Error);
    }
}
