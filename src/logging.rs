use std::sync::OnceLock;

use chrono::Local;
use log::{LevelFilter, Metadata, Record, SetLoggerError};

static LOGGER: OnceLock<ConsoleLogger> = OnceLock::new();

/// Writes `[timestamp LEVEL target] message` lines to stderr
pub struct ConsoleLogger {
    level: LevelFilter,
}

impl ConsoleLogger {
    pub fn new(level: LevelFilter) -> Self {
        Self { level }
    }

    /// Installs the logger process-wide. Fails if a logger is already set.
    pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = LOGGER.get_or_init(|| ConsoleLogger::new(level));
        log::set_logger(logger).map(|()| log::set_max_level(logger.level))
    }

    fn format(record: &Record) -> String {
        format!(
            "[{} {:<5} {}] {}",
            Local::now().to_rfc3339(),
            record.level(),
            record.target(),
            record.args()
        )
    }
}

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{}", Self::format(record));
        }
    }

    fn flush(&self) {}
}

/// Installs [`ConsoleLogger`], falling back to `env_logger` if that fails.
pub fn setup_logging(level: LevelFilter) {
    if ConsoleLogger::init(level).is_err() {
        let _ = env_logger::builder().filter_level(level).try_init();
    }
    log::info!("Logging initialized at {}", level);
}
