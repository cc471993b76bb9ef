use chrono::Local;
use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};
use serde::Serialize;
use tokio::sync::broadcast;

const LOG_FEED_CAPACITY: usize = 256;

// BLE backend crates that log every advertisement at debug level
const NOISY_TARGETS: [&str; 3] = ["bluest", "btleplug", "bluer"];

#[derive(Debug, Serialize, Clone)]
pub struct LogMessage {
    pub level: String,
    pub message: String,
    pub timestamp: String,
}

pub struct ConsoleLogger {
    level: LevelFilter,
    feed: broadcast::Sender<LogMessage>,
}

impl ConsoleLogger {
    pub fn new(level: LevelFilter) -> Self {
        let (feed, _) = broadcast::channel(LOG_FEED_CAPACITY);
        Self { level, feed }
    }

    /// Installs the logger globally. Returns a handle to the log feed.
    pub fn init(level: LevelFilter) -> Result<broadcast::Sender<LogMessage>, SetLoggerError> {
        let logger = ConsoleLogger::new(level);
        let feed = logger.feed.clone();
        log::set_boxed_logger(Box::new(logger))?;
        log::set_max_level(level);
        Ok(feed)
    }

    fn format_line(record: &Record, time: &str) -> String {
        format!("[{}] {:<5} {}", time, record.level(), record.args())
    }

    fn emit_log(&self, record: &Record) {
        // nobody listening is fine
        let _ = self.feed.send(LogMessage {
            level: record.level().to_string(),
            message: record.args().to_string(),
            timestamp: Local::now().to_rfc3339(),
        });
    }
}

fn is_noisy(target: &str) -> bool {
    NOISY_TARGETS
        .iter()
        .any(|noisy| target == *noisy || target.starts_with(&format!("{}::", noisy)))
}

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        if is_noisy(metadata.target()) && metadata.level() > Level::Warn {
            return false;
        }
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let time = Local::now().format("%H:%M:%S").to_string();
            eprintln!("{}", Self::format_line(record, &time));
            self.emit_log(record);
        }
    }

    fn flush(&self) {}
}

/// Sets up logging. `RUST_LOG` selects env_logger, otherwise the console logger is used.
pub fn init_logging(level: LevelFilter) -> Option<broadcast::Sender<LogMessage>> {
    if std::env::var_os("RUST_LOG").is_some() {
        let mut builder = env_logger::Builder::from_default_env();
        for target in NOISY_TARGETS {
            builder.filter_module(target, LevelFilter::Warn);
        }
        if builder.try_init().is_err() {
            eprintln!("A logger was already installed");
        }
        return None;
    }

    match ConsoleLogger::init(level) {
        Ok(feed) => Some(feed),
        Err(_) => {
            // only fall back to env_logger when the console logger could not be installed
            let _ = env_logger::builder().filter_level(level).try_init();
            None
        }
    }
}
