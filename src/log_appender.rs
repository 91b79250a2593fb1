use anyhow::{Context, Result};
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::{
    roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy,
};
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Roll the log file when it reaches 10MB
const LOG_FILE_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Number of compressed archives kept
const LOG_ARCHIVE_COUNT: u32 = 3;

/// Console plus size-rolled file logging under `<log_dir>/logs`
pub fn setup_logging(log_dir: &Path, level: &str) -> Result<()> {
    let logs_dir = log_dir.join("logs");
    fs::create_dir_all(&logs_dir).context("Failed to create logs directory")?;

    let level = LevelFilter::from_str(level).unwrap_or(LevelFilter::Info);

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{h({l})} {d(%Y-%m-%d %H:%M:%S)} {M} - {m}{n}",
        )))
        .build();

    let archive_pattern = logs_dir.join("drive-sync.{}.log.gz");
    let roller = FixedWindowRoller::builder()
        .base(1)
        .build(&archive_pattern.to_string_lossy(), LOG_ARCHIVE_COUNT)
        .context("Failed to build log roller")?;

    let policy = CompoundPolicy::new(
        Box::new(SizeTrigger::new(LOG_FILE_MAX_BYTES)),
        Box::new(roller),
    );

    let file = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d} {l} {M} - {m}{n}")))
        .build(logs_dir.join("drive-sync.log"), Box::new(policy))
        .context("Failed to create log file appender")?;

    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .appender(Appender::builder().build("file", Box::new(file)))
        // HTTP internals are noisy at debug level
        .logger(Logger::builder().build("hyper", LevelFilter::Info))
        .logger(Logger::builder().build("reqwest", LevelFilter::Info))
        .build(
            Root::builder()
                .appender("stdout")
                .appender("file")
                .build(level),
        )
        .context("Invalid logging configuration")?;

    log4rs::init_config(config).context("Failed to initialize logging")?;
    Ok(())
}
