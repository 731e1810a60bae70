use chrono::Local;
use fern::Dispatch;
use log::LevelFilter;
use std::fs;
use std::path::Path;

const LOG_FILE: &str = "wta-trace.log";

/// Initializes the global logger.
///
/// Call once at the start of `main`. `RUST_LOG`, when set, overrides the configured level.
/// Logs go to stderr and to `<log_dir>/wta-trace.log`.
pub fn init(level: LevelFilter, log_dir: &Path) {
    if let Err(e) = fs::create_dir_all(log_dir) {
        eprintln!("Failed to create log directory at '{}': {}", log_dir.display(), e);
    }

    let log_file_path = log_dir.join(LOG_FILE);

    let log_level_filter = std::env::var("RUST_LOG").ok().and_then(|l| l.parse::<LevelFilter>().ok()).unwrap_or(level);

    let base_config = Dispatch::new().level(log_level_filter).level_for("tokio_util", LevelFilter::Warn).level_for("mio", LevelFilter::Warn);

    let console_config = Dispatch::new()
        .format(|out, message, record| {
            let colors = fern::colors::ColoredLevelConfig::new()
                .error(fern::colors::Color::Red)
                .warn(fern::colors::Color::Yellow)
                .info(fern::colors::Color::Green)
                .debug(fern::colors::Color::Blue)
                .trace(fern::colors::Color::BrightBlack);

            out.finish(format_args!(
                "[{} {} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .chain(std::io::stderr());

    let mut dispatch = base_config.chain(console_config);

    match fern::log_file(&log_file_path) {
        Ok(file) => {
            let file_config = Dispatch::new()
                .format(|out, message, record| {
                    out.finish(format_args!("[{} {} {}] {}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"), record.level(), record.target(), message))
                })
                .chain(file);
            dispatch = dispatch.chain(file_config);
        }
        Err(e) => eprintln!("Failed to open log file '{}': {}", log_file_path.display(), e),
    }

    dispatch.apply().unwrap_or_else(|e| {
        eprintln!("Failed to apply logger configuration: {}", e);
    });

    log::info!("Logger initialized at level {}. Logging to console and '{}'.", log_level_filter, log_file_path.display());
}
