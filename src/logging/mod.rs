/*!
 * Logging Module
 * Centralized logging configuration
 */
pub mod config;

use std::io;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use config::{LogConfig, LogLevel};

/// Initialize the logging system.
///
/// The returned guards flush the background writers when dropped and must be
/// kept alive for as long as the process logs.
pub fn init(config: &LogConfig) -> Vec<WorkerGuard> {
    // Create log directory if it doesn't exist
    std::fs::create_dir_all(&config.directory).ok();

    // File appender for all logs
    let file_appender = rolling::daily(&config.directory, "app.log");
    let (file_writer, file_guard) = non_blocking(file_appender);

    // Console writer
    let (console_writer, console_guard) = non_blocking(io::stdout());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("blog_admin_backend={},sqlx=warn", config.level))
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let mut guards = vec![file_guard, console_guard];

    if config.is_production() {
        // File appender for errors only
        let error_appender = rolling::daily(&config.directory, "error.log");
        let (error_writer, error_guard) = non_blocking(error_appender);
        guards.push(error_guard);

        // JSON format for production
        let file_layer = fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        let error_layer = fmt::layer()
            .json()
            .with_writer(error_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(tracing_subscriber::filter::LevelFilter::ERROR);

        let console_layer = fmt::layer()
            .json()
            .with_writer(console_writer)
            .with_target(false);

        let _ = subscriber
            .with(file_layer)
            .with(error_layer)
            .with(console_layer)
            .try_init();
    } else {
        // Pretty format for development
        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false);

        let console_layer = fmt::layer()
            .with_writer(console_writer)
            .with_target(true)
            .pretty();

        let _ = subscriber.with(file_layer).with(console_layer).try_init();
    }

    tracing::info!("Logging initialized for {} environment", config.environment);

    guards
}
