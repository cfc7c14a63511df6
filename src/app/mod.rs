pub mod config;
mod error;
mod logging;
pub mod runtime;
pub mod services;

pub use error::AppError;

pub fn run() -> Result<(), AppError> {
    let config = bootstrap()?;
    runtime::run(config)
}

/// Captures a single full snapshot and exits without scheduling.
pub fn run_snapshot_once() -> Result<(), AppError> {
    let config = bootstrap()?;
    let path = runtime::capture_once(&config)?;
    tracing::info!(path = %path.display(), "one-shot snapshot written");
    Ok(())
}

fn bootstrap() -> Result<config::AppConfig, AppError> {
    logging::init()?;

    let config = config::AppConfig::from_env()?;

    tracing::info!(
        output_dir = %config.output_dir.display(),
        poll_interval_minutes = config.poll_interval_minutes,
        info_page_size = config.info_page_size,
        status_page_size = config.status_page_size,
        info_url = %config.endpoints.info_url,
        status_url = %config.endpoints.status_url,
        http_timeout_secs = config.http_timeout_secs,
        unmatched_policy = ?config.unmatched_policy,
        replay_script = ?config.replay_script,
        "application bootstrap initialized"
    );

    Ok(config)
}
