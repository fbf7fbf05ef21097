use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

/// Install an `env_logger` (default filter `info`) that cooperates with progress bars.
///
/// Log lines are routed through the returned `MultiProgress` so they never tear a bar that is
/// currently drawn.
pub fn init_logging_with_progress() -> anyhow::Result<MultiProgress> {
    let logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).build();
    let progress = MultiProgress::new();
    LogWrapper::new(progress.clone(), logger).try_init()?;
    Ok(progress)
}
