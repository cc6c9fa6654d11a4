use std::fs::File;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Open a debug log file if `GRADER_DEBUG` env var is set.
fn open_log_file() -> Option<File> {
    std::env::var("GRADER_DEBUG").ok().and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .ok()
    })
}

/// Install the global subscriber. `GRADER_LOG` wins over the configured filter.
/// Logs go to stderr unless `GRADER_DEBUG` names a file to write them to.
pub fn init(config: &LogConfig) {
    let filter = EnvFilter::try_from_env("GRADER_LOG")
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match open_log_file() {
        Some(file) => {
            let _ = builder.with_ansi(false).with_writer(Mutex::new(file)).try_init();
        }
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}
