use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;

use grader::backend::{ExecutionBackend, LocalBackend};
use grader::config::Config;
use grader::report::{self, TerminalReporter};
use grader::{ActivityFile, ActivitySequencer, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let workspace = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config = Config::load(&workspace);
    logging::init(&config.log);

    let mut args = std::env::args().skip(1).peekable();
    let with_key = args.next_if(|arg| arg == "--key").is_some();
    let Some(path) = args.next() else {
        bail!("usage: grader [--key] <activity.toml>");
    };

    if !run(&config, Path::new(&path), with_key).await? {
        std::process::exit(1);
    }
    Ok(())
}

/// Grade the activity once, against its reference solution when
/// `with_key` is set. Returns whether every test passed.
async fn run(config: &Config, path: &Path, with_key: bool) -> Result<bool> {
    let activity = ActivityFile::load(path)?
        .build(config.grading.timeout_ms)
        .with_context(|| format!("invalid activity {}", path.display()))?;
    if with_key {
        activity.sources.load_key();
    }

    let backend = Arc::new(LocalBackend::new(&config.backend)?);
    let sequencer = ActivitySequencer::open(
        Arc::clone(&backend) as Arc<dyn ExecutionBackend>,
        activity.sources.clone(),
        activity.tests.clone(),
    )
    .await
    .context("failed to open sandbox session")?;

    let (tx, rx) = mpsc::unbounded_channel();
    let reporter = TerminalReporter::new(activity.title.clone(), activity.tests.clone());
    let printer = tokio::spawn(report::print_events(reporter, rx));

    let outcome = sequencer.submit(Some(tx)).await;
    printer.await.context("reporter task panicked")??;
    let outcome = outcome?;

    if let Err(e) = backend.close_session(sequencer.session()) {
        tracing::warn!("failed to clean up session: {e}");
    }
    Ok(outcome.passed())
}
