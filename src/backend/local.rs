use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::models::ExecResult;

use super::{ExecutionBackend, SessionHandle};

/// Guard that kills the child process (and its entire process group) on drop.
struct ChildGuard {
    child: Option<tokio::process::Child>,
    /// Process group ID saved at spawn time so we can kill the whole group.
    #[cfg(unix)]
    pgid: Option<u32>,
}

impl ChildGuard {
    fn new(child: tokio::process::Child) -> Self {
        #[cfg(unix)]
        let pgid = child.id();
        Self {
            child: Some(child),
            #[cfg(unix)]
            pgid,
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        // Background jobs started by a command must not outlive it.
        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            unsafe { libc::kill(-(pgid as libc::pid_t), libc::SIGKILL) };
        }
        if let Some(ref mut child) = self.child {
            let _ = child.start_kill();
        }
    }
}

/// Sandbox backed by local processes. Every session owns a private
/// temporary directory that commands run in and files are stored under.
pub struct LocalBackend {
    shell: Vec<String>,
    root: Option<PathBuf>,
    next_session: AtomicU64,
    sessions: Mutex<HashMap<u64, TempDir>>,
}

impl LocalBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let shell =
            shell_words::split(&config.shell).map_err(|e| BackendError::Shell(e.to_string()))?;
        if shell.is_empty() {
            return Err(BackendError::Shell("shell command is empty".into()));
        }
        Ok(Self {
            shell,
            root: config.root.clone(),
            next_session: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Directory backing `session`.
    pub fn session_dir(&self, session: SessionHandle) -> Result<PathBuf, BackendError> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(&session.0)
            .map(|dir| dir.path().to_path_buf())
            .ok_or(BackendError::UnknownSession(session.0))
    }

    /// Drop a session and delete its directory.
    pub fn close_session(&self, session: SessionHandle) -> Result<(), BackendError> {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&session.0);
        match removed {
            Some(dir) => Ok(dir.close()?),
            None => Err(BackendError::UnknownSession(session.0)),
        }
    }

    fn resolve(&self, session: SessionHandle, filename: &str) -> Result<PathBuf, BackendError> {
        let dir = self.session_dir(session)?;
        Ok(dir.join(sandbox_relative(filename)?))
    }
}

/// Reject paths that would leave the session directory.
fn sandbox_relative(filename: &str) -> Result<&Path, BackendError> {
    let path = Path::new(filename);
    let escapes = filename.is_empty()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(BackendError::InvalidPath(filename.to_string()));
    }
    Ok(path)
}

/// Bytes kept per output stream; anything past this is read and dropped.
pub const OUTPUT_LIMIT: usize = 1 << 20;

/// How long pipes may stay open once the command is gone. A process that
/// escaped the group can hold them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

#[derive(Default)]
struct Captured {
    bytes: Vec<u8>,
    dropped: usize,
}

/// Background task collecting one output stream into a shared buffer, so
/// whatever was read survives the task being aborted.
struct OutputReader {
    captured: Arc<Mutex<Captured>>,
    task: JoinHandle<()>,
}

impl OutputReader {
    fn spawn<R>(mut pipe: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let sink = Arc::clone(&captured);
        let task = tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                let n = match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                let mut out = sink.lock().unwrap_or_else(|e| e.into_inner());
                let room = OUTPUT_LIMIT.saturating_sub(out.bytes.len()).min(n);
                out.bytes.extend_from_slice(&chunk[..room]);
                out.dropped += n - room;
            }
        });
        Self { captured, task }
    }

    /// Wait up to `grace` for the stream to close, then take what was read.
    async fn finish(mut self, grace: Duration) -> String {
        if tokio::time::timeout(grace, &mut self.task).await.is_err() {
            debug!("output stream still open, abandoning reader");
            self.task.abort();
        }
        let captured = {
            let mut captured = self.captured.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *captured)
        };
        let mut text = String::from_utf8_lossy(&captured.bytes).into_owned();
        if captured.dropped > 0 {
            text.push_str(&format!(
                "\n[output truncated: {} bytes dropped]\n",
                captured.dropped
            ));
        }
        text
    }
}

async fn finish_reader(reader: Option<OutputReader>) -> String {
    match reader {
        Some(reader) => reader.finish(DRAIN_GRACE).await,
        None => String::new(),
    }
}

#[async_trait]
impl ExecutionBackend for LocalBackend {
    async fn open_session(&self) -> Result<SessionHandle, BackendError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("grader-session-");
        let dir = match self.root {
            Some(ref root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        debug!(session = id, dir = %dir.path().display(), "opened session");
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, dir);
        Ok(SessionHandle(id))
    }

    async fn exec(
        &self,
        session: SessionHandle,
        command: &str,
        timeout_ms: u64,
    ) -> Result<ExecResult, BackendError> {
        let dir = self.session_dir(session)?;
        let (program, args) = self
            .shell
            .split_first()
            .ok_or_else(|| BackendError::Shell("shell command is empty".into()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(command)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group, so the guard can take out anything the command forks.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.as_std_mut().process_group(0);
        }

        debug!(%session, command, timeout_ms, "exec");
        let mut child = cmd.spawn().map_err(BackendError::Spawn)?;
        let stdout = child.stdout.take().map(OutputReader::spawn);
        let stderr = child.stderr.take().map(OutputReader::spawn);
        let mut guard = ChildGuard::new(child);

        let waited = match guard.child.as_mut() {
            Some(child) => {
                tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait()).await
            }
            None => return Err(BackendError::Shell("child process missing".into())),
        };
        // Kill the group before draining pipes: a leftover background job
        // would otherwise keep them open.
        drop(guard);

        let (stdout, stderr) = tokio::join!(finish_reader(stdout), finish_reader(stderr));

        match waited {
            Ok(status) => {
                let status = status?;
                let result = ExecResult::new(stdout, stderr, status.code().unwrap_or(-1));
                debug!(%session, command, exit_code = result.exit_code, "exec finished");
                Ok(result)
            }
            Err(_) => {
                warn!(%session, command, timeout_ms, "command timed out");
                let mut result = ExecResult::timed_out(timeout_ms);
                result.stdout = stdout;
                if !stderr.is_empty() {
                    result.stderr = format!("{}\n{}", stderr.trim_end(), result.stderr);
                }
                Ok(result)
            }
        }
    }

    async fn download_file(
        &self,
        session: SessionHandle,
        filename: &str,
    ) -> Result<Option<Vec<u8>>, BackendError> {
        let path = self.resolve(session, filename)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn upload_file(
        &self,
        session: SessionHandle,
        filename: &str,
        content: &str,
    ) -> Result<(), BackendError> {
        let path = self.resolve(session, filename)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        debug!(%session, filename, bytes = content.len(), "uploaded");
        Ok(())
    }

    fn name(&self) -> &str {
        "local"
    }
}
