//! In-memory backend with scripted command results, for engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::models::ExecResult;

use super::{ExecutionBackend, SessionHandle};

#[derive(Default)]
struct Script {
    results: HashMap<String, ExecResult>,
    exec_delays: HashMap<String, u64>,
    unavailable: HashSet<String>,
    /// Files a command creates when it runs.
    writes: HashMap<String, (String, String)>,
}

#[derive(Default)]
struct Sandbox {
    files: HashMap<String, Vec<u8>>,
    download_delays: HashMap<String, u64>,
    broken_downloads: HashSet<String>,
}

#[derive(Default)]
pub(crate) struct Journal {
    pub executed: Vec<String>,
    pub uploads: Vec<(String, String)>,
    pub downloads_started: Vec<String>,
    pub downloads_finished: Vec<String>,
    pub in_flight: usize,
    pub max_in_flight: usize,
}

#[derive(Default)]
pub(crate) struct ScriptedBackend {
    script: Mutex<Script>,
    sandbox: Mutex<Sandbox>,
    journal: Mutex<Journal>,
    fail_open: bool,
    fail_uploads: AtomicBool,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unopenable() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn failing_uploads() -> Self {
        Self {
            fail_uploads: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Let uploads through (or break them again) after construction.
    pub fn set_failing_uploads(&self, failing: bool) {
        self.fail_uploads.store(failing, Ordering::SeqCst);
    }

    pub fn respond(self, command: &str, result: ExecResult) -> Self {
        self.script
            .lock()
            .unwrap()
            .results
            .insert(command.into(), result);
        self
    }

    pub fn exit(self, command: &str, code: i32) -> Self {
        self.respond(command, ExecResult::new("", format!("{} failed", command), code))
    }

    pub fn delay_exec(self, command: &str, ms: u64) -> Self {
        self.script
            .lock()
            .unwrap()
            .exec_delays
            .insert(command.into(), ms);
        self
    }

    pub fn unavailable(self, command: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .unavailable
            .insert(command.into());
        self
    }

    pub fn writes(self, command: &str, filename: &str, content: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .writes
            .insert(command.into(), (filename.into(), content.into()));
        self
    }

    pub fn file(self, filename: &str, content: &str) -> Self {
        self.sandbox
            .lock()
            .unwrap()
            .files
            .insert(filename.into(), content.as_bytes().to_vec());
        self
    }

    pub fn delay_download(self, filename: &str, ms: u64) -> Self {
        self.sandbox
            .lock()
            .unwrap()
            .download_delays
            .insert(filename.into(), ms);
        self
    }

    pub fn broken_download(self, filename: &str) -> Self {
        self.sandbox
            .lock()
            .unwrap()
            .broken_downloads
            .insert(filename.into());
        self
    }

    pub fn journal(&self) -> std::sync::MutexGuard<'_, Journal> {
        self.journal.lock().unwrap()
    }

    pub fn executed(&self) -> Vec<String> {
        self.journal().executed.clone()
    }

    pub fn uploaded_files(&self) -> Vec<String> {
        self.journal().uploads.iter().map(|(f, _)| f.clone()).collect()
    }

    pub fn clear_journal(&self) {
        *self.journal() = Journal::default();
    }
}

#[async_trait]
impl ExecutionBackend for ScriptedBackend {
    async fn open_session(&self) -> Result<SessionHandle, BackendError> {
        if self.fail_open {
            return Err(BackendError::Io(std::io::Error::other("sandbox offline")));
        }
        Ok(SessionHandle(7))
    }

    async fn exec(
        &self,
        _session: SessionHandle,
        command: &str,
        _timeout_ms: u64,
    ) -> Result<ExecResult, BackendError> {
        let (delay, result, unavailable, write) = {
            let script = self.script.lock().unwrap();
            (
                script.exec_delays.get(command).copied(),
                script.results.get(command).cloned().unwrap_or_default(),
                script.unavailable.contains(command),
                script.writes.get(command).cloned(),
            )
        };

        {
            let mut journal = self.journal();
            journal.executed.push(command.into());
            journal.in_flight += 1;
            journal.max_in_flight = journal.max_in_flight.max(journal.in_flight);
        }
        if let Some(ms) = delay {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        self.journal().in_flight -= 1;

        if unavailable {
            return Err(BackendError::Io(std::io::Error::other("connection lost")));
        }
        if let Some((filename, content)) = write {
            self.sandbox
                .lock()
                .unwrap()
                .files
                .insert(filename, content.into_bytes());
        }
        Ok(result)
    }

    async fn download_file(
        &self,
        _session: SessionHandle,
        filename: &str,
    ) -> Result<Option<Vec<u8>>, BackendError> {
        self.journal().downloads_started.push(filename.into());
        let (delay, broken) = {
            let sandbox = self.sandbox.lock().unwrap();
            (
                sandbox.download_delays.get(filename).copied(),
                sandbox.broken_downloads.contains(filename),
            )
        };
        if let Some(ms) = delay {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        self.journal().downloads_finished.push(filename.into());
        if broken {
            return Err(BackendError::Io(std::io::Error::other("transfer failed")));
        }
        Ok(self.sandbox.lock().unwrap().files.get(filename).cloned())
    }

    async fn upload_file(
        &self,
        _session: SessionHandle,
        filename: &str,
        content: &str,
    ) -> Result<(), BackendError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(BackendError::Io(std::io::Error::other("disk full")));
        }
        self.journal()
            .uploads
            .push((filename.into(), content.into()));
        self.sandbox
            .lock()
            .unwrap()
            .files
            .insert(filename.into(), content.as_bytes().to_vec());
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
