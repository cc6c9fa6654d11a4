pub mod local;
#[cfg(test)]
pub(crate) mod scripted;

use std::fmt;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::models::ExecResult;

pub use local::{LocalBackend, OUTPUT_LIMIT};

/// Opaque handle to one sandbox session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub u64);

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Contract for sandboxes that run graded commands.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Open a fresh session. The session starts without any source files.
    async fn open_session(&self) -> Result<SessionHandle, BackendError>;

    /// Run `command` inside the session.
    ///
    /// A command that outlives `timeout_ms` must still resolve, reporting a
    /// non-zero exit code instead of an error.
    async fn exec(
        &self,
        session: SessionHandle,
        command: &str,
        timeout_ms: u64,
    ) -> Result<ExecResult, BackendError>;

    /// Fetch a file from the session. `Ok(None)` means the file does not
    /// exist, which is distinct from an empty file.
    async fn download_file(
        &self,
        session: SessionHandle,
        filename: &str,
    ) -> Result<Option<Vec<u8>>, BackendError>;

    /// Store a file in the session, replacing any previous content.
    async fn upload_file(
        &self,
        session: SessionHandle,
        filename: &str,
        content: &str,
    ) -> Result<(), BackendError>;

    /// Display name for this backend (e.g., "local").
    fn name(&self) -> &str;
}
