use serde::{Deserialize, Serialize};

/// Exit code reported for commands that ran past their timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when the backend could not run a command at all.
pub const UNAVAILABLE_EXIT_CODE: i32 = -1;

/// Captured result of one command executed in the sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecResult {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Synthetic failure standing in for a command the backend never ran.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new("", message, UNAVAILABLE_EXIT_CODE)
    }

    pub fn timed_out(timeout_ms: u64) -> Self {
        Self::new(
            "",
            format!("command timed out after {} ms", timeout_ms),
            TIMEOUT_EXIT_CODE,
        )
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
