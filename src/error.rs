use thiserror::Error;

/// A test or check declaration that cannot be turned into a runnable test.
#[derive(Debug, Error)]
pub enum DeclarationError {
    #[error("test name must not be empty")]
    EmptyName,

    #[error("test '{test}': empty command in {section}")]
    EmptyCommand { test: String, section: &'static str },

    #[error("test '{test}': check {index} reads a file but has no filename")]
    MissingFilename { test: String, index: usize },

    #[error("test '{test}': check {index} has an invalid regular expression: {source}")]
    InvalidRegex {
        test: String,
        index: usize,
        #[source]
        source: regex::Error,
    },

    #[error("test declaration blob is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("test declaration is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Failures talking to the execution backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("unknown session {0}")]
    UnknownSession(u64),

    #[error("path '{0}' escapes the sandbox")]
    InvalidPath(String),

    #[error("invalid shell configuration: {0}")]
    Shell(String),

    #[error("failed to spawn command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reasons a submission is refused or cannot start.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("a run is already in progress")]
    RunInProgress,

    #[error("failed to upload '{filename}': {source}")]
    Upload {
        filename: String,
        #[source]
        source: BackendError,
    },
}

/// Edits the source set refuses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("no source file named '{0}'")]
    Unknown(String),

    #[error("source file '{0}' is hidden and cannot be edited")]
    Hidden(String),

    #[error("source file '{0}' is read-only")]
    ReadOnly(String),

    #[error("edit to '{0}' changes read-only lines")]
    LockedLines(String),
}

/// An activity file that cannot be turned into a runnable activity.
#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("activity has no source files")]
    EmptySkeleton,

    #[error("source file {0} has an empty filename")]
    EmptyFilename(usize),

    #[error("source file '{0}' is declared twice")]
    DuplicateFilename(String),

    #[error("source file '{0}' has a read-only range with line 0")]
    InvalidLineRange(String),

    #[error("test {index}: {source}")]
    Test {
        index: usize,
        #[source]
        source: DeclarationError,
    },
}
