//! Grading engine for interactive code activities.
//!
//! An activity owns a list of tests; each test runs setup, graded and
//! teardown commands in a sandbox and checks their output. The
//! [`engine::ActivitySequencer`] drives the tests one at a time against an
//! [`backend::ExecutionBackend`] and streams [`engine::GradeEvent`]s to
//! whoever renders feedback.

pub mod activity;
pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;
pub mod report;

pub use activity::{Activity, ActivityFile, SourceFile, SourceFiles};
pub use backend::{ExecutionBackend, LocalBackend, SessionHandle};
pub use engine::{ActivitySequencer, GradeEvent, SequencerState, TestEngine};
pub use error::{ActivityError, BackendError, DeclarationError, SourceError, SubmitError};
