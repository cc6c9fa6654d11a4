use tokio::sync::mpsc;

use crate::models::{ActivityOutcome, ExecResult, TestReport};

use super::step::Phase;

/// Events streamed from a grading run to whoever renders feedback.
#[derive(Debug, Clone)]
pub enum GradeEvent {
    RunStarted {
        total: usize,
    },
    SourcesUploaded {
        files: Vec<String>,
        bytes: usize,
    },
    TestStarted {
        index: usize,
        name: String,
    },
    /// A command ran to completion. Skipped commands produce no event.
    CommandFinished {
        index: usize,
        phase: Phase,
        command: String,
        result: ExecResult,
    },
    /// Emitted exactly once per test that ran, in test order.
    TestFinished(TestReport),
    RunFinished(ActivityOutcome),
}

pub type EventSender = mpsc::UnboundedSender<GradeEvent>;

/// Send an event if anyone is listening. A closed receiver is not an error:
/// grading carries on without a reporter.
pub(crate) fn emit(events: Option<&EventSender>, event: GradeEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}
