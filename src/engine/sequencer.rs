use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::activity::SourceFiles;
use crate::backend::{ExecutionBackend, SessionHandle};
use crate::error::{BackendError, SubmitError};
use crate::models::{ActivityOutcome, TestOutcome, TestSpec, TestStatus};

use super::events::{EventSender, GradeEvent, emit};
use super::test_engine::{ExecContext, TestEngine};

/// Progress of the current (or last) run, readable at any time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequencerState {
    /// Test being run right now, if a run is in progress.
    pub current_index: Option<usize>,
    /// Outcomes of finished tests, in test order.
    pub outcomes: Vec<TestOutcome>,
    /// One status per declared test.
    pub statuses: Vec<TestStatus>,
}

impl SequencerState {
    fn fresh(total: usize) -> Self {
        Self {
            current_index: None,
            outcomes: Vec::new(),
            statuses: vec![TestStatus::Pending; total],
        }
    }
}

struct RunSlot {
    engines: Vec<TestEngine>,
    /// The sandbox has no copy of the sources yet (first submission, or after a reset).
    force_upload: bool,
}

/// Runs an activity's tests, one after another, against a single session.
pub struct ActivitySequencer {
    backend: Arc<dyn ExecutionBackend>,
    session: SessionHandle,
    sources: SourceFiles,
    /// Held for the whole duration of a run; a failed `try_lock` means busy.
    slot: tokio::sync::Mutex<RunSlot>,
    state: Mutex<SequencerState>,
}

impl ActivitySequencer {
    /// Open a backend session for the activity. An unreachable backend is a
    /// setup error, reported here rather than in a test outcome.
    pub async fn open(
        backend: Arc<dyn ExecutionBackend>,
        sources: SourceFiles,
        tests: Vec<TestSpec>,
    ) -> Result<Self, BackendError> {
        let session = backend.open_session().await?;
        info!(
            backend = backend.name(),
            %session,
            tests = tests.len(),
            sources = sources.len(),
            "activity ready"
        );
        let total = tests.len();
        Ok(Self {
            backend,
            session,
            sources,
            slot: tokio::sync::Mutex::new(RunSlot {
                engines: tests.into_iter().map(TestEngine::new).collect(),
                force_upload: true,
            }),
            state: Mutex::new(SequencerState::fresh(total)),
        })
    }

    pub fn session(&self) -> SessionHandle {
        self.session
    }

    pub fn sources(&self) -> &SourceFiles {
        &self.sources
    }

    pub fn is_running(&self) -> bool {
        self.slot.try_lock().is_err()
    }

    pub fn state(&self) -> SequencerState {
        self.lock_state().clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, SequencerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Grade the activity.
    ///
    /// Rejected with [`SubmitError::RunInProgress`] while another submission
    /// is running. Every call is a full fresh run.
    #[tracing::instrument(skip_all, fields(session = %self.session))]
    pub async fn submit(
        &self,
        events: Option<EventSender>,
    ) -> Result<ActivityOutcome, SubmitError> {
        let mut slot = self.slot.try_lock().map_err(|_| SubmitError::RunInProgress)?;
        let events = events.as_ref();
        let total = slot.engines.len();

        emit(events, GradeEvent::RunStarted { total });
        self.upload_sources(&mut slot, events).await?;
        *self.lock_state() = SequencerState::fresh(total);

        let mut aborted = false;
        for (index, engine) in slot.engines.iter_mut().enumerate() {
            engine.initialize();
            {
                let mut state = self.lock_state();
                state.current_index = Some(index);
                state.statuses[index] = TestStatus::Running;
            }
            emit(
                events,
                GradeEvent::TestStarted {
                    index,
                    name: engine.spec().name().to_string(),
                },
            );

            let ctx = ExecContext {
                backend: self.backend.as_ref(),
                session: self.session,
                index,
                events,
            };
            let report = engine.run(ctx).await;
            let failed = report.outcome.failed();

            {
                let mut state = self.lock_state();
                state.statuses[index] = report.outcome.status();
                state.outcomes.push(report.outcome.clone());
            }
            emit(events, GradeEvent::TestFinished(report));

            if failed && engine.spec().is_fatal() {
                warn!(index, test = engine.spec().name(), "fatal test failed, stopping");
                aborted = true;
                break;
            }
        }

        let outcome = {
            let mut state = self.lock_state();
            state.current_index = None;
            for status in state.statuses.iter_mut() {
                if *status == TestStatus::Pending {
                    *status = TestStatus::Skipped;
                }
            }
            ActivityOutcome {
                outcomes: state.outcomes.clone(),
                aborted,
            }
        };
        info!(
            tests = outcome.outcomes.len(),
            failed = outcome.outcomes.iter().filter(|o| o.failed()).count(),
            aborted,
            "run finished"
        );
        emit(events, GradeEvent::RunFinished(outcome.clone()));
        Ok(outcome)
    }

    /// Push sources the sandbox does not have yet.
    async fn upload_sources(
        &self,
        slot: &mut RunSlot,
        events: Option<&EventSender>,
    ) -> Result<(), SubmitError> {
        let pending = self.sources.take_pending(slot.force_upload);
        let mut files = Vec::with_capacity(pending.len());
        let mut bytes = 0;

        for upload in pending {
            self.backend
                .upload_file(self.session, &upload.filename, &upload.content)
                .await
                .map_err(|source| SubmitError::Upload {
                    filename: upload.filename.clone(),
                    source,
                })?;
            self.sources.mark_uploaded(&upload);
            bytes += upload.content.len();
            files.push(upload.filename);
        }

        slot.force_upload = false;
        debug!(files = files.len(), bytes, "sources uploaded");
        emit(events, GradeEvent::SourcesUploaded { files, bytes });
        Ok(())
    }

    /// Forget the last run and put the sources back to their initial
    /// content. The backend session is left alone.
    pub fn reset(&self) -> Result<(), SubmitError> {
        let mut slot = self.slot.try_lock().map_err(|_| SubmitError::RunInProgress)?;
        self.sources.restore();
        slot.force_upload = true;
        *self.lock_state() = SequencerState::fresh(slot.engines.len());
        debug!("activity reset");
        Ok(())
    }
}
