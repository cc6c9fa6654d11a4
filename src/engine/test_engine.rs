use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::backend::{ExecutionBackend, SessionHandle};
use crate::models::{CheckOutcome, ExecResult, TestOutcome, TestReport, TestSpec};

use super::evaluator::{decode_file, evaluate, observe_stream};
use super::events::{EventSender, GradeEvent, emit};
use super::step::{Phase, Step, plan};

/// What a test engine needs from its surroundings while it runs.
#[derive(Clone, Copy)]
pub struct ExecContext<'a> {
    pub backend: &'a dyn ExecutionBackend,
    pub session: SessionHandle,
    /// Position of the test within its activity.
    pub index: usize,
    pub events: Option<&'a EventSender>,
}

/// Drives one test through its step sequence.
///
/// The engine suspends only while a command is in flight and while the
/// checks are being joined; every other step completes synchronously.
pub struct TestEngine {
    spec: TestSpec,
    steps: Vec<Step>,
    cursor: usize,
    phase: Phase,
    run_failed: bool,
    check_failed: bool,
    last_exec: Option<ExecResult>,
    checks: Vec<CheckOutcome>,
}

impl TestEngine {
    pub fn new(spec: TestSpec) -> Self {
        let steps = plan(&spec);
        let cursor = steps.len();
        Self {
            spec,
            steps,
            cursor,
            phase: Phase::Idle,
            run_failed: false,
            check_failed: false,
            last_exec: None,
            checks: Vec::new(),
        }
    }

    pub fn spec(&self) -> &TestSpec {
        &self.spec
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Clear transient state and rewind the cursor to the first step.
    pub fn initialize(&mut self) {
        self.cursor = 0;
        self.phase = Phase::Idle;
        self.run_failed = false;
        self.check_failed = false;
        self.last_exec = None;
        self.checks.clear();
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.steps.len()
    }

    pub fn failed(&self) -> bool {
        self.run_failed || self.check_failed
    }

    pub fn outcome(&self) -> TestOutcome {
        TestOutcome {
            run_failed: self.run_failed,
            check_failed: self.check_failed,
            last_exec_result: self.last_exec.clone(),
        }
    }

    fn report(&self, index: usize) -> TestReport {
        TestReport {
            index,
            name: self.spec.name().to_string(),
            outcome: self.outcome(),
            checks: self.checks.clone(),
        }
    }

    /// Execute the step under the cursor and move past it.
    /// Returns the final report once the `Finish` step has run.
    pub async fn advance(&mut self, ctx: ExecContext<'_>) -> Option<TestReport> {
        let step = self.steps.get(self.cursor)?.clone();
        self.cursor += 1;

        match step {
            Step::EnterPhase(phase) => {
                debug!(test = self.spec.name(), %phase, "entering phase");
                self.phase = phase;
                None
            }
            Step::RunCommand(command) => {
                self.run_command(ctx, command).await;
                None
            }
            Step::RunChecks => {
                self.run_checks(ctx).await;
                None
            }
            Step::Finish => {
                self.phase = Phase::Idle;
                debug!(
                    test = self.spec.name(),
                    run_failed = self.run_failed,
                    check_failed = self.check_failed,
                    "test finished"
                );
                Some(self.report(ctx.index))
            }
        }
    }

    /// Advance until the test finishes.
    #[tracing::instrument(skip_all, fields(test = self.spec.name(), index = ctx.index))]
    pub async fn run(&mut self, ctx: ExecContext<'_>) -> TestReport {
        while !self.is_finished() {
            if let Some(report) = self.advance(ctx).await {
                return report;
            }
        }
        self.report(ctx.index)
    }

    async fn run_command(&mut self, ctx: ExecContext<'_>, command: String) {
        // Teardown always runs: it is what cleans the sandbox up.
        if self.run_failed && self.phase != Phase::Postcmds {
            debug!(test = self.spec.name(), command, "skipping after failure");
            return;
        }

        let result = match ctx
            .backend
            .exec(ctx.session, &command, self.spec.timeout_ms())
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(test = self.spec.name(), command, "backend failed: {e}");
                ExecResult::unavailable(e.to_string())
            }
        };

        match self.phase {
            Phase::Cmds => {
                if !result.success() {
                    debug!(
                        test = self.spec.name(),
                        command,
                        exit_code = result.exit_code,
                        "primary command failed"
                    );
                    self.run_failed = true;
                }
                self.last_exec = Some(result.clone());
            }
            Phase::Precmds => self.last_exec = Some(result.clone()),
            Phase::Postcmds | Phase::Idle => {}
        }

        emit(
            ctx.events,
            GradeEvent::CommandFinished {
                index: ctx.index,
                phase: self.phase,
                command,
                result,
            },
        );
    }

    async fn run_checks(&mut self, ctx: ExecContext<'_>) {
        if self.spec.checks().is_empty() || self.run_failed {
            return;
        }

        let last = self.last_exec.as_ref();
        let name = self.spec.name();
        // join_all yields results in input order, whatever order the
        // downloads resolve in.
        let pending: Vec<_> = self
            .spec
            .checks()
            .iter()
            .map(move |check| async move {
                let Some(filename) = check.reads_file() else {
                    return evaluate(check, observe_stream(check, last));
                };
                let observed = match ctx.backend.download_file(ctx.session, filename).await {
                    Ok(bytes) => bytes.map(decode_file),
                    Err(e) => {
                        warn!(test = name, filename, "download failed: {e}");
                        None
                    }
                };
                evaluate(check, observed.as_deref())
            })
            .collect();

        let outcomes = join_all(pending).await;
        let any_failed = outcomes.iter().any(|o| !o.passed);
        debug!(
            test = self.spec.name(),
            checks = outcomes.len(),
            any_failed,
            "checks joined"
        );
        self.check_failed = self.check_failed || any_failed;
        self.checks = outcomes;
    }
}
