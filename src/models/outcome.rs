use serde::{Deserialize, Serialize};

use super::check::CheckOutcome;
use super::exec::ExecResult;
use super::status::TestStatus;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Set the first time a primary command exits non-zero.
    pub run_failed: bool,
    /// Set when any evaluated check did not pass.
    pub check_failed: bool,
    /// Last result of a setup or primary command; teardown never overwrites it.
    pub last_exec_result: Option<ExecResult>,
}

impl TestOutcome {
    pub fn failed(&self) -> bool {
        self.run_failed || self.check_failed
    }

    pub fn status(&self) -> TestStatus {
        if self.failed() {
            TestStatus::Failed
        } else {
            TestStatus::Passed
        }
    }
}

/// Everything a reporter needs about one finished test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub index: usize,
    pub name: String,
    pub outcome: TestOutcome,
    /// One entry per declared check, in declaration order. Empty when the
    /// checks were skipped.
    pub checks: Vec<CheckOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityOutcome {
    /// Outcomes of the tests that actually ran, in test order.
    pub outcomes: Vec<TestOutcome>,
    /// Sequencing stopped early because a fatal test failed.
    pub aborted: bool,
}

impl ActivityOutcome {
    pub fn passed(&self) -> bool {
        !self.aborted && self.outcomes.iter().all(|o| !o.failed())
    }

    pub fn first_failure(&self) -> Option<usize> {
        self.outcomes.iter().position(TestOutcome::failed)
    }

    pub fn summary(&self, total: usize) -> RunSummary {
        let failed = self.outcomes.iter().filter(|o| o.failed()).count();
        RunSummary {
            total,
            passed: self.outcomes.len() - failed,
            failed,
            skipped: total.saturating_sub(self.outcomes.len()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}
