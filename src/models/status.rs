use crossterm::style::Color;
use serde::{Deserialize, Serialize};

/// Display status of a single test within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TestStatus {
    #[default]
    Pending,
    Running,
    Passed,
    Failed,
    /// Never started because an earlier fatal test failed.
    Skipped,
}

impl TestStatus {
    pub fn icon(&self) -> &'static str {
        match self {
            TestStatus::Pending => "◌",
            TestStatus::Running => "⟳",
            TestStatus::Passed => "✔",
            TestStatus::Failed => "✘",
            TestStatus::Skipped => "⊘",
        }
    }

    pub fn color(&self) -> Color {
        match self {
            TestStatus::Passed => Color::Green,
            TestStatus::Failed => Color::Red,
            TestStatus::Running => Color::Yellow,
            TestStatus::Skipped => Color::DarkGrey,
            TestStatus::Pending => Color::Grey,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TestStatus::Passed | TestStatus::Failed)
    }
}
