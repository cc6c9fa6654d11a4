use std::io::{self, Write};

use crossterm::style::Stylize;
use tokio::sync::mpsc;

use crate::engine::GradeEvent;
use crate::models::{CheckOutcome, CheckSpec, Matcher, TestReport, TestSpec, TestStatus};

/// Make visually similar multi-line strings distinguishable: tabs and
/// newlines become visible arrows, other control characters a box.
pub fn render_printable(s: &str) -> String {
    const NUL: char = '\u{2370}';
    const TAB: char = '\u{27F6}';
    const NL: &str = "\u{21B2}\n";

    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\t' => out.push(TAB),
            '\n' => out.push_str(NL),
            ' '..='~' => out.push(c),
            _ => out.push(NUL),
        }
    }
    out
}

/// Per-test status bookkeeping, updated from the event stream.
#[derive(Debug, Clone)]
pub struct Progress {
    statuses: Vec<TestStatus>,
    done: usize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            statuses: vec![TestStatus::Pending; total],
            done: 0,
        }
    }

    pub fn apply(&mut self, event: &GradeEvent) {
        match event {
            GradeEvent::RunStarted { total } => *self = Self::new(*total),
            GradeEvent::TestStarted { index, .. } => {
                if let Some(status) = self.statuses.get_mut(*index) {
                    *status = TestStatus::Running;
                }
            }
            GradeEvent::TestFinished(report) => {
                self.done += 1;
                if let Some(status) = self.statuses.get_mut(report.index) {
                    *status = report.outcome.status();
                }
            }
            GradeEvent::RunFinished(_) => {
                for status in &mut self.statuses {
                    if !status.is_terminal() {
                        *status = TestStatus::Skipped;
                    }
                }
            }
            GradeEvent::SourcesUploaded { .. } | GradeEvent::CommandFinished { .. } => {}
        }
    }

    pub fn statuses(&self) -> &[TestStatus] {
        &self.statuses
    }

    /// Share of tests finished, from 0.0 to 1.0.
    pub fn fraction(&self) -> f64 {
        if self.statuses.is_empty() {
            0.0
        } else {
            self.done as f64 / self.statuses.len() as f64
        }
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|l| format!("    {}", l))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Feedback lines for one check.
pub fn describe_check(check: &CheckSpec, outcome: &CheckOutcome) -> Vec<String> {
    let source = &check.source;
    let expected = match check.matcher {
        Matcher::Regex(_) => check.expected().to_string(),
        Matcher::Exact(_) => indent(&render_printable(check.expected())),
    };

    if outcome.passed {
        let what = if check.matcher.is_regex() {
            "matches regular expression"
        } else {
            "matches"
        };
        return vec![format!("Output {} {}:", source, what), expected];
    }

    let Some(ref observed) = outcome.observed else {
        return vec![format!("Output {} does not exist.", source)];
    };
    let observed = indent(&render_printable(observed));

    if check.matcher.is_regex() {
        vec![
            format!("Output {} does not match regular expression:", source),
            format!("    {}", expected),
            "Program output:".into(),
            observed,
        ]
    } else {
        vec![
            format!("Output {} differs from expected value.", source),
            "Program output:".into(),
            observed,
            "Expected value:".into(),
            expected,
        ]
    }
}

/// Feedback lines for a finished test, headed by its last primary command.
pub fn describe_test(spec: &TestSpec, report: &TestReport) -> Vec<String> {
    let command = spec
        .cmds()
        .last()
        .map(String::as_str)
        .unwrap_or(spec.name());
    let last = report.outcome.last_exec_result.as_ref();
    let mut lines = Vec::new();

    if report.outcome.run_failed {
        let code = last.map(|r| r.exit_code).unwrap_or_default();
        lines.push(format!("Command `{}` failed with exit code {}.", command, code));
        if let Some(stderr) = last.map(|r| r.stderr.as_str()).filter(|s| !s.is_empty()) {
            lines.push(indent(&render_printable(stderr)));
        }
    } else if report.outcome.check_failed {
        lines.push(format!(
            "Command `{}` succeeded, but some checks failed.",
            command
        ));
    } else {
        lines.push(format!("Command `{}` succeeded.", command));
        // With no checks, the output is the only feedback worth showing.
        if spec.checks().is_empty()
            && let Some(stdout) = last.map(|r| r.stdout.as_str()).filter(|s| !s.trim().is_empty())
        {
            lines.push(indent(&render_printable(stdout)));
        }
    }

    for (check, outcome) in spec.checks().iter().zip(&report.checks) {
        lines.extend(describe_check(check, outcome));
    }
    lines
}

/// Renders grading events as plain terminal output.
pub struct TerminalReporter {
    title: String,
    tests: Vec<TestSpec>,
    progress: Progress,
}

impl TerminalReporter {
    pub fn new(title: impl Into<String>, tests: Vec<TestSpec>) -> Self {
        let progress = Progress::new(tests.len());
        Self {
            title: title.into(),
            tests,
            progress,
        }
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn handle(&mut self, event: GradeEvent, out: &mut impl Write) -> io::Result<()> {
        self.progress.apply(&event);
        let total = self.tests.len();

        match event {
            GradeEvent::RunStarted { total } => {
                writeln!(out, "{} ({} tests)", self.title.as_str().bold(), total)?;
            }
            GradeEvent::SourcesUploaded { files, bytes } if !files.is_empty() => {
                writeln!(
                    out,
                    "Uploaded {} ({} bytes)",
                    files.join(", "),
                    bytes
                )?;
            }
            GradeEvent::TestFinished(report) => {
                let status = report.outcome.status();
                writeln!(
                    out,
                    "{} [{}/{}] {}",
                    status.icon().with(status.color()),
                    report.index + 1,
                    total,
                    report.name
                )?;
                if let Some(spec) = self.tests.get(report.index) {
                    for line in describe_test(spec, &report) {
                        writeln!(out, "  {}", line.replace('\n', "\n  "))?;
                    }
                }
            }
            GradeEvent::RunFinished(outcome) => {
                let summary = outcome.summary(total);
                write!(
                    out,
                    "{} passed, {} failed, {} skipped",
                    summary.passed, summary.failed, summary.skipped
                )?;
                if outcome.aborted {
                    write!(out, " (stopped after a fatal test failed)")?;
                }
                writeln!(out)?;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Print events until the sender side closes.
pub async fn print_events(
    mut reporter: TerminalReporter,
    mut rx: mpsc::UnboundedReceiver<GradeEvent>,
) -> io::Result<()> {
    let mut out = io::stdout();
    while let Some(event) = rx.recv().await {
        reporter.handle(event, &mut out)?;
        out.flush()?;
    }
    Ok(())
}
