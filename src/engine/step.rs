use std::fmt;

use crate::models::TestSpec;

/// Which command list of a test is currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Precmds,
    Cmds,
    Postcmds,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Precmds => "precmds",
            Phase::Cmds => "cmds",
            Phase::Postcmds => "postcmds",
        })
    }
}

/// One element of a test's flattened execution sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    EnterPhase(Phase),
    RunCommand(String),
    RunChecks,
    Finish,
}

/// Flatten a test into
/// `[enter precmds, ..precmds, enter cmds, ..cmds, checks, enter postcmds, ..postcmds, finish]`.
pub fn plan(spec: &TestSpec) -> Vec<Step> {
    let commands = spec.precmds().len() + spec.cmds().len() + spec.postcmds().len();
    let mut steps = Vec::with_capacity(commands + 5);

    steps.push(Step::EnterPhase(Phase::Precmds));
    steps.extend(spec.precmds().iter().cloned().map(Step::RunCommand));
    steps.push(Step::EnterPhase(Phase::Cmds));
    steps.extend(spec.cmds().iter().cloned().map(Step::RunCommand));
    steps.push(Step::RunChecks);
    steps.push(Step::EnterPhase(Phase::Postcmds));
    steps.extend(spec.postcmds().iter().cloned().map(Step::RunCommand));
    steps.push(Step::Finish);

    steps
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn plan_orders_phases_around_checks() {
        let spec = TestSpec::new("t", ["make", "./a.out"])
            .with_precmds(["rm -f out"])
            .with_postcmds(["make clean"]);

        assert_eq!(
            plan(&spec),
            vec![
                Step::EnterPhase(Phase::Precmds),
                Step::RunCommand("rm -f out".into()),
                Step::EnterPhase(Phase::Cmds),
                Step::RunCommand("make".into()),
                Step::RunCommand("./a.out".into()),
                Step::RunChecks,
                Step::EnterPhase(Phase::Postcmds),
                Step::RunCommand("make clean".into()),
                Step::Finish,
            ]
        );
    }

    #[test]
    fn empty_test_still_has_markers() {
        let spec = TestSpec::new("t", Vec::<String>::new());
        let steps = plan(&spec);
        assert_eq!(steps.len(), 5);
        assert_eq!(steps.last(), Some(&Step::Finish));
    }
}
