pub mod check;
pub mod declaration;
pub mod exec;
pub mod outcome;
pub mod status;

pub use check::{CheckOutcome, CheckSource, CheckSpec, Matcher};
pub use declaration::{CheckDeclaration, CheckKind, CheckOutput, TestDeclaration};
pub use exec::{ExecResult, TIMEOUT_EXIT_CODE, UNAVAILABLE_EXIT_CODE};
pub use outcome::{ActivityOutcome, RunSummary, TestOutcome, TestReport};
pub use status::TestStatus;
pub use test::{DEFAULT_TIMEOUT_MS, TestSpec};
