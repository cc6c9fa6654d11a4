//! Pure check evaluation. Nothing here knows about timing or backends.

use crate::models::{CheckOutcome, CheckSource, CheckSpec, ExecResult, Matcher};

/// Evaluate `check` against the observed value. A missing value always fails.
pub fn evaluate(check: &CheckSpec, observed: Option<&str>) -> CheckOutcome {
    let passed = match (observed, &check.matcher) {
        (None, _) => false,
        (Some(data), Matcher::Exact(expected)) => data == expected,
        (Some(data), Matcher::Regex(re)) => re.is_match(data),
    };
    CheckOutcome {
        passed,
        observed: observed.map(str::to_owned),
    }
}

/// Pick the stream a stdout/stderr check reads from. File checks and
/// tests that never ran a command observe nothing here.
pub fn observe_stream<'a>(check: &CheckSpec, exec: Option<&'a ExecResult>) -> Option<&'a str> {
    let exec = exec?;
    match check.source {
        CheckSource::Stdout => Some(&exec.stdout),
        CheckSource::Stderr => Some(&exec.stderr),
        CheckSource::File(_) => None,
    }
}

/// Decode downloaded file contents for comparison.
pub fn decode_file(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}
