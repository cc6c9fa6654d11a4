use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Where a check reads its observed value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckSource {
    Stdout,
    Stderr,
    File(String),
}

impl fmt::Display for CheckSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckSource::Stdout => f.write_str("stdout"),
            CheckSource::Stderr => f.write_str("stderr"),
            CheckSource::File(name) => write!(f, "file {}", name),
        }
    }
}

/// How the observed value is compared to the expected one.
/// Patterns are compiled when the check is built, never at run time.
#[derive(Debug, Clone)]
pub enum Matcher {
    Exact(String),
    Regex(Regex),
}

impl Matcher {
    pub fn is_regex(&self) -> bool {
        matches!(self, Matcher::Regex(_))
    }

    pub fn expected(&self) -> &str {
        match self {
            Matcher::Exact(s) => s,
            Matcher::Regex(re) => re.as_str(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckSpec {
    pub matcher: Matcher,
    pub source: CheckSource,
}

impl CheckSpec {
    pub fn exact(source: CheckSource, expected: impl Into<String>) -> Self {
        Self {
            matcher: Matcher::Exact(expected.into()),
            source,
        }
    }

    pub fn regex(source: CheckSource, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            matcher: Matcher::Regex(Regex::new(pattern)?),
            source,
        })
    }

    pub fn expected(&self) -> &str {
        self.matcher.expected()
    }

    pub fn reads_file(&self) -> Option<&str> {
        match &self.source {
            CheckSource::File(name) => Some(name),
            _ => None,
        }
    }
}

/// Result of one evaluated check. `observed` is `None` when the source
/// (typically a file) did not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub passed: bool,
    pub observed: Option<String>,
}
