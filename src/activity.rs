use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::{ActivityError, SourceError};
use crate::models::{TestDeclaration, TestSpec};

/// One editable source artifact of an activity.
#[derive(Debug, Clone)]
pub struct SourceFile {
    filename: String,
    initial: String,
    content: String,
    /// Reference solution.
    key: String,
    hidden: bool,
    read_only: bool,
    /// 1-based inclusive line ranges of `initial` that edits must keep.
    locked: Vec<RangeInclusive<usize>>,
    /// Bumped on every change to `content`.
    revision: u64,
    uploaded_revision: Option<u64>,
}

impl SourceFile {
    pub fn new(filename: impl Into<String>, data: impl Into<String>) -> Self {
        let data = data.into();
        Self {
            filename: filename.into(),
            initial: data.clone(),
            key: data.clone(),
            content: data,
            hidden: false,
            read_only: false,
            locked: Vec::new(),
            revision: 0,
            uploaded_revision: None,
        }
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Lock line ranges of the initial content against edits.
    pub fn with_locked_lines(mut self, ranges: Vec<RangeInclusive<usize>>) -> Self {
        self.locked = ranges;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn locked_lines(&self) -> &[RangeInclusive<usize>] {
        &self.locked
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Every locked block of the initial content still appears, in order
    /// and line for line, in `content`.
    fn keeps_locked_lines(&self, content: &str) -> bool {
        let initial: Vec<&str> = self.initial.split('\n').collect();
        let lines: Vec<&str> = content.split('\n').collect();
        let mut from = 0;
        for range in &self.locked {
            let Some(block) = initial.get(range.start() - 1..*range.end()) else {
                continue;
            };
            match lines[from..].windows(block.len()).position(|w| w == block) {
                Some(at) => from += at + block.len(),
                None => return false,
            }
        }
        true
    }

    /// Changed since the last upload, or never uploaded.
    pub fn is_dirty(&self) -> bool {
        self.uploaded_revision != Some(self.revision)
    }
}

/// A file waiting to be sent to the sandbox, pinned to the revision read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub filename: String,
    pub content: String,
    revision: u64,
}

/// Shared handle over an activity's source files.
///
/// The editor side mutates content through [`SourceFiles::edit`]; the
/// sequencer only reads content and records what it has uploaded.
#[derive(Debug, Clone, Default)]
pub struct SourceFiles {
    files: Arc<Mutex<Vec<SourceFile>>>,
}

impl SourceFiles {
    pub fn new(files: impl IntoIterator<Item = SourceFile>) -> Self {
        Self {
            files: Arc::new(Mutex::new(files.into_iter().collect())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SourceFile>> {
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().iter().map(|f| f.filename.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of one file.
    pub fn get(&self, filename: &str) -> Option<SourceFile> {
        self.lock().iter().find(|f| f.filename == filename).cloned()
    }

    pub fn content(&self, filename: &str) -> Option<String> {
        self.lock()
            .iter()
            .find(|f| f.filename == filename)
            .map(|f| f.content.clone())
    }

    pub fn is_dirty(&self, filename: &str) -> Option<bool> {
        self.lock()
            .iter()
            .find(|f| f.filename == filename)
            .map(SourceFile::is_dirty)
    }

    /// Replace the content of a visible, writable file.
    pub fn edit(&self, filename: &str, content: impl Into<String>) -> Result<(), SourceError> {
        let mut files = self.lock();
        let file = files
            .iter_mut()
            .find(|f| f.filename == filename)
            .ok_or_else(|| SourceError::Unknown(filename.to_string()))?;
        if file.hidden {
            return Err(SourceError::Hidden(filename.to_string()));
        }
        if file.read_only {
            return Err(SourceError::ReadOnly(filename.to_string()));
        }
        let content = content.into();
        if !file.keeps_locked_lines(&content) {
            return Err(SourceError::LockedLines(filename.to_string()));
        }
        if file.content != content {
            file.content = content;
            file.revision += 1;
        }
        Ok(())
    }

    /// Put every file back to its initial content.
    pub fn restore(&self) {
        for file in self.lock().iter_mut() {
            if file.content != file.initial {
                file.content = file.initial.clone();
                file.revision += 1;
            }
        }
    }

    /// Replace every file with its reference solution, locks included.
    pub fn load_key(&self) {
        for file in self.lock().iter_mut() {
            if file.content != file.key {
                file.content = file.key.clone();
                file.revision += 1;
            }
        }
    }

    /// Files to upload: all of them when `force` is set, otherwise the dirty ones.
    pub(crate) fn take_pending(&self, force: bool) -> Vec<PendingUpload> {
        self.lock()
            .iter()
            .filter(|f| force || f.is_dirty())
            .map(|f| PendingUpload {
                filename: f.filename.clone(),
                content: f.content.clone(),
                revision: f.revision,
            })
            .collect()
    }

    /// Record a finished upload. Edits made since the content was read keep
    /// the file dirty.
    pub(crate) fn mark_uploaded(&self, upload: &PendingUpload) {
        if let Some(file) = self
            .lock()
            .iter_mut()
            .find(|f| f.filename == upload.filename)
        {
            file.uploaded_revision = Some(upload.revision);
        }
    }
}

/// On-disk description of an activity.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivityFile {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub prompt: Option<String>,
    /// Default per-command timeout for tests that set none.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    pub skeleton: Vec<SkeletonFile>,
    #[serde(default)]
    pub tests: Vec<TestEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkeletonFile {
    pub filename: String,
    #[serde(default)]
    pub data: String,
    /// Reference solution; the skeleton itself when absent.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub readonly: ReadOnly,
}

/// Which part of a skeleton file the learner may not change.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ReadOnly {
    Whole(bool),
    Lines(Vec<LineRange>),
    Except(ExceptLines),
}

impl Default for ReadOnly {
    fn default() -> Self {
        Self::Whole(false)
    }
}

/// Everything is locked but the listed lines.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExceptLines {
    pub except: Vec<LineRange>,
}

/// One line or a span of lines. Negative numbers count back from the end
/// of the file, `-1` being the last line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LineRange {
    Line(i64),
    Span(LineSpan),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineSpan {
    #[serde(default = "first_line")]
    pub from: i64,
    #[serde(default = "last_line")]
    pub to: i64,
}

fn first_line() -> i64 {
    1
}

fn last_line() -> i64 {
    -1
}

impl LineRange {
    fn bounds(self) -> (i64, i64) {
        match self {
            Self::Line(line) => (line, line),
            Self::Span(span) => (span.from, span.to),
        }
    }
}

impl ReadOnly {
    pub fn is_whole(&self) -> bool {
        matches!(self, Self::Whole(true))
    }

    fn ranges(&self) -> &[LineRange] {
        match self {
            Self::Whole(_) => &[],
            Self::Lines(ranges) => ranges,
            Self::Except(except) => &except.except,
        }
    }

    /// Line 0 does not exist in either direction.
    fn is_valid(&self) -> bool {
        self.ranges().iter().all(|r| {
            let (from, to) = r.bounds();
            from != 0 && to != 0
        })
    }

    /// Resolve against `data` into sorted, merged, 1-based line ranges.
    /// Whole-file locking is reported by [`ReadOnly::is_whole`] instead.
    pub fn locked_lines(&self, data: &str) -> Vec<RangeInclusive<usize>> {
        let total = data.matches('\n').count() as i64 + 1;
        let spans = match self {
            Self::Whole(_) => Vec::new(),
            Self::Lines(ranges) => merge_lines(ranges, total),
            Self::Except(except) => invert_lines(&merge_lines(&except.except, total), total),
        };
        spans
            .into_iter()
            .map(|(start, end)| start as usize..=end as usize)
            .collect()
    }
}

fn merge_lines(ranges: &[LineRange], total: i64) -> Vec<(i64, i64)> {
    let resolve = |n: i64| {
        let line = if n < 0 { total + n + 1 } else { n };
        line.clamp(1, total)
    };
    let mut spans: Vec<(i64, i64)> = ranges
        .iter()
        .map(|r| {
            let (from, to) = r.bounds();
            let (a, b) = (resolve(from), resolve(to));
            (a.min(b), a.max(b))
        })
        .collect();
    spans.sort_unstable();

    let mut merged: Vec<(i64, i64)> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        match merged.last_mut() {
            Some(last) if start <= last.1 + 1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

fn invert_lines(spans: &[(i64, i64)], total: i64) -> Vec<(i64, i64)> {
    let mut gaps = Vec::new();
    let mut next = 1;
    for &(start, end) in spans {
        if start > next {
            gaps.push((next, start - 1));
        }
        next = end + 1;
    }
    if next <= total {
        gaps.push((next, total));
    }
    gaps
}

/// A test is either written inline or shipped as an encoded blob. Tables
/// with a `params` key are blobs.
#[derive(Debug, Deserialize)]
#[serde(try_from = "toml::Table")]
pub enum TestEntry {
    Encoded(EncodedTest),
    Inline(TestDeclaration),
}

impl TryFrom<toml::Table> for TestEntry {
    type Error = toml::de::Error;

    fn try_from(table: toml::Table) -> Result<Self, Self::Error> {
        let encoded = table.contains_key("params");
        let value = toml::Value::Table(table);
        if encoded {
            value.try_into().map(Self::Encoded)
        } else {
            value.try_into().map(Self::Inline)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncodedTest {
    pub params: String,
}

/// A validated activity, ready to hand to a sequencer.
#[derive(Debug)]
pub struct Activity {
    pub id: String,
    pub title: String,
    pub prompt: Option<String>,
    pub tests: Vec<TestSpec>,
    pub sources: SourceFiles,
}

impl ActivityFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid activity file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse activity TOML")
    }

    /// Validate the activity and compile its tests. `default_timeout_ms`
    /// applies when neither a test nor the activity sets a timeout.
    pub fn build(self, default_timeout_ms: u64) -> Result<Activity, ActivityError> {
        if self.skeleton.is_empty() {
            return Err(ActivityError::EmptySkeleton);
        }
        let mut seen = HashSet::new();
        for (index, file) in self.skeleton.iter().enumerate() {
            if file.filename.is_empty() {
                return Err(ActivityError::EmptyFilename(index));
            }
            if !seen.insert(file.filename.as_str()) {
                return Err(ActivityError::DuplicateFilename(file.filename.clone()));
            }
            if !file.readonly.is_valid() {
                return Err(ActivityError::InvalidLineRange(file.filename.clone()));
            }
        }

        let timeout = self.timeout_ms.unwrap_or(default_timeout_ms);
        let tests = self
            .tests
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let decl = match entry {
                    TestEntry::Inline(decl) => decl,
                    TestEntry::Encoded(encoded) => TestDeclaration::from_blob(&encoded.params)
                        .map_err(|source| ActivityError::Test { index, source })?,
                };
                TestSpec::from_declaration(decl, timeout)
                    .map_err(|source| ActivityError::Test { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let sources = SourceFiles::new(self.skeleton.into_iter().map(|f| {
            let locked = f.readonly.locked_lines(&f.data);
            let key = f.key.unwrap_or_else(|| f.data.clone());
            SourceFile::new(f.filename, f.data)
                .hidden(f.hidden)
                .read_only(f.readonly.is_whole())
                .with_locked_lines(locked)
                .with_key(key)
        }));

        Ok(Activity {
            id: self.id,
            title: self.title,
            prompt: self.prompt,
            tests,
            sources,
        })
    }
}
