//! Typed results produced by collectors.
//!
//! A collector reports what it captured as an [`OutputCollection`]: an ordered list of
//! [`OutputEntry`] values, each tagged with an [`OutputKind`]. Downstream tooling can walk
//! the collection without knowing which backend produced it.
//!
//! ```
//! use devcollect::output::{OutputCollection, OutputEntry, OutputKind};
//!
//! let mut output = OutputCollection::new();
//! output.append(OutputEntry::new("/tmp/trace.bin", "FILE").unwrap());
//! output.append(OutputEntry::metric("cpu_freq_avg"));
//!
//! assert_eq!(output[0].kind(), OutputKind::File);
//! assert_eq!(output[0].to_string(), "/tmp/trace.bin");
//! assert!(output[1].path().is_none());
//! ```
use std::{
    fmt,
    ops::Index,
    path::{Path, PathBuf},
    str::FromStr,
};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::error::OutputError;

/// The kind of a collected result.
///
/// Parsed case-insensitively, always rendered in lowercase.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum OutputKind {
    /// A single file.
    File,
    /// A directory of files.
    Directory,
    /// A scalar measurement identified by name.
    Metric,
}

impl OutputKind {
    /// Returns `true` for kinds whose value is a filesystem path.
    pub fn is_path(&self) -> bool {
        matches!(self, Self::File | Self::Directory)
    }

    pub(crate) fn valid_kinds() -> String {
        Self::iter().join(" ")
    }

    /// Parses a kind tag, ignoring case.
    pub fn parse(kind: &str) -> Result<Self, OutputError> {
        OutputKind::from_str(kind).map_err(|_| OutputError::InvalidKind { kind: kind.to_string() })
    }
}

impl TryFrom<String> for OutputKind {
    type Error = OutputError;

    fn try_from(kind: String) -> Result<Self, Self::Error> {
        Self::parse(&kind)
    }
}

/// A single tagged result: a path or a metric identifier.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputEntry {
    value: String,
    kind: OutputKind,
}

impl OutputEntry {
    /// Creates an entry from a kind tag such as `"file"` or `"METRIC"`.
    ///
    /// Fails with [`OutputError::InvalidKind`] if the tag is not a known kind.
    pub fn new(value: impl Into<String>, kind: &str) -> Result<Self, OutputError> {
        let kind = OutputKind::parse(kind)?;
        Ok(Self::with_kind(value, kind))
    }

    /// Creates an entry with an already validated kind.
    pub fn with_kind(value: impl Into<String>, kind: OutputKind) -> Self {
        Self { value: value.into(), kind }
    }

    /// Creates a `file` entry.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::with_kind(path.as_ref().to_string_lossy(), OutputKind::File)
    }

    /// Creates a `directory` entry.
    pub fn directory(path: impl AsRef<Path>) -> Self {
        Self::with_kind(path.as_ref().to_string_lossy(), OutputKind::Directory)
    }

    /// Creates a `metric` entry.
    pub fn metric(name: impl Into<String>) -> Self {
        Self::with_kind(name, OutputKind::Metric)
    }

    /// Returns the raw value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns the kind.
    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    /// Returns the path for file and directory entries, `None` for metrics.
    pub fn path(&self) -> Option<&Path> {
        self.kind.is_path().then(|| Path::new(&self.value))
    }

    /// Returns the path, failing with [`OutputError::NotAPath`] for metrics.
    pub fn as_path(&self) -> Result<&Path, OutputError> {
        self.path().ok_or_else(|| OutputError::NotAPath { value: self.value.clone() })
    }
}

impl fmt::Display for OutputEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl fmt::Debug for OutputEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} ({})>", self.value, self.kind)
    }
}

impl TryFrom<OutputEntry> for PathBuf {
    type Error = OutputError;

    fn try_from(entry: OutputEntry) -> Result<Self, Self::Error> {
        match entry.kind {
            OutputKind::Metric => Err(OutputError::NotAPath { value: entry.value }),
            _ => Ok(PathBuf::from(entry.value)),
        }
    }
}

impl<'a> TryFrom<&'a OutputEntry> for &'a Path {
    type Error = OutputError;

    fn try_from(entry: &'a OutputEntry) -> Result<Self, Self::Error> {
        entry.as_path()
    }
}

/// An ordered sequence of [`OutputEntry`] produced by one retrieval.
///
/// Order is insertion order. Entries are never removed individually.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputCollection {
    entries: Vec<OutputEntry>,
}

impl OutputCollection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry to the end of the collection.
    pub fn append(&mut self, entry: OutputEntry) {
        self.entries.push(entry);
    }

    /// Alias of [`append`](Self::append).
    pub fn push(&mut self, entry: OutputEntry) {
        self.append(entry);
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the collection has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entry at `index`.
    pub fn get(&self, index: usize) -> Option<&OutputEntry> {
        self.entries.get(index)
    }

    /// Returns `true` if an equal entry is present.
    pub fn contains(&self, entry: &OutputEntry) -> bool {
        self.entries.contains(entry)
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, OutputEntry> {
        self.entries.iter()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Index<usize> for OutputCollection {
    type Output = OutputEntry;

    fn index(&self, index: usize) -> &Self::Output {
        &self.entries[index]
    }
}

impl IntoIterator for OutputCollection {
    type Item = OutputEntry;
    type IntoIter = std::vec::IntoIter<OutputEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a OutputCollection {
    type Item = &'a OutputEntry;
    type IntoIter = std::slice::Iter<'a, OutputEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<OutputEntry> for OutputCollection {
    fn from_iter<I: IntoIterator<Item = OutputEntry>>(iter: I) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

impl Extend<OutputEntry> for OutputCollection {
    fn extend<I: IntoIterator<Item = OutputEntry>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}
