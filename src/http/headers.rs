//! Case-insensitive, order-preserving header collection.
//!
//! # Design Decisions
//! - Names compare case-insensitively; the case of the first insertion is
//!   kept for display
//! - Re-setting an existing name replaces the value in place, so iteration
//!   order is insertion order of first appearance
//! - Backed by a `Vec`: header sets are small and order matters more than
//!   lookup speed

use std::fmt;

/// A single header pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Ordered collection of headers with case-insensitive names.
///
/// `PartialEq` is order-sensitive; use [`HeaderSet::same_entries`] for an
/// order-insensitive comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<Header>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|h| h.name.eq_ignore_ascii_case(name))
    }

    /// Insert or replace a header. An existing entry keeps its position and
    /// display name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx].value = value,
            None => self.entries.push(Header { name, value }),
        }
    }

    /// Builder-style `set`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|idx| self.entries[idx].value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Remove a header, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|idx| self.entries.remove(idx).value)
    }

    /// Merge `other` into `self`. Existing names are only replaced when
    /// `overwrite` is set.
    pub fn merge(&mut self, other: &HeaderSet, overwrite: bool) {
        for header in &other.entries {
            if overwrite || !self.contains(&header.name) {
                self.set(header.name.clone(), header.value.clone());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|h| (h.name.as_str(), h.value.as_str()))
    }

    /// Display names in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|h| h.name.as_str()).collect()
    }

    /// Pairs sorted by lowercase name.
    pub fn sorted(&self) -> Vec<(String, &str)> {
        let mut pairs: Vec<_> = self
            .entries
            .iter()
            .map(|h| (h.name.to_ascii_lowercase(), h.value.as_str()))
            .collect();
        pairs.sort();
        pairs
    }

    /// Order-insensitive equality.
    pub fn same_entries(&self, other: &HeaderSet) -> bool {
        self.sorted() == other.sorted()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut set = HeaderSet::new();
        for (name, value) in iter {
            set.set(name, value);
        }
        set
    }
}

impl<N: Into<String>, V: Into<String>> Extend<(N, V)> for HeaderSet {
    fn extend<I: IntoIterator<Item = (N, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.set(name, value);
        }
    }
}

/// One `Name: value` line per header, in insertion order.
impl fmt::Display for HeaderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, h) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}: {}", h.name, h.value)?;
        }
        Ok(())
    }
}
