// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// A hierarchical test name: the outermost suite name first, then each
/// nested suite, then the case or hook name last.
///
/// Empty (`""`) segments are elided when the name is rendered, so that
/// `describe("")` nodes (used to group tests without adding a visible
/// prefix) don't leave a stray separator behind.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestName(Vec<String>);

impl TestName {
    pub fn new(segments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Returns a new name with `segment` appended, unless it is empty.
    pub fn appended(&self, segment: impl Into<String>) -> Self {
        let segment = segment.into();
        let mut segments = self.0.clone();
        if !segment.is_empty() {
            segments.push(segment);
        }
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }
}

impl fmt::Display for TestName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in self.0.iter().filter(|s| !s.is_empty()) {
            if !first {
                write!(f, " > ")?;
            }
            first = false;
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl From<Vec<String>> for TestName {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<TestName> for Vec<String> {
    fn from(name: TestName) -> Self {
        name.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_elides_empty_segments() {
        let name = TestName::new(["outer", "", "inner"]);
        assert_eq!(name.to_string(), "outer > inner");
    }

    #[test]
    fn appended_skips_empty_segment() {
        let name = TestName::new(["outer"]).appended("");
        assert_eq!(name, TestName::new(["outer"]));
    }
}
