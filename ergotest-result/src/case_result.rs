// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{RunResult, TestMark, TestName, TestStatus};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// The composite result of one test case: its `beforeEach` chain, its `it`
/// body, and its `afterEach` chain.
///
/// The overall status is never stored; it is always derived from
/// `before_each`, `it`, and `after_each` by [`TestStatus::derive`]. This
/// mirrors the suite tree, where a case's status cannot be observed except
/// by running it.
#[derive(Clone, Debug)]
pub struct TestCaseResult {
    mark: TestMark,
    before_each: Vec<RunResult>,
    after_each: Vec<RunResult>,
    it: RunResult,
}

impl TestCaseResult {
    pub fn new(mark: TestMark, before_each: Vec<RunResult>, it: RunResult, after_each: Vec<RunResult>) -> Self {
        Self {
            mark,
            before_each,
            after_each,
            it,
        }
    }

    /// Convenience constructor for a `beforeAll`/`afterAll` result, which
    /// wraps a single [`RunResult`] with empty before/after arrays.
    pub fn from_hook(mark: TestMark, result: RunResult) -> Self {
        Self::new(mark, Vec::new(), result, Vec::new())
    }

    pub fn mark(&self) -> TestMark {
        self.mark
    }

    pub fn before_each(&self) -> &[RunResult] {
        &self.before_each
    }

    pub fn after_each(&self) -> &[RunResult] {
        &self.after_each
    }

    pub fn it(&self) -> &RunResult {
        &self.it
    }

    pub fn name(&self) -> &TestName {
        self.it.name()
    }

    pub fn filename(&self) -> Option<&camino::Utf8Path> {
        self.it.filename()
    }

    pub fn status(&self) -> TestStatus {
        let before_after = self
            .before_each
            .iter()
            .chain(self.after_each.iter())
            .map(RunResult::status);
        TestStatus::derive(before_after, self.it.status())
    }

    pub fn is_pass(&self) -> bool {
        self.status() == TestStatus::Pass
    }

    pub fn is_fail(&self) -> bool {
        self.status() == TestStatus::Fail
    }

    pub fn is_skip(&self) -> bool {
        self.status() == TestStatus::Skip
    }

    pub fn is_timeout(&self) -> bool {
        self.status() == TestStatus::Timeout
    }

    pub fn equals(&self, other: &Self) -> bool {
        self.mark == other.mark
            && self.it.equals(&other.it)
            && self.before_each.len() == other.before_each.len()
            && self.after_each.len() == other.after_each.len()
            && self
                .before_each
                .iter()
                .zip(&other.before_each)
                .all(|(a, b)| a.equals(b))
            && self
                .after_each
                .iter()
                .zip(&other.after_each)
                .all(|(a, b)| a.equals(b))
    }

    /// All marks in this result that match `marks`, preorder (just this
    /// case, since a case has no children with independent marks).
    pub fn all_matching_marks(&self, marks: &[TestMark]) -> Vec<&TestCaseResult> {
        if marks.contains(&self.mark) {
            vec![self]
        } else {
            Vec::new()
        }
    }

    pub fn serialize(&self) -> SerializedTestCaseResult {
        SerializedTestCaseResult {
            kind: CaseResultTag::TestCaseResult,
            name: self.it.name().clone().into(),
            filename: self.it.filename().map(Utf8PathBuf::from),
            mark: self.mark,
            status: self.it.status(),
            error_message: self.it.error_message().map(str::to_owned),
            error_render: self.it.error_render().cloned(),
            timeout: self.it.timeout_value().map(|d| d.as_millis() as u64),
            before_each: self.before_each.iter().map(RunResult::clone).collect(),
            after_each: self.after_each.iter().map(RunResult::clone).collect(),
        }
    }

    pub fn deserialize(serialized: SerializedTestCaseResult) -> Self {
        let name = TestName::from(serialized.name);
        let it = match serialized.status {
            TestStatus::Fail => RunResult::fail(
                name,
                serialized.filename,
                serialized.error_message.unwrap_or_default(),
                serialized.error_render,
            ),
            TestStatus::Timeout => RunResult::timeout(
                name,
                serialized.filename,
                std::time::Duration::from_millis(serialized.timeout.unwrap_or(0)),
            ),
            TestStatus::Skip => RunResult::skip(name, serialized.filename),
            TestStatus::Pass => RunResult::pass(name, serialized.filename),
        };
        Self::new(serialized.mark, serialized.before_each, it, serialized.after_each)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename = "TestCaseResult")]
enum CaseResultTag {
    TestCaseResult,
}

/// The wire shape of a [`TestCaseResult`], matching the worker protocol in
/// `spec.md` §6 (`SerializedTestCaseResult`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedTestCaseResult {
    #[serde(rename = "type")]
    kind: CaseResultTag,
    pub name: Vec<String>,
    pub mark: TestMark,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<Utf8PathBuf>,
    pub status: TestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_render: Option<serde_json::Value>,
    /// Milliseconds; present iff `status == Timeout`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    pub before_each: Vec<RunResult>,
    pub after_each: Vec<RunResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass_run(name: &str) -> RunResult {
        RunResult::pass(TestName::new([name]), None)
    }

    #[test]
    fn round_trip_preserves_equality() {
        let case = TestCaseResult::new(
            TestMark::None,
            vec![pass_run("before")],
            RunResult::fail(TestName::new(["it"]), None, "oops", Some(serde_json::json!({"x": 1}))),
            vec![pass_run("after")],
        );
        let restored = TestCaseResult::deserialize(case.serialize());
        assert!(case.equals(&restored));
    }

    #[test]
    fn clean_skip_reports_skip_status() {
        let case = TestCaseResult::new(
            TestMark::None,
            vec![pass_run("before")],
            RunResult::skip(TestName::new(["it"]), None),
            vec![pass_run("after")],
        );
        assert!(case.is_skip());
    }
}
