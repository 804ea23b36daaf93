// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::case_result::SerializedTestCaseResult;
use crate::{TestCaseResult, TestMark, TestName, TestStatus};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// A node in a result tree: either a leaf case result or a nested suite
/// result.
#[derive(Clone, Debug)]
pub enum TestResult {
    Case(TestCaseResult),
    Suite(TestSuiteResult),
}

impl TestResult {
    pub fn mark(&self) -> TestMark {
        match self {
            Self::Case(case) => case.mark(),
            Self::Suite(suite) => suite.mark,
        }
    }

    pub fn equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Case(a), Self::Case(b)) => a.equals(b),
            (Self::Suite(a), Self::Suite(b)) => a.equals(b),
            _ => false,
        }
    }

    fn push_all_tests<'a>(&'a self, out: &mut Vec<&'a TestCaseResult>) {
        match self {
            Self::Case(case) => out.push(case),
            Self::Suite(suite) => suite.push_all_tests(out),
        }
    }

    fn push_marked<'a>(&'a self, marks: &[TestMark], out: &mut Vec<MarkedResult<'a>>) {
        match self {
            Self::Case(case) => {
                if marks.contains(&case.mark()) {
                    out.push(MarkedResult::Case(case));
                }
            }
            Self::Suite(suite) => suite.push_marked(marks, out),
        }
    }
}

/// A case or suite result whose mark matches a query, as returned by
/// [`TestSuiteResult::all_marked_results`] / `all_matching_marks`.
#[derive(Clone, Copy, Debug)]
pub enum MarkedResult<'a> {
    Case(&'a TestCaseResult),
    Suite(&'a TestSuiteResult),
}

impl MarkedResult<'_> {
    pub fn mark(&self) -> TestMark {
        match self {
            Self::Case(case) => case.mark(),
            Self::Suite(suite) => suite.mark,
        }
    }
}

/// Per-status tallies over a flattened result tree.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Counts {
    pub pass: usize,
    pub fail: usize,
    pub skip: usize,
    pub timeout: usize,
}

impl Counts {
    pub fn total(&self) -> usize {
        self.pass + self.fail + self.skip + self.timeout
    }

    fn add(&mut self, status: TestStatus) {
        match status {
            TestStatus::Pass => self.pass += 1,
            TestStatus::Fail => self.fail += 1,
            TestStatus::Skip => self.skip += 1,
            TestStatus::Timeout => self.timeout += 1,
        }
    }
}

/// The composite result of one suite: its `beforeAll`/`afterAll` hook
/// results, in declaration order, and its child case/sub-suite results, in
/// declaration order.
#[derive(Clone, Debug)]
pub struct TestSuiteResult {
    name: TestName,
    filename: Option<Utf8PathBuf>,
    mark: TestMark,
    before_all: Vec<TestCaseResult>,
    after_all: Vec<TestCaseResult>,
    children: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn new(
        name: TestName,
        filename: Option<Utf8PathBuf>,
        mark: TestMark,
        before_all: Vec<TestCaseResult>,
        after_all: Vec<TestCaseResult>,
        children: Vec<TestResult>,
    ) -> Self {
        Self {
            name,
            filename,
            mark,
            before_all,
            after_all,
            children,
        }
    }

    pub fn name(&self) -> &TestName {
        &self.name
    }

    pub fn filename(&self) -> Option<&camino::Utf8Path> {
        self.filename.as_deref()
    }

    pub fn mark(&self) -> TestMark {
        self.mark
    }

    pub fn before_all(&self) -> &[TestCaseResult] {
        &self.before_all
    }

    pub fn after_all(&self) -> &[TestCaseResult] {
        &self.after_all
    }

    pub fn children(&self) -> &[TestResult] {
        &self.children
    }

    fn push_all_tests<'a>(&'a self, out: &mut Vec<&'a TestCaseResult>) {
        out.extend(self.before_all.iter());
        for child in &self.children {
            child.push_all_tests(out);
        }
        out.extend(self.after_all.iter());
    }

    /// Flattens to case results, preorder, with `beforeAll`/`afterAll`
    /// wrappers of each suite appearing around that suite's own children.
    pub fn all_tests(&self) -> Vec<&TestCaseResult> {
        let mut out = Vec::new();
        self.push_all_tests(&mut out);
        out
    }

    pub fn all_matching_tests(&self, statuses: &[TestStatus]) -> Vec<&TestCaseResult> {
        self.all_tests()
            .into_iter()
            .filter(|case| statuses.contains(&case.status()))
            .collect()
    }

    fn push_marked<'a>(&'a self, marks: &[TestMark], out: &mut Vec<MarkedResult<'a>>) {
        if marks.contains(&self.mark) {
            out.push(MarkedResult::Suite(self));
        }
        for case in &self.before_all {
            if marks.contains(&case.mark()) {
                out.push(MarkedResult::Case(case));
            }
        }
        for child in &self.children {
            child.push_marked(marks, out);
        }
        for case in &self.after_all {
            if marks.contains(&case.mark()) {
                out.push(MarkedResult::Case(case));
            }
        }
    }

    /// All cases and suites whose mark is not `none`, preorder; includes
    /// this suite itself if it matches.
    pub fn all_marked_results(&self) -> Vec<MarkedResult<'_>> {
        self.all_matching_marks(&[TestMark::Skip, TestMark::Only])
    }

    pub fn all_matching_marks(&self, marks: &[TestMark]) -> Vec<MarkedResult<'_>> {
        let mut out = Vec::new();
        self.push_marked(marks, &mut out);
        out
    }

    /// Filenames for which every flattened case result passes.
    pub fn all_passing_files(&self) -> BTreeSet<Utf8PathBuf> {
        let mut by_file: std::collections::BTreeMap<Utf8PathBuf, bool> = Default::default();
        for case in self.all_tests() {
            let Some(filename) = case.filename() else {
                continue;
            };
            let entry = by_file.entry(filename.to_owned()).or_insert(true);
            *entry &= case.is_pass();
        }
        by_file
            .into_iter()
            .filter_map(|(file, all_pass)| all_pass.then_some(file))
            .collect()
    }

    pub fn count(&self) -> Counts {
        let mut counts = Counts::default();
        for case in self.all_tests() {
            counts.add(case.status());
        }
        counts
    }

    pub fn equals(&self, other: &Self) -> bool {
        self.name == other.name
            && self.filename == other.filename
            && self.mark == other.mark
            && self.before_all.len() == other.before_all.len()
            && self.after_all.len() == other.after_all.len()
            && self.children.len() == other.children.len()
            && self
                .before_all
                .iter()
                .zip(&other.before_all)
                .all(|(a, b)| a.equals(b))
            && self
                .after_all
                .iter()
                .zip(&other.after_all)
                .all(|(a, b)| a.equals(b))
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| a.equals(b))
    }

    /// A minimal plain-text rendering. The colorized, stack-trace-highlighted
    /// renderer described in `spec.md` §1 as out of scope is expected to
    /// layer its own formatting on top of the data this returns.
    pub fn render(&self, preamble: Option<&str>, elapsed: Option<Duration>) -> String {
        let counts = self.count();
        let mut out = String::new();
        if let Some(preamble) = preamble {
            out.push_str(preamble);
            out.push('\n');
        }
        for case in self.all_matching_tests(&[TestStatus::Fail, TestStatus::Timeout]) {
            out.push_str(&format!("{}: {:?}\n", case.name(), case.status()));
            if let Some(message) = case.it().error_message() {
                out.push_str(&format!("  {message}\n"));
            }
        }
        out.push_str(&format!(
            "{} passed, {} failed, {} skipped, {} timed out ({} total)",
            counts.pass,
            counts.fail,
            counts.skip,
            counts.timeout,
            counts.total(),
        ));
        if let Some(elapsed) = elapsed {
            out.push_str(&format!(" in {:.2}s", elapsed.as_secs_f64()));
        }
        out
    }

    pub fn serialize(&self) -> SerializedTestSuiteResult {
        SerializedTestSuiteResult {
            kind: SuiteResultTag::TestSuiteResult,
            name: self.name.clone().into(),
            mark: self.mark,
            filename: self.filename.clone(),
            tests: self.children.iter().map(TestResult::serialize).collect(),
            before_all: self.before_all.iter().map(TestCaseResult::serialize).collect(),
            after_all: self.after_all.iter().map(TestCaseResult::serialize).collect(),
        }
    }

    pub fn deserialize(serialized: SerializedTestSuiteResult) -> Self {
        Self::new(
            TestName::from(serialized.name),
            serialized.filename,
            serialized.mark,
            serialized
                .before_all
                .into_iter()
                .map(TestCaseResult::deserialize)
                .collect(),
            serialized
                .after_all
                .into_iter()
                .map(TestCaseResult::deserialize)
                .collect(),
            serialized.tests.into_iter().map(TestResult::deserialize).collect(),
        )
    }
}

impl TestResult {
    fn serialize(&self) -> SerializedTestResult {
        match self {
            Self::Case(case) => SerializedTestResult::Case(case.serialize()),
            Self::Suite(suite) => SerializedTestResult::Suite(suite.serialize()),
        }
    }

    fn deserialize(serialized: SerializedTestResult) -> Self {
        match serialized {
            SerializedTestResult::Case(case) => Self::Case(TestCaseResult::deserialize(case)),
            SerializedTestResult::Suite(suite) => Self::Suite(TestSuiteResult::deserialize(suite)),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename = "TestSuiteResult")]
enum SuiteResultTag {
    TestSuiteResult,
}

/// The wire shape of a [`TestSuiteResult`], matching `spec.md` §6
/// (`SerializedTestSuiteResult`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializedTestSuiteResult {
    #[serde(rename = "type")]
    kind: SuiteResultTag,
    pub name: Vec<String>,
    pub mark: TestMark,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<Utf8PathBuf>,
    pub tests: Vec<SerializedTestResult>,
    #[serde(rename = "beforeAll")]
    pub before_all: Vec<SerializedTestCaseResult>,
    #[serde(rename = "afterAll")]
    pub after_all: Vec<SerializedTestCaseResult>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SerializedTestResult {
    Case(SerializedTestCaseResult),
    Suite(SerializedTestSuiteResult),
}
