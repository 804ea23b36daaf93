// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The immutable suite tree: [`TestSuite`], [`TestCase`], and
//! [`BeforeAfter`]. None of these types expose a public mutation API once
//! built; the DSL in [`crate::dsl`] is the only supported way to construct
//! one.

use crate::config::RunConfig;
use camino::{Utf8Path, Utf8PathBuf};
use ergotest_result::{TestMark, TestName};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The error type a user function's future resolves with on failure — the
/// Rust analogue of a rejected promise or a thrown non-`Error` value.
pub type UserError = Box<dyn std::error::Error + Send + Sync>;

/// A hook or case body: given the run's configuration, returns a boxed
/// future that resolves `Ok(())` on success or `Err` on failure.
pub type UserFn = Arc<dyn Fn(RunConfig) -> BoxFuture<'static, Result<(), UserError>> + Send + Sync>;

fn synthetic_fail_fn(message: String) -> UserFn {
    Arc::new(move |_config| {
        let message = message.clone();
        Box::pin(async move { Err(message.into()) })
    })
}

/// One node in a suite tree: either a nested suite or a leaf case.
#[derive(Clone)]
pub enum TestNode {
    Suite(TestSuite),
    Case(TestCase),
}

impl TestNode {
    pub fn mark(&self) -> TestMark {
        match self {
            Self::Suite(s) => s.mark,
            Self::Case(c) => c.mark,
        }
    }

    pub fn name(&self) -> &TestName {
        match self {
            Self::Suite(s) => &s.name,
            Self::Case(c) => &c.name,
        }
    }
}

impl fmt::Debug for TestNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suite(s) => f.debug_tuple("Suite").field(&s.name).finish(),
            Self::Case(c) => f.debug_tuple("Case").field(&c.name).finish(),
        }
    }
}

/// A `beforeAll`/`afterAll`/`beforeEach`/`afterEach` hook.
#[derive(Clone)]
pub struct BeforeAfter {
    name: TestName,
    timeout: Option<Duration>,
    func: UserFn,
}

impl BeforeAfter {
    pub fn new(name: TestName, timeout: Option<Duration>, func: UserFn) -> Self {
        Self { name, timeout, func }
    }

    pub fn name(&self) -> &TestName {
        &self.name
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn func(&self) -> &UserFn {
        &self.func
    }
}

impl fmt::Debug for BeforeAfter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeforeAfter")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// A single test, produced by `it`.
#[derive(Clone)]
pub struct TestCase {
    name: TestName,
    mark: TestMark,
    timeout: Option<Duration>,
    func: Option<UserFn>,
}

impl TestCase {
    /// Builds a case, enforcing the invariant that a case with no body is
    /// coerced to `skip` — or, if marked `only`, becomes a synthetic
    /// failure explaining the misuse, since an only-marked case with
    /// nothing to run can't be silently dropped from an only-mode run.
    pub fn new(name: TestName, mark: TestMark, timeout: Option<Duration>, func: Option<UserFn>) -> Self {
        match (mark, func) {
            (TestMark::Only, None) => Self {
                func: Some(synthetic_fail_fn(format!(
                    "{name} is marked '.only', but it has no body"
                ))),
                name,
                mark: TestMark::Only,
                timeout,
            },
            (_, None) => Self {
                name,
                mark: TestMark::Skip,
                timeout,
                func: None,
            },
            (mark, Some(func)) => Self {
                name,
                mark,
                timeout,
                func: Some(func),
            },
        }
    }

    pub fn name(&self) -> &TestName {
        &self.name
    }

    pub fn mark(&self) -> TestMark {
        self.mark
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn func(&self) -> Option<&UserFn> {
        self.func.as_ref()
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("mark", &self.mark)
            .field("timeout", &self.timeout)
            .field("has_body", &self.func.is_some())
            .finish()
    }
}

/// A named container of child suites, cases, and hooks, produced by
/// `describe`. Immutable after construction.
#[derive(Clone)]
pub struct TestSuite {
    name: TestName,
    mark: TestMark,
    timeout: Option<Duration>,
    before_all: Vec<BeforeAfter>,
    after_all: Vec<BeforeAfter>,
    before_each: Vec<BeforeAfter>,
    after_each: Vec<BeforeAfter>,
    children: Vec<TestNode>,
    filename: Option<Utf8PathBuf>,
}

impl TestSuite {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: TestName,
        mark: TestMark,
        timeout: Option<Duration>,
        children: Vec<TestNode>,
        before_all: Vec<BeforeAfter>,
        after_all: Vec<BeforeAfter>,
        before_each: Vec<BeforeAfter>,
        after_each: Vec<BeforeAfter>,
    ) -> Self {
        let children = if mark == TestMark::Only && children.is_empty() {
            vec![TestNode::Case(TestCase::new(
                name.clone(),
                TestMark::Only,
                None,
                Some(synthetic_fail_fn(format!(
                    "{name} is marked '.only', but it has no body"
                ))),
            ))]
        } else {
            children
        };
        Self {
            name,
            mark,
            timeout,
            before_all,
            after_all,
            before_each,
            after_each,
            children,
            filename: None,
        }
    }

    pub fn name(&self) -> &TestName {
        &self.name
    }

    pub fn mark(&self) -> TestMark {
        self.mark
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn before_all(&self) -> &[BeforeAfter] {
        &self.before_all
    }

    pub fn after_all(&self) -> &[BeforeAfter] {
        &self.after_all
    }

    pub fn before_each(&self) -> &[BeforeAfter] {
        &self.before_each
    }

    pub fn after_each(&self) -> &[BeforeAfter] {
        &self.after_each
    }

    pub fn children(&self) -> &[TestNode] {
        &self.children
    }

    pub fn filename(&self) -> Option<&Utf8Path> {
        self.filename.as_deref()
    }

    /// Attaches `filename` to this suite. One-shot: the module loader calls
    /// this exactly once, immediately after importing the module that
    /// produced this suite.
    pub fn with_filename(mut self, filename: Utf8PathBuf) -> Self {
        assert!(
            self.filename.is_none(),
            "TestSuite::with_filename called twice on suite '{}'",
            self.name
        );
        self.filename = Some(filename);
        self
    }

    /// Whether any node in this subtree is marked `only`.
    pub fn has_only(&self) -> bool {
        self.mark == TestMark::Only
            || self.children.iter().any(|child| match child {
                TestNode::Suite(s) => s.has_only(),
                TestNode::Case(c) => c.mark() == TestMark::Only,
            })
    }
}

impl fmt::Debug for TestSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSuite")
            .field("name", &self.name)
            .field("mark", &self.mark)
            .field("timeout", &self.timeout)
            .field("filename", &self.filename)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_without_body_is_skipped() {
        let case = TestCase::new(TestName::new(["t"]), TestMark::None, None, None);
        assert_eq!(case.mark(), TestMark::Skip);
        assert!(case.func().is_none());
    }

    #[test]
    fn only_case_without_body_becomes_synthetic_failure() {
        let case = TestCase::new(TestName::new(["t"]), TestMark::Only, None, None);
        assert_eq!(case.mark(), TestMark::Only);
        assert!(case.func().is_some());
    }

    #[test]
    fn empty_only_suite_gets_synthetic_failing_case() {
        let suite = TestSuite::new(
            TestName::new(["s"]),
            TestMark::Only,
            None,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        assert_eq!(suite.children().len(), 1);
    }

    #[test]
    fn filename_can_only_be_set_once() {
        let suite = TestSuite::new(
            TestName::new(["s"]),
            TestMark::None,
            None,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        let suite = suite.with_filename(Utf8PathBuf::from("/a.so"));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            suite.with_filename(Utf8PathBuf::from("/b.so"))
        }));
        assert!(result.is_err());
    }
}
