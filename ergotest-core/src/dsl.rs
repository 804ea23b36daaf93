// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `describe`/`it`/hook registration, backed by a thread-local context
//! stack — the Rust analogue of the process-wide context stack `spec.md`
//! §4.4/§9 describes, specialized per-thread since the loader runs each
//! module's top-level `describe` callback to completion on a single
//! thread before any other module's callback can interleave with it.

use crate::config::RunConfig;
use crate::suite::{BeforeAfter, TestCase, TestNode, TestSuite, UserError, UserFn};
use ergotest_result::{TestMark, TestName};
use futures::future::BoxFuture;
use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default)]
pub struct DescribeOptions {
    pub timeout: Option<Duration>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CaseOptions {
    pub timeout: Option<Duration>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HookOptions {
    pub timeout: Option<Duration>,
}

struct SuiteBuilder {
    name: TestName,
    mark: TestMark,
    timeout: Option<Duration>,
    children: Vec<TestNode>,
    before_all: Vec<BeforeAfter>,
    after_all: Vec<BeforeAfter>,
    before_each: Vec<BeforeAfter>,
    after_each: Vec<BeforeAfter>,
}

thread_local! {
    static STACK: RefCell<Vec<SuiteBuilder>> = const { RefCell::new(Vec::new()) };
}

/// Pops its stack frame when dropped, whether that happens because
/// `finish` ran or because a panicking `describe` callback is unwinding
/// through it — either way the frame leaves the stack exactly once.
struct PushGuard {
    popped: bool,
}

impl PushGuard {
    fn finish(mut self) -> SuiteBuilder {
        self.popped = true;
        STACK.with(|stack| stack.borrow_mut().pop()).expect("PushGuard frame already missing")
    }
}

impl Drop for PushGuard {
    fn drop(&mut self) {
        if !self.popped {
            STACK.with(|stack| {
                stack.borrow_mut().pop();
            });
        }
    }
}

fn push_frame(name: TestName, mark: TestMark, timeout: Option<Duration>) -> PushGuard {
    STACK.with(|stack| {
        stack.borrow_mut().push(SuiteBuilder {
            name,
            mark,
            timeout,
            children: Vec::new(),
            before_all: Vec::new(),
            after_all: Vec::new(),
            before_each: Vec::new(),
            after_each: Vec::new(),
        })
    });
    PushGuard { popped: false }
}

fn current_parent_name() -> TestName {
    STACK.with(|stack| stack.borrow().last().map(|frame| frame.name.clone()).unwrap_or_else(TestName::empty))
}

fn build_suite(name: String, mark: TestMark, options: DescribeOptions, f: impl FnOnce()) -> TestSuite {
    let full_name = current_parent_name().appended(name);
    let guard = push_frame(full_name, mark, options.timeout);
    f();
    let frame = guard.finish();
    let suite = TestSuite::new(
        frame.name,
        frame.mark,
        frame.timeout,
        frame.children,
        frame.before_all,
        frame.after_all,
        frame.before_each,
        frame.after_each,
    );
    STACK.with(|stack| {
        if let Some(parent) = stack.borrow_mut().last_mut() {
            parent.children.push(TestNode::Suite(suite.clone()));
        }
    });
    suite
}

pub fn describe(name: impl Into<String>, f: impl FnOnce()) -> TestSuite {
    build_suite(name.into(), TestMark::None, DescribeOptions::default(), f)
}

pub fn describe_with(name: impl Into<String>, options: DescribeOptions, f: impl FnOnce()) -> TestSuite {
    build_suite(name.into(), TestMark::None, options, f)
}

pub fn describe_only(name: impl Into<String>, f: impl FnOnce()) -> TestSuite {
    build_suite(name.into(), TestMark::Only, DescribeOptions::default(), f)
}

pub fn describe_only_with(name: impl Into<String>, options: DescribeOptions, f: impl FnOnce()) -> TestSuite {
    build_suite(name.into(), TestMark::Only, options, f)
}

pub fn describe_skip(name: impl Into<String>, f: impl FnOnce()) -> TestSuite {
    build_suite(name.into(), TestMark::Skip, DescribeOptions::default(), f)
}

pub fn describe_skip_with(name: impl Into<String>, options: DescribeOptions, f: impl FnOnce()) -> TestSuite {
    build_suite(name.into(), TestMark::Skip, options, f)
}

/// `describe(name)` with no body — a pending suite, recorded as skipped.
pub fn describe_pending(name: impl Into<String>) -> TestSuite {
    build_suite(name.into(), TestMark::Skip, DescribeOptions::default(), || {})
}

/// `describe.only(name)` with no body — nothing to run under an only-mode
/// filter, so `TestSuite::new`'s empty-only-suite rule synthesizes a single
/// failing case instead of silently dropping the suite.
pub fn describe_only_pending(name: impl Into<String>) -> TestSuite {
    build_suite(name.into(), TestMark::Only, DescribeOptions::default(), || {})
}

fn into_user_fn<F, Fut>(f: F) -> UserFn
where
    F: Fn(RunConfig) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), UserError>> + Send + 'static,
{
    Arc::new(move |config| Box::pin(f(config)) as BoxFuture<'static, Result<(), UserError>>)
}

fn register_case(name: String, mark: TestMark, timeout: Option<Duration>, func: Option<UserFn>) -> TestCase {
    STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let frame = stack.last_mut().expect("`it` called outside of a `describe` callback");
        let full_name = frame.name.appended(name);
        let case = TestCase::new(full_name, mark, timeout, func);
        frame.children.push(TestNode::Case(case.clone()));
        case
    })
}

pub fn it<F, Fut>(name: impl Into<String>, f: F) -> TestCase
where
    F: Fn(RunConfig) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), UserError>> + Send + 'static,
{
    register_case(name.into(), TestMark::None, None, Some(into_user_fn(f)))
}

pub fn it_with<F, Fut>(name: impl Into<String>, options: CaseOptions, f: F) -> TestCase
where
    F: Fn(RunConfig) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), UserError>> + Send + 'static,
{
    register_case(name.into(), TestMark::None, options.timeout, Some(into_user_fn(f)))
}

pub fn it_only<F, Fut>(name: impl Into<String>, f: F) -> TestCase
where
    F: Fn(RunConfig) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), UserError>> + Send + 'static,
{
    register_case(name.into(), TestMark::Only, None, Some(into_user_fn(f)))
}

pub fn it_skip<F, Fut>(name: impl Into<String>, f: F) -> TestCase
where
    F: Fn(RunConfig) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), UserError>> + Send + 'static,
{
    register_case(name.into(), TestMark::Skip, None, Some(into_user_fn(f)))
}

/// `it("name")` with no body — a pending test, recorded as a skip.
pub fn it_pending(name: impl Into<String>) -> TestCase {
    register_case(name.into(), TestMark::None, None, None)
}

/// `it.only("name")` with no body — nothing to run under an only-mode
/// filter, so it becomes a synthetic failing case instead of vanishing.
pub fn it_only_pending(name: impl Into<String>) -> TestCase {
    register_case(name.into(), TestMark::Only, None, None)
}

#[derive(Clone, Copy)]
enum HookCategory {
    BeforeAll,
    AfterAll,
    BeforeEach,
    AfterEach,
}

impl HookCategory {
    fn label(self) -> &'static str {
        match self {
            Self::BeforeAll => "beforeAll",
            Self::AfterAll => "afterAll",
            Self::BeforeEach => "beforeEach",
            Self::AfterEach => "afterEach",
        }
    }
}

fn register_hook(category: HookCategory, timeout: Option<Duration>, func: UserFn) {
    STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let frame = stack.last_mut().expect("hook called outside of a `describe` callback");
        let parent_name = frame.name.clone();
        let hooks = match category {
            HookCategory::BeforeAll => &mut frame.before_all,
            HookCategory::AfterAll => &mut frame.after_all,
            HookCategory::BeforeEach => &mut frame.before_each,
            HookCategory::AfterEach => &mut frame.after_each,
        };
        let occurrence = hooks.len();
        let label = if occurrence == 0 {
            format!("{}()", category.label())
        } else {
            format!("{}() #{}", category.label(), occurrence + 1)
        };
        hooks.push(BeforeAfter::new(parent_name.appended(label), timeout, func));
    });
}

macro_rules! hook_fns {
    ($register:ident, $register_with:ident, $category:expr) => {
        pub fn $register<F, Fut>(f: F)
        where
            F: Fn(RunConfig) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<(), UserError>> + Send + 'static,
        {
            register_hook($category, None, into_user_fn(f));
        }

        pub fn $register_with<F, Fut>(options: HookOptions, f: F)
        where
            F: Fn(RunConfig) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<(), UserError>> + Send + 'static,
        {
            register_hook($category, options.timeout, into_user_fn(f));
        }
    };
}

hook_fns!(before_all, before_all_with, HookCategory::BeforeAll);
hook_fns!(after_all, after_all_with, HookCategory::AfterAll);
hook_fns!(before_each, before_each_with, HookCategory::BeforeEach);
hook_fns!(after_each, after_each_with, HookCategory::AfterEach);

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_fn(_config: RunConfig) -> BoxFuture<'static, Result<(), UserError>> {
        Box::pin(async { Ok(()) })
    }

    #[test]
    fn describe_registers_nested_case_with_full_name() {
        let suite = describe("outer", || {
            it("t", ok_fn);
        });
        assert_eq!(suite.children().len(), 1);
        match &suite.children()[0] {
            TestNode::Case(case) => assert_eq!(case.name().to_string(), "outer > t"),
            TestNode::Suite(_) => panic!("expected a case"),
        }
    }

    #[test]
    fn nested_describe_registers_as_child_suite() {
        let outer = describe("outer", || {
            describe("inner", || {
                it("t", ok_fn);
            });
        });
        match &outer.children()[0] {
            TestNode::Suite(inner) => assert_eq!(inner.name().to_string(), "outer > inner"),
            TestNode::Case(_) => panic!("expected a suite"),
        }
    }

    #[test]
    fn it_outside_describe_panics() {
        let result = std::panic::catch_unwind(|| it("t", ok_fn));
        assert!(result.is_err());
    }

    #[test]
    fn hook_names_number_from_second_occurrence() {
        let suite = describe("s", || {
            before_each(ok_fn);
            before_each(ok_fn);
        });
        assert_eq!(suite.before_each()[0].name().to_string(), "s > beforeEach()");
        assert_eq!(suite.before_each()[1].name().to_string(), "s > beforeEach() #2");
    }

    #[test]
    fn panic_in_describe_callback_unwinds_stack_cleanly() {
        let result = std::panic::catch_unwind(|| {
            describe("will-panic", || {
                panic!("boom");
            })
        });
        assert!(result.is_err());

        // The stack must be back to empty, or this would nest under the
        // leftover frame instead of being a fresh top-level suite.
        let suite = describe("after-panic", || {
            it("t", ok_fn);
        });
        assert_eq!(suite.name().to_string(), "after-panic");
    }

    #[test]
    fn only_pending_case_becomes_synthetic_failure() {
        let suite = describe("s", || {
            it_only_pending("todo");
        });
        match &suite.children()[0] {
            TestNode::Case(case) => assert!(case.func().is_some()),
            TestNode::Suite(_) => panic!("expected a case"),
        }
    }

    #[test]
    fn pending_suite_is_marked_skip_with_no_children() {
        let suite = describe_pending("todo");
        assert_eq!(suite.mark(), TestMark::Skip);
        assert!(suite.children().is_empty());
    }

    #[test]
    fn only_pending_suite_becomes_synthetic_failing_case() {
        let suite = describe_only_pending("todo");
        assert_eq!(suite.mark(), TestMark::Only);
        assert_eq!(suite.children().len(), 1);
        match &suite.children()[0] {
            TestNode::Case(case) => assert!(case.func().is_some()),
            TestNode::Suite(_) => panic!("expected a synthetic failing case"),
        }
    }
}
