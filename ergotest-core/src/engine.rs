// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The execution engine (C5): walks a suite tree, respects marks, wires up
//! before/after chains, invokes user functions under per-call timeouts,
//! and produces a [`TestSuiteResult`].

use crate::clock::{timeout_async, Clock};
use crate::config::RunConfig;
use crate::render::RenderError;
use crate::suite::{BeforeAfter, TestCase, TestNode, TestSuite, UserError, UserFn};
use camino::Utf8PathBuf;
use ergotest_result::{TestCaseResult, TestMark, TestName, TestResult, TestStatus, TestSuiteResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Effective timeout used when no case, suite, or run-level timeout
/// applies to a given user function.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// How often the engine ticks its keep-alive sink while a run is in
/// progress, independent of test progress — must be shorter than whatever
/// watchdog timeout the caller pairs it with.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_millis(500);

/// Per-run configuration: the run-level timeout floor, the config map
/// handed to every user function, the clock driving all timing, and the
/// optional result-streaming and keep-alive sinks.
#[derive(Clone)]
pub struct RunOptions {
    pub timeout: Option<Duration>,
    pub config: RunConfig,
    pub clock: Arc<dyn Clock>,
    pub renderer: Option<Arc<dyn RenderError>>,
    pub on_test_case_result: Option<Arc<dyn Fn(&TestResult) + Send + Sync>>,
    pub on_keepalive: Option<Arc<dyn Fn() + Send + Sync>>,
    pub keepalive_interval: Duration,
}

impl RunOptions {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            timeout: None,
            config: RunConfig::empty(),
            clock,
            renderer: None,
            on_test_case_result: None,
            on_keepalive: None,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }
}

/// Runs `suite` to completion and returns its aggregated result.
#[instrument(level = "debug", skip_all, fields(suite = %suite.name()))]
pub async fn run(suite: &TestSuite, options: &RunOptions) -> TestSuiteResult {
    let only_mode = suite.has_only();
    let keepalive = options
        .on_keepalive
        .clone()
        .map(|sink| crate::clock::repeat(Arc::clone(&options.clock), options.keepalive_interval, move || sink()));

    let result = run_suite(suite, options, only_mode, false, false, options.timeout, None, &[], &[]).await;

    if let Some(keepalive) = keepalive {
        keepalive.cancel();
    }
    result
}

fn child_flags(mark: TestMark, force_only: bool, force_skip: bool) -> (bool, bool) {
    // An inherited `only` stops propagating once an intervening `skip` suite
    // is crossed (`spec.md` §4.5: only-inheritance requires no intervening
    // skip); `force_skip` itself keeps accumulating unconditionally.
    let force_only = force_only && mark != TestMark::Skip;
    (force_only || mark == TestMark::Only, force_skip || mark == TestMark::Skip)
}

/// Whether an `only` filter excludes this case given the flags inherited
/// from its ancestors. A case's own `only` always wins over an ancestor's
/// `skip` (and vice versa, an explicit `skip` always wins over an
/// inherited `only`), matching the mark-precedence scenario in `spec.md`
/// §8: a `.only` case nested inside a `.skip` suite still runs.
fn case_is_skipped(case: &TestCase, only_mode: bool, force_only: bool, force_skip: bool) -> bool {
    let is_only = force_only || case.mark() == TestMark::Only;
    if is_only {
        return false;
    }
    if case.mark() == TestMark::Skip || force_skip {
        return true;
    }
    only_mode
}

fn has_runnable_case(node: &TestNode, only_mode: bool, force_only: bool, force_skip: bool) -> bool {
    match node {
        TestNode::Case(case) => !case_is_skipped(case, only_mode, force_only, force_skip),
        TestNode::Suite(suite) => {
            let (force_only, force_skip) = child_flags(suite.mark(), force_only, force_skip);
            suite.children().iter().any(|child| has_runnable_case(child, only_mode, force_only, force_skip))
        }
    }
}

enum Outcome {
    Completed(Result<(), UserError>),
    Panicked(Box<dyn std::any::Any + Send>),
    TimedOut,
}

/// Extracts a human-readable message from a caught panic payload — `&str`
/// and `String` cover `panic!("...")` and `assert_eq!`'s formatted message,
/// the two shapes the standard panic hook itself knows how to print.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "user function panicked with a non-string payload".to_string()
    }
}

#[instrument(level = "debug", skip(func, options), fields(name = %name))]
async fn run_user_function(
    name: TestName,
    filename: Option<Utf8PathBuf>,
    mark: TestMark,
    func: &UserFn,
    effective_timeout: Duration,
    options: &RunOptions,
) -> ergotest_result::RunResult {
    let func = Arc::clone(func);
    let config = options.config.clone();
    let outcome = timeout_async(
        options.clock.as_ref(),
        effective_timeout,
        async move {
            match AssertUnwindSafe(func(config)).catch_unwind().await {
                Ok(result) => Outcome::Completed(result),
                Err(payload) => Outcome::Panicked(payload),
            }
        },
        async { Outcome::TimedOut },
    )
    .await;

    match outcome {
        Outcome::Completed(Ok(())) => ergotest_result::RunResult::pass(name, filename),
        Outcome::Completed(Err(error)) => {
            let render = options.renderer.as_ref().map(|r| r.render(&name, &error, mark, filename.as_deref()));
            warn!(error = %error, "user function failed");
            ergotest_result::RunResult::fail(name, filename, error.to_string(), render)
        }
        Outcome::Panicked(payload) => {
            let message = panic_message(&*payload);
            let error: UserError = message.clone().into();
            let render = options.renderer.as_ref().map(|r| r.render(&name, &error, mark, filename.as_deref()));
            warn!(message = %message, "user function panicked");
            ergotest_result::RunResult::fail(name, filename, message, render)
        }
        Outcome::TimedOut => {
            warn!(?effective_timeout, "user function timed out");
            ergotest_result::RunResult::timeout(name, filename, effective_timeout)
        }
    }
}

fn effective_timeout(own: Option<Duration>, inherited: Option<Duration>) -> Duration {
    own.or(inherited).unwrap_or(DEFAULT_TIMEOUT)
}

#[allow(clippy::too_many_arguments)]
async fn run_case(
    case: &TestCase,
    filename: Option<Utf8PathBuf>,
    inherited_timeout: Option<Duration>,
    before_each_chain: &[BeforeAfter],
    after_each_chain: &[BeforeAfter],
    only_mode: bool,
    force_only: bool,
    force_skip: bool,
    suite_before_all_failed: bool,
    options: &RunOptions,
) -> TestCaseResult {
    if suite_before_all_failed || case_is_skipped(case, only_mode, force_only, force_skip) {
        let before = before_each_chain
            .iter()
            .map(|hook| ergotest_result::RunResult::skip(hook.name().clone(), filename.clone()))
            .collect();
        let after = after_each_chain
            .iter()
            .rev()
            .map(|hook| ergotest_result::RunResult::skip(hook.name().clone(), filename.clone()))
            .collect();
        let it = ergotest_result::RunResult::skip(case.name().clone(), filename.clone());
        return TestCaseResult::new(case.mark(), before, it, after);
    }

    let mut before_each_results = Vec::with_capacity(before_each_chain.len());
    let mut before_each_failed = false;
    for hook in before_each_chain {
        if before_each_failed {
            before_each_results.push(ergotest_result::RunResult::skip(hook.name().clone(), filename.clone()));
            continue;
        }
        let timeout = effective_timeout(hook.timeout(), inherited_timeout);
        let result = run_user_function(hook.name().clone(), filename.clone(), TestMark::None, hook.func(), timeout, options).await;
        if result.status() != TestStatus::Pass {
            before_each_failed = true;
        }
        before_each_results.push(result);
    }

    let it_result = if before_each_failed {
        ergotest_result::RunResult::skip(case.name().clone(), filename.clone())
    } else {
        match case.func() {
            None => ergotest_result::RunResult::skip(case.name().clone(), filename.clone()),
            Some(func) => {
                let timeout = effective_timeout(case.timeout(), inherited_timeout);
                run_user_function(case.name().clone(), filename.clone(), case.mark(), func, timeout, options).await
            }
        }
    };

    // afterEach always runs, even if beforeEach or the case itself failed.
    let mut after_each_results = Vec::with_capacity(after_each_chain.len());
    for hook in after_each_chain.iter().rev() {
        let timeout = effective_timeout(hook.timeout(), inherited_timeout);
        after_each_results.push(run_user_function(hook.name().clone(), filename.clone(), TestMark::None, hook.func(), timeout, options).await);
    }

    TestCaseResult::new(case.mark(), before_each_results, it_result, after_each_results)
}

#[allow(clippy::too_many_arguments)]
fn run_suite<'a>(
    suite: &'a TestSuite,
    options: &'a RunOptions,
    only_mode: bool,
    force_only: bool,
    force_skip: bool,
    inherited_timeout: Option<Duration>,
    inherited_filename: Option<Utf8PathBuf>,
    before_each_chain: &'a [BeforeAfter],
    after_each_chain: &'a [BeforeAfter],
) -> BoxFuture<'a, TestSuiteResult> {
    Box::pin(async move {
        let (force_only, force_skip) = child_flags(suite.mark(), force_only, force_skip);
        let timeout = suite.timeout().or(inherited_timeout);
        let filename = suite.filename().map(Utf8PathBuf::from).or(inherited_filename);

        let has_runnable = suite
            .children()
            .iter()
            .any(|child| has_runnable_case(child, only_mode, force_only, force_skip));

        debug!(suite = %suite.name(), has_runnable, "entering suite");

        let mut before_each_chain_ext = before_each_chain.to_vec();
        before_each_chain_ext.extend(suite.before_each().iter().cloned());
        let mut after_each_chain_ext = after_each_chain.to_vec();
        after_each_chain_ext.extend(suite.after_each().iter().cloned());

        let mut before_all_failed = false;
        let mut before_all_results = Vec::with_capacity(suite.before_all().len());
        if has_runnable {
            for hook in suite.before_all() {
                if before_all_failed {
                    before_all_results.push(TestCaseResult::from_hook(
                        TestMark::None,
                        ergotest_result::RunResult::skip(hook.name().clone(), filename.clone()),
                    ));
                    continue;
                }
                let hook_timeout = effective_timeout(hook.timeout(), timeout);
                let result = run_user_function(hook.name().clone(), filename.clone(), TestMark::None, hook.func(), hook_timeout, options).await;
                if result.status() != TestStatus::Pass {
                    before_all_failed = true;
                }
                before_all_results.push(TestCaseResult::from_hook(TestMark::None, result));
            }
        }

        let mut children = Vec::with_capacity(suite.children().len());
        for child in suite.children() {
            let child_result = match child {
                TestNode::Case(case) => {
                    let case_result = run_case(
                        case,
                        filename.clone(),
                        timeout,
                        &before_each_chain_ext,
                        &after_each_chain_ext,
                        only_mode,
                        force_only,
                        force_skip,
                        before_all_failed,
                        options,
                    )
                    .await;
                    let result = TestResult::Case(case_result);
                    if let Some(sink) = &options.on_test_case_result {
                        sink(&result);
                    }
                    result
                }
                TestNode::Suite(inner) => {
                    TestResult::Suite(
                        run_suite(
                            inner,
                            options,
                            only_mode,
                            force_only,
                            force_skip,
                            timeout,
                            filename.clone(),
                            &before_each_chain_ext,
                            &after_each_chain_ext,
                        )
                        .await,
                    )
                }
            };
            children.push(child_result);
        }

        let mut after_all_results = Vec::with_capacity(suite.after_all().len());
        if has_runnable {
            for hook in suite.after_all() {
                let hook_timeout = effective_timeout(hook.timeout(), timeout);
                let result = run_user_function(hook.name().clone(), filename.clone(), TestMark::None, hook.func(), hook_timeout, options).await;
                after_all_results.push(TestCaseResult::from_hook(TestMark::None, result));
            }
        }

        TestSuiteResult::new(suite.name().clone(), filename, suite.mark(), before_all_results, after_all_results, children)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::RealClock;
    use crate::dsl::{describe, describe_only, describe_skip, it, it_only};
    use ergotest_result::{Counts, TestStatus};
    use pretty_assertions::assert_eq;

    fn options() -> RunOptions {
        RunOptions::new(Arc::new(RealClock::new()))
    }

    fn ok(_config: RunConfig) -> BoxFuture<'static, Result<(), UserError>> {
        Box::pin(async { Ok(()) })
    }

    fn fail(_config: RunConfig) -> BoxFuture<'static, Result<(), UserError>> {
        Box::pin(async { Err("boom".into()) })
    }

    #[tokio::test]
    async fn happy_path_single_passing_case() {
        let suite = describe("top", || {
            it("t", ok);
        });
        let result = run(&suite, &options()).await;
        assert_eq!(result.count().pass, 1);
    }

    #[tokio::test]
    async fn only_mode_skips_unmarked_siblings() {
        let suite = describe("top", || {
            it_only("marked", ok);
            it("unmarked", ok);
        });
        let result = run(&suite, &options()).await;
        assert_eq!(
            result.count(),
            Counts {
                pass: 1,
                fail: 0,
                skip: 1,
                timeout: 0,
            }
        );
    }

    #[tokio::test]
    async fn only_case_nested_in_skip_suite_still_runs() {
        let suite = describe_skip("outer", || {
            describe("inner", || {
                it_only("t", ok);
            });
        });
        let result = run(&suite, &options()).await;
        let cases = result.all_tests();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].status(), TestStatus::Pass);
    }

    #[tokio::test]
    async fn before_all_failure_skips_descendant_cases_but_runs_after_all() {
        let suite = describe("top", || {
            crate::dsl::before_all(fail);
            crate::dsl::after_all(ok);
            it("t", ok);
        });
        let result = run(&suite, &options()).await;
        assert_eq!(result.before_all()[0].status(), TestStatus::Fail);
        assert_eq!(result.after_all()[0].status(), TestStatus::Pass);
        // all_tests() orders beforeAll, then children, then afterAll.
        assert_eq!(result.all_tests()[1].status(), TestStatus::Skip);
    }

    #[tokio::test]
    async fn hook_order_outer_before_inner_after() {
        let order = Arc::new(std::sync::Mutex::new(Vec::<&'static str>::new()));
        let outer_before = Arc::clone(&order);
        let inner_before = Arc::clone(&order);
        let inner_after = Arc::clone(&order);
        let outer_after = Arc::clone(&order);

        let suite = describe("outer", || {
            crate::dsl::before_each(move |_config: RunConfig| -> BoxFuture<'static, Result<(), UserError>> {
                outer_before.lock().unwrap().push("outer-before");
                Box::pin(async { Ok(()) })
            });
            crate::dsl::after_each(move |_config: RunConfig| -> BoxFuture<'static, Result<(), UserError>> {
                outer_after.lock().unwrap().push("outer-after");
                Box::pin(async { Ok(()) })
            });
            describe("inner", || {
                crate::dsl::before_each(move |_config: RunConfig| -> BoxFuture<'static, Result<(), UserError>> {
                    inner_before.lock().unwrap().push("inner-before");
                    Box::pin(async { Ok(()) })
                });
                crate::dsl::after_each(move |_config: RunConfig| -> BoxFuture<'static, Result<(), UserError>> {
                    inner_after.lock().unwrap().push("inner-after");
                    Box::pin(async { Ok(()) })
                });
                it("t", ok);
            });
        });
        run(&suite, &options()).await;
        let recorded = order.lock().unwrap().clone();
        assert_eq!(recorded, vec!["outer-before", "inner-before", "inner-after", "outer-after"]);
    }

    #[tokio::test]
    async fn empty_only_suite_without_runnable_cases_skips_all_ancestors() {
        let suite = describe_only("top", || {});
        let result = run(&suite, &options()).await;
        assert_eq!(result.count().fail, 1);
    }

    #[tokio::test]
    async fn only_inheritance_does_not_cross_an_intervening_skip_suite() {
        let suite = describe_only("outer", || {
            describe_skip("middle", || {
                it("case", ok);
            });
        });
        let result = run(&suite, &options()).await;
        let cases = result.all_tests();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].status(), TestStatus::Skip);
    }

    #[tokio::test]
    async fn panicking_case_becomes_a_failing_result_instead_of_aborting_the_run() {
        let suite = describe("top", || {
            it("panics", |_config: RunConfig| -> BoxFuture<'static, Result<(), UserError>> {
                Box::pin(async { panic!("boom") })
            });
            it("after", ok);
        });
        let result = run(&suite, &options()).await;
        let counts = result.count();
        assert_eq!(counts.fail, 1);
        assert_eq!(counts.pass, 1);
        let cases = result.all_tests();
        let failed = cases.iter().find(|c| c.status() == TestStatus::Fail).unwrap();
        assert!(failed.it().error_message().unwrap().contains("boom"));
    }
}
