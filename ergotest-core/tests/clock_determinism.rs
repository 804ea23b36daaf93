// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exercises the effective-timeout/`NullClock` contract through the full
//! engine, not just `timeout_async` in isolation: a case whose own timeout
//! never resolves must stay pending until virtual time reaches exactly its
//! effective timeout, and resolve as a timeout on that tick, not before.

use ergotest_core::clock::NullClock;
use ergotest_core::config::RunConfig;
use ergotest_core::dsl::{it_with, CaseOptions};
use ergotest_core::engine::{self, RunOptions};
use ergotest_core::suite::UserError;
use ergotest_result::TestStatus;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

fn never_resolves(_config: RunConfig) -> BoxFuture<'static, Result<(), UserError>> {
    Box::pin(std::future::pending())
}

#[tokio::test(flavor = "current_thread")]
async fn advancing_by_one_tick_less_than_the_timeout_does_not_resolve_it() {
    let timeout = Duration::from_millis(100);
    let suite = ergotest_core::dsl::describe("top", || {
        it_with("hangs", CaseOptions { timeout: Some(timeout) }, never_resolves);
    });
    let clock = NullClock::new();
    let mut options = RunOptions::new(Arc::new(clock.clone()));
    options.timeout = Some(timeout);

    let handle = tokio::spawn(async move { engine::run(&suite, &options).await });

    // Let the spawned task run up to registering its timeout timer and
    // suspending on it, before advancing virtual time past it.
    tokio::task::yield_now().await;
    clock.tick_async(timeout - Duration::from_millis(1)).await;
    tokio::task::yield_now().await;
    assert!(!handle.is_finished(), "case resolved before its effective timeout elapsed");

    clock.tick_async(Duration::from_millis(1)).await;
    let result = handle.await.expect("engine task panicked");
    assert_eq!(result.all_tests()[0].status(), TestStatus::Timeout);
}

#[tokio::test(flavor = "current_thread")]
async fn advancing_by_exactly_the_timeout_resolves_it() {
    let timeout = Duration::from_millis(50);
    let suite = ergotest_core::dsl::describe("top", || {
        it_with("hangs", CaseOptions { timeout: Some(timeout) }, never_resolves);
    });
    let clock = NullClock::new();
    let mut options = RunOptions::new(Arc::new(clock.clone()));
    options.timeout = Some(timeout);

    let handle = tokio::spawn(async move { engine::run(&suite, &options).await });

    tokio::task::yield_now().await;
    clock.tick_async(timeout).await;
    let result = handle.await.expect("engine task panicked");
    assert_eq!(result.all_tests()[0].status(), TestStatus::Timeout);
}
