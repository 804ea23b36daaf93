// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The child side of the worker protocol: read one [`WorkerRequest`] from
//! stdin, run the suite, stream [`WorkerMessage`]s to stdout.
//!
//! The engine's `on_keepalive`/`on_test_case_result` callbacks are
//! synchronous (`Fn() + Send + Sync`), called inline from the suite
//! traversal; writing to stdout is async. An unbounded channel bridges the
//! two: callbacks push onto it without blocking the traversal, and one
//! writer task drains it to stdout in order.

use crate::protocol::{WorkerMessage, WorkerRequest};
use ergotest_core::clock::{Clock, RealClock};
use ergotest_core::config::RunConfig;
use ergotest_core::engine::{self, RunOptions, DEFAULT_KEEPALIVE_INTERVAL};
use ergotest_core::loader;
use ergotest_result::TestResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::warn;

/// Reads the single request from stdin, runs it, and writes the resulting
/// message stream to stdout. Returns the process exit code: `0` if the run
/// completed (whether or not individual tests passed), `1` if something
/// about the run itself — not a test — went wrong.
pub async fn main_async() -> i32 {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    let request = match lines.next_line().await {
        Ok(Some(raw)) => match serde_json::from_str::<WorkerRequest>(&raw) {
            Ok(request) => request,
            Err(error) => return fatal("worker received a malformed request", &error).await,
        },
        Ok(None) => return fatal_message("worker's stdin closed before sending a request", serde_json::Value::Null).await,
        Err(error) => return fatal("failed to read request from stdin", &error).await,
    };

    run_request(request).await
}

async fn run_request(request: WorkerRequest) -> i32 {
    let renderer = match request.renderer.as_deref() {
        Some(path) => match loader::load_renderer(path) {
            Ok(renderer) => Some(renderer),
            Err(reason) => return fatal_message(&format!("failed to load renderer `{path}`"), serde_json::json!({"reason": reason})).await,
        },
        None => None,
    };

    let suite = loader::load_suites(&request.module_paths);
    let config = request
        .config
        .map(|map| RunConfig::from_pairs(map.into_iter()))
        .unwrap_or_else(RunConfig::empty);

    let (tx, mut rx) = mpsc::unbounded_channel::<WorkerMessage>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = rx.recv().await {
            let mut line = serde_json::to_string(&message).expect("WorkerMessage always serializes");
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let tx_for_keepalive = tx.clone();
    let tx_for_progress = tx.clone();

    let mut options = RunOptions::new(Arc::new(RealClock::new()) as Arc<dyn Clock>);
    options.timeout = request.timeout.map(Duration::from_millis);
    options.config = config;
    options.renderer = renderer;
    options.keepalive_interval = DEFAULT_KEEPALIVE_INTERVAL;
    options.on_keepalive = Some(Arc::new(move || {
        let _ = tx_for_keepalive.send(WorkerMessage::Keepalive);
    }));
    options.on_test_case_result = Some(Arc::new(move |result: &TestResult| {
        if let TestResult::Case(case) = result {
            let _ = tx_for_progress.send(WorkerMessage::Progress { result: case.serialize() });
        }
    }));

    let result = engine::run(&suite, &options).await;
    // Drop the closures holding the other channel senders before sending
    // `Complete`, so the writer task's `rx.recv()` sees the channel close
    // once this function's own `tx` is dropped too.
    drop(options);
    let _ = tx.send(WorkerMessage::Complete { result: result.serialize() });
    drop(tx);
    let _ = writer.await;
    0
}

async fn fatal(message: &str, error: &dyn std::fmt::Display) -> i32 {
    warn!(%error, message);
    fatal_message(message, serde_json::json!({"error": error.to_string()})).await
}

async fn fatal_message(message: &str, err: serde_json::Value) -> i32 {
    let payload = WorkerMessage::Fatal {
        message: message.to_string(),
        err,
    };
    let mut line = serde_json::to_string(&payload).expect("WorkerMessage always serializes");
    line.push('\n');
    let mut stdout = tokio::io::stdout();
    let _ = stdout.write_all(line.as_bytes()).await;
    let _ = stdout.flush().await;
    1
}
