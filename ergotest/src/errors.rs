// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Category 3/4 errors from `spec.md` §7: renderer-load failures and
//! worker-protocol violations. Unlike category 1/2 (user-test, module-load)
//! errors, these escape as `Result::Err` — they mean the run itself
//! couldn't be trusted, not that a particular test failed.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Failures that can prevent `run_in_current_process_async` or
/// `run_in_child_process_async` from producing a result at all.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunnerError {
    #[error("failed to load renderer module `{path}`: {reason}")]
    RendererLoad { path: Utf8PathBuf, reason: String },

    #[error("failed to locate the current executable to spawn the worker")]
    CurrentExe(#[source] std::io::Error),

    #[error("failed to spawn worker process")]
    Spawn(#[source] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] WorkerProtocolError),
}

/// Category-4 violations of the NDJSON worker protocol itself: a message
/// that doesn't parse, or an explicit `fatal` from the worker. These abort
/// the run immediately, unlike worker-liveness failures (category 5 —
/// infinite loop, early exit, non-zero close code — see
/// `watchdog::early_exit_result`), which resolve successfully with one
/// synthetic failing case instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkerProtocolError {
    #[error("malformed message from worker: {raw}")]
    Malformed {
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("worker reported a fatal error: {message}")]
    WorkerFatal { message: String, err: serde_json::Value },

    #[error("failed to write request to worker's stdin")]
    WriteRequest(#[source] std::io::Error),

    #[error("failed to read a line from worker's stdout")]
    ReadLine(#[source] std::io::Error),
}
