// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! C7: the two ways a run can be driven — in the current process, directly
//! against the engine, or in a child process spoken to over the worker
//! protocol (`spec.md` §6/§7). Category 3 (a bad `--renderer` path) aborts
//! the run immediately in both cases; the child-process path additionally
//! owns the watchdog (category 5) and protocol errors (category 4), which
//! have no in-process equivalent — a hang or panic there is just this
//! process's hang or panic.

use crate::errors::{RunnerError, WorkerProtocolError};
use crate::protocol::{WorkerMessage, WorkerRequest};
use crate::watchdog;
use camino::Utf8PathBuf;
use ergotest_core::clock::{Clock, RealClock};
use ergotest_core::config::RunConfig;
use ergotest_core::engine::{self, RunOptions};
use ergotest_core::loader;
use ergotest_result::TestSuiteResult;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// Everything a run needs regardless of which process runs it.
pub struct RunSpec {
    pub module_paths: Vec<Utf8PathBuf>,
    pub timeout: Option<Duration>,
    pub config: RunConfig,
    pub renderer: Option<Utf8PathBuf>,
}

/// Runs `spec` directly in this process: loads the modules, runs the
/// engine, returns its result. A bad `--renderer` path aborts the run
/// immediately (category 3, `spec.md` §7) — the same as the child-process
/// path, just without a child to report it over the wire.
pub async fn run_in_current_process_async(
    spec: &RunSpec,
    on_progress: impl Fn(&ergotest_result::TestResult) + Send + Sync + 'static,
) -> Result<TestSuiteResult, RunnerError> {
    let suite = loader::load_suites(&spec.module_paths);
    let renderer = match &spec.renderer {
        Some(path) => Some(loader::load_renderer(path).map_err(|reason| RunnerError::RendererLoad { path: path.clone(), reason })?),
        None => None,
    };

    let mut options = RunOptions::new(Arc::new(RealClock::new()) as Arc<dyn Clock>);
    options.timeout = spec.timeout;
    options.config = spec.config.clone();
    options.renderer = renderer;
    options.on_test_case_result = Some(Arc::new(on_progress));

    Ok(engine::run(&suite, &options).await)
}

/// The name of the hidden subcommand the parent re-executes itself with to
/// become a worker; see `src/main.rs`.
pub const WORKER_SUBCOMMAND: &str = "__worker";

/// Runs `spec` in a freshly spawned copy of the current executable, talking
/// NDJSON over its stdin/stdout, with a parent-side watchdog substituting a
/// synthetic failure if the child goes quiet (`spec.md` §7 category 5).
pub async fn run_in_child_process_async(
    spec: &RunSpec,
    watchdog_timeout: Duration,
    on_progress: impl Fn(&ergotest_result::TestResult) + Send + Sync + 'static,
) -> Result<TestSuiteResult, RunnerError> {
    let current_exe = std::env::current_exe().map_err(RunnerError::CurrentExe)?;

    let mut child = Command::new(&current_exe)
        .arg(WORKER_SUBCOMMAND)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(RunnerError::Spawn)?;

    let request = WorkerRequest {
        module_paths: spec.module_paths.clone(),
        timeout: spec.timeout.map(|d| d.as_millis() as u64),
        config: spec.config.to_json_map(),
        renderer: spec.renderer.clone(),
    };

    write_request(&mut child, &request).await?;

    let clock = Arc::new(RealClock::new()) as Arc<dyn Clock>;
    let result = drive_worker(&mut child, clock, watchdog_timeout, &on_progress).await;

    match &result {
        Ok(_) => {
            let _ = child.wait().await;
        }
        Err(_) => {
            kill_child(&mut child);
        }
    }

    result
}

async fn write_request(child: &mut Child, request: &WorkerRequest) -> Result<(), RunnerError> {
    let mut line = serde_json::to_string(request).expect("WorkerRequest always serializes");
    line.push('\n');
    let stdin = child.stdin.as_mut().expect("stdin was piped");
    stdin
        .write_all(line.as_bytes())
        .await
        .map_err(WorkerProtocolError::WriteRequest)
        .map_err(RunnerError::from)
}

/// The outcome of reading the worker's NDJSON stream to completion, or
/// being cut off by the watchdog first.
enum DriveOutcome {
    Complete(Box<TestSuiteResult>),
    WatchdogFired,
    ProtocolError(WorkerProtocolError),
    StreamEnded,
}

async fn drive_worker(
    child: &mut Child,
    clock: Arc<dyn Clock>,
    watchdog_timeout: Duration,
    on_progress: &(impl Fn(&ergotest_result::TestResult) + Send + Sync),
) -> Result<TestSuiteResult, RunnerError> {
    let stdout = child.stdout.take().expect("stdout was piped");
    let mut lines = BufReader::new(stdout).lines();

    let fired = Arc::new(tokio::sync::Notify::new());
    let fired_for_watchdog = Arc::clone(&fired);
    let (keep_alive, _) = watchdog::start(clock, watchdog_timeout, move || {
        fired_for_watchdog.notify_one();
    });
    keep_alive.alive();

    let outcome = loop {
        let next_line = tokio::select! {
            line = lines.next_line() => line,
            _ = fired.notified() => break DriveOutcome::WatchdogFired,
        };

        match next_line {
            Ok(Some(raw)) => {
                keep_alive.alive();
                match serde_json::from_str::<WorkerMessage>(&raw) {
                    Ok(WorkerMessage::Keepalive) => debug!("worker keepalive"),
                    Ok(WorkerMessage::Progress { result }) => {
                        on_progress(&ergotest_result::TestResult::Case(ergotest_result::TestCaseResult::deserialize(result)));
                    }
                    Ok(WorkerMessage::Complete { result }) => {
                        break DriveOutcome::Complete(Box::new(TestSuiteResult::deserialize(result)));
                    }
                    Ok(WorkerMessage::Fatal { message, err }) => {
                        break DriveOutcome::ProtocolError(WorkerProtocolError::WorkerFatal { message, err });
                    }
                    // A line that fails to parse because the worker was
                    // killed mid-write looks the same on the wire as a
                    // genuinely malformed message; the two are told apart
                    // by whether the worker process has already exited.
                    Err(source) => match child.try_wait() {
                        Ok(Some(_)) => break DriveOutcome::StreamEnded,
                        _ => break DriveOutcome::ProtocolError(WorkerProtocolError::Malformed { raw, source }),
                    },
                }
            }
            Ok(None) => break DriveOutcome::StreamEnded,
            Err(source) => break DriveOutcome::ProtocolError(WorkerProtocolError::ReadLine(source)),
        }
    };

    keep_alive.cancel();

    match outcome {
        DriveOutcome::Complete(result) => Ok(*result),
        DriveOutcome::WatchdogFired => {
            info!(?watchdog_timeout, "worker watchdog fired, killing worker");
            kill_child(child);
            Ok(watchdog::timeout_result())
        }
        DriveOutcome::ProtocolError(error) => Err(RunnerError::from(error)),
        DriveOutcome::StreamEnded => {
            // Category 5 (`spec.md` §7): the worker closed its stdout
            // before sending `complete`, whether by exiting early or being
            // killed mid-write. This resolves the run, not the caller.
            let detail = match child.try_wait() {
                Ok(Some(status)) => format!("worker exited with {status}"),
                _ => "worker's stdout closed unexpectedly".to_string(),
            };
            kill_child(child);
            info!(detail, "worker exited before completing, synthesizing a failing result");
            Ok(watchdog::early_exit_result(&detail))
        }
    }
}

#[cfg(unix)]
fn kill_child(child: &mut Child) {
    if let Some(pid) = child.id() {
        let pid = nix::unistd::Pid::from_raw(pid as i32);
        let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGKILL);
    }
}

#[cfg(windows)]
fn kill_child(child: &mut Child) {
    use std::os::windows::io::AsRawHandle;
    let handle = child.as_raw_handle();
    unsafe {
        windows_sys::Win32::System::Threading::TerminateProcess(handle as _, 1);
    }
}

#[cfg(not(any(unix, windows)))]
fn kill_child(_child: &mut Child) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn spawn_shell(script: &str) -> Child {
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .expect("failed to spawn test shell")
    }

    fn no_progress(_result: &ergotest_result::TestResult) {}

    /// Covers `SPEC_FULL.md`'s worker-protocol-framing property: a worker
    /// that exits without ever sending `complete` resolves the run
    /// successfully with a synthetic failing case, not an error.
    #[tokio::test]
    async fn worker_exiting_without_complete_resolves_as_early_exit() {
        let mut child = spawn_shell("exit 0");
        let clock = Arc::new(RealClock::new()) as Arc<dyn Clock>;
        let result = drive_worker(&mut child, clock, Duration::from_secs(5), &no_progress).await;
        let result = result.expect("early exit must resolve Ok, not Err");
        assert_eq!(result.count().fail, 1);
    }

    /// A final line with no trailing newline — as if the worker was killed
    /// mid-write — fails to parse, but since the process has already
    /// exited by the time it's read, it's treated as an early exit rather
    /// than a protocol error.
    #[tokio::test]
    async fn truncated_final_line_is_treated_as_early_exit_not_a_protocol_error() {
        let mut child = spawn_shell(r#"printf '{"type":"complete","result":{"nam'"#);
        let clock = Arc::new(RealClock::new()) as Arc<dyn Clock>;
        let result = drive_worker(&mut child, clock, Duration::from_secs(5), &no_progress).await;
        let result = result.expect("truncated line after exit must resolve Ok, not Err");
        assert_eq!(result.count().fail, 1);
    }

    #[tokio::test]
    async fn malformed_line_from_a_still_running_worker_is_a_protocol_error() {
        let mut child = spawn_shell(r#"printf 'not json\n'; sleep 5"#);
        let clock = Arc::new(RealClock::new()) as Arc<dyn Clock>;
        let result = drive_worker(&mut child, clock, Duration::from_secs(5), &no_progress).await;
        assert!(matches!(result, Err(RunnerError::Protocol(WorkerProtocolError::Malformed { .. }))));
        kill_child(&mut child);
    }

    #[tokio::test]
    async fn keepalive_then_complete_resolves_with_the_real_result() {
        let script = r#"printf '{"type":"keepalive"}\n'; printf '{"type":"complete","result":{"type":"TestSuiteResult","name":[],"mark":"none","tests":[],"beforeAll":[],"afterAll":[]}}\n'"#;
        let mut child = spawn_shell(script);
        let clock = Arc::new(RealClock::new()) as Arc<dyn Clock>;
        let result = drive_worker(&mut child, clock, Duration::from_secs(5), &no_progress).await;
        let result = result.expect("well-formed stream must resolve Ok");
        assert_eq!(result.count().total(), 0);
    }
}
