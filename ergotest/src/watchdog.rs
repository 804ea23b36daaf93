// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The parent-side keep-alive watchdog (`spec.md` §7 category 5, worker
//! liveness): if the child goes quiet for longer than the watchdog
//! timeout, the run resolves successfully with one synthetic failing
//! result rather than hanging or propagating an error.

use ergotest_core::clock::{keep_alive, Clock, KeepAlive};
use ergotest_result::{RunResult, TestCaseResult, TestMark, TestName, TestSuiteResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_millis(2000);

/// Starts a watchdog that flips `fired` and calls `on_timeout` if
/// [`KeepAlive::alive`] isn't called within `timeout`.
pub fn start(clock: Arc<dyn Clock>, timeout: Duration, on_timeout: impl Fn() + Send + Sync + 'static) -> (KeepAlive, Arc<AtomicBool>) {
    let fired = Arc::new(AtomicBool::new(false));
    let fired_for_callback = Arc::clone(&fired);
    let handle = keep_alive(clock, timeout, move || {
        fired_for_callback.store(true, Ordering::SeqCst);
        on_timeout();
    });
    (handle, fired)
}

/// The result substituted for the worker's real output when the watchdog
/// fires: a single failing case named `["Test runner watchdog"]`.
pub fn timeout_result() -> TestSuiteResult {
    let name = TestName::new(["Test runner watchdog"]);
    let it = RunResult::fail(name.clone(), None, "Detected infinite loop in tests", None);
    let case = TestCaseResult::new(TestMark::None, Vec::new(), it, Vec::new());
    TestSuiteResult::new(TestName::empty(), None, TestMark::None, Vec::new(), Vec::new(), vec![ergotest_result::TestResult::Case(case)])
}

/// The result substituted when the worker's stdout closes before it sends a
/// `complete` message — whether it exited early or was killed mid-write.
/// Like [`timeout_result`], this is worker liveness failure, not a protocol
/// error: the run resolves successfully with one synthetic failing case.
pub fn early_exit_result(detail: &str) -> TestSuiteResult {
    let name = TestName::new(["Test runner"]);
    let message = format!("Tests exited early: {detail}");
    let it = RunResult::fail(name.clone(), None, &message, None);
    let case = TestCaseResult::new(TestMark::None, Vec::new(), it, Vec::new());
    TestSuiteResult::new(TestName::empty(), None, TestMark::None, Vec::new(), Vec::new(), vec![ergotest_result::TestResult::Case(case)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_result_reports_a_single_failing_case() {
        let result = timeout_result();
        let counts = result.count();
        assert_eq!(counts.fail, 1);
        assert_eq!(counts.total(), 1);
    }

    #[test]
    fn early_exit_result_reports_a_single_failing_case() {
        let result = early_exit_result("worker exited with status 1");
        let counts = result.count();
        assert_eq!(counts.fail, 1);
        assert_eq!(counts.total(), 1);
    }
}
