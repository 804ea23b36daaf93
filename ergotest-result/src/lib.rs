// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The serializable result model shared by the execution engine and the
//! worker protocol: [`RunResult`], [`TestCaseResult`], and
//! [`TestSuiteResult`], plus the [`TestMark`] and [`TestStatus`] enums that
//! also back the suite tree in `ergotest-core`.

mod case_result;
mod mark;
mod name;
mod run_result;
mod status;
mod suite_result;

pub use case_result::{SerializedTestCaseResult, TestCaseResult};
pub use mark::TestMark;
pub use name::TestName;
pub use run_result::RunResult;
pub use status::TestStatus;
pub use suite_result::{Counts, MarkedResult, SerializedTestResult, SerializedTestSuiteResult, TestResult, TestSuiteResult};
