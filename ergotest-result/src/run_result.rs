// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{TestName, TestStatus};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The result of executing one user function: a hook body or a case's `it`
/// body.
///
/// `error_message`/`error_render` are present if and only if `status` is
/// `Fail`; `timeout` is present if and only if `status` is `Timeout`. These
/// invariants are enforced by construction: [`RunResult`] has no public
/// field-level setters, only the four named constructors below.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResult {
    name: TestName,
    filename: Option<Utf8PathBuf>,
    status: TestStatus,
    error_message: Option<String>,
    error_render: Option<serde_json::Value>,
    timeout: Option<Duration>,
}

impl RunResult {
    pub fn pass(name: TestName, filename: Option<Utf8PathBuf>) -> Self {
        Self {
            name,
            filename,
            status: TestStatus::Pass,
            error_message: None,
            error_render: None,
            timeout: None,
        }
    }

    pub fn skip(name: TestName, filename: Option<Utf8PathBuf>) -> Self {
        Self {
            name,
            filename,
            status: TestStatus::Skip,
            error_message: None,
            error_render: None,
            timeout: None,
        }
    }

    pub fn fail(
        name: TestName,
        filename: Option<Utf8PathBuf>,
        error_message: impl Into<String>,
        error_render: Option<serde_json::Value>,
    ) -> Self {
        Self {
            name,
            filename,
            status: TestStatus::Fail,
            error_message: Some(error_message.into()),
            error_render,
            timeout: None,
        }
    }

    pub fn timeout(name: TestName, filename: Option<Utf8PathBuf>, timeout: Duration) -> Self {
        Self {
            name,
            filename,
            status: TestStatus::Timeout,
            error_message: None,
            error_render: None,
            timeout: Some(timeout),
        }
    }

    pub fn name(&self) -> &TestName {
        &self.name
    }

    pub fn filename(&self) -> Option<&camino::Utf8Path> {
        self.filename.as_deref()
    }

    pub fn status(&self) -> TestStatus {
        self.status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn error_render(&self) -> Option<&serde_json::Value> {
        self.error_render.as_ref()
    }

    pub fn timeout_value(&self) -> Option<Duration> {
        self.timeout
    }

    /// Structural equality that ignores `error_render`, since two different
    /// renderers may legitimately produce different renders for the same
    /// underlying error.
    pub fn equals(&self, other: &Self) -> bool {
        self.name == other.name
            && self.filename == other.filename
            && self.status == other.status
            && self.error_message == other.error_message
            && self.timeout == other.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equals_ignores_render() {
        let a = RunResult::fail(TestName::new(["t"]), None, "boom", Some(serde_json::json!("a")));
        let b = RunResult::fail(TestName::new(["t"]), None, "boom", Some(serde_json::json!("b")));
        assert!(a.equals(&b));
    }

    #[test]
    fn equals_detects_message_change() {
        let a = RunResult::fail(TestName::new(["t"]), None, "boom", None);
        let b = RunResult::fail(TestName::new(["t"]), None, "bang", None);
        assert!(!a.equals(&b));
    }
}
