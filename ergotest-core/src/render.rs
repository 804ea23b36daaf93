// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The error-render capability (C8): an optional hook that turns a failed
//! user function's error into an opaque, renderer-specific value stored
//! alongside the plain-text `errorMessage`.
//!
//! `spec.md` describes the renderer as a module path exporting a
//! `renderError(name, error, mark, filename?)` function; here it's a trait
//! object so both the in-process engine and the out-of-process worker can
//! load one the same way they load test modules (C6).

use crate::suite::UserError;
use camino::Utf8Path;
use ergotest_result::{TestMark, TestName};

/// Produces an `errorRender` value for a failed [`RunResult`](ergotest_result::RunResult).
pub trait RenderError: std::fmt::Debug + Send + Sync {
    fn render(&self, name: &TestName, error: &UserError, mark: TestMark, filename: Option<&Utf8Path>) -> serde_json::Value;
}

/// The renderer used when no `--renderer` module is configured: folds the
/// error down to its `Display` text, the same text already carried in
/// `errorMessage`.
#[derive(Debug, Default)]
pub struct DefaultRenderer;

impl RenderError for DefaultRenderer {
    fn render(&self, _name: &TestName, error: &UserError, _mark: TestMark, _filename: Option<&Utf8Path>) -> serde_json::Value {
        serde_json::Value::String(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_renderer_renders_display_text() {
        let renderer = DefaultRenderer;
        let error: UserError = "boom".into();
        let rendered = renderer.render(&TestName::new(["t"]), &error, TestMark::None, None);
        assert_eq!(rendered, serde_json::json!("boom"));
    }
}
