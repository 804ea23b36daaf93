// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loads compiled test modules and wraps them into one suite tree.
//!
//! A "test module" here is a `cdylib` exporting a single symbol,
//! `extern "C" fn ergotest_suite() -> *mut TestSuite`, built by calling
//! into `ergotest_core::dsl` during its own construction. `libloading` is
//! the idiomatic Rust substitute for JS's dynamic `import()` of a
//! same-process module found only at a path chosen at runtime.
//!
//! Failures here never escape as `Result::Err` — a module that can't be
//! loaded becomes a suite containing one synthetic failing case, the same
//! way `spec.md` §7 treats category-1/2 errors.

use crate::render::RenderError;
use crate::suite::{TestCase, TestNode, TestSuite, UserError};
use camino::{Utf8Path, Utf8PathBuf};
use ergotest_result::{TestMark, TestName};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// The symbol every test module must export.
const SUITE_ENTRY_POINT: &[u8] = b"ergotest_suite\0";

/// The symbol a `--renderer` module must export.
const RENDER_ENTRY_POINT: &[u8] = b"ergotest_render_error\0";

/// Loads every path in `paths` and wraps the results into one unnamed
/// parent suite, preserving order.
pub fn load_suites(paths: &[Utf8PathBuf]) -> TestSuite {
    let children = paths.iter().map(|path| TestNode::Suite(load_one(path))).collect();
    TestSuite::new(TestName::empty(), TestMark::None, None, children, Vec::new(), Vec::new(), Vec::new(), Vec::new())
}

fn load_one(path: &Utf8Path) -> TestSuite {
    if !path.is_absolute() {
        return failing_suite(path, format!("Test module filenames must use absolute paths: {path}"));
    }
    match try_load(path) {
        Ok(suite) => suite.with_filename(path.to_path_buf()),
        Err(message) => failing_suite(path, message),
    }
}

fn try_load(path: &Utf8Path) -> Result<TestSuite, String> {
    // SAFETY: the loaded module is trusted test code, the same trust model
    // as any other dependency linked into the binary; `ergotest_suite` is
    // required to match the declared signature exactly.
    let library = unsafe { libloading::Library::new(path.as_std_path()) }.map_err(|error| classify_open_error(path, &error))?;

    let ctor: libloading::Symbol<'_, unsafe extern "C" fn() -> *mut TestSuite> =
        unsafe { library.get(SUITE_ENTRY_POINT) }.map_err(|error| error.to_string())?;

    let built = std::panic::catch_unwind(AssertUnwindSafe(|| unsafe { ctor() }));

    let suite = match built {
        Ok(ptr) if !ptr.is_null() => unsafe { *Box::from_raw(ptr) },
        Ok(_) => return Err("test module's ergotest_suite() returned a null suite".to_string()),
        Err(_) => return Err("test module panicked while constructing its suite".to_string()),
    };

    // The suite's closures point into this library's code; it must outlive
    // every call to them, which in practice means for the rest of the
    // process's life. `libloading::Library` has no safe mechanism for
    // "unload once nothing references it anymore", so we leak the handle
    // deliberately rather than risk unloading code a closure still points
    // into.
    std::mem::forget(library);

    Ok(suite)
}

/// `libloading`'s error variants don't distinguish "file not found" from
/// other `dlopen`/`LoadLibrary` failures, so this falls back to matching
/// the platform loader's own message text. This also means a missing
/// *transitive* dependency of the module — which produces a similarly
/// worded "cannot open shared object" error on some platforms — can be
/// misclassified as "not found" rather than reported as a generic link
/// failure; this gap is inherent to the loader, not something this
/// function tries to paper over.
fn classify_open_error(path: &Utf8Path, error: &libloading::Error) -> String {
    classify_open_error_as(path, error, "Test module")
}

/// Same classification, with a caller-chosen noun so a renderer load
/// failure reads as "Renderer module not found" rather than borrowing the
/// test-module loader's wording.
fn classify_open_error_as(path: &Utf8Path, error: &libloading::Error, subject: &str) -> String {
    let text = error.to_string();
    let lower = text.to_lowercase();
    if lower.contains("no such file") || lower.contains("cannot find") || lower.contains("not found") {
        format!("{subject} not found: {path}")
    } else {
        text
    }
}

fn failing_suite(path: &Utf8Path, message: String) -> TestSuite {
    let name = TestName::new([path.to_string()]);
    let message = Arc::new(message);
    let func: crate::suite::UserFn = Arc::new(move |_config| {
        let message = Arc::clone(&message);
        Box::pin(async move { Err((*message).clone().into()) })
    });
    let case = TestCase::new(name.clone(), TestMark::None, None, Some(func));
    TestSuite::new(name, TestMark::None, None, vec![TestNode::Case(case)], Vec::new(), Vec::new(), Vec::new(), Vec::new())
        .with_filename(path.to_path_buf())
}

/// A C-ABI-compatible renderer, loaded from a `cdylib` exporting
/// `extern "C" fn ergotest_render_error(*const c_char) -> *mut c_char`: the
/// input is a JSON object (`{"name", "error", "mark", "filename"}`), the
/// output is a JSON value the caller owns and must free by returning it —
/// callers are expected to build it with `CString::into_raw`.
///
/// Unlike [`load_suites`], a renderer that fails to load is this function's
/// caller's problem: `spec.md` §7 treats a bad `--renderer` as a category-3
/// error that aborts the run, not one synthetic failing case.
pub fn load_renderer(path: &Utf8Path) -> Result<Arc<dyn RenderError>, String> {
    // SAFETY: same trust model as `load_suites` — the renderer module is
    // trusted code, and `ergotest_render_error` must match the declared
    // signature exactly.
    let library =
        unsafe { libloading::Library::new(path.as_std_path()) }.map_err(|error| classify_open_error_as(path, &error, "Renderer module"))?;

    let symbol: libloading::Symbol<'_, RawRenderFn> = unsafe { library.get(RENDER_ENTRY_POINT) }.map_err(|error| error.to_string())?;
    let func = *symbol;

    // As in `try_load`, the loaded function's code must outlive every call
    // to it, so the library handle is leaked rather than risk unloading
    // code a `RenderError` impl still points into.
    std::mem::forget(library);

    Ok(Arc::new(LoadedRenderer { func }))
}

type RawRenderFn = unsafe extern "C" fn(*const c_char) -> *mut c_char;

struct LoadedRenderer {
    func: RawRenderFn,
}

impl std::fmt::Debug for LoadedRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedRenderer").finish_non_exhaustive()
    }
}

impl RenderError for LoadedRenderer {
    fn render(&self, name: &TestName, error: &UserError, mark: TestMark, filename: Option<&Utf8Path>) -> serde_json::Value {
        let input = serde_json::json!({
            "name": name.segments().to_vec(),
            "error": error.to_string(),
            "mark": mark,
            "filename": filename.map(|f| f.as_str()),
        });
        let Ok(input) = CString::new(input.to_string()) else {
            return serde_json::Value::Null;
        };

        // SAFETY: `func` matches `RawRenderFn`'s signature by construction;
        // the returned pointer, if non-null, is a `CString` the renderer
        // handed off ownership of via `into_raw`.
        let output = unsafe { func_call(self.func, input.as_ptr()) };
        match output {
            Some(text) => serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)),
            None => serde_json::Value::Null,
        }
    }
}

/// # Safety
/// `func` must accept a NUL-terminated C string and return either null or a
/// pointer previously produced by `CString::into_raw`.
unsafe fn func_call(func: RawRenderFn, input: *const c_char) -> Option<String> {
    let output_ptr = func(input);
    if output_ptr.is_null() {
        return None;
    }
    let owned = CString::from_raw(output_ptr);
    Some(CStr::from_ptr(owned.as_ptr()).to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "current_thread")]
    async fn relative_path_is_rejected_without_touching_the_filesystem() {
        let suite = load_one(Utf8Path::new("relative/module.so"));
        let TestNode::Case(case) = &suite.children()[0] else {
            panic!("expected a synthetic failing case");
        };
        let config = crate::config::RunConfig::empty();
        let result = (case.func().unwrap())(config).await;
        let error = result.unwrap_err();
        assert!(error.to_string().contains("must use absolute paths"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_file_is_reported_as_not_found() {
        let suite = load_one(Utf8Path::new("/nonexistent/path/to/module.so"));
        let TestNode::Case(case) = &suite.children()[0] else {
            panic!("expected a synthetic failing case");
        };
        let config = crate::config::RunConfig::empty();
        let result = (case.func().unwrap())(config).await;
        let error = result.unwrap_err();
        assert!(error.to_string().contains("Test module not found"));
    }

    #[test]
    fn load_renderer_reports_missing_module() {
        let result = load_renderer(Utf8Path::new("/nonexistent/path/to/renderer.so"));
        let error = result.unwrap_err();
        assert!(error.contains("Renderer module not found"));
    }
}
