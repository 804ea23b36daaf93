// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The suite DSL, execution engine, clock, configuration, error-render
//! capability, and module loader that together implement ergotest's
//! in-process test-running semantics. The `ergotest` binary crate wraps
//! this in a CLI and an out-of-process worker protocol.

pub mod clock;
pub mod config;
pub mod dsl;
pub mod engine;
pub mod loader;
pub mod render;
pub mod suite;

pub use config::{ConfigKeyMissing, ConfigValue, RunConfig};
pub use engine::{RunOptions, DEFAULT_KEEPALIVE_INTERVAL, DEFAULT_TIMEOUT};
pub use render::{DefaultRenderer, RenderError};
pub use suite::{BeforeAfter, TestCase, TestNode, TestSuite, UserError, UserFn};
