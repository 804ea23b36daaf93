// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ergotest`: runs compiled test modules (`cdylib`s built with
//! `ergotest_core::dsl`) and reports pass/fail/skip/timeout results.
//!
//! Three subcommands share one binary: `run`, the user-facing entry point,
//! `list`, which loads the same modules but only prints their test names,
//! and the hidden `__worker`, which `run` re-executes itself as when
//! `--in-process` isn't set (`spec.md` §6/§7's out-of-process worker).

mod errors;
mod protocol;
mod runner;
mod watchdog;
mod worker;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use ergotest_core::config::RunConfig;
use ergotest_core::suite::{TestNode, TestSuite};
use runner::RunSpec;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ergotest", about = "Async test runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one or more compiled test modules.
    Run {
        /// Absolute paths to compiled test modules (cdylibs).
        #[arg(required = true)]
        module_paths: Vec<Utf8PathBuf>,

        /// Run-level timeout floor, in milliseconds; overridden by any
        /// case- or suite-level timeout.
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,

        /// A `key=value` pair, readable by tests via `getConfig`. May be
        /// given more than once.
        #[arg(long = "config", value_name = "KEY=VALUE")]
        config: Vec<String>,

        /// Path to a cdylib exporting `ergotest_render_error`, used to
        /// render failed assertions' errors into a structured value.
        #[arg(long)]
        renderer: Option<Utf8PathBuf>,

        /// Run in this process instead of spawning a worker. Disables the
        /// watchdog — a hang blocks this process directly.
        #[arg(long)]
        in_process: bool,

        /// How long the worker may go without a keepalive before the
        /// watchdog declares it hung. Ignored with `--in-process`.
        #[arg(long, value_name = "MS", default_value_t = watchdog::DEFAULT_WATCHDOG_TIMEOUT.as_millis() as u64)]
        watchdog_timeout_ms: u64,
    },

    /// List every test case in one or more compiled test modules, without
    /// running them.
    List {
        /// Absolute paths to compiled test modules (cdylibs).
        #[arg(required = true)]
        module_paths: Vec<Utf8PathBuf>,
    },

    /// Hidden: the worker side of the `run` subcommand. Not meant to be
    /// invoked directly — `run` re-execs itself with this subcommand and
    /// talks NDJSON over its stdin/stdout.
    #[command(hide = true, name = "__worker")]
    Worker,
}

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new().expect("failed to start the tokio runtime");

    match cli.command {
        Command::Worker => {
            let code = runtime.block_on(worker::main_async());
            std::process::ExitCode::from(code as u8)
        }
        Command::List { module_paths } => {
            let suite = ergotest_core::loader::load_suites(&module_paths);
            list_suite(&suite);
            std::process::ExitCode::SUCCESS
        }
        Command::Run {
            module_paths,
            timeout_ms,
            config,
            renderer,
            in_process,
            watchdog_timeout_ms,
        } => {
            let config = match parse_config_pairs(&config) {
                Ok(config) => config,
                Err(message) => {
                    eprintln!("error: {message}");
                    return std::process::ExitCode::FAILURE;
                }
            };

            let spec = RunSpec {
                module_paths,
                timeout: timeout_ms.map(Duration::from_millis),
                config,
                renderer,
            };

            runtime.block_on(run(spec, in_process, Duration::from_millis(watchdog_timeout_ms)))
        }
    }
}

/// Recursively prints every case name in `suite`, the way `ergotest list`
/// reports what `ergotest run` would otherwise execute.
fn list_suite(suite: &TestSuite) {
    for child in suite.children() {
        match child {
            TestNode::Case(case) => println!("{}", case.name()),
            TestNode::Suite(inner) => list_suite(inner),
        }
    }
}

async fn run(spec: RunSpec, in_process: bool, watchdog_timeout: Duration) -> std::process::ExitCode {
    let on_progress = |result: &ergotest_result::TestResult| {
        if let ergotest_result::TestResult::Case(case) = result {
            println!("{} ... {:?}", case.name(), case.status());
        }
    };

    let outcome = if in_process {
        runner::run_in_current_process_async(&spec, on_progress).await
    } else {
        runner::run_in_child_process_async(&spec, watchdog_timeout, on_progress).await
    };
    let result = match outcome {
        Ok(result) => result,
        Err(error) => {
            eprintln!("error: {error}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let elapsed = None;
    println!("{}", result.render(None, elapsed));

    let counts = result.count();
    if counts.fail > 0 || counts.timeout > 0 {
        std::process::ExitCode::FAILURE
    } else {
        std::process::ExitCode::SUCCESS
    }
}

fn parse_config_pairs(pairs: &[String]) -> Result<RunConfig, String> {
    let mut parsed = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or_else(|| format!("invalid --config value `{pair}`, expected KEY=VALUE"))?;
        let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        parsed.push((key.to_string(), value));
    }
    Ok(RunConfig::from_pairs(parsed))
}
