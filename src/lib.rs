//! # cxbuild - Declarative C/C++ Build Driver
//!
//! cxbuild (`cxb`) is a multi-step, incremental command driver: a JSON file
//! describes named build configurations, optional build types (debug,
//! release, ...) and an ordered list of templated build steps, and `cxb`
//! expands and runs them - once, per matching file, or per matching
//! directory.
//!
//! ## Features
//!
//! - **Template mini-language**: `${var}` substitution, `$${var}` multi-value
//!   fan-out, `[...]` path quoting, `(...)` grouping, `\` escapes
//! - **Layered variables**: CLI > per-file > step > build type >
//!   configuration > file > C/C++ properties > built-ins
//! - **Incremental**: per-file commands are skipped when their declared
//!   output is newer than the input
//! - **Parallel**: file fan-out runs on a bounded worker pool with prompt
//!   cancellation on the first error
//! - **Include trimming**: `-I` sets reduced to the directories a
//!   translation unit transitively needs
//!
//! ## Quick Start
//!
//! ```bash
//! # drop a sample .vscode/c_cpp_build.json
//! cxb -i .vscode/c_cpp_build.json
//!
//! # run the gcc configuration, debug build type
//! cxb gcc debug
//! ```
//!
//! ## Module Organization
//!
//! - [`expand`] - Template engine, resolver, glob expansion
//! - [`step`] - Build-step executor with the worker pool
//! - [`driver`] - Configuration loading and step orchestration
//! - [`includes`] - C/C++ include-dependency analysis

/// Configuration file parsing (build steps and C/C++ properties).
pub mod config;

/// Build orchestration: scope composition and step iteration.
pub mod driver;

/// Shell command execution with cancellation and timeouts.
pub mod exec;

/// Template expansion engine and variable resolver.
pub mod expand;

/// C/C++ include-dependency analysis for `-I` trimming.
pub mod includes;

/// Mutex-guarded log sink.
pub mod logger;

/// Sample-configuration writer.
pub mod sample;

/// Build-step execution: fan-out, incremental skip, cancellation.
pub mod step;

/// Terminal UI utilities (summary table).
pub mod ui;

/// Values, scopes and the resolver cache.
pub mod value;
