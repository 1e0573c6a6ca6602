//! plugstrap command-line front end.
//!
//! Wires the production services and release sources into the core engine
//! and renders its reports as tables or JSON envelopes.

// Tables and JSON go to stdout, diagnostics to stderr
#![allow(clippy::print_stdout, clippy::print_stderr)]

pub mod cli;
pub mod commands;
pub mod render;
pub mod tracing;

/// Manifest used when `--manifest` is not given.
pub const DEFAULT_MANIFEST: &str = include_str!("../manifests/default.toml");
