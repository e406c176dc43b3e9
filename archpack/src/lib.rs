//! Multi-architecture packaging for native libraries.
//!
//! A native library is cross-compiled once per architecture descriptor, the
//! binaries are bundled with a manifest into a versioned package, and each
//! consuming build places only the binary matching its own architecture.
//! The `archpack` binary drives the producer side (`package`) and the
//! consumer side (`place`, `inspect`); everything it does is available here.
//!
//! # Modules
//!
//! - [`descriptor`] - Architecture and configuration descriptors
//! - [`digest`] - SHA-256 digests of binaries
//! - [`source`] - Native source provenance and release versions
//! - [`toolchain`] - Cross-compiler invocation
//! - [`builder`] - Single-descriptor builds with atomic promotion
//! - [`matrix`] - Parallel builds of every descriptor
//! - [`manifest`] - Package manifest model and JSON format
//! - [`assembler`] - Package staging with version verification
//! - [`transport`] - `.tar.zst` package archives
//! - [`resolver`] - Consumer descriptor resolution
//! - [`placement`] - Consumer-side binary placement
//! - [`config`] - `archpack.toml` loading
//! - [`cli`] - Command-line argument definitions
//! - [`output`] - CLI summaries
//! - [`error`] - Aggregated CLI error type

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod assembler;
pub mod builder;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod digest;
pub mod error;
pub mod manifest;
pub mod matrix;
pub mod output;
pub mod placement;
pub mod resolver;
pub mod source;
pub mod toolchain;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
