//! # depsync - crashpad third-party dependency sync
//!
//! Reads the upstream `DEPS` manifest, keeps only the allow-listed nested
//! dependencies, and replaces each one's directory with the pinned snapshot
//! downloaded from an archive mirror.
//!
//! ## Quick Start
//!
//! ```bash
//! # Sync gtest, lss and mini_chromium into ./third_party
//! depsync
//!
//! # Show what the manifest pins without touching disk
//! depsync --list
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Allow-list, mirror and manifest conventions (`depsync.toml`)
//! - [`manifest`] - `DEPS` line parser
//! - [`fetch`] - Download, extract and clean up each dependency
//! - [`ui`] - Listing output

/// Sync configuration and `depsync.toml` overrides.
pub mod config;

/// Error taxonomy shared by the pipeline.
pub mod error;

/// Snapshot download and extraction.
pub mod fetch;

/// `DEPS` manifest parsing.
pub mod manifest;

/// Terminal UI utilities.
pub mod ui;
