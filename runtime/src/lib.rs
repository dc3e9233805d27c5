// Copyright 2026 Chainmetrics Contributors
// SPDX-License-Identifier: MIT

//! Chainmetrics runtime: browser sessions, target orchestration and the CLI
//! around the `chainmetrics` extraction core.
//!
//! This library crate exposes the modules for integration testing.

pub mod cli;
pub mod fetcher;
pub mod orchestrator;
pub mod renderer;
pub mod runner;
pub mod stealth;
pub mod targets;
