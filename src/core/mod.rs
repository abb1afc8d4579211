// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Core types used throughout roboplay.
//!
//! This module provides the foundational types for the library:
//! - [`PlaybackError`] - Error kinds and the crate `Result`
//! - [`Problem`] - Non-fatal diagnostics and the append-only [`ProblemLog`]
//! - [`time`] - Nanosecond timestamp helpers

pub mod error;
pub mod problem;
pub mod time;

pub use error::{PlaybackError, Result};
pub use problem::{DiagnosticsSink, Problem, ProblemLog, Severity, TracingSink};
