// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Playback engine.
//!
//! This module provides:
//! - [`PlaybackEngine`] - the state machine a consumer drives
//! - [`PlayerConfig`] - frame cadence, speed bounds and worker settings
//! - [`Frame`] / [`PlayerState`] - what the consumer observes

pub mod config;
pub mod engine;
pub mod frame;

pub use config::PlayerConfig;
pub use engine::{PlaybackEngine, PlaybackEngineBuilder};
pub use frame::{Frame, PlayerState};
