// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Engine states and the frames delivered to the consumer.

use std::fmt;

use serde::Serialize;

use crate::core::Problem;
use crate::io::metadata::{MessageEvent, Topic};
use crate::schema::Datatypes;

/// Playback engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    /// No sources initialized yet
    Uninitialized,
    /// Sources are being initialized
    Initializing,
    /// Initialized and paused
    Idle,
    /// Frames advance through time
    Playing,
    /// A seek is waiting for its first frame
    Seeking,
    /// Every source failed; only `restart` or `close` leave this state
    Error,
}

impl PlayerState {
    /// Whether the engine has a usable initialization.
    pub fn is_ready(self) -> bool {
        matches!(
            self,
            PlayerState::Idle | PlayerState::Playing | PlayerState::Seeking
        )
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayerState::Uninitialized => "Uninitialized",
            PlayerState::Initializing => "Initializing",
            PlayerState::Idle => "Idle",
            PlayerState::Playing => "Playing",
            PlayerState::Seeking => "Seeking",
            PlayerState::Error => "Error",
        };
        f.write_str(name)
    }
}

/// One playback update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// Generation of the iterator that produced the frame
    pub generation: u64,
    /// Playback position after this frame (ns)
    pub current_time: u64,
    /// Live events in receive-time order
    pub events: Vec<MessageEvent>,
    /// Last event at or before the seek target per topic, sent once after a seek
    pub backfill: Vec<MessageEvent>,
    /// Merged topics
    pub topics: Vec<Topic>,
    /// Merged datatypes
    pub datatypes: Datatypes,
    /// Every problem recorded so far
    pub problems: Vec<Problem>,
    /// Engine state after this frame
    pub state: PlayerState,
}

impl Frame {
    /// Whether the frame carries no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.backfill.is_empty()
    }

    /// Receive time of the last live event.
    pub fn last_event_time(&self) -> Option<u64> {
        self.events.last().map(|e| e.receive_time)
    }
}
