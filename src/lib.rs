// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! # Roboplay
//!
//! Iterable playback engine for robotics logs.
//!
//! Roboplay turns one or more MCAP files or ROS1 bags into a single
//! time-ordered, seekable stream of events:
//! - **Sources** in [`io`] parse one file or URL each
//! - **Workers** in [`worker`] move decoding onto a thread per source
//! - **Merging** in [`merge`] reconciles metadata and interleaves events
//! - **Playback** in [`player`] drives frames, seeking and speed
//!
//! Malformed messages, schema conflicts and failing sources are recorded
//! as [`Problem`]s; playback only stops when no source is left.
//!
//! ## Example
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use roboplay::{PlaybackEngine, PlayerConfig, SourceDescriptor};
//!
//! let descriptor = SourceDescriptor::from_inputs(&["a.mcap", "b.bag"])?;
//! let mut engine = PlaybackEngine::open(&descriptor, PlayerConfig::default())?;
//! engine.start()?;
//! engine.play()?;
//! while let Some(frame) = engine.next_frame()? {
//!     for event in &frame.events {
//!         println!("{} @ {}", event.topic, event.receive_time);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// Core types
pub mod core;

pub use core::{PlaybackError, Problem, Result, Severity};

// Schema parsing
pub mod schema;

// Sources, formats and metadata
pub mod io;

pub use io::{
    open_source, BackfillArgs, EventStream, FormatSource, Initialization, IterableSource,
    IteratorResult, MessageEvent, MessageIteratorArgs, Payload, SourceDescriptor, Topic,
    TopicFilter,
};

// Worker boundary
pub mod worker;

pub use worker::WorkerSource;

// Multi-source merging
pub mod merge;

pub use merge::{merge_initializations, InitializationMerger, MultiSource};

// Playback engine
pub mod player;

pub use player::{Frame, PlaybackEngine, PlayerConfig, PlayerState};
