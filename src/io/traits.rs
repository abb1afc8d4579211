// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Core traits for playable sources.
//!
//! Every format adapter, the worker boundary and the multi-source merger
//! implement [`IterableSource`], so the playback engine can drive any of
//! them through the same surface.

use std::collections::BTreeMap;

use crate::core::{Problem, Result};

use super::metadata::{Initialization, MessageEvent};

/// Arguments for [`IterableSource::message_iterator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageIteratorArgs {
    /// Topics to include
    pub topics: Vec<String>,
    /// First receive time included (ns)
    pub start: u64,
    /// Last receive time included (ns)
    pub end: u64,
    /// Iterate in descending time order
    pub reverse: bool,
}

impl MessageIteratorArgs {
    /// Forward iteration over `[start, end]`.
    pub fn new(topics: Vec<String>, start: u64, end: u64) -> Self {
        Self {
            topics,
            start,
            end,
            reverse: false,
        }
    }

    /// Iterate in descending time order.
    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Whether `topic` was requested.
    pub fn wants(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }
}

/// Arguments for [`IterableSource::backfill_messages`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillArgs {
    /// Topics to look up
    pub topics: Vec<String>,
    /// Target time (ns); events at or before it qualify
    pub time: u64,
}

/// One item of an event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum IteratorResult {
    /// A message
    Event(MessageEvent),
    /// A non-fatal problem, e.g. a message that failed to decode and was skipped
    Problem(Problem),
}

impl IteratorResult {
    /// The event, if this is one.
    pub fn event(&self) -> Option<&MessageEvent> {
        match self {
            IteratorResult::Event(event) => Some(event),
            IteratorResult::Problem(_) => None,
        }
    }
}

/// Lazy, time-ordered stream of events.
///
/// An `Err` item is fatal for the stream's source; the stream yields
/// nothing after it. The stream owns its data and is `Send`.
pub trait EventStream: Iterator<Item = Result<IteratorResult>> + Send {}

// Blanket implementation for any matching type
impl<T> EventStream for T where T: Iterator<Item = Result<IteratorResult>> + Send {}

/// A source of timestamped, topic-tagged messages.
///
/// Sources are initialized once; iterators are created per playback pass
/// and cannot be restarted.
pub trait IterableSource: Send {
    /// Display name (file name or URL).
    fn name(&self) -> &str;

    /// Parse headers and index.
    fn initialize(&mut self) -> Result<Initialization>;

    /// Open a lazy iterator over `args.topics` within `[args.start, args.end]`.
    fn message_iterator(&mut self, args: MessageIteratorArgs) -> Result<Box<dyn EventStream>>;

    /// The last event at or before `args.time` for each requested topic.
    fn backfill_messages(&mut self, args: BackfillArgs) -> Result<BTreeMap<String, MessageEvent>>;

    /// Release handles and buffers. Calling it twice is a no-op.
    fn dispose(&mut self);
}

impl<S: IterableSource + ?Sized> IterableSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn initialize(&mut self) -> Result<Initialization> {
        (**self).initialize()
    }

    fn message_iterator(&mut self, args: MessageIteratorArgs) -> Result<Box<dyn EventStream>> {
        (**self).message_iterator(args)
    }

    fn backfill_messages(&mut self, args: BackfillArgs) -> Result<BTreeMap<String, MessageEvent>> {
        (**self).backfill_messages(args)
    }

    fn dispose(&mut self) {
        (**self).dispose()
    }
}
