// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Multi-source merging.
//!
//! [`MultiSource`] composes several sources into one. Initialization fans
//! out over all sources in parallel; iteration is a k-way heap merge over
//! one cursor per live source, ordered by receive time, then registration
//! order, then each source's own emission order.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use rayon::prelude::*;
use tracing::{debug, error, info};

use crate::core::{time, PlaybackError, Problem, Result};
use crate::io::metadata::{Initialization, MessageEvent};
use crate::io::traits::{
    BackfillArgs, EventStream, IterableSource, IteratorResult, MessageIteratorArgs,
};

use super::initialization::InitializationMerger;

/// Liveness of one registered source, shared with the streams reading it.
#[derive(Debug)]
pub struct SourceHealth {
    alive: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl SourceHealth {
    fn new() -> Self {
        Self {
            alive: AtomicBool::new(true),
            reason: Mutex::new(None),
        }
    }

    /// Whether the source is still part of the merge.
    pub fn is_alive(&self) -> bool {
        self.alive.load(AtomicOrdering::Acquire)
    }

    /// Why the source was dropped, if it was.
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().ok().and_then(|r| r.clone())
    }

    fn fail(&self, reason: String) {
        if let Ok(mut slot) = self.reason.lock() {
            *slot = Some(reason);
        }
        self.alive.store(false, AtomicOrdering::Release);
    }

    fn revive(&self) {
        if let Ok(mut slot) = self.reason.lock() {
            *slot = None;
        }
        self.alive.store(true, AtomicOrdering::Release);
    }
}

struct Member {
    source: Box<dyn IterableSource>,
    health: Arc<SourceHealth>,
    /// Own time range, known after a successful initialize
    range: Option<(u64, u64)>,
}

/// Several sources exposed as one [`IterableSource`].
pub struct MultiSource {
    name: String,
    members: Vec<Member>,
    problems: Vec<Problem>,
}

fn all_failed(health: &[(String, Arc<SourceHealth>)]) -> PlaybackError {
    PlaybackError::AllSourcesFailed {
        errors: health
            .iter()
            .map(|(name, h)| {
                let reason = h.reason().unwrap_or_else(|| "unavailable".to_string());
                format!("{name}: {reason}")
            })
            .collect(),
    }
}

fn failure_reason(err: &PlaybackError) -> String {
    match err {
        PlaybackError::SourceInit { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

impl MultiSource {
    /// Compose `sources`; registration order is the order given.
    pub fn new(sources: Vec<Box<dyn IterableSource>>) -> Self {
        let name = sources
            .iter()
            .map(|s| s.name().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let members = sources
            .into_iter()
            .map(|source| Member {
                source,
                health: Arc::new(SourceHealth::new()),
                range: None,
            })
            .collect();
        Self {
            name,
            members,
            problems: Vec::new(),
        }
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether no source is registered.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of sources still taking part in the merge.
    pub fn active_source_count(&self) -> usize {
        self.members.iter().filter(|m| m.health.is_alive()).count()
    }

    /// Names of all registered sources, in registration order.
    pub fn source_names(&self) -> Vec<String> {
        self.members
            .iter()
            .map(|m| m.source.name().to_string())
            .collect()
    }

    /// Take problems raised outside of a stream (backfill failures).
    pub fn drain_problems(&mut self) -> Vec<Problem> {
        std::mem::take(&mut self.problems)
    }

    fn health(&self) -> Vec<(String, Arc<SourceHealth>)> {
        self.members
            .iter()
            .map(|m| (m.source.name().to_string(), m.health.clone()))
            .collect()
    }
}

impl IterableSource for MultiSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self) -> Result<Initialization> {
        let results: Vec<Result<Initialization>> = self
            .members
            .par_iter_mut()
            .map(|member| member.source.initialize())
            .collect();

        let mut merger = InitializationMerger::new();
        let mut errors = Vec::new();

        for (member, result) in self.members.iter_mut().zip(results) {
            let name = member.source.name().to_string();
            match result {
                Ok(init) => {
                    member.health.revive();
                    member.range = Some((init.start, init.end));
                    merger.add(init);
                }
                Err(e) => {
                    let reason = failure_reason(&e);
                    error!(
                        context = "MultiSource",
                        source = %name,
                        error = %e,
                        "Source failed to initialize"
                    );
                    merger.push_problem(
                        Problem::error(format!("Failed to initialize source \"{name}\": {reason}"))
                            .with_error(&e),
                    );
                    member.health.fail(reason.clone());
                    member.range = None;
                    errors.push(format!("{name}: {reason}"));
                }
            }
        }

        if merger.source_count() == 0 {
            return Err(PlaybackError::AllSourcesFailed { errors });
        }

        let merged = merger.finish();
        info!(
            context = "MultiSource",
            sources = self.members.len(),
            active = self.active_source_count(),
            topics = merged.topics.len(),
            start = merged.start,
            end = merged.end,
            "Initialized"
        );
        Ok(merged)
    }

    fn message_iterator(&mut self, args: MessageIteratorArgs) -> Result<Box<dyn EventStream>> {
        let health = self.health();
        let mut stream = MergedStream::new(args.reverse, health.clone());

        for (index, member) in self.members.iter_mut().enumerate() {
            if !member.health.is_alive() {
                continue;
            }
            let Some(range) = member.range else {
                continue;
            };
            let Some((start, end)) = time::intersect(range, (args.start, args.end)) else {
                continue;
            };

            let source_args = MessageIteratorArgs {
                topics: args.topics.clone(),
                start,
                end,
                reverse: args.reverse,
            };
            match member.source.message_iterator(source_args) {
                Ok(cursor) => stream.add_cursor(index, member.source.name().to_string(), cursor),
                Err(e) => stream.drop_source(index, member.source.name(), &e),
            }
        }

        if !health.iter().any(|(_, h)| h.is_alive()) {
            return Err(all_failed(&health));
        }

        debug!(
            context = "MultiSource",
            cursors = stream.cursor_count(),
            start = args.start,
            end = args.end,
            reverse = args.reverse,
            "Opened merged iterator"
        );
        Ok(Box::new(stream))
    }

    fn backfill_messages(&mut self, args: BackfillArgs) -> Result<BTreeMap<String, MessageEvent>> {
        let mut found: BTreeMap<String, MessageEvent> = BTreeMap::new();

        for member in self.members.iter_mut() {
            if !member.health.is_alive() {
                continue;
            }
            let name = member.source.name().to_string();
            match member.source.backfill_messages(args.clone()) {
                Ok(events) => {
                    for (topic, event) in events {
                        match found.get(&topic) {
                            Some(existing) if existing.receive_time >= event.receive_time => {}
                            _ => {
                                found.insert(topic, event);
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(context = "MultiSource", source = %name, error = %e, "Backfill failed");
                    if matches!(e, PlaybackError::WorkerCrash { .. }) {
                        member.health.fail(e.to_string());
                        self.problems.push(
                            Problem::error(format!("Source \"{name}\" stopped unexpectedly"))
                                .with_error(&e),
                        );
                    } else {
                        self.problems.push(
                            Problem::error(format!("Failed to backfill from source \"{name}\""))
                                .with_error(&e),
                        );
                    }
                }
            }
        }

        if self.active_source_count() == 0 {
            return Err(all_failed(&self.health()));
        }
        Ok(found)
    }

    fn dispose(&mut self) {
        for member in self.members.iter_mut() {
            member.source.dispose();
        }
    }
}

/// One pending event per cursor, ordered for the merge.
struct HeapEntry {
    event: MessageEvent,
    source: usize,
    seq: u64,
    reverse: bool,
}

impl HeapEntry {
    fn key(&self) -> (u64, usize, u64) {
        (self.event.receive_time, self.source, self.seq)
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // BinaryHeap pops the greatest entry: the earliest event going forward,
    // the latest going backward. Ties always favor the lower source index,
    // then the earlier emission.
    fn cmp(&self, other: &Self) -> Ordering {
        let (time, source, seq) = self.key();
        let (o_time, o_source, o_seq) = other.key();
        let by_time = if self.reverse {
            time.cmp(&o_time)
        } else {
            o_time.cmp(&time)
        };
        by_time
            .then_with(|| o_source.cmp(&source))
            .then_with(|| o_seq.cmp(&seq))
    }
}

struct Cursor {
    name: String,
    stream: Box<dyn EventStream>,
    seq: u64,
}

/// K-way merge over per-source streams.
///
/// Problems reported by a cursor are passed through as they are read. A
/// cursor that returns an error is dropped and its source marked dead; when
/// no registered source is left alive the stream ends with
/// [`PlaybackError::AllSourcesFailed`].
pub struct MergedStream {
    reverse: bool,
    cursors: Vec<Option<Cursor>>,
    heap: BinaryHeap<HeapEntry>,
    pending: VecDeque<Problem>,
    health: Vec<(String, Arc<SourceHealth>)>,
    primed: bool,
    failed: bool,
}

impl MergedStream {
    fn new(reverse: bool, health: Vec<(String, Arc<SourceHealth>)>) -> Self {
        let cursors = health.iter().map(|_| None).collect();
        Self {
            reverse,
            cursors,
            heap: BinaryHeap::new(),
            pending: VecDeque::new(),
            health,
            primed: false,
            failed: false,
        }
    }

    fn add_cursor(&mut self, index: usize, name: String, stream: Box<dyn EventStream>) {
        if let Some(slot) = self.cursors.get_mut(index) {
            *slot = Some(Cursor {
                name,
                stream,
                seq: 0,
            });
        }
    }

    fn cursor_count(&self) -> usize {
        self.cursors.iter().filter(|c| c.is_some()).count()
    }

    fn drop_source(&mut self, index: usize, name: &str, err: &PlaybackError) {
        error!(context = "MergedStream", source = %name, error = %err, "Dropping source");
        if let Some((_, health)) = self.health.get(index) {
            health.fail(err.to_string());
        }
        if let Some(slot) = self.cursors.get_mut(index) {
            *slot = None;
        }
        self.pending.push_back(
            Problem::error(format!("Source \"{name}\" stopped unexpectedly")).with_error(err),
        );
    }

    /// Pull from cursor `index` until it yields an event, ends or fails.
    fn advance(&mut self, index: usize) {
        loop {
            let Some(cursor) = self.cursors.get_mut(index).and_then(Option::as_mut) else {
                return;
            };
            match cursor.stream.next() {
                Some(Ok(IteratorResult::Event(event))) => {
                    let seq = cursor.seq;
                    cursor.seq += 1;
                    self.heap.push(HeapEntry {
                        event,
                        source: index,
                        seq,
                        reverse: self.reverse,
                    });
                    return;
                }
                Some(Ok(IteratorResult::Problem(problem))) => self.pending.push_back(problem),
                Some(Err(e)) => {
                    let name = cursor.name.clone();
                    self.drop_source(index, &name, &e);
                    return;
                }
                None => {
                    debug!(context = "MergedStream", source = %cursor.name, "Cursor exhausted");
                    self.cursors[index] = None;
                    return;
                }
            }
        }
    }

    fn all_dead(&self) -> bool {
        !self.health.iter().any(|(_, h)| h.is_alive())
    }
}

impl Iterator for MergedStream {
    type Item = Result<IteratorResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if !self.primed {
            self.primed = true;
            for index in 0..self.cursors.len() {
                self.advance(index);
            }
        }

        if let Some(problem) = self.pending.pop_front() {
            return Some(Ok(IteratorResult::Problem(problem)));
        }
        if self.all_dead() {
            self.failed = true;
            self.heap.clear();
            return Some(Err(all_failed(&self.health)));
        }

        let entry = self.heap.pop()?;
        self.advance(entry.source);
        Some(Ok(IteratorResult::Event(entry.event)))
    }
}
