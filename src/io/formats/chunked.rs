// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Chunk-at-a-time iteration shared by the chunked formats.
//!
//! A format exposes the time bounds of its chunks and a way to read one
//! chunk. [`ChunkedStream`] loads the chunks overlapping the requested
//! window in time order and releases messages through a heap once no
//! unloaded chunk can hold an earlier one, so chunks may overlap in time.

use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::{PlaybackError, Problem, Result};
use crate::io::metadata::MessageEvent;
use crate::io::traits::{BackfillArgs, IteratorResult, MessageIteratorArgs};

/// Time bounds of one chunk (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkBounds {
    /// Earliest message time in the chunk
    pub start: u64,
    /// Latest message time in the chunk
    pub end: u64,
}

/// Format-specific chunk access.
pub trait ChunkSource: Send + Sync {
    /// Bounds of every chunk, indexed by chunk number.
    fn chunk_bounds(&self) -> &[ChunkBounds];

    /// Visit every message of chunk `chunk` as `(channel, log_time, data)`.
    fn read_chunk(&self, chunk: usize, visit: &mut dyn FnMut(u32, u64, &[u8])) -> Result<()>;

    /// Channels carrying any of `topics`.
    fn channel_ids(&self, topics: &[String]) -> HashSet<u32>;

    /// Build an event. `None` if the channel is unknown.
    fn build_event(
        &self,
        channel: u32,
        log_time: u64,
        data: Vec<u8>,
    ) -> Option<Result<MessageEvent>>;
}

/// A message waiting in the release heap.
struct Pending {
    /// Max-heap key: the next message to release compares greatest
    key: (u64, u64),
    channel: u32,
    log_time: u64,
    data: Vec<u8>,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

/// Lazy event stream over a [`ChunkSource`].
pub struct ChunkedStream<S: ChunkSource> {
    source: Arc<S>,
    args: MessageIteratorArgs,
    wanted: HashSet<u32>,
    /// Chunk numbers in load order
    chunks: Vec<usize>,
    next_chunk: usize,
    heap: BinaryHeap<Pending>,
    seq: u64,
    done: bool,
}

impl<S: ChunkSource> ChunkedStream<S> {
    /// Open a stream for `args`.
    pub fn new(source: Arc<S>, args: MessageIteratorArgs) -> Self {
        let wanted = source.channel_ids(&args.topics);
        let bounds = source.chunk_bounds();

        let mut chunks: Vec<usize> = (0..bounds.len())
            .filter(|&i| bounds[i].end >= args.start && bounds[i].start <= args.end)
            .collect();
        if args.reverse {
            chunks.sort_by(|a, b| bounds[*b].end.cmp(&bounds[*a].end));
        } else {
            chunks.sort_by_key(|i| bounds[*i].start);
        }

        debug!(
            context = "ChunkedStream",
            chunks = chunks.len(),
            topics = args.topics.len(),
            start = args.start,
            end = args.end,
            reverse = args.reverse,
            "Opened iterator"
        );

        let done = wanted.is_empty() || args.start > args.end;
        Self {
            source,
            args,
            wanted,
            chunks,
            next_chunk: 0,
            heap: BinaryHeap::new(),
            seq: 0,
            done,
        }
    }

    /// Whether the next unloaded chunk could hold a message due before `time`.
    fn must_load_before(&self, time: u64) -> bool {
        match self.chunks.get(self.next_chunk) {
            Some(&i) => {
                let bounds = self.source.chunk_bounds()[i];
                if self.args.reverse {
                    bounds.end >= time
                } else {
                    bounds.start <= time
                }
            }
            None => false,
        }
    }

    /// Load the next chunk. Returns false when every chunk is loaded.
    fn load_next(&mut self) -> Result<bool> {
        let Some(&chunk) = self.chunks.get(self.next_chunk) else {
            return Ok(false);
        };
        self.next_chunk += 1;

        let source = Arc::clone(&self.source);
        let (start, end, reverse) = (self.args.start, self.args.end, self.args.reverse);
        let wanted = &self.wanted;
        let heap = &mut self.heap;
        let seq = &mut self.seq;

        source.read_chunk(chunk, &mut |channel, log_time, data| {
            if !wanted.contains(&channel) || log_time < start || log_time > end {
                return;
            }
            let key = if reverse {
                (log_time, *seq)
            } else {
                (u64::MAX - log_time, u64::MAX - *seq)
            };
            *seq += 1;
            heap.push(Pending {
                key,
                channel,
                log_time,
                data: data.to_vec(),
            });
        })?;
        Ok(true)
    }
}

impl<S: ChunkSource> Iterator for ChunkedStream<S> {
    type Item = Result<IteratorResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let ready = match self.heap.peek() {
                Some(top) => !self.must_load_before(top.log_time),
                None => false,
            };

            if ready {
                let pending = self.heap.pop()?;
                let built = self
                    .source
                    .build_event(pending.channel, pending.log_time, pending.data);
                return match built {
                    None => continue,
                    Some(Ok(event)) => Some(Ok(IteratorResult::Event(event))),
                    Some(Err(e)) => Some(Ok(IteratorResult::Problem(decode_problem(
                        &e,
                        pending.log_time,
                    )))),
                };
            }

            match self.load_next() {
                Ok(true) => continue,
                Ok(false) if self.heap.is_empty() => {
                    self.done = true;
                    return None;
                }
                Ok(false) => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Problem recorded for a message that failed to decode.
pub fn decode_problem(error: &PlaybackError, log_time: u64) -> Problem {
    let message = match error {
        PlaybackError::Decode { topic, .. } => {
            format!("Failed to decode message on topic \"{topic}\" at {log_time}")
        }
        _ => format!("Failed to decode message at {log_time}"),
    };
    debug!(context = "ChunkedStream", log_time, error = %error, "Skipping message");
    Problem::error(message).with_error(error)
}

/// The last message at or before `args.time` for each requested topic.
///
/// Chunks starting at or before the target are read in descending end
/// order; the scan stops once every channel has a candidate newer than
/// anything the remaining chunks could hold.
pub fn backfill<S: ChunkSource>(
    source: &S,
    args: &BackfillArgs,
) -> Result<BTreeMap<String, MessageEvent>> {
    let wanted = source.channel_ids(&args.topics);
    let bounds = source.chunk_bounds();

    let mut chunks: Vec<usize> = (0..bounds.len())
        .filter(|&i| bounds[i].start <= args.time)
        .collect();
    chunks.sort_by(|a, b| bounds[*b].end.cmp(&bounds[*a].end));

    let mut found: HashMap<u32, (u64, Vec<u8>)> = HashMap::new();
    for (i, &chunk) in chunks.iter().enumerate() {
        source.read_chunk(chunk, &mut |channel, log_time, data| {
            if !wanted.contains(&channel) || log_time > args.time {
                return;
            }
            match found.get(&channel) {
                Some((t, _)) if *t > log_time => {}
                _ => {
                    found.insert(channel, (log_time, data.to_vec()));
                }
            }
        })?;

        // Remaining chunks end no later than the next one.
        let horizon = chunks.get(i + 1).map(|&c| bounds[c].end);
        let complete = found.len() == wanted.len()
            && horizon.map_or(true, |h| found.values().all(|(t, _)| *t > h));
        if complete {
            break;
        }
    }

    let mut result: BTreeMap<String, MessageEvent> = BTreeMap::new();
    for (channel, (log_time, data)) in found {
        match source.build_event(channel, log_time, data) {
            Some(Ok(event)) => {
                let newer = result
                    .get(&event.topic)
                    .map_or(true, |e| e.receive_time <= event.receive_time);
                if newer {
                    result.insert(event.topic.clone(), event);
                }
            }
            Some(Err(e)) => warn!(
                context = "ChunkedStream",
                error = %e,
                "Skipping undecodable backfill message"
            ),
            None => {}
        }
    }
    Ok(result)
}
