// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Worker boundary.
//!
//! [`WorkerSource`] hosts one [`IterableSource`] on a dedicated thread and
//! talks to it only through channels. Every request carries a generation id
//! that the worker echoes back; the generation of an `OpenIterator` request
//! doubles as the iterator handle.
//!
//! Flow control is pull based: a [`WorkerStream`] keeps exactly one
//! `NextBatch` request outstanding, so the worker decodes at most one batch
//! ahead of the consumer.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, error, warn};

use crate::core::{PlaybackError, Result};
use crate::io::metadata::{Initialization, MessageEvent};
use crate::io::traits::{
    BackfillArgs, EventStream, IterableSource, IteratorResult, MessageIteratorArgs,
};

/// Default number of stream items per `NextBatch` response.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// A message tagged with the generation it belongs to.
#[derive(Debug)]
pub struct Envelope<T> {
    /// Generation id of the originating request
    pub generation: u64,
    /// Message body
    pub body: T,
}

/// Requests sent to a worker thread.
#[derive(Debug)]
pub enum WorkerRequest {
    /// Run `initialize` on the hosted source
    Initialize,
    /// Open an iterator; batches for it are sent on `reply`
    OpenIterator {
        /// Iterator arguments
        args: MessageIteratorArgs,
        /// Dedicated response channel for this iterator
        reply: Sender<Envelope<WorkerResponse>>,
    },
    /// Produce the next batch of the iterator whose handle is the envelope generation
    NextBatch,
    /// Look up backfill events
    Backfill(BackfillArgs),
    /// Drop the iterator whose handle is the envelope generation
    Dispose,
    /// Dispose the hosted source and exit
    Shutdown,
}

/// Responses sent back by a worker thread.
#[derive(Debug)]
pub enum WorkerResponse {
    /// Result of `Initialize`
    Initialized(Result<Initialization>),
    /// Result of `Backfill`
    Backfilled(Result<BTreeMap<String, MessageEvent>>),
    /// One batch of an iterator
    Batch {
        /// Items in stream order; an `Err` item is always last
        items: Vec<Result<IteratorResult>>,
        /// No more batches follow
        done: bool,
    },
    /// The iterator was superseded by a newer one and has been dropped
    Cancelled,
}

type Control = Envelope<WorkerResponse>;

/// An [`IterableSource`] running on its own thread.
pub struct WorkerSource {
    name: String,
    requests: Sender<Envelope<WorkerRequest>>,
    control: Receiver<Control>,
    thread: Option<JoinHandle<()>>,
    next_generation: u64,
}

impl WorkerSource {
    /// Move `source` onto a new worker thread.
    ///
    /// Iterators opened through the worker deliver `batch_size` items per
    /// round trip.
    pub fn spawn<S>(source: S, batch_size: usize) -> Result<Self>
    where
        S: IterableSource + 'static,
    {
        let name = source.name().to_string();
        let (requests, request_rx) = unbounded();
        // The worker owns the only control sender, so a dead worker
        // disconnects the channel.
        let (worker_control, control) = unbounded();
        let batch_size = batch_size.max(1);

        let thread = thread::Builder::new()
            .name(format!("roboplay-worker-{name}"))
            .spawn(move || run_worker(Box::new(source), request_rx, worker_control, batch_size))
            .map_err(|e| PlaybackError::Io(format!("Failed to spawn worker for {name}: {e}")))?;

        debug!(context = "WorkerSource", source = %name, batch_size, "Worker started");

        Ok(Self {
            name,
            requests,
            control,
            thread: Some(thread),
            next_generation: 0,
        })
    }

    /// Whether the worker thread is still attached.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn crash(&self) -> PlaybackError {
        error!(context = "WorkerSource", source = %self.name, "Worker terminated unexpectedly");
        PlaybackError::WorkerCrash {
            source_name: self.name.clone(),
        }
    }

    fn send(&mut self, body: WorkerRequest) -> Result<u64> {
        if self.thread.is_none() {
            return Err(PlaybackError::invalid_state("send worker request", "disposed"));
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        self.requests
            .send(Envelope { generation, body })
            .map_err(|_| self.crash())?;
        Ok(generation)
    }

    /// Wait for the control response to `generation`, discarding stale ones.
    fn receive(&self, generation: u64) -> Result<WorkerResponse> {
        loop {
            let envelope = self.control.recv().map_err(|_| self.crash())?;
            if envelope.generation == generation {
                return Ok(envelope.body);
            }
            debug!(
                context = "WorkerSource",
                source = %self.name,
                stale = envelope.generation,
                current = generation,
                "Discarding stale response"
            );
        }
    }

    fn unexpected(&self, operation: &str, response: &WorkerResponse) -> PlaybackError {
        PlaybackError::parse(
            format!("worker {} {}", self.name, operation),
            format!("unexpected response {response:?}"),
        )
    }
}

impl IterableSource for WorkerSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self) -> Result<Initialization> {
        let generation = self.send(WorkerRequest::Initialize)?;
        match self.receive(generation)? {
            WorkerResponse::Initialized(result) => result,
            other => Err(self.unexpected("initialize", &other)),
        }
    }

    fn message_iterator(&mut self, args: MessageIteratorArgs) -> Result<Box<dyn EventStream>> {
        let (reply, batches) = unbounded();
        let generation = self.send(WorkerRequest::OpenIterator { args, reply })?;
        let stream = WorkerStream::new(
            self.name.clone(),
            generation,
            self.requests.clone(),
            batches,
        );
        Ok(Box::new(stream))
    }

    fn backfill_messages(&mut self, args: BackfillArgs) -> Result<BTreeMap<String, MessageEvent>> {
        let generation = self.send(WorkerRequest::Backfill(args))?;
        match self.receive(generation)? {
            WorkerResponse::Backfilled(result) => result,
            other => Err(self.unexpected("backfill", &other)),
        }
    }

    fn dispose(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.next_generation += 1;
        let _ = self.requests.send(Envelope {
            generation: self.next_generation,
            body: WorkerRequest::Shutdown,
        });
        if thread.join().is_err() {
            warn!(context = "WorkerSource", source = %self.name, "Worker panicked before shutdown");
        }
        debug!(context = "WorkerSource", source = %self.name, "Worker stopped");
    }
}

impl Drop for WorkerSource {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Client side of an iterator hosted by a worker.
///
/// Items are buffered one batch at a time; the next batch is requested as
/// soon as the previous one arrives. Dropping the stream tells the worker
/// to release the iterator.
pub struct WorkerStream {
    source_name: String,
    generation: u64,
    requests: Sender<Envelope<WorkerRequest>>,
    batches: Receiver<Envelope<WorkerResponse>>,
    buffer: VecDeque<Result<IteratorResult>>,
    pending: bool,
    finished: bool,
}

impl WorkerStream {
    fn new(
        source_name: String,
        generation: u64,
        requests: Sender<Envelope<WorkerRequest>>,
        batches: Receiver<Envelope<WorkerResponse>>,
    ) -> Self {
        let mut stream = Self {
            source_name,
            generation,
            requests,
            batches,
            buffer: VecDeque::new(),
            pending: false,
            finished: false,
        };
        stream.request_batch();
        stream
    }

    /// Handle (generation id) of this iterator.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn crash(&mut self) -> PlaybackError {
        self.finished = true;
        error!(
            context = "WorkerStream",
            source = %self.source_name,
            generation = self.generation,
            "Worker terminated unexpectedly"
        );
        PlaybackError::WorkerCrash {
            source_name: self.source_name.clone(),
        }
    }

    fn request_batch(&mut self) {
        let request = Envelope {
            generation: self.generation,
            body: WorkerRequest::NextBatch,
        };
        if self.requests.send(request).is_ok() {
            self.pending = true;
        } else {
            let err = self.crash();
            self.buffer.push_back(Err(err));
        }
    }

    /// Block until the outstanding batch arrives, then prefetch the next one.
    fn receive_batch(&mut self) {
        loop {
            let envelope = match self.batches.recv() {
                Ok(envelope) => envelope,
                Err(_) => {
                    self.pending = false;
                    let err = self.crash();
                    self.buffer.push_back(Err(err));
                    return;
                }
            };

            if envelope.generation != self.generation {
                debug!(
                    context = "WorkerStream",
                    source = %self.source_name,
                    stale = envelope.generation,
                    current = self.generation,
                    "Discarding stale batch"
                );
                continue;
            }

            self.pending = false;
            match envelope.body {
                WorkerResponse::Batch { items, done } => {
                    self.buffer.extend(items);
                    if done {
                        self.finished = true;
                    } else {
                        self.request_batch();
                    }
                }
                WorkerResponse::Cancelled => {
                    debug!(
                        context = "WorkerStream",
                        source = %self.source_name,
                        generation = self.generation,
                        "Iterator superseded"
                    );
                    self.finished = true;
                }
                other => {
                    self.finished = true;
                    self.buffer.push_back(Err(PlaybackError::parse(
                        format!("worker {} iterator", self.source_name),
                        format!("unexpected response {other:?}"),
                    )));
                }
            }
            return;
        }
    }
}

impl Iterator for WorkerStream {
    type Item = Result<IteratorResult>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(item);
            }
            if !self.pending {
                return None;
            }
            self.receive_batch();
        }
    }
}

impl Drop for WorkerStream {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let _ = self.requests.send(Envelope {
            generation: self.generation,
            body: WorkerRequest::Dispose,
        });
    }
}

/// Iterator state held by the worker thread.
struct HostedStream {
    stream: Box<dyn EventStream>,
    reply: Sender<Envelope<WorkerResponse>>,
}

impl HostedStream {
    fn next_batch(&mut self, batch_size: usize) -> (Vec<Result<IteratorResult>>, bool) {
        let mut items = Vec::with_capacity(batch_size);
        while items.len() < batch_size {
            match self.stream.next() {
                Some(Ok(item)) => items.push(Ok(item)),
                Some(Err(e)) => {
                    items.push(Err(e));
                    return (items, true);
                }
                None => return (items, true),
            }
        }
        (items, false)
    }
}

fn run_worker(
    mut source: Box<dyn IterableSource>,
    requests: Receiver<Envelope<WorkerRequest>>,
    control: Sender<Control>,
    batch_size: usize,
) {
    let mut streams: HashMap<u64, HostedStream> = HashMap::new();

    while let Ok(Envelope { generation, body }) = requests.recv() {
        match body {
            WorkerRequest::Initialize => {
                let result = source.initialize();
                let _ = control.send(Envelope {
                    generation,
                    body: WorkerResponse::Initialized(result),
                });
            }
            WorkerRequest::Backfill(args) => {
                let result = source.backfill_messages(args);
                let _ = control.send(Envelope {
                    generation,
                    body: WorkerResponse::Backfilled(result),
                });
            }
            WorkerRequest::OpenIterator { args, reply } => {
                // Only one iterator per source is live at a time.
                for (old, hosted) in streams.drain() {
                    debug!(
                        context = "worker",
                        superseded = old,
                        by = generation,
                        "Cancelling iterator"
                    );
                    let _ = hosted.reply.send(Envelope {
                        generation: old,
                        body: WorkerResponse::Cancelled,
                    });
                }
                match source.message_iterator(args) {
                    Ok(stream) => {
                        streams.insert(generation, HostedStream { stream, reply });
                    }
                    Err(e) => {
                        let _ = reply.send(Envelope {
                            generation,
                            body: WorkerResponse::Batch {
                                items: vec![Err(e)],
                                done: true,
                            },
                        });
                    }
                }
            }
            WorkerRequest::NextBatch => {
                let Some(hosted) = streams.get_mut(&generation) else {
                    debug!(
                        context = "worker",
                        generation,
                        "Discarding request for released iterator"
                    );
                    continue;
                };
                let (items, done) = hosted.next_batch(batch_size);
                let sent = hosted
                    .reply
                    .send(Envelope {
                        generation,
                        body: WorkerResponse::Batch { items, done },
                    })
                    .is_ok();
                if done || !sent {
                    streams.remove(&generation);
                }
            }
            WorkerRequest::Dispose => {
                if streams.remove(&generation).is_some() {
                    debug!(context = "worker", generation, "Iterator released");
                }
            }
            WorkerRequest::Shutdown => break,
        }
    }

    streams.clear();
    source.dispose();
}
