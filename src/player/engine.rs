// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! The playback engine state machine.
//!
//! The engine owns every piece of mutable playback state: the merged
//! initialization, the current time, the speed, the live iterator and the
//! problem log. It is driven by a single consumer that pulls frames with
//! [`PlaybackEngine::next_frame`]; nothing is produced ahead of that call,
//! so at most one undelivered frame exists at any time.
//!
//! Each iterator opened by `play` or `seek` gets a new generation id. Any
//! iterator from an older generation is dropped before the next one is
//! opened, which also releases it on the worker side.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::core::{
    time, DiagnosticsSink, PlaybackError, Problem, ProblemLog, Result, TracingSink,
};
use crate::io::filter::TopicFilter;
use crate::io::metadata::{Initialization, MessageEvent, PlaybackRange, SourceDescriptor};
use crate::io::source::FormatSource;
use crate::io::traits::{
    BackfillArgs, EventStream, IterableSource, IteratorResult, MessageIteratorArgs,
};
use crate::merge::MultiSource;
use crate::worker::WorkerSource;

use super::config::PlayerConfig;
use super::frame::{Frame, PlayerState};

/// Iterable playback over one or more sources.
pub struct PlaybackEngine {
    source: MultiSource,
    config: PlayerConfig,
    state: PlayerState,
    initialization: Option<Initialization>,
    problems: ProblemLog,
    filter: TopicFilter,
    speed: f64,
    current_time: u64,
    /// First receive time not yet delivered
    next_start: u64,
    generation: u64,
    iterator: Option<Box<dyn EventStream>>,
    /// Event read past the end of the previous frame
    lookahead: Option<MessageEvent>,
    pending_backfill: Option<Vec<MessageEvent>>,
    /// Backfill events at the seek target that must not be repeated live
    delivered_backfill: Vec<MessageEvent>,
    /// State to enter once the pending seek delivers its first frame
    resume_playing: bool,
    /// Set by `close`; the sources are gone
    closed: bool,
    /// The live data up to the range end has been read
    drained: bool,
    fatal: Option<PlaybackError>,
}

impl PlaybackEngine {
    /// Create an engine over injected sources, registered in the given order.
    ///
    /// Fails on an invalid configuration.
    pub fn new(sources: Vec<Box<dyn IterableSource>>, config: PlayerConfig) -> Result<Self> {
        Self::with_sink(sources, config, Arc::new(TracingSink))
    }

    /// Start building an engine.
    pub fn builder() -> PlaybackEngineBuilder {
        PlaybackEngineBuilder::default()
    }

    /// Open every source named by `descriptor`.
    ///
    /// Sources whose format cannot be determined are recorded as problems;
    /// the engine is only refused if none can be opened. With
    /// `config.use_workers`, each source runs on its own worker thread.
    pub fn open(descriptor: &SourceDescriptor, config: PlayerConfig) -> Result<Self> {
        config.validate()?;
        let mut sources: Vec<Box<dyn IterableSource>> = Vec::new();
        let mut failures = Vec::new();
        let mut errors = Vec::new();

        for location in descriptor.locations()? {
            let name = location.name();
            let opened = FormatSource::open(location).and_then(|source| {
                if config.use_workers {
                    let worker = WorkerSource::spawn(source, config.worker_batch_size)?;
                    Ok(Box::new(worker) as Box<dyn IterableSource>)
                } else {
                    Ok(Box::new(source) as Box<dyn IterableSource>)
                }
            });
            match opened {
                Ok(source) => sources.push(source),
                Err(e) => {
                    let reason = match &e {
                        PlaybackError::SourceInit { reason, .. } => reason.clone(),
                        other => other.to_string(),
                    };
                    errors.push(format!("{name}: {reason}"));
                    failures.push(
                        Problem::error(format!("Failed to initialize source \"{name}\": {reason}"))
                            .with_error(&e),
                    );
                }
            }
        }

        if sources.is_empty() {
            return Err(PlaybackError::AllSourcesFailed { errors });
        }

        let mut engine = Self::new(sources, config)?;
        engine.problems.extend(failures);
        Ok(engine)
    }

    fn with_sink(
        sources: Vec<Box<dyn IterableSource>>,
        config: PlayerConfig,
        sink: Arc<dyn DiagnosticsSink>,
    ) -> Result<Self> {
        // Speed clamping below relies on ordered, finite bounds
        config.validate()?;
        let speed = config.speed.clamp(config.min_speed, config.max_speed);
        Ok(Self {
            source: MultiSource::new(sources),
            config,
            state: PlayerState::Uninitialized,
            initialization: None,
            problems: ProblemLog::new(sink),
            filter: TopicFilter::All,
            speed,
            current_time: 0,
            next_start: 0,
            generation: 0,
            iterator: None,
            lookahead: None,
            pending_backfill: None,
            delivered_backfill: Vec::new(),
            resume_playing: false,
            closed: false,
            drained: false,
            fatal: None,
        })
    }

    /// Current state.
    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// Current playback position (ns).
    pub fn current_time(&self) -> u64 {
        self.current_time
    }

    /// Current speed multiplier.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Generation of the most recent iterator.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The merged initialization, once started.
    pub fn initialization(&self) -> Option<&Initialization> {
        self.initialization.as_ref()
    }

    /// The playable range, once started.
    pub fn range(&self) -> Option<PlaybackRange> {
        self.initialization.as_ref().map(Initialization::range)
    }

    /// Every problem recorded so far, oldest first.
    pub fn problems(&self) -> &[Problem] {
        self.problems.as_slice()
    }

    /// The fatal error that put the engine into [`PlayerState::Error`].
    pub fn error(&self) -> Option<&PlaybackError> {
        self.fatal.as_ref()
    }

    /// The configuration in use.
    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Number of sources still taking part in playback.
    pub fn active_source_count(&self) -> usize {
        self.source.active_source_count()
    }

    /// Log time covered by one frame at the current speed.
    pub fn frame_window(&self) -> u64 {
        time::scaled_span(self.config.frame_interval(), self.speed)
    }

    /// Initialize every source and merge their metadata.
    pub fn start(&mut self) -> Result<()> {
        if self.closed {
            return Err(PlaybackError::invalid_state("start", "closed"));
        }
        if self.state != PlayerState::Uninitialized {
            return Err(PlaybackError::invalid_state("start", self.state));
        }
        self.transition(PlayerState::Initializing);

        let init = match self.source.initialize() {
            Ok(init) => init,
            Err(e) => return Err(self.fail(e)),
        };
        self.problems.extend(init.problems.iter().cloned());

        self.current_time = init.start;
        self.next_start = init.start;
        self.initialization = Some(init);
        self.transition(PlayerState::Idle);

        if self.config.backfill_on_seek {
            let start = self.current_time;
            if let Err(e) = self.load_backfill(start) {
                return Err(self.fail(e));
            }
        }
        Ok(())
    }

    /// Start advancing through time from the current position.
    pub fn play(&mut self) -> Result<()> {
        match self.state {
            PlayerState::Idle => {
                self.transition(PlayerState::Playing);
                Ok(())
            }
            PlayerState::Playing => Ok(()),
            PlayerState::Seeking => {
                self.resume_playing = true;
                Ok(())
            }
            state => Err(PlaybackError::invalid_state("play", state)),
        }
    }

    /// Stop advancing; the current position is kept.
    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            PlayerState::Playing => {
                self.close_iterator();
                self.transition(PlayerState::Idle);
                Ok(())
            }
            PlayerState::Idle => Ok(()),
            PlayerState::Seeking => {
                self.resume_playing = false;
                Ok(())
            }
            state => Err(PlaybackError::invalid_state("pause", state)),
        }
    }

    /// Jump to `time`, then return to the state the engine was in.
    pub fn seek(&mut self, time: u64) -> Result<()> {
        let playing = match self.state {
            PlayerState::Playing => true,
            PlayerState::Seeking => self.resume_playing,
            _ => false,
        };
        self.seek_and_resume(time, playing)
    }

    /// Jump to `time`, then play if `play` is set or stay idle otherwise.
    ///
    /// A seek supersedes any earlier seek whose first frame has not been
    /// pulled yet: its iterator and backfill are dropped undelivered.
    /// Targets outside the playable range are clamped with an info problem.
    pub fn seek_and_resume(&mut self, time: u64, play: bool) -> Result<()> {
        if !self.state.is_ready() {
            return Err(PlaybackError::invalid_state("seek", self.state));
        }
        let range = self
            .range()
            .ok_or_else(|| PlaybackError::invalid_state("seek", self.state))?;

        let target = time::clamp(time, range.start, range.end);
        if target != time {
            let err = PlaybackError::InvalidRange {
                requested: time,
                start: range.start,
                end: range.end,
            };
            info!(
                context = "PlaybackEngine",
                requested = time,
                clamped = target,
                "Seek target clamped"
            );
            self.problems.push(
                Problem::info(format!(
                    "Seek target {} is outside the recording; playing from {}",
                    time::format_timestamp(time),
                    time::format_timestamp(target)
                ))
                .with_error(err),
            );
        }

        self.close_iterator();
        self.transition(PlayerState::Seeking);
        self.resume_playing = play;
        self.current_time = target;
        self.next_start = target;

        if self.config.backfill_on_seek {
            if let Err(e) = self.load_backfill(target) {
                return Err(self.fail(e));
            }
        } else {
            self.pending_backfill = None;
            self.delivered_backfill.clear();
        }

        if let Err(e) = self.open_iterator() {
            return Err(self.fail(e));
        }
        Ok(())
    }

    /// Change the speed multiplier, clamped to the configured bounds.
    ///
    /// Returns the speed actually applied.
    pub fn set_speed(&mut self, speed: f64) -> Result<f64> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(PlaybackError::invalid_state(
                format!("set speed to {speed}"),
                self.state,
            ));
        }
        self.speed = speed.clamp(self.config.min_speed, self.config.max_speed);
        debug!(context = "PlaybackEngine", speed = self.speed, "Speed changed");
        Ok(self.speed)
    }

    /// Restrict playback to topics accepted by `filter`.
    ///
    /// Takes effect from the current position; a live iterator is reopened.
    pub fn set_topic_filter(&mut self, filter: TopicFilter) -> Result<()> {
        self.filter = filter;
        if let Some(backfill) = self.pending_backfill.as_mut() {
            backfill.retain(|e| self.filter.should_include(&e.topic));
        }
        // Newly included topics may still have data ahead
        self.drained = false;
        if self.iterator.is_some() {
            self.close_iterator();
            if let Err(e) = self.open_iterator() {
                return Err(self.fail(e));
            }
        }
        Ok(())
    }

    /// Topics currently read, after applying the topic filter.
    pub fn subscribed_topics(&self) -> Vec<String> {
        self.initialization
            .as_ref()
            .map(|init| self.filter.resolve(init))
            .unwrap_or_default()
    }

    /// Produce the next frame.
    ///
    /// Returns `Ok(None)` when there is nothing to deliver: the engine is
    /// idle with no pending backfill. A fatal error moves the engine into
    /// [`PlayerState::Error`] and is returned.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.state {
            PlayerState::Uninitialized | PlayerState::Initializing => {
                Err(PlaybackError::invalid_state("produce a frame", self.state))
            }
            PlayerState::Error => Err(self
                .fatal
                .clone()
                .unwrap_or_else(|| PlaybackError::invalid_state("produce a frame", self.state))),
            PlayerState::Idle => match self.pending_backfill.take() {
                Some(backfill) => Ok(Some(self.frame(Vec::new(), backfill))),
                None => Ok(None),
            },
            PlayerState::Seeking => {
                let backfill = self.pending_backfill.take().unwrap_or_default();
                if self.resume_playing {
                    self.transition(PlayerState::Playing);
                    let events = self.pull_window()?;
                    Ok(Some(self.frame(events, backfill)))
                } else {
                    self.close_iterator();
                    self.transition(PlayerState::Idle);
                    Ok(Some(self.frame(Vec::new(), backfill)))
                }
            }
            PlayerState::Playing => {
                let backfill = self.pending_backfill.take().unwrap_or_default();
                let events = self.pull_window()?;
                Ok(Some(self.frame(events, backfill)))
            }
        }
    }

    /// Leave any state, dispose the live iterator and initialize again.
    pub fn restart(&mut self) -> Result<()> {
        if self.closed {
            return Err(PlaybackError::invalid_state("restart", "closed"));
        }
        info!(context = "PlaybackEngine", from = %self.state, "Restarting");
        self.reset();
        self.start()
    }

    /// Dispose every source.
    ///
    /// Closing is terminal: the engine stays `Uninitialized` and refuses
    /// `start` and `restart`. Open a new engine to play again.
    pub fn close(&mut self) {
        self.reset();
        self.closed = true;
        self.source.dispose();
        info!(context = "PlaybackEngine", "Closed");
    }

    fn reset(&mut self) {
        self.close_iterator();
        self.pending_backfill = None;
        self.delivered_backfill.clear();
        self.initialization = None;
        self.fatal = None;
        self.resume_playing = false;
        self.drained = false;
        self.current_time = 0;
        self.next_start = 0;
        self.transition(PlayerState::Uninitialized);
    }

    fn transition(&mut self, next: PlayerState) {
        if self.state != next {
            info!(context = "PlaybackEngine", from = %self.state, to = %next, "State change");
            self.state = next;
        }
    }

    /// Move into `Error`, recording the cause.
    fn fail(&mut self, err: PlaybackError) -> PlaybackError {
        error!(context = "PlaybackEngine", error = %err, "Playback failed");
        self.close_iterator();
        self.pending_backfill = None;
        self.problems
            .push(Problem::error("Playback stopped: no source is available").with_error(&err));
        self.fatal = Some(err.clone());
        self.transition(PlayerState::Error);
        err
    }

    fn close_iterator(&mut self) {
        if self.iterator.take().is_some() {
            debug!(context = "PlaybackEngine", generation = self.generation, "Iterator disposed");
        }
        self.lookahead = None;
    }

    fn open_iterator(&mut self) -> Result<()> {
        let end = self.range().map(|r| r.end).unwrap_or(0);
        self.generation += 1;
        let args = MessageIteratorArgs::new(self.subscribed_topics(), self.next_start, end);
        debug!(
            context = "PlaybackEngine",
            generation = self.generation,
            start = args.start,
            end = args.end,
            "Opening iterator"
        );
        let iterator = self.source.message_iterator(args)?;
        self.problems.extend(self.source.drain_problems());
        self.iterator = Some(iterator);
        self.drained = false;
        Ok(())
    }

    fn load_backfill(&mut self, target: u64) -> Result<()> {
        let topics: Vec<String> = self
            .subscribed_topics()
            .into_iter()
            .filter(|t| !self.config.dense_topics.contains(t))
            .collect();

        let found = if topics.is_empty() {
            Default::default()
        } else {
            self.source.backfill_messages(BackfillArgs {
                topics,
                time: target,
            })?
        };
        self.problems.extend(self.source.drain_problems());

        let mut events: Vec<MessageEvent> = found.into_values().collect();
        events.sort_by_key(|e| e.receive_time);
        self.delivered_backfill = events
            .iter()
            .filter(|e| e.receive_time == target)
            .cloned()
            .collect();
        debug!(context = "PlaybackEngine", target, events = events.len(), "Backfill loaded");
        self.pending_backfill = Some(events);
        Ok(())
    }

    /// Whether `event` was already delivered as backfill.
    fn was_backfilled(&mut self, event: &MessageEvent) -> bool {
        let Some(first) = self.delivered_backfill.first() else {
            return false;
        };
        if event.receive_time > first.receive_time {
            self.delivered_backfill.clear();
            return false;
        }
        match self.delivered_backfill.iter().position(|b| b == event) {
            Some(pos) => {
                self.delivered_backfill.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    /// Read the live events of one frame window.
    fn pull_window(&mut self) -> Result<Vec<MessageEvent>> {
        let range_end = self.range().map(|r| r.end).unwrap_or(0);
        if self.iterator.is_none() && !self.drained {
            if let Err(e) = self.open_iterator() {
                return Err(self.fail(e));
            }
        }

        let window_end = self
            .next_start
            .saturating_add(self.frame_window() - 1)
            .min(range_end);
        let max_events = self.config.max_frame_events.max(1);

        let mut events: Vec<MessageEvent> = Vec::new();
        let mut cut_at: Option<u64> = None;
        let mut cut = false;
        let mut exhausted = false;

        loop {
            let event = match self.lookahead.take() {
                Some(event) => event,
                None => {
                    let Some(iterator) = self.iterator.as_mut() else {
                        exhausted = true;
                        break;
                    };
                    match iterator.next() {
                        None => {
                            exhausted = true;
                            break;
                        }
                        Some(Err(e)) => return Err(self.fail(e)),
                        Some(Ok(IteratorResult::Problem(problem))) => {
                            self.problems.push(problem);
                            continue;
                        }
                        Some(Ok(IteratorResult::Event(event))) => event,
                    }
                }
            };

            // Never split events sharing a timestamp across frames.
            if cut_at.is_some_and(|limit| event.receive_time > limit) {
                self.lookahead = Some(event);
                cut = true;
                break;
            }
            if event.receive_time > window_end {
                self.lookahead = Some(event);
                break;
            }
            if self.was_backfilled(&event) {
                continue;
            }

            let time = event.receive_time;
            events.push(event);
            if cut_at.is_none() && events.len() >= max_events {
                cut_at = Some(time);
            }
        }

        if exhausted && window_end >= range_end {
            self.close_iterator();
            self.drained = true;
            self.current_time = range_end;
            self.next_start = range_end.saturating_add(1);
            info!(context = "PlaybackEngine", time = range_end, "Reached end of playback");
            self.transition(PlayerState::Idle);
        } else if exhausted {
            // Nothing left to read, but the clock still runs to the range end
            self.close_iterator();
            self.drained = true;
            self.current_time = window_end;
            self.next_start = window_end.saturating_add(1);
        } else if let (true, Some(limit)) = (cut, cut_at) {
            self.current_time = limit;
            self.next_start = limit.saturating_add(1);
        } else {
            self.current_time = window_end;
            self.next_start = window_end.saturating_add(1);
        }

        Ok(events)
    }

    fn frame(&self, events: Vec<MessageEvent>, backfill: Vec<MessageEvent>) -> Frame {
        let (topics, datatypes) = self
            .initialization
            .as_ref()
            .map(|init| (init.topics.clone(), init.datatypes.clone()))
            .unwrap_or_default();
        Frame {
            generation: self.generation,
            current_time: self.current_time,
            events,
            backfill,
            topics,
            datatypes,
            problems: self.problems.as_slice().to_vec(),
            state: self.state,
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.close_iterator();
        self.source.dispose();
    }
}

/// Builder for [`PlaybackEngine`].
#[derive(Default)]
pub struct PlaybackEngineBuilder {
    sources: Vec<Box<dyn IterableSource>>,
    config: Option<PlayerConfig>,
    sink: Option<Arc<dyn DiagnosticsSink>>,
}

impl PlaybackEngineBuilder {
    /// Register one source.
    pub fn source(mut self, source: impl IterableSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Register several sources in order.
    pub fn sources(mut self, sources: Vec<Box<dyn IterableSource>>) -> Self {
        self.sources.extend(sources);
        self
    }

    /// Use `config` instead of the defaults.
    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Forward recorded problems to `sink` instead of `tracing`.
    pub fn sink(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build the engine. Fails on an invalid configuration.
    pub fn build(self) -> Result<PlaybackEngine> {
        let config = self.config.unwrap_or_default();
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));
        PlaybackEngine::with_sink(self.sources, config, sink)
    }
}
