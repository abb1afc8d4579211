// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! MCAP source adapter.
//!
//! Indexed files are iterated one chunk at a time through
//! [`ChunkedStream`]. Files without a readable summary are walked record by
//! record at initialize and then read as a single pseudo-chunk; a channel
//! naming a schema that was never written is dropped on its own.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::{PlaybackError, Problem, Result};
use crate::io::bytes::ByteSource;
use crate::io::formats::chunked::{self, ChunkBounds, ChunkSource, ChunkedStream};
use crate::io::metadata::{Initialization, MessageEvent, Payload, SourceLocation, Topic};
use crate::io::traits::{BackfillArgs, EventStream, IterableSource, MessageIteratorArgs};
use crate::schema::{parse_schema, MessageDefinition};

/// Channel metadata needed to build events.
#[derive(Debug, Clone)]
struct ChannelMeta {
    topic: String,
    schema_name: String,
    message_encoding: String,
}

/// How messages are located in the file.
enum Layout {
    /// Summary with chunk indexes
    Indexed(Box<mcap::Summary>),
    /// No usable chunk index; messages are found by a linear scan
    Linear,
}

/// Parsed index shared by all iterators of one source.
struct McapIndex {
    data: Arc<ByteSource>,
    layout: Layout,
    channels: HashMap<u16, ChannelMeta>,
    bounds: Vec<ChunkBounds>,
}

impl ChunkSource for McapIndex {
    fn chunk_bounds(&self) -> &[ChunkBounds] {
        &self.bounds
    }

    fn read_chunk(&self, chunk: usize, visit: &mut dyn FnMut(u32, u64, &[u8])) -> Result<()> {
        match &self.layout {
            Layout::Indexed(summary) => {
                let index = summary.chunk_indexes.get(chunk).ok_or_else(|| {
                    PlaybackError::parse("MCAP chunk index", format!("no chunk {chunk}"))
                })?;
                for message in summary.stream_chunk(&self.data, index)? {
                    let message = message?;
                    visit(u32::from(message.channel.id), message.log_time, &message.data);
                }
            }
            Layout::Linear => {
                // Record problems were reported once at initialize
                let mut problems = Vec::new();
                walk_messages(
                    &self.data,
                    &mut ChannelRegistry::default(),
                    &mut problems,
                    &mut |channel, log_time, data| visit(u32::from(channel), log_time, data),
                )?;
            }
        }
        Ok(())
    }

    fn channel_ids(&self, topics: &[String]) -> HashSet<u32> {
        self.channels
            .iter()
            .filter(|(_, c)| topics.iter().any(|t| *t == c.topic))
            .map(|(id, _)| u32::from(*id))
            .collect()
    }

    fn build_event(
        &self,
        channel: u32,
        log_time: u64,
        data: Vec<u8>,
    ) -> Option<Result<MessageEvent>> {
        let meta = u16::try_from(channel)
            .ok()
            .and_then(|id| self.channels.get(&id))?;
        let size_in_bytes = data.len();
        Some(decode_payload(meta, data).map(|payload| MessageEvent {
            topic: meta.topic.clone(),
            receive_time: log_time,
            payload,
            schema_name: meta.schema_name.clone(),
            size_in_bytes,
        }))
    }
}

/// Decode a payload according to its message encoding. JSON is parsed;
/// every other encoding is passed through as raw bytes.
fn decode_payload(channel: &ChannelMeta, data: Vec<u8>) -> Result<Payload> {
    match channel.message_encoding.as_str() {
        "json" => serde_json::from_slice(&data)
            .map(Payload::Json)
            .map_err(|e| PlaybackError::decode(&channel.topic, e.to_string())),
        _ => Ok(Payload::Raw(data)),
    }
}

/// MCAP file or URL exposed as an [`IterableSource`].
pub struct McapSource {
    location: SourceLocation,
    name: String,
    bytes: Option<Arc<ByteSource>>,
    index: Option<Arc<McapIndex>>,
}

impl McapSource {
    /// Create an adapter for a location. Nothing is read until `initialize`.
    pub fn new(location: SourceLocation) -> Self {
        let name = location.name();
        Self {
            location,
            name,
            bytes: None,
            index: None,
        }
    }

    /// Create an adapter over bytes already in memory.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        Self {
            location: SourceLocation::Url(name.clone()),
            name,
            bytes: Some(Arc::new(ByteSource::Owned(bytes))),
            index: None,
        }
    }

    fn index(&self) -> Result<Arc<McapIndex>> {
        self.index
            .clone()
            .ok_or_else(|| PlaybackError::invalid_state("read messages", "uninitialized"))
    }
}

impl IterableSource for McapSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self) -> Result<Initialization> {
        let data = match &self.bytes {
            Some(data) => Arc::clone(data),
            None => Arc::new(ByteSource::open(&self.location)?),
        };

        let mut init = Initialization::default();
        init.metadata.insert("source".to_string(), self.location.to_string());
        init.metadata.insert("format".to_string(), "mcap".to_string());
        init.profile = read_profile(&data)
            .map_err(|e| PlaybackError::source_init(&self.name, e.to_string()))?;

        let summary = match mcap::Summary::read(&data) {
            Ok(summary) => summary,
            Err(e) => {
                warn!(
                    context = "McapSource",
                    source = %self.name,
                    error = %e,
                    "Failed to read summary, scanning messages"
                );
                init.problems.push(
                    Problem::warn(format!("Failed to read summary of \"{}\"", self.name))
                        .with_error(&e)
                        .with_tip("The file may be truncated. Playback falls back to a full scan."),
                );
                None
            }
        };

        let index = match summary {
            Some(summary) if !summary.chunk_indexes.is_empty() => {
                init_from_summary(&summary, &mut init);
                McapIndex {
                    channels: channel_table(summary.channels.values()),
                    bounds: summary
                        .chunk_indexes
                        .iter()
                        .map(|c| ChunkBounds {
                            start: c.message_start_time,
                            end: c.message_end_time,
                        })
                        .collect(),
                    layout: Layout::Indexed(Box::new(summary)),
                    data: Arc::clone(&data),
                }
            }
            _ => {
                debug!(context = "McapSource", source = %self.name, "Scanning unindexed file");
                let (channels, range) = init_from_scan(&data, &mut init);
                McapIndex {
                    channels,
                    bounds: range
                        .map(|(start, end)| vec![ChunkBounds { start, end }])
                        .unwrap_or_default(),
                    layout: Layout::Linear,
                    data: Arc::clone(&data),
                }
            }
        };

        debug!(
            context = "McapSource",
            source = %self.name,
            topics = init.topics.len(),
            chunks = index.bounds.len(),
            start = init.start,
            end = init.end,
            "Initialized"
        );

        self.bytes = Some(data);
        self.index = Some(Arc::new(index));
        Ok(init)
    }

    fn message_iterator(&mut self, args: MessageIteratorArgs) -> Result<Box<dyn EventStream>> {
        Ok(Box::new(ChunkedStream::new(self.index()?, args)))
    }

    fn backfill_messages(&mut self, args: BackfillArgs) -> Result<BTreeMap<String, MessageEvent>> {
        chunked::backfill(self.index()?.as_ref(), &args)
    }

    fn dispose(&mut self) {
        if self.index.take().is_some() {
            debug!(context = "McapSource", source = %self.name, "Disposed");
        }
        // In-memory and downloaded bytes are kept so a restart does not refetch.
        if matches!(self.location, SourceLocation::Path(_)) {
            self.bytes = None;
        }
    }
}

/// Profile string from the header record.
fn read_profile(data: &[u8]) -> Result<Option<String>> {
    let mut reader = mcap::read::LinearReader::new(data)?;
    match reader.next() {
        Some(Ok(mcap::records::Record::Header(header))) if !header.profile.is_empty() => {
            Ok(Some(header.profile))
        }
        Some(Err(e)) => Err(e.into()),
        _ => Ok(None),
    }
}

fn channel_table<'a, 'b: 'a>(
    channels: impl Iterator<Item = &'a Arc<mcap::Channel<'b>>>,
) -> HashMap<u16, ChannelMeta> {
    channels.map(|c| (c.id, channel_meta(c))).collect()
}

fn channel_meta(channel: &mcap::Channel<'_>) -> ChannelMeta {
    ChannelMeta {
        topic: channel.topic.clone(),
        schema_name: channel
            .schema
            .as_ref()
            .map(|s| s.name.clone())
            .unwrap_or_default(),
        message_encoding: channel.message_encoding.clone(),
    }
}

/// Register a channel's topic and, once per schema, its datatypes.
fn register_channel(
    channel: &mcap::Channel<'_>,
    message_count: Option<u64>,
    seen_schemas: &mut HashSet<u16>,
    init: &mut Initialization,
) {
    let meta = channel_meta(channel);
    let mut topic = Topic::new(meta.topic, meta.schema_name);
    topic.message_count = message_count;
    if !init.add_topic(topic) {
        debug!(context = "McapSource", topic = %channel.topic, "Duplicate channel for topic");
    }

    let Some(schema) = channel.schema.as_ref() else {
        return;
    };
    if !seen_schemas.insert(schema.id) {
        return;
    }
    match parse_schema(&schema.name, &schema.encoding, &schema.data) {
        Ok(datatypes) => {
            for (name, definition) in datatypes {
                init.datatypes.entry(name).or_insert(definition);
            }
        }
        Err(e) => {
            init.problems.push(
                Problem::warn(format!("Failed to parse schema \"{}\"", schema.name)).with_error(e),
            );
            init.datatypes
                .entry(schema.name.clone())
                .or_insert_with(|| MessageDefinition::new(schema.name.clone()));
        }
    }
}

fn init_from_summary(summary: &mcap::Summary, init: &mut Initialization) {
    let counts = summary.stats.as_ref().map(|s| &s.channel_message_counts);

    let mut channels: Vec<_> = summary.channels.values().collect();
    channels.sort_by_key(|c| c.id);

    let mut seen_schemas = HashSet::new();
    for channel in channels {
        let count = counts.map(|c| c.get(&channel.id).copied().unwrap_or(0));
        register_channel(channel, count, &mut seen_schemas, init);
    }

    match &summary.stats {
        Some(stats) if stats.message_count > 0 => {
            init.start = stats.message_start_time;
            init.end = stats.message_end_time;
        }
        _ => {
            let chunks = &summary.chunk_indexes;
            init.start = chunks.iter().map(|c| c.message_start_time).min().unwrap_or(0);
            init.end = chunks.iter().map(|c| c.message_end_time).max().unwrap_or(0);
        }
    }
}

/// Schemas and channels met while walking the data section.
#[derive(Default)]
struct ChannelRegistry {
    schemas: HashMap<u16, Arc<mcap::Schema<'static>>>,
    channels: HashMap<u16, Arc<mcap::Channel<'static>>>,
    /// Channel ids in the order their records appear
    order: Vec<u16>,
    /// Channels naming a schema that was never written
    orphaned: HashSet<u16>,
}

impl ChannelRegistry {
    fn add_schema(&mut self, header: mcap::records::SchemaHeader, data: Cow<'_, [u8]>) {
        // Id 0 means "no schema" and is never a valid schema record
        if header.id == 0 {
            return;
        }
        self.schemas.entry(header.id).or_insert_with(|| {
            Arc::new(mcap::Schema {
                id: header.id,
                name: header.name,
                encoding: header.encoding,
                data: Cow::Owned(data.into_owned()),
            })
        });
    }

    fn add_channel(&mut self, record: mcap::records::Channel, problems: &mut Vec<Problem>) {
        if self.channels.contains_key(&record.id) || self.orphaned.contains(&record.id) {
            return;
        }
        let schema = match record.schema_id {
            0 => None,
            id => match self.schemas.get(&id) {
                Some(schema) => Some(Arc::clone(schema)),
                None => {
                    warn!(
                        context = "McapSource",
                        channel = record.id,
                        schema = id,
                        topic = %record.topic,
                        "Skipping channel with unknown schema"
                    );
                    problems.push(
                        Problem::error(format!(
                            "Channel {} on topic \"{}\" refers to unknown schema {}",
                            record.id, record.topic, id
                        ))
                        .with_tip("Messages on this channel are skipped."),
                    );
                    self.orphaned.insert(record.id);
                    return;
                }
            },
        };
        self.order.push(record.id);
        self.channels.insert(
            record.id,
            Arc::new(mcap::Channel {
                id: record.id,
                topic: record.topic,
                schema,
                message_encoding: record.message_encoding,
                metadata: record.metadata,
            }),
        );
    }

    fn handle(
        &mut self,
        record: mcap::records::Record<'_>,
        problems: &mut Vec<Problem>,
        visit: &mut dyn FnMut(u16, u64, &[u8]),
    ) {
        match record {
            mcap::records::Record::Schema { header, data } => self.add_schema(header, data),
            mcap::records::Record::Channel(channel) => self.add_channel(channel, problems),
            mcap::records::Record::Message { header, data } => {
                if self.channels.contains_key(&header.channel_id) {
                    visit(header.channel_id, header.log_time, &data);
                }
            }
            _ => {}
        }
    }
}

/// Walk every record of the data section, descending into chunks.
///
/// Messages on registered channels are passed to `visit` as
/// `(channel, log_time, data)`. Unreadable records end the walk (or the
/// current chunk) with an error problem instead of failing it.
fn walk_messages(
    data: &[u8],
    registry: &mut ChannelRegistry,
    problems: &mut Vec<Problem>,
    visit: &mut dyn FnMut(u16, u64, &[u8]),
) -> Result<()> {
    for record in mcap::read::LinearReader::new(data)? {
        match record {
            Ok(mcap::records::Record::Chunk { header, data }) => {
                let chunk = match mcap::read::ChunkReader::new(header, &data) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        problems.push(Problem::error("Failed to read chunk").with_error(e));
                        continue;
                    }
                };
                for inner in chunk {
                    match inner {
                        Ok(inner) => registry.handle(inner, problems, visit),
                        Err(e) => {
                            problems
                                .push(Problem::error("Failed to read chunk record").with_error(e));
                            break;
                        }
                    }
                }
            }
            Ok(record) => registry.handle(record, problems, visit),
            Err(e) => {
                problems.push(Problem::error("Failed to read record").with_error(e));
                break;
            }
        }
    }
    Ok(())
}

/// Walk the data section once. Returns the channel table and the time range.
fn init_from_scan(
    data: &[u8],
    init: &mut Initialization,
) -> (HashMap<u16, ChannelMeta>, Option<(u64, u64)>) {
    let mut registry = ChannelRegistry::default();
    let mut counts: HashMap<u16, u64> = HashMap::new();
    let mut range: Option<(u64, u64)> = None;

    let walked = walk_messages(data, &mut registry, &mut init.problems, &mut |id, log_time, _| {
        *counts.entry(id).or_default() += 1;
        range = Some(match range {
            Some((s, e)) => (s.min(log_time), e.max(log_time)),
            None => (log_time, log_time),
        });
    });
    if let Err(e) = walked {
        init.problems
            .push(Problem::error("Failed to read messages").with_error(e));
    }

    let mut channels: HashMap<u16, ChannelMeta> = HashMap::new();
    let mut seen_schemas = HashSet::new();
    for id in &registry.order {
        let Some(channel) = registry.channels.get(id) else {
            continue;
        };
        let count = counts.get(id).copied().unwrap_or(0);
        register_channel(channel, Some(count), &mut seen_schemas, init);
        channels.insert(*id, channel_meta(channel));
    }
    if let Some((start, end)) = range {
        init.start = start;
        init.end = end;
    }
    (channels, range)
}
