// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Common utilities for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use roboplay::core::Problem;
use roboplay::io::metadata::Topic;
use roboplay::schema::{Datatypes, MessageDefinition, MessageDefinitionField};
use roboplay::{
    BackfillArgs, EventStream, Initialization, IterableSource, IteratorResult, MessageEvent,
    MessageIteratorArgs, PlaybackError, Result,
};

// ============================================================================
// Temporary files
// ============================================================================

/// Directory removed when dropped.
#[derive(Debug)]
pub struct CleanupGuard(pub PathBuf);

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

/// A fresh temporary directory unique to this process and test.
pub fn temp_dir(name: &str) -> (PathBuf, CleanupGuard) {
    let random = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "roboplay_{}_{}_{}",
        name,
        std::process::id(),
        random
    ));
    fs::create_dir_all(&dir).unwrap();
    (dir.clone(), CleanupGuard(dir))
}

// ============================================================================
// MCAP fixtures
// ============================================================================

/// One channel of a generated MCAP file.
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub topic: String,
    pub schema_name: String,
    pub schema_encoding: String,
    pub schema_data: Vec<u8>,
    pub message_encoding: String,
}

impl ChannelSpec {
    /// A JSON channel with a JSON schema of numeric properties.
    pub fn json(topic: &str, schema_name: &str, fields: &[&str]) -> Self {
        let properties: serde_json::Map<String, serde_json::Value> = fields
            .iter()
            .map(|f| (f.to_string(), serde_json::json!({ "type": "number" })))
            .collect();
        let schema = serde_json::json!({ "type": "object", "properties": properties });
        Self {
            topic: topic.to_string(),
            schema_name: schema_name.to_string(),
            schema_encoding: "jsonschema".to_string(),
            schema_data: serde_json::to_vec(&schema).unwrap(),
            message_encoding: "json".to_string(),
        }
    }

    /// A ROS1 channel with a `.msg` definition and raw payloads.
    pub fn ros1(topic: &str, schema_name: &str, definition: &str) -> Self {
        Self {
            topic: topic.to_string(),
            schema_name: schema_name.to_string(),
            schema_encoding: "ros1msg".to_string(),
            schema_data: definition.as_bytes().to_vec(),
            message_encoding: "ros1".to_string(),
        }
    }
}

/// One message of a generated MCAP file.
#[derive(Debug, Clone)]
pub struct MessageSpec {
    /// Index into the channel list
    pub channel: usize,
    pub log_time: u64,
    pub data: Vec<u8>,
}

impl MessageSpec {
    /// A JSON message `{"x": <time>}`.
    pub fn json(channel: usize, log_time: u64) -> Self {
        Self {
            channel,
            log_time,
            data: format!("{{\"x\": {log_time}}}").into_bytes(),
        }
    }

    /// A message whose payload is not valid JSON.
    pub fn corrupt(channel: usize, log_time: u64) -> Self {
        Self {
            channel,
            log_time,
            data: b"{not json".to_vec(),
        }
    }

    pub fn raw(channel: usize, log_time: u64, data: &[u8]) -> Self {
        Self {
            channel,
            log_time,
            data: data.to_vec(),
        }
    }
}

/// Write an MCAP file with the given channels and messages.
///
/// `flush_every` starts a new chunk after that many messages.
pub fn write_mcap(
    path: &Path,
    channels: &[ChannelSpec],
    messages: &[MessageSpec],
    flush_every: Option<usize>,
) {
    let file = BufWriter::new(fs::File::create(path).unwrap());
    let mut writer = mcap::WriteOptions::new()
        .compression(None)
        .profile("ros1")
        .create(file)
        .unwrap();

    let mut ids = Vec::new();
    for spec in channels {
        let schema_id = writer
            .add_schema(&spec.schema_name, &spec.schema_encoding, &spec.schema_data)
            .unwrap();
        let channel_id = writer
            .add_channel(
                schema_id,
                &spec.topic,
                &spec.message_encoding,
                &BTreeMap::new(),
            )
            .unwrap();
        ids.push(channel_id);
    }

    for (i, message) in messages.iter().enumerate() {
        writer
            .write_to_known_channel(
                &mcap::records::MessageHeader {
                    channel_id: ids[message.channel],
                    sequence: i as u32,
                    log_time: message.log_time,
                    publish_time: message.log_time,
                },
                &message.data,
            )
            .unwrap();
        if let Some(n) = flush_every {
            if (i + 1) % n == 0 {
                writer.flush().unwrap();
            }
        }
    }

    writer.finish().unwrap();
}

// ============================================================================
// ROS1 bag fixtures
// ============================================================================

/// One connection of a generated bag.
#[derive(Debug, Clone)]
pub struct BagConnection {
    pub topic: String,
    pub datatype: String,
    pub definition: String,
}

impl BagConnection {
    pub fn new(topic: &str, datatype: &str, definition: &str) -> Self {
        Self {
            topic: topic.to_string(),
            datatype: datatype.to_string(),
            definition: definition.to_string(),
        }
    }
}

/// One message of a generated bag.
#[derive(Debug, Clone)]
pub struct BagMessage {
    /// Index into the connection list
    pub connection: usize,
    pub time: u64,
    pub data: Vec<u8>,
}

impl BagMessage {
    pub fn new(connection: usize, time: u64, data: &[u8]) -> Self {
        Self {
            connection,
            time,
            data: data.to_vec(),
        }
    }
}

fn bag_field(out: &mut Vec<u8>, name: &str, value: &[u8]) {
    out.extend_from_slice(&((name.len() + 1 + value.len()) as u32).to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    out.push(b'=');
    out.extend_from_slice(value);
}

fn bag_time(time: u64) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&((time / 1_000_000_000) as u32).to_le_bytes());
    out[4..].copy_from_slice(&((time % 1_000_000_000) as u32).to_le_bytes());
    out
}

fn bag_record(out: &mut Vec<u8>, header: &[u8], data: &[u8]) {
    out.extend_from_slice(&(header.len() as u32).to_le_bytes());
    out.extend_from_slice(header);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
}

fn bag_connection_record(out: &mut Vec<u8>, id: u32, connection: &BagConnection) {
    let mut header = Vec::new();
    bag_field(&mut header, "op", &[0x07]);
    bag_field(&mut header, "conn", &id.to_le_bytes());
    bag_field(&mut header, "topic", connection.topic.as_bytes());
    let mut data = Vec::new();
    bag_field(&mut data, "topic", connection.topic.as_bytes());
    bag_field(&mut data, "type", connection.datatype.as_bytes());
    bag_field(&mut data, "md5sum", "0".repeat(32).as_bytes());
    bag_field(&mut data, "message_definition", connection.definition.as_bytes());
    bag_field(&mut data, "callerid", b"/recorder");
    bag_field(&mut data, "latching", b"0");
    bag_record(out, &header, &data);
}

fn bag_header_record(index_pos: u64, conn_count: u32, chunk_count: u32) -> Vec<u8> {
    let mut header = Vec::new();
    bag_field(&mut header, "op", &[0x03]);
    bag_field(&mut header, "index_pos", &index_pos.to_le_bytes());
    bag_field(&mut header, "conn_count", &conn_count.to_le_bytes());
    bag_field(&mut header, "chunk_count", &chunk_count.to_le_bytes());
    let mut out = Vec::new();
    // Recorders pad the header record to 4096 bytes
    let padding = 4096 - 8 - header.len();
    bag_record(&mut out, &header, &vec![b' '; padding]);
    out
}

/// Write an uncompressed v2.0 bag.
///
/// Messages are stored in the given order, `per_chunk` to a chunk. Each
/// chunk carries its own connection records and is followed by index data
/// records; the index section holds every connection and one chunk info
/// record per chunk.
pub fn write_bag(
    path: &Path,
    connections: &[BagConnection],
    messages: &[BagMessage],
    per_chunk: usize,
) {
    const VERSION: &[u8] = b"#ROSBAG V2.0\n";
    let header_len = bag_header_record(0, 0, 0).len();
    let chunk_section_start = (VERSION.len() + header_len) as u64;

    let mut chunks = Vec::new();
    // (chunk_pos, start, end, per-connection counts)
    let mut infos: Vec<(u64, u64, u64, BTreeMap<u32, u32>)> = Vec::new();

    for group in messages.chunks(per_chunk.max(1)) {
        let mut data = Vec::new();
        let mut counts: BTreeMap<u32, u32> = BTreeMap::new();
        let mut offsets: BTreeMap<u32, Vec<(u64, u32)>> = BTreeMap::new();
        for message in group {
            let id = message.connection as u32;
            if !counts.contains_key(&id) {
                bag_connection_record(&mut data, id, &connections[message.connection]);
            }
            *counts.entry(id).or_insert(0) += 1;
            offsets
                .entry(id)
                .or_default()
                .push((message.time, data.len() as u32));

            let mut header = Vec::new();
            bag_field(&mut header, "op", &[0x02]);
            bag_field(&mut header, "conn", &id.to_le_bytes());
            bag_field(&mut header, "time", &bag_time(message.time));
            bag_record(&mut data, &header, &message.data);
        }

        let chunk_pos = chunk_section_start + chunks.len() as u64;
        let mut header = Vec::new();
        bag_field(&mut header, "op", &[0x05]);
        bag_field(&mut header, "compression", b"none");
        bag_field(&mut header, "size", &(data.len() as u32).to_le_bytes());
        bag_record(&mut chunks, &header, &data);

        for (id, entries) in &offsets {
            let mut header = Vec::new();
            bag_field(&mut header, "op", &[0x04]);
            bag_field(&mut header, "ver", &1u32.to_le_bytes());
            bag_field(&mut header, "conn", &id.to_le_bytes());
            bag_field(&mut header, "count", &(entries.len() as u32).to_le_bytes());
            let mut body = Vec::new();
            for (time, offset) in entries {
                body.extend_from_slice(&bag_time(*time));
                body.extend_from_slice(&offset.to_le_bytes());
            }
            bag_record(&mut chunks, &header, &body);
        }

        let start = group.iter().map(|m| m.time).min().unwrap_or(0);
        let end = group.iter().map(|m| m.time).max().unwrap_or(0);
        infos.push((chunk_pos, start, end, counts));
    }

    let index_pos = chunk_section_start + chunks.len() as u64;
    let mut index = Vec::new();
    for (id, connection) in connections.iter().enumerate() {
        bag_connection_record(&mut index, id as u32, connection);
    }
    for (chunk_pos, start, end, counts) in &infos {
        let mut header = Vec::new();
        bag_field(&mut header, "op", &[0x06]);
        bag_field(&mut header, "ver", &1u32.to_le_bytes());
        bag_field(&mut header, "chunk_pos", &chunk_pos.to_le_bytes());
        bag_field(&mut header, "start_time", &bag_time(*start));
        bag_field(&mut header, "end_time", &bag_time(*end));
        bag_field(&mut header, "count", &(counts.len() as u32).to_le_bytes());
        let mut body = Vec::new();
        for (id, count) in counts {
            body.extend_from_slice(&id.to_le_bytes());
            body.extend_from_slice(&count.to_le_bytes());
        }
        bag_record(&mut index, &header, &body);
    }

    let mut out = VERSION.to_vec();
    out.extend(bag_header_record(
        index_pos,
        connections.len() as u32,
        infos.len() as u32,
    ));
    out.extend(chunks);
    out.extend(index);
    fs::write(path, out).unwrap();
}

// ============================================================================
// In-memory source
// ============================================================================

#[derive(Debug, Clone)]
enum Entry {
    Event(MessageEvent),
    Corrupt { topic: String, time: u64 },
}

impl Entry {
    fn time(&self) -> u64 {
        match self {
            Entry::Event(e) => e.receive_time,
            Entry::Corrupt { time, .. } => *time,
        }
    }

    fn topic(&self) -> &str {
        match self {
            Entry::Event(e) => &e.topic,
            Entry::Corrupt { topic, .. } => topic,
        }
    }
}

/// Observations of a [`MemorySource`] that outlive the engine owning it.
#[derive(Debug, Default)]
pub struct Counters {
    pub iterators_opened: AtomicUsize,
    pub disposed: AtomicBool,
}

/// In-memory [`IterableSource`] with injectable failures.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    topics: Vec<Topic>,
    datatypes: Datatypes,
    entries: Vec<Entry>,
    range: Option<(u64, u64)>,
    fail_init: Option<String>,
    fail_after: Option<usize>,
    counters: Arc<Counters>,
}

impl MemorySource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            topics: Vec::new(),
            datatypes: Datatypes::new(),
            entries: Vec::new(),
            range: None,
            fail_init: None,
            fail_after: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Declare a topic.
    pub fn topic(mut self, name: &str, schema: &str) -> Self {
        self.topics.push(Topic::new(name, schema));
        self
    }

    /// Declare a datatype with float64 fields.
    pub fn datatype(mut self, name: &str, fields: &[&str]) -> Self {
        let mut def = MessageDefinition::new(name);
        for field in fields {
            def.add_field(MessageDefinitionField::new(*field, "float64"));
        }
        self.datatypes.insert(name.to_string(), def);
        self
    }

    /// Add one event per time on `topic`. The topic must be declared.
    pub fn events(mut self, topic: &str, times: &[u64]) -> Self {
        let schema = self
            .topics
            .iter()
            .find(|t| t.name == topic)
            .map(|t| t.schema_name.clone())
            .unwrap_or_default();
        for time in times {
            let payload = format!("{}@{}", self.name, time).into_bytes();
            self.entries.push(Entry::Event(MessageEvent::raw(
                topic, *time, &schema, payload,
            )));
        }
        self.entries.sort_by_key(Entry::time);
        self
    }

    /// Add a message that fails to decode.
    pub fn corrupt(mut self, topic: &str, time: u64) -> Self {
        self.entries.push(Entry::Corrupt {
            topic: topic.to_string(),
            time,
        });
        self.entries.sort_by_key(Entry::time);
        self
    }

    /// Override the advertised time range.
    pub fn range(mut self, start: u64, end: u64) -> Self {
        self.range = Some((start, end));
        self
    }

    /// Make `initialize` fail.
    pub fn failing_init(mut self, reason: &str) -> Self {
        self.fail_init = Some(reason.to_string());
        self
    }

    /// Make every iterator fail after yielding `n` items.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Shared observations.
    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    pub fn boxed(self) -> Box<dyn IterableSource> {
        Box::new(self)
    }
}

impl IterableSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self) -> Result<Initialization> {
        if let Some(reason) = &self.fail_init {
            return Err(PlaybackError::source_init(&self.name, reason.clone()));
        }
        let (start, end) = self.range.unwrap_or_else(|| {
            (
                self.entries.first().map(Entry::time).unwrap_or(0),
                self.entries.last().map(Entry::time).unwrap_or(0),
            )
        });
        let mut init = Initialization {
            start,
            end,
            datatypes: self.datatypes.clone(),
            ..Default::default()
        };
        for topic in &self.topics {
            init.add_topic(topic.clone());
        }
        Ok(init)
    }

    fn message_iterator(&mut self, args: MessageIteratorArgs) -> Result<Box<dyn EventStream>> {
        self.counters.iterators_opened.fetch_add(1, Ordering::SeqCst);
        let mut items: Vec<Result<IteratorResult>> = self
            .entries
            .iter()
            .filter(|e| e.time() >= args.start && e.time() <= args.end && args.wants(e.topic()))
            .map(|e| match e {
                Entry::Event(event) => Ok(IteratorResult::Event(event.clone())),
                Entry::Corrupt { topic, time } => Ok(IteratorResult::Problem(Problem::error(
                    format!("Failed to decode message on topic \"{topic}\" at {time}"),
                ))),
            })
            .collect();
        if args.reverse {
            items.reverse();
        }
        if let Some(n) = self.fail_after {
            items.truncate(n);
            items.push(Err(PlaybackError::Io(format!("{} went away", self.name))));
        }
        Ok(Box::new(items.into_iter()))
    }

    fn backfill_messages(&mut self, args: BackfillArgs) -> Result<BTreeMap<String, MessageEvent>> {
        let mut found = BTreeMap::new();
        for entry in self.entries.iter().rev() {
            if let Entry::Event(event) = entry {
                if event.receive_time <= args.time
                    && args.topics.contains(&event.topic)
                    && !found.contains_key(&event.topic)
                {
                    found.insert(event.topic.clone(), event.clone());
                }
            }
        }
        Ok(found)
    }

    fn dispose(&mut self) {
        self.counters.disposed.store(true, Ordering::SeqCst);
    }
}

/// Receive times of the events in `items`, in order.
pub fn event_times(items: &[IteratorResult]) -> Vec<u64> {
    items
        .iter()
        .filter_map(|i| i.event().map(|e| e.receive_time))
        .collect()
}

/// Drain a stream, panicking on errors.
pub fn drain(stream: Box<dyn EventStream>) -> Vec<IteratorResult> {
    stream.map(|r| r.unwrap()).collect()
}
