// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! ROS1 bag source adapter.
//!
//! Connections and chunk infos come from the index section. Chunks are
//! located by their file offset and decompressed on demand. Payloads are
//! delivered as raw ROS1-serialized bytes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::core::{PlaybackError, Problem, Result};
use crate::io::formats::chunked::{self, ChunkBounds, ChunkSource, ChunkedStream};
use crate::io::metadata::{Initialization, MessageEvent, SourceLocation, Topic};
use crate::io::traits::{BackfillArgs, EventStream, IterableSource, MessageIteratorArgs};
use crate::schema::{parse_schema, MessageDefinition};

/// Connection metadata needed to build events.
#[derive(Debug, Clone)]
struct ConnectionMeta {
    topic: String,
    schema_name: String,
}

/// Parsed bag index shared by all iterators of one source.
struct BagIndex {
    bag: rosbag::RosBag,
    connections: HashMap<u32, ConnectionMeta>,
    bounds: Vec<ChunkBounds>,
    /// File offset of each chunk record, parallel to `bounds`
    positions: Vec<u64>,
}

fn bag_error(context: &str, e: impl std::fmt::Display) -> PlaybackError {
    PlaybackError::parse(format!("bag {context}"), e.to_string())
}

impl ChunkSource for BagIndex {
    fn chunk_bounds(&self) -> &[ChunkBounds] {
        &self.bounds
    }

    fn read_chunk(&self, chunk: usize, visit: &mut dyn FnMut(u32, u64, &[u8])) -> Result<()> {
        let position = *self
            .positions
            .get(chunk)
            .ok_or_else(|| bag_error("chunk index", format!("no chunk {chunk}")))?;

        let mut records = self.bag.chunk_records();
        records.seek(position).map_err(|e| bag_error("chunk seek", e))?;

        match records.next() {
            Some(Ok(rosbag::ChunkRecord::Chunk(chunk))) => {
                for record in chunk.messages() {
                    if let rosbag::MessageRecord::MessageData(message) =
                        record.map_err(|e| bag_error("message", e))?
                    {
                        visit(message.conn_id, message.time, message.data);
                    }
                }
                Ok(())
            }
            Some(Ok(_)) => Err(bag_error("chunk", format!("no chunk record at {position}"))),
            Some(Err(e)) => Err(bag_error("chunk", e)),
            None => Err(bag_error("chunk", format!("unexpected end of file at {position}"))),
        }
    }

    fn channel_ids(&self, topics: &[String]) -> HashSet<u32> {
        self.connections
            .iter()
            .filter(|(_, c)| topics.iter().any(|t| *t == c.topic))
            .map(|(id, _)| *id)
            .collect()
    }

    fn build_event(
        &self,
        channel: u32,
        log_time: u64,
        data: Vec<u8>,
    ) -> Option<Result<MessageEvent>> {
        let meta = self.connections.get(&channel)?;
        Some(Ok(MessageEvent::raw(
            meta.topic.clone(),
            log_time,
            meta.schema_name.clone(),
            data,
        )))
    }
}

/// ROS1 bag file exposed as an [`IterableSource`].
pub struct BagSource {
    location: SourceLocation,
    name: String,
    index: Option<Arc<BagIndex>>,
}

impl BagSource {
    /// Create an adapter for a location. Nothing is read until `initialize`.
    pub fn new(location: SourceLocation) -> Self {
        let name = location.name();
        Self {
            location,
            name,
            index: None,
        }
    }

    fn path(&self) -> Result<PathBuf> {
        match &self.location {
            SourceLocation::Path(path) => Ok(path.clone()),
            SourceLocation::Url(_) => Err(PlaybackError::source_init(
                &self.name,
                "ROS1 bags can only be opened from local files",
            )),
        }
    }

    fn index(&self) -> Result<Arc<BagIndex>> {
        self.index
            .clone()
            .ok_or_else(|| PlaybackError::invalid_state("read messages", "uninitialized"))
    }
}

impl IterableSource for BagSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self) -> Result<Initialization> {
        let path = self.path()?;
        let bag = rosbag::RosBag::new(&path).map_err(|e| {
            PlaybackError::source_init(&self.name, format!("Failed to open bag: {e}"))
        })?;

        let mut init = Initialization {
            profile: Some("ros1".to_string()),
            ..Default::default()
        };
        init.metadata.insert("source".to_string(), self.location.to_string());
        init.metadata.insert("format".to_string(), "bag".to_string());

        let mut connections = HashMap::new();
        let mut chunks: Vec<(ChunkBounds, u64)> = Vec::new();

        for record in bag.index_records() {
            let record = record.map_err(|e| {
                PlaybackError::source_init(&self.name, format!("Failed to read index: {e}"))
            })?;
            match record {
                rosbag::IndexRecord::Connection(conn) => {
                    if connections.contains_key(&conn.id) {
                        continue;
                    }
                    let topic: &str = &conn.topic;
                    let tp: &str = &conn.tp;
                    connections.insert(
                        conn.id,
                        ConnectionMeta {
                            topic: topic.to_string(),
                            schema_name: tp.to_string(),
                        },
                    );
                    init.add_topic(Topic::new(topic, tp));

                    if init.datatypes.contains_key(tp) {
                        continue;
                    }
                    match parse_schema(tp, "ros1msg", conn.message_definition.as_bytes()) {
                        Ok(datatypes) => {
                            for (name, definition) in datatypes {
                                init.datatypes.entry(name).or_insert(definition);
                            }
                        }
                        Err(e) => {
                            init.problems.push(
                                Problem::warn(format!("Failed to parse schema \"{tp}\""))
                                    .with_error(e),
                            );
                            init.datatypes
                                .insert(tp.to_string(), MessageDefinition::new(tp));
                        }
                    }
                }
                rosbag::IndexRecord::ChunkInfo(info) => {
                    chunks.push((
                        ChunkBounds {
                            start: info.start_time,
                            end: info.end_time,
                        },
                        info.chunk_pos,
                    ));
                }
                // Per-connection offsets; chunks are scanned whole instead
                rosbag::IndexRecord::IndexData(_) => {}
            }
        }

        init.start = chunks.iter().map(|(b, _)| b.start).min().unwrap_or(0);
        init.end = chunks.iter().map(|(b, _)| b.end).max().unwrap_or(0);

        debug!(
            context = "BagSource",
            source = %self.name,
            topics = init.topics.len(),
            chunks = chunks.len(),
            "Initialized"
        );

        let (bounds, positions) = chunks.into_iter().unzip();
        self.index = Some(Arc::new(BagIndex {
            bag,
            connections,
            bounds,
            positions,
        }));
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
            debug!(context = "BagSource", source = %self.name, "Disposed");
        }
    }
}
