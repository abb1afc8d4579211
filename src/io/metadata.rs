// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Shared metadata types for all playable sources.
//!
//! These types are format-independent: MCAP and ROS1 bag adapters both
//! describe themselves with an [`Initialization`] and emit [`MessageEvent`]s.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::{PlaybackError, Problem, Result};
use crate::schema::Datatypes;

/// What to open: one or many files, one or many URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "lowercase")]
pub enum SourceDescriptor {
    /// A single local file
    File(PathBuf),
    /// Several local files played as one
    Files(Vec<PathBuf>),
    /// A single remote file
    Url(String),
    /// Several remote files played as one
    Urls(Vec<String>),
}

/// One physical source named by a [`SourceDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// Local file path
    Path(PathBuf),
    /// Remote URL
    Url(String),
}

impl SourceLocation {
    /// Display name: the file name for paths, the last URL segment for URLs.
    pub fn name(&self) -> String {
        match self {
            SourceLocation::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            SourceLocation::Url(url) => url
                .split(['?', '#'])
                .next()
                .and_then(|u| u.rsplit('/').find(|s| !s.is_empty()))
                .unwrap_or(url)
                .to_string(),
        }
    }

    /// The path extension, or the extension of the URL's last segment.
    pub fn extension(&self) -> Option<String> {
        match self {
            SourceLocation::Path(path) => path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_lowercase),
            SourceLocation::Url(_) => Path::new(&self.name())
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_lowercase),
        }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceLocation::Path(path) => write!(f, "{}", path.display()),
            SourceLocation::Url(url) => write!(f, "{url}"),
        }
    }
}

impl SourceDescriptor {
    /// Build a descriptor from CLI-style inputs. Inputs starting with
    /// `http://` or `https://` are URLs; mixing URLs and paths is rejected.
    pub fn from_inputs<S: AsRef<str>>(inputs: &[S]) -> Result<Self> {
        let is_url = |s: &str| s.starts_with("http://") || s.starts_with("https://");
        let urls = inputs.iter().filter(|s| is_url(s.as_ref())).count();

        match (inputs.len(), urls) {
            (0, _) => Err(PlaybackError::source_init("input", "file or url required")),
            (1, 1) => Ok(Self::Url(inputs[0].as_ref().to_string())),
            (1, 0) => Ok(Self::File(PathBuf::from(inputs[0].as_ref()))),
            (n, u) if u == n => Ok(Self::Urls(
                inputs.iter().map(|s| s.as_ref().to_string()).collect(),
            )),
            (_, 0) => Ok(Self::Files(
                inputs.iter().map(|s| PathBuf::from(s.as_ref())).collect(),
            )),
            _ => Err(PlaybackError::unsupported("mixing files and urls")),
        }
    }

    /// Expand into physical sources in registration order.
    pub fn locations(&self) -> Result<Vec<SourceLocation>> {
        let locations: Vec<SourceLocation> = match self {
            SourceDescriptor::File(path) => vec![SourceLocation::Path(path.clone())],
            SourceDescriptor::Files(paths) => {
                paths.iter().cloned().map(SourceLocation::Path).collect()
            }
            SourceDescriptor::Url(url) => vec![SourceLocation::Url(url.clone())],
            SourceDescriptor::Urls(urls) => urls.iter().cloned().map(SourceLocation::Url).collect(),
        };
        if locations.is_empty() {
            return Err(PlaybackError::source_init("input", "file or url required"));
        }
        Ok(locations)
    }
}

/// A named channel within a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    /// Topic name, unique within one [`Initialization`]
    pub name: String,
    /// Schema name of the topic's payload
    pub schema_name: String,
    /// Schemas this topic can be converted to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub convertible_to: Vec<String>,
    /// Number of messages, when the index records it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u64>,
}

impl Topic {
    /// Create a topic.
    pub fn new(name: impl Into<String>, schema_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema_name: schema_name.into(),
            convertible_to: Vec::new(),
            message_count: None,
        }
    }

    /// Set the message count.
    pub fn with_message_count(mut self, count: u64) -> Self {
        self.message_count = Some(count);
        self
    }
}

/// Metadata describing one source, or several merged sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Initialization {
    /// Earliest receive time (ns)
    pub start: u64,
    /// Latest receive time (ns), inclusive
    pub end: u64,
    /// Topics in first-seen order, unique by name
    pub topics: Vec<Topic>,
    /// Schema name to structural definition
    pub datatypes: Datatypes,
    /// Problems found while opening
    pub problems: Vec<Problem>,
    /// Recording profile, e.g. "ros1" or "ros2"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Source-level key/values for display
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Initialization {
    /// Look up a topic by name.
    pub fn topic(&self, name: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.name == name)
    }

    /// Add a topic unless one with the same name exists. Returns whether it was added.
    pub fn add_topic(&mut self, topic: Topic) -> bool {
        if self.topic(&topic.name).is_some() {
            return false;
        }
        self.topics.push(topic);
        true
    }

    /// All topic names.
    pub fn topic_names(&self) -> Vec<String> {
        self.topics.iter().map(|t| t.name.clone()).collect()
    }

    /// The playable range.
    pub fn range(&self) -> PlaybackRange {
        PlaybackRange::new(self.start, self.end)
    }

    /// Duration in nanoseconds.
    pub fn duration(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Total message count across topics that report one.
    pub fn message_count(&self) -> u64 {
        self.topics.iter().filter_map(|t| t.message_count).sum()
    }
}

/// Message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum Payload {
    /// Decoded JSON message
    Json(serde_json::Value),
    /// Undecoded bytes; decoding is left to the consumer
    Raw(Vec<u8>),
}

/// One message delivered by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    /// Topic name
    pub topic: String,
    /// Receive (log) time in nanoseconds
    pub receive_time: u64,
    /// Message payload
    pub payload: Payload,
    /// Schema name of the payload
    pub schema_name: String,
    /// Size of the encoded message
    pub size_in_bytes: usize,
}

impl MessageEvent {
    /// Create an event with a raw payload.
    pub fn raw(
        topic: impl Into<String>,
        receive_time: u64,
        schema_name: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            topic: topic.into(),
            receive_time,
            schema_name: schema_name.into(),
            size_in_bytes: data.len(),
            payload: Payload::Raw(data),
        }
    }
}

/// Time bounds of one iteration pass. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackRange {
    /// First time included (ns)
    pub start: u64,
    /// Last time included (ns)
    pub end: u64,
}

impl PlaybackRange {
    /// Create a range.
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Whether `time` lies within the range.
    pub fn contains(&self, time: u64) -> bool {
        self.start <= time && time <= self.end
    }

    /// Overlap with another range.
    pub fn intersect(&self, other: &PlaybackRange) -> Option<PlaybackRange> {
        crate::core::time::intersect((self.start, self.end), (other.start, other.end))
            .map(|(start, end)| PlaybackRange { start, end })
    }
}

/// Detected file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileFormat {
    /// MCAP format
    Mcap,
    /// ROS1 bag format
    Bag,
    /// Unknown format
    Unknown,
}

impl FileFormat {
    /// Get the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Mcap => "mcap",
            FileFormat::Bag => "bag",
            FileFormat::Unknown => "",
        }
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileFormat::Mcap => write!(f, "MCAP"),
            FileFormat::Bag => write!(f, "ROS1 Bag"),
            FileFormat::Unknown => write!(f, "Unknown"),
        }
    }
}
