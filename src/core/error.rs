// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Core error types for roboplay.
//!
//! Only [`PlaybackError::AllSourcesFailed`] is terminal for a playback session.
//! Every other kind is absorbed into the problem list by the component that
//! observes it, so playback keeps going.

use thiserror::Error;

/// Errors that can occur while opening, merging or playing sources.
#[derive(Debug, Clone, Error)]
pub enum PlaybackError {
    /// One source's header or index could not be read.
    #[error("Failed to initialize source '{source_name}': {reason}")]
    SourceInit {
        /// Display name of the source (file path or URL)
        source_name: String,
        /// Why initialization failed
        reason: String,
    },

    /// Every registered source failed to initialize (or has since failed).
    #[error("All sources failed: {}", .errors.join("; "))]
    AllSourcesFailed {
        /// One message per failed source, in registration order
        errors: Vec<String>,
    },

    /// A single message payload could not be decoded.
    #[error("Failed to decode message on topic '{topic}': {reason}")]
    Decode {
        /// Topic of the malformed message
        topic: String,
        /// Decoder error
        reason: String,
    },

    /// The isolated decode context for a source died.
    #[error("Worker for source '{source_name}' terminated unexpectedly")]
    WorkerCrash {
        /// Display name of the source hosted by the worker
        source_name: String,
    },

    /// A seek target fell outside the playable range.
    #[error("Time {requested} is outside the playable range [{start}, {end}]")]
    InvalidRange {
        /// Requested time (nanoseconds)
        requested: u64,
        /// Range start (nanoseconds)
        start: u64,
        /// Range end (nanoseconds)
        end: u64,
    },

    /// A request belonged to a superseded generation.
    #[error("Generation {generation} was superseded")]
    Cancelled {
        /// The stale generation id
        generation: u64,
    },

    /// An operation was issued in a state that does not allow it.
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        /// Requested operation
        operation: String,
        /// Current state, for display
        state: String,
    },

    /// Parse error in a schema, record or argument.
    #[error("Parse error in {context}: {message}")]
    Parse {
        /// What was being parsed
        context: String,
        /// Error message
        message: String,
    },

    /// Unsupported format or feature.
    #[error("Unsupported feature: '{feature}'")]
    Unsupported {
        /// What is not supported
        feature: String,
    },

    /// Configuration could not be loaded.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O failure (file open, mmap, network).
    #[error("I/O error: {0}")]
    Io(String),
}

impl PlaybackError {
    /// Create a source initialization error.
    pub fn source_init(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        PlaybackError::SourceInit {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        PlaybackError::Decode {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    /// Create a parse error.
    pub fn parse(context: impl Into<String>, message: impl Into<String>) -> Self {
        PlaybackError::Parse {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported feature error.
    pub fn unsupported(feature: impl Into<String>) -> Self {
        PlaybackError::Unsupported {
            feature: feature.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(operation: impl Into<String>, state: impl std::fmt::Display) -> Self {
        PlaybackError::InvalidState {
            operation: operation.into(),
            state: state.to_string(),
        }
    }

    /// Whether this error ends the playback session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PlaybackError::AllSourcesFailed { .. })
    }

    /// Get structured fields for logging.
    pub fn log_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            PlaybackError::SourceInit {
                source_name,
                reason,
            } => vec![("source", source_name.clone()), ("reason", reason.clone())],
            PlaybackError::AllSourcesFailed { errors } => {
                vec![("failed", errors.len().to_string())]
            }
            PlaybackError::Decode { topic, reason } => {
                vec![("topic", topic.clone()), ("reason", reason.clone())]
            }
            PlaybackError::WorkerCrash { source_name } => vec![("source", source_name.clone())],
            PlaybackError::InvalidRange {
                requested,
                start,
                end,
            } => vec![
                ("requested", requested.to_string()),
                ("start", start.to_string()),
                ("end", end.to_string()),
            ],
            PlaybackError::Cancelled { generation } => {
                vec![("generation", generation.to_string())]
            }
            PlaybackError::InvalidState { operation, state } => {
                vec![("operation", operation.clone()), ("state", state.clone())]
            }
            PlaybackError::Parse { context, message } => {
                vec![("context", context.clone()), ("message", message.clone())]
            }
            PlaybackError::Unsupported { feature } => vec![("feature", feature.clone())],
            PlaybackError::Config(msg) | PlaybackError::Io(msg) => {
                vec![("message", msg.clone())]
            }
        }
    }
}

impl From<std::io::Error> for PlaybackError {
    fn from(err: std::io::Error) -> Self {
        PlaybackError::Io(err.to_string())
    }
}

impl From<mcap::McapError> for PlaybackError {
    fn from(err: mcap::McapError) -> Self {
        PlaybackError::parse("MCAP", err.to_string())
    }
}

/// Result type for roboplay operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
