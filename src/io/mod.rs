// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! I/O layer: source descriptors, format detection, byte loading and the
//! per-format source adapters.

pub mod bytes;
pub mod detection;
pub mod filter;
pub mod formats;
pub mod metadata;
pub mod source;
pub mod traits;

// Re-exports
pub use bytes::ByteSource;
pub use detection::{detect_format, detect_location};
pub use filter::TopicFilter;
pub use metadata::{
    FileFormat, Initialization, MessageEvent, Payload, PlaybackRange, SourceDescriptor,
    SourceLocation, Topic,
};
pub use source::{open_source, FormatSource};
pub use traits::{BackfillArgs, EventStream, IterableSource, IteratorResult, MessageIteratorArgs};
