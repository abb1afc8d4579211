// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Source factory.
//!
//! The supported formats form a closed set: [`FormatSource`] has one
//! variant per format and [`open_source`] picks the variant for each
//! physical source named by a [`SourceDescriptor`].

use std::collections::BTreeMap;

use tracing::debug;

use crate::core::{PlaybackError, Result};

use super::detection::detect_location;
use super::formats::bag::BagSource;
use super::formats::mcap::McapSource;
use super::metadata::{FileFormat, Initialization, MessageEvent, SourceDescriptor, SourceLocation};
use super::traits::{BackfillArgs, EventStream, IterableSource, MessageIteratorArgs};

/// A source adapter for one supported format.
pub enum FormatSource {
    /// MCAP file or URL
    Mcap(McapSource),
    /// ROS1 bag file
    Bag(BagSource),
}

impl FormatSource {
    /// Create the adapter for one location, detecting its format.
    pub fn open(location: SourceLocation) -> Result<Self> {
        let format = detect_location(&location)?;
        debug!(context = "open_source", source = %location, %format, "Detected format");
        match format {
            FileFormat::Mcap => Ok(FormatSource::Mcap(McapSource::new(location))),
            FileFormat::Bag => Ok(FormatSource::Bag(BagSource::new(location))),
            FileFormat::Unknown => Err(PlaybackError::source_init(
                location.name(),
                "Unrecognized file format (expected .mcap or .bag)",
            )),
        }
    }

    /// Format of this adapter.
    pub fn format(&self) -> FileFormat {
        match self {
            FormatSource::Mcap(_) => FileFormat::Mcap,
            FormatSource::Bag(_) => FileFormat::Bag,
        }
    }

    fn inner(&self) -> &dyn IterableSource {
        match self {
            FormatSource::Mcap(s) => s,
            FormatSource::Bag(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn IterableSource {
        match self {
            FormatSource::Mcap(s) => s,
            FormatSource::Bag(s) => s,
        }
    }
}

impl IterableSource for FormatSource {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn initialize(&mut self) -> Result<Initialization> {
        self.inner_mut().initialize()
    }

    fn message_iterator(&mut self, args: MessageIteratorArgs) -> Result<Box<dyn EventStream>> {
        self.inner_mut().message_iterator(args)
    }

    fn backfill_messages(&mut self, args: BackfillArgs) -> Result<BTreeMap<String, MessageEvent>> {
        self.inner_mut().backfill_messages(args)
    }

    fn dispose(&mut self) {
        self.inner_mut().dispose()
    }
}

/// Open one adapter per physical source, in registration order.
///
/// Fails if the descriptor names no source or any source has an
/// unrecognized format.
pub fn open_source(descriptor: &SourceDescriptor) -> Result<Vec<FormatSource>> {
    descriptor
        .locations()?
        .into_iter()
        .map(FormatSource::open)
        .collect()
}
