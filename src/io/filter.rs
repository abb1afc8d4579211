// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Topic filtering.
//!
//! A [`TopicFilter`] is resolved against an [`Initialization`]'s topics to
//! produce the topic list passed to iterators and backfill requests.

use std::fmt;
use std::sync::Arc;

use crate::io::metadata::Initialization;

/// Filter for selecting topics to play.
#[derive(Clone, Default)]
pub enum TopicFilter {
    /// Play all topics (no filtering)
    #[default]
    All,
    /// Play only specific topics
    Include(Vec<String>),
    /// Exclude specific topics
    Exclude(Vec<String>),
    /// Include topics matching regex pattern
    RegexInclude(Arc<regex::Regex>),
    /// Exclude topics matching regex pattern
    RegexExclude(Arc<regex::Regex>),
}

impl fmt::Debug for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.debug_tuple("All").finish(),
            Self::Include(v) => f.debug_tuple("Include").field(v).finish(),
            Self::Exclude(v) => f.debug_tuple("Exclude").field(v).finish(),
            Self::RegexInclude(re) => f.debug_tuple("RegexInclude").field(&re.as_str()).finish(),
            Self::RegexExclude(re) => f.debug_tuple("RegexExclude").field(&re.as_str()).finish(),
        }
    }
}

impl TopicFilter {
    /// Check if a topic should be included.
    pub fn should_include(&self, topic: &str) -> bool {
        match self {
            TopicFilter::All => true,
            TopicFilter::Include(topics) => topics.iter().any(|t| t == topic),
            TopicFilter::Exclude(topics) => !topics.iter().any(|t| t == topic),
            TopicFilter::RegexInclude(re) => re.is_match(topic),
            TopicFilter::RegexExclude(re) => !re.is_match(topic),
        }
    }

    /// Create an include filter from topic names.
    pub fn include(topics: Vec<String>) -> Self {
        Self::Include(topics)
    }

    /// Create an exclude filter from topic names.
    pub fn exclude(topics: Vec<String>) -> Self {
        Self::Exclude(topics)
    }

    /// Create a regex include filter.
    pub fn regex_include(pattern: &str) -> Result<Self, regex::Error> {
        regex::Regex::new(pattern).map(|re| Self::RegexInclude(Arc::new(re)))
    }

    /// Create a regex exclude filter.
    pub fn regex_exclude(pattern: &str) -> Result<Self, regex::Error> {
        regex::Regex::new(pattern).map(|re| Self::RegexExclude(Arc::new(re)))
    }

    /// Topic names of `init` that pass the filter, in topic order.
    pub fn resolve(&self, init: &Initialization) -> Vec<String> {
        init.topics
            .iter()
            .filter(|t| self.should_include(&t.name))
            .map(|t| t.name.clone())
            .collect()
    }
}
