// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Initialization merging.
//!
//! Folds per-source [`Initialization`]s into one in registration order.
//! The first definition of a schema and the first schema of a topic win;
//! later disagreements become warn problems, each recorded once.

use crate::core::Problem;
use crate::io::metadata::Initialization;
use crate::schema::MessageDefinition;

const DATATYPE_TIP: &str =
    "Ensure all MCAPs use the same schema for each datatype. Merging files may cause issues in visualization.";
const TOPIC_TIP: &str = "Ensure all MCAPs use a consistent schema for this topic.";

/// Accumulates initializations one source at a time.
#[derive(Debug, Default)]
pub struct InitializationMerger {
    merged: Initialization,
    sources: usize,
    datatype_conflicts: Vec<(String, MessageDefinition)>,
    topic_conflicts: Vec<(String, String)>,
}

impl InitializationMerger {
    /// Create an empty merger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of initializations folded in so far.
    pub fn source_count(&self) -> usize {
        self.sources
    }

    /// Fold in the next source's initialization.
    pub fn add(&mut self, init: Initialization) {
        let Initialization {
            start,
            end,
            topics,
            datatypes,
            problems,
            profile,
            metadata,
        } = init;

        if self.sources == 0 {
            self.merged.start = start;
            self.merged.end = end;
        } else {
            self.merged.start = self.merged.start.min(start);
            self.merged.end = self.merged.end.max(end);
        }
        self.sources += 1;

        self.merged.problems.extend(problems);

        for (name, definition) in datatypes {
            self.add_datatype(name, definition);
        }

        for topic in topics {
            let Some(existing) = self.merged.topics.iter_mut().find(|t| t.name == topic.name)
            else {
                self.merged.topics.push(topic);
                continue;
            };

            if existing.schema_name == topic.schema_name {
                existing.message_count = match (existing.message_count, topic.message_count) {
                    (Some(a), Some(b)) => Some(a + b),
                    (a, b) => a.or(b),
                };
                for target in topic.convertible_to {
                    if !existing.convertible_to.contains(&target) {
                        existing.convertible_to.push(target);
                    }
                }
                continue;
            }

            let key = (topic.name.clone(), topic.schema_name.clone());
            if self.topic_conflicts.contains(&key) {
                continue;
            }
            let problem = Problem::warn(format!(
                "Schema name mismatch detected for topic \"{}\". Expected \"{}\", but found \"{}\".",
                topic.name, existing.schema_name, topic.schema_name
            ))
            .with_tip(TOPIC_TIP);
            self.merged.problems.push(problem);
            self.topic_conflicts.push(key);
        }

        if self.merged.profile.is_none() {
            self.merged.profile = profile;
        }
        for (key, value) in metadata {
            self.merged.metadata.entry(key).or_insert(value);
        }
    }

    fn add_datatype(&mut self, name: String, definition: MessageDefinition) {
        match self.merged.datatypes.get(&name) {
            None => {
                self.merged.datatypes.insert(name, definition);
            }
            Some(existing) if *existing == definition => {}
            Some(_) => {
                let key = (name, definition);
                if self.datatype_conflicts.contains(&key) {
                    return;
                }
                let problem =
                    Problem::warn(format!("Different datatypes found for schema \"{}\"", key.0))
                        .with_tip(DATATYPE_TIP);
                self.merged.problems.push(problem);
                self.datatype_conflicts.push(key);
            }
        }
    }

    /// Record a problem that belongs to no single initialization, such as a
    /// source that failed to open.
    pub fn push_problem(&mut self, problem: Problem) {
        self.merged.problems.push(problem);
    }

    /// Problems accumulated so far.
    pub fn problems(&self) -> &[Problem] {
        &self.merged.problems
    }

    /// Return the merged initialization.
    pub fn finish(self) -> Initialization {
        self.merged
    }
}

/// Merge initializations in registration order.
pub fn merge_initializations(inits: impl IntoIterator<Item = Initialization>) -> Initialization {
    let mut merger = InitializationMerger::new();
    for init in inits {
        merger.add(init);
    }
    merger.finish()
}
