// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Topics command - topic table of the merged sources.

use clap::Args;

use crate::common::{start_engine, Result};
use roboplay::PlayerConfig;

/// List topics.
#[derive(Args, Clone, Debug)]
pub struct TopicsCmd {
    /// Input files or URLs (MCAP or BAG)
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<String>,
}

impl TopicsCmd {
    pub fn run(self) -> Result<()> {
        let engine = start_engine(&self.inputs, PlayerConfig::default().with_workers(false))?;
        let Some(init) = engine.initialization() else {
            anyhow::bail!("no initialization available");
        };

        let width = init
            .topics
            .iter()
            .map(|t| t.name.len())
            .max()
            .unwrap_or(5)
            .max(5);

        println!("{:<width$}  {:<40}  MESSAGES", "TOPIC", "SCHEMA");
        for topic in &init.topics {
            let count = topic
                .message_count
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("{:<width$}  {:<40}  {}", topic.name, topic.schema_name, count);
        }

        Ok(())
    }
}
