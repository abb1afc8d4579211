// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Info command - merged initialization of one or more sources.

use clap::Args;

use crate::common::{format_duration, format_timestamp, start_engine, Result};
use roboplay::PlayerConfig;

/// Show merged metadata.
#[derive(Args, Clone, Debug)]
pub struct InfoCmd {
    /// Input files or URLs (MCAP or BAG)
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<String>,

    /// Print the initialization as JSON
    #[arg(long)]
    json: bool,
}

impl InfoCmd {
    pub fn run(self) -> Result<()> {
        let engine = start_engine(&self.inputs, PlayerConfig::default().with_workers(false))?;
        let Some(init) = engine.initialization() else {
            anyhow::bail!("no initialization available");
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(init)?);
            return Ok(());
        }

        println!("=== {} ===", self.inputs.join(", "));
        if let Some(profile) = &init.profile {
            println!("Profile: {profile}");
        }
        println!("Sources: {} ({} active)", self.inputs.len(), engine.active_source_count());
        println!("Start: {}", format_timestamp(init.start));
        println!("End: {}", format_timestamp(init.end));
        println!("Duration: {}", format_duration(init.duration()));
        println!("Topics: {}", init.topics.len());
        println!("Datatypes: {}", init.datatypes.len());
        println!("Messages: {}", init.message_count());

        let problems = engine.problems();
        if !problems.is_empty() {
            println!();
            println!("Problems:");
            for problem in problems {
                println!("  {problem}");
                if let Some(tip) = &problem.tip {
                    println!("    tip: {tip}");
                }
            }
        }

        Ok(())
    }
}
