// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Play command - real-time playback to stdout.

use std::path::PathBuf;
use std::thread;
use std::time::Instant;

use clap::Args;

use crate::common::{format_timestamp, parse_timestamp, start_engine, ProgressBar, Result};
use roboplay::{MessageEvent, PlayerConfig, PlayerState, TopicFilter};

/// Play recordings.
#[derive(Args, Clone, Debug)]
pub struct PlayCmd {
    /// Input files or URLs (MCAP or BAG)
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<String>,

    /// Playback speed multiplier
    #[arg(short, long)]
    speed: Option<f64>,

    /// Start time (seconds, nanoseconds or RFC 3339)
    #[arg(long)]
    start: Option<String>,

    /// Only play topics matching this regex
    #[arg(short, long, value_name = "REGEX")]
    topics: Option<String>,

    /// Decode on the calling thread instead of worker threads
    #[arg(long)]
    no_workers: bool,

    /// Load player settings from a TOML file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

impl PlayCmd {
    pub fn run(self) -> Result<()> {
        let mut config = match &self.config {
            Some(path) => PlayerConfig::load(path)?,
            None => PlayerConfig::default(),
        };
        if self.no_workers {
            config = config.with_workers(false);
        }
        let interval = config.frame_interval();

        let mut engine = start_engine(&self.inputs, config)?;
        if let Some(speed) = self.speed {
            engine.set_speed(speed)?;
        }
        if let Some(pattern) = &self.topics {
            engine.set_topic_filter(TopicFilter::regex_include(pattern)?)?;
        }

        let Some(range) = engine.range() else {
            anyhow::bail!("no initialization available");
        };
        match &self.start {
            Some(start) => engine.seek_and_resume(parse_timestamp(start)?, true)?,
            None => engine.play()?,
        }

        let progress = ProgressBar::new(range.start, range.end, !self.json);
        let mut frames = 0u64;
        let mut events = 0u64;

        loop {
            let tick = Instant::now();
            let Some(frame) = engine.next_frame()? else {
                break;
            };
            frames += 1;

            for event in frame.backfill.iter().chain(frame.events.iter()) {
                events += 1;
                if self.json {
                    println!("{}", serde_json::to_string(event)?);
                } else {
                    progress.println(describe(event));
                }
            }
            progress.set_time(frame.current_time);

            if frame.state != PlayerState::Playing {
                break;
            }
            if let Some(rest) = interval.checked_sub(tick.elapsed()) {
                thread::sleep(rest);
            }
        }

        progress.finish_with_message(format!(
            "{} frames, {} events, ended at {}",
            frames,
            events,
            format_timestamp(engine.current_time())
        ));
        engine.close();
        Ok(())
    }
}

fn describe(event: &MessageEvent) -> String {
    format!(
        "{} {} [{}] {} bytes",
        event.receive_time, event.topic, event.schema_name, event.size_in_bytes
    )
}
