// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Common utilities for CLI commands.

use std::io::IsTerminal as _;

use roboplay::{PlaybackEngine, PlayerConfig, SourceDescriptor};

pub use anyhow::Result as CliResult;
pub use roboplay::core::time::{format_duration, format_timestamp};
pub type Result<T = ()> = CliResult<T>;

/// Parse a timestamp string to nanoseconds.
///
/// Accepts:
/// - Unix timestamp in seconds: "1234567890"
/// - Unix timestamp in nanoseconds: "1234567890000000000"
/// - RFC 3339: "2023-01-01T00:00:00Z"
pub fn parse_timestamp(s: &str) -> CliResult<u64> {
    if let Ok(n) = s.parse::<u64>() {
        // Anything before year 3000 in seconds is read as seconds
        return Ok(if n < 32503680000 {
            n * 1_000_000_000
        } else {
            n
        });
    }

    if let Ok(secs) = s.parse::<f64>() {
        if secs.is_finite() && secs >= 0.0 {
            return Ok((secs * 1e9) as u64);
        }
    }

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return dt
            .timestamp_nanos_opt()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| anyhow::anyhow!("Timestamp out of range: {s}"));
    }

    Err(anyhow::anyhow!("Invalid timestamp: {s}"))
}

/// Open an engine over CLI inputs and initialize it.
pub fn start_engine(inputs: &[String], config: PlayerConfig) -> Result<PlaybackEngine> {
    let descriptor = SourceDescriptor::from_inputs(inputs)?;
    let mut engine = PlaybackEngine::open(&descriptor, config)?;
    engine.start()?;
    Ok(engine)
}

/// Progress bar over a time range, shown only on a terminal.
pub struct ProgressBar {
    inner: Option<indicatif::ProgressBar>,
    start: u64,
}

impl ProgressBar {
    /// Create a progress bar spanning `[start, end]`.
    pub fn new(start: u64, end: u64, enabled: bool) -> Self {
        let inner = if enabled && std::io::stderr().is_terminal() {
            let pb = indicatif::ProgressBar::new(end.saturating_sub(start).max(1));
            if let Ok(style) = indicatif::ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {msg}")
            {
                pb.set_style(style.progress_chars("=>-"));
            }
            Some(pb)
        } else {
            None
        };

        Self { inner, start }
    }

    /// Move to playback time `time`.
    pub fn set_time(&self, time: u64) {
        if let Some(pb) = &self.inner {
            pb.set_position(time.saturating_sub(self.start));
            pb.set_message(format_timestamp(time));
        }
    }

    /// Print a line above the bar.
    pub fn println(&self, line: String) {
        match &self.inner {
            Some(pb) => pb.println(line),
            None => println!("{line}"),
        }
    }

    /// Finish the progress bar with a message.
    pub fn finish_with_message(&self, msg: String) {
        if let Some(pb) = &self.inner {
            pb.finish_with_message(msg);
        }
    }
}
