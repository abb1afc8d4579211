// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Playback configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{PlaybackError, Result};
use crate::worker::DEFAULT_BATCH_SIZE;

/// Configuration for a [`PlaybackEngine`](super::PlaybackEngine).
///
/// Every key is optional when loading from TOML; missing keys take their
/// default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Wall-clock time between frames (ms)
    pub frame_interval_ms: u64,
    /// Initial speed multiplier
    pub speed: f64,
    /// Lowest accepted speed
    pub min_speed: f64,
    /// Highest accepted speed
    pub max_speed: f64,
    /// Maximum live events per frame
    pub max_frame_events: usize,
    /// Items per worker batch
    pub worker_batch_size: usize,
    /// Run each source on its own worker thread
    pub use_workers: bool,
    /// Deliver backfill after start and seek
    pub backfill_on_seek: bool,
    /// Topics that publish densely enough to skip backfill
    pub dense_topics: Vec<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 50,
            speed: 1.0,
            min_speed: 0.01,
            max_speed: 20.0,
            max_frame_events: 10_000,
            worker_batch_size: DEFAULT_BATCH_SIZE,
            use_workers: true,
            backfill_on_seek: true,
            dense_topics: Vec::new(),
        }
    }
}

impl PlayerConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial speed.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Set the frame cadence.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the per-frame event cap.
    pub fn with_max_frame_events(mut self, max: usize) -> Self {
        self.max_frame_events = max;
        self
    }

    /// Enable or disable worker threads.
    pub fn with_workers(mut self, enabled: bool) -> Self {
        self.use_workers = enabled;
        self
    }

    /// Set the worker batch size.
    pub fn with_worker_batch_size(mut self, size: usize) -> Self {
        self.worker_batch_size = size;
        self
    }

    /// Enable or disable backfill.
    pub fn with_backfill(mut self, enabled: bool) -> Self {
        self.backfill_on_seek = enabled;
        self
    }

    /// Set the topics excluded from backfill.
    pub fn with_dense_topics(mut self, topics: Vec<String>) -> Self {
        self.dense_topics = topics;
        self
    }

    /// Frame cadence as a duration.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| PlaybackError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PlaybackError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Check that the values are usable.
    pub fn validate(&self) -> Result<()> {
        if self.frame_interval_ms == 0 {
            return Err(PlaybackError::Config(
                "frame_interval_ms must be positive".to_string(),
            ));
        }
        if !(self.min_speed.is_finite() && self.max_speed.is_finite())
            || self.min_speed <= 0.0
            || self.min_speed > self.max_speed
        {
            return Err(PlaybackError::Config(format!(
                "invalid speed bounds [{}, {}]",
                self.min_speed, self.max_speed
            )));
        }
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(PlaybackError::Config(format!("invalid speed {}", self.speed)));
        }
        if self.max_frame_events == 0 || self.worker_batch_size == 0 {
            return Err(PlaybackError::Config(
                "max_frame_events and worker_batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
