// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! # Roboplay CLI
//!
//! Inspect and play back robotics logs.
//!
//! ## Usage
//!
//! ```sh
//! # Show merged metadata of several recordings
//! roboplay info run1.mcap run2.bag
//!
//! # List topics with schemas and message counts
//! roboplay topics run1.mcap
//!
//! # Play in real time at double speed
//! roboplay play run1.mcap --speed 2 --topics '^/imu'
//! ```

mod cmd;
mod common;

use std::process;

use clap::{Parser, Subcommand};
use cmd::{InfoCmd, PlayCmd, TopicsCmd};
use common::Result;

/// Roboplay - iterable playback for robotics logs
///
/// Merges MCAP files and ROS1 bags into one time-ordered stream.
/// Inputs starting with http:// or https:// are fetched as URLs.
#[derive(Parser, Clone)]
#[command(name = "roboplay")]
#[command(about = "Playback engine for MCAP and ROS bag recordings", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "ArcheBase")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Clone)]
enum Commands {
    /// Show merged time range, topics, datatypes and problems
    Info(InfoCmd),

    /// List topics with schema names and message counts
    Topics(TopicsCmd),

    /// Play recordings in real time
    Play(PlayCmd),
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Info(cmd) => cmd.run(),
        Commands::Topics(cmd) => cmd.run(),
        Commands::Play(cmd) => cmd.run(),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("roboplay=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run();

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
