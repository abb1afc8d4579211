// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Format detection using magic numbers and file extensions.
//!
//! # Supported Formats
//!
//! - **MCAP**: `\x89MCAP0\r\n` magic at the start of the file
//! - **ROS1 Bag**: `#ROSBAG V2.0` version line
//!
//! # Example
//!
//! ```rust,no_run
//! use roboplay::io::detection::detect_format;
//! use roboplay::io::metadata::FileFormat;
//!
//! let format = detect_format("data.mcap")?;
//! assert_eq!(format, FileFormat::Mcap);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::core::Result;

use super::metadata::{FileFormat, SourceLocation};

/// Try to detect the file format from the file content, falling back to the
/// file extension when the header is not recognized or cannot be read.
pub fn detect_format<P: AsRef<Path>>(path: P) -> Result<FileFormat> {
    let path_ref = path.as_ref();

    match detect_from_magic(path_ref) {
        Ok(FileFormat::Unknown) | Err(_) => {}
        Ok(format) => return Ok(format),
    }

    Ok(detect_from_extension(path_ref))
}

/// Detect the format of a source location. URLs are detected by extension only.
pub fn detect_location(location: &SourceLocation) -> Result<FileFormat> {
    match location {
        SourceLocation::Path(path) => detect_format(path),
        SourceLocation::Url(_) => Ok(match location.extension().as_deref() {
            Some("mcap") => FileFormat::Mcap,
            Some("bag") => FileFormat::Bag,
            _ => FileFormat::Unknown,
        }),
    }
}

/// Detect the format of an in-memory header.
pub fn detect_from_bytes(header: &[u8]) -> FileFormat {
    if is_mcap_magic(header) {
        FileFormat::Mcap
    } else if is_rosbag_magic(header) {
        FileFormat::Bag
    } else {
        FileFormat::Unknown
    }
}

/// Detect format by reading file magic numbers.
fn detect_from_magic(path: &Path) -> Result<FileFormat> {
    let mut file = File::open(path)?;

    let mut header = [0u8; 16];
    let n = file.read(&mut header)?;

    if n < 8 {
        return Ok(FileFormat::Unknown);
    }

    Ok(detect_from_bytes(&header[..n]))
}

/// Check if the header starts with MCAP magic.
fn is_mcap_magic(header: &[u8]) -> bool {
    header.len() >= mcap::MAGIC.len() && header.starts_with(mcap::MAGIC)
}

/// Check if the header starts with ROS1 bag magic.
fn is_rosbag_magic(header: &[u8]) -> bool {
    header.starts_with(b"#ROSBAG")
}

/// Detect format from file extension (fallback).
fn detect_from_extension(path: &Path) -> FileFormat {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| match ext.to_lowercase().as_str() {
            "mcap" => FileFormat::Mcap,
            "bag" => FileFormat::Bag,
            _ => FileFormat::Unknown,
        })
        .unwrap_or(FileFormat::Unknown)
}
