// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Byte-source provider.
//!
//! Local files are memory-mapped; URLs are downloaded once into memory.

use std::fs::File;
use std::ops::Deref;
use std::path::Path;

use tracing::{debug, info};

use crate::core::{PlaybackError, Result};

use super::metadata::SourceLocation;

/// Raw bytes of one physical source.
pub enum ByteSource {
    /// Memory-mapped local file
    Mapped(memmap2::Mmap),
    /// Owned buffer (downloaded or built in memory)
    Owned(Vec<u8>),
}

impl ByteSource {
    /// Load the bytes for a location.
    pub fn open(location: &SourceLocation) -> Result<Self> {
        match location {
            SourceLocation::Path(path) => Self::map_file(path),
            SourceLocation::Url(url) => Self::fetch(url),
        }
    }

    /// Memory-map a local file.
    pub fn map_file(path: &Path) -> Result<Self> {
        let name = path.display().to_string();
        let file = File::open(path)
            .map_err(|e| PlaybackError::source_init(&name, format!("Failed to open file: {e}")))?;

        // SAFETY: the mapping is read-only and the file is not modified while mapped.
        let mmap = unsafe { memmap2::Mmap::map(&file) }
            .map_err(|e| PlaybackError::source_init(&name, format!("Failed to mmap file: {e}")))?;

        debug!(
            context = "ByteSource",
            path = %path.display(),
            size = mmap.len(),
            "Mapped file"
        );
        Ok(ByteSource::Mapped(mmap))
    }

    /// Download a remote file.
    pub fn fetch(url: &str) -> Result<Self> {
        info!(context = "ByteSource", url, "Downloading");

        let response = reqwest::blocking::get(url)
            .and_then(|r| r.error_for_status())
            .map_err(|e| PlaybackError::source_init(url, format!("Failed to fetch: {e}")))?;
        let bytes = response
            .bytes()
            .map_err(|e| PlaybackError::source_init(url, format!("Failed to read body: {e}")))?;

        debug!(context = "ByteSource", url, size = bytes.len(), "Downloaded");
        Ok(ByteSource::Owned(bytes.to_vec()))
    }
}

impl Deref for ByteSource {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            ByteSource::Mapped(mmap) => &mmap[..],
            ByteSource::Owned(buf) => &buf[..],
        }
    }
}

impl AsRef<[u8]> for ByteSource {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ByteSource::Mapped(m) => f.debug_tuple("Mapped").field(&m.len()).finish(),
            ByteSource::Owned(b) => f.debug_tuple("Owned").field(&b.len()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_map_file() {
        let mut path = std::env::temp_dir();
        path.push(format!("roboplay_test_bytes_{}.bin", std::process::id()));
        {
            let mut f = File::create(&path).unwrap();
            f.write_all(b"hello bytes").unwrap();
        }

        let bytes = ByteSource::open(&SourceLocation::Path(path.clone())).unwrap();
        assert_eq!(&bytes[..], b"hello bytes");
        assert!(matches!(bytes, ByteSource::Mapped(_)));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file() {
        let err = ByteSource::map_file(Path::new("/nonexistent/roboplay.mcap")).unwrap_err();
        assert!(matches!(err, PlaybackError::SourceInit { .. }));
    }
}
