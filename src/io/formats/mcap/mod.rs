// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! MCAP format implementation.
//!
//! Reading is delegated to the `mcap` crate: the summary section provides
//! channels, schemas, statistics and chunk indexes, and chunks are
//! decompressed on demand while iterating.

pub mod source;

pub use source::McapSource;
