// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Combining several sources into one.
//!
//! - [`initialization`] - folding per-source metadata into one
//!   [`Initialization`](crate::io::Initialization)
//! - [`multi`] - the [`MultiSource`] k-way merge

pub mod initialization;
pub mod multi;

pub use initialization::{merge_initializations, InitializationMerger};
pub use multi::{MergedStream, MultiSource, SourceHealth};
