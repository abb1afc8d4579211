// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! ROS1 bag format implementation.
//!
//! Parsing is delegated to the `rosbag` crate; this module maps its index
//! and chunk records onto the shared chunked iteration.

pub mod source;

pub use source::BagSource;
