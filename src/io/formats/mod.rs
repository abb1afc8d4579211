// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Source adapters for robotics log formats:
//! - [`mcap`]: MCAP
//! - [`bag`]: ROS1 bag
//!
//! Both are chunked formats and share [`chunked`] iteration and backfill.

pub mod bag;
pub mod chunked;
pub mod mcap;
