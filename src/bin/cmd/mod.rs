// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! CLI subcommands.

mod info;
mod play;
mod topics;

pub use info::InfoCmd;
pub use play::PlayCmd;
pub use topics::TopicsCmd;
