// SPDX-License-Identifier: MIT

//! Round-based agreement on a replicated [`sync_data::SynchronizedData`]
//!
//! Every peer feeds the same ordered blocks into its own [`app::Application`].
//! Nothing in here looks at clocks, randomness or the network, so the
//! resulting snapshots and round transitions are identical everywhere.

pub mod app;
pub mod error;
pub mod event;
pub mod kind;
pub mod params;
pub mod round;
pub mod sync_data;
pub mod transition;

const LOG_TARGET: &str = "agora::rounds";
