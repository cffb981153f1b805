//! Map Bridge replay tool
//!
//! Runs a [`map_bridge_lib::MapSession`] over an in-memory engine and writes what the host would
//! have received as JSON lines.

pub mod logging;
pub mod replay;
pub mod settings;

pub use replay::{Replay, ReplayError, ReplayRecord};
pub use settings::Settings;
