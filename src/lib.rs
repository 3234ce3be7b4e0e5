//! Core engine and orchestration for the screen dimming daemon.
//!
//! The [`engine::DimmingEngine`] owns the dimming level and all timing
//! anchors; the loops in [`monitor`] feed it from screen power edges and the
//! exemption oracle. Level math is keyed off wall-clock timestamps, never off
//! delivered tick counts, so the signal stays consistent regardless of how
//! the loops are scheduled.

pub mod config;
pub mod engine;
pub mod flags;
pub mod handlers;
pub mod monitor;
pub mod policy;
mod schedule;
mod state;

pub use engine::{DimmingEngine, StateSnapshot};
pub use policy::transition_duration;
pub use state::Mode;
