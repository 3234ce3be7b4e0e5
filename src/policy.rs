//! This module computes level changes from the retained anchors.
//!
//! All math here is keyed off wall-clock `now` arguments and the anchors held
//! in the state, never off how many ticks happened to be delivered. The same
//! off-screen period produces the same total recovery whether it is observed
//! by one late tick or by sixty punctual ones.

use std::time::{Duration, Instant};

use smallvec::{smallvec, SmallVec};

use crate::config::DimmingConfig;
use crate::state::{DimmingState, Mode};

/// Intensity of a fresh accumulation run, percent.
pub(crate) const BASE_LEVEL: f32 = 10.0;
/// Percent recovered per `recovery_rate` minutes of off-screen time.
const RECOVERY_STEP: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum PolicyAction {
    SetLevel(f32),
    /// Move the recovery anchor so the next recompute only charges for time
    /// elapsed after this one.
    RebaseRecovery(Instant),
}

/// Compute the actions for one periodic recompute.
pub(crate) fn recompute(
    state: &DimmingState,
    config: &DimmingConfig,
    now: Instant,
) -> SmallVec<[PolicyAction; 2]> {
    match state.mode {
        // Manual level only changes through an explicit user command, and an
        // exemption pause freezes both the level and the anchors.
        Mode::Manual | Mode::PausedExempt => smallvec![],
        Mode::Recovering => {
            let Some(anchor) = state.recovery_anchor else {
                return smallvec![];
            };
            let elapsed_off = now.saturating_duration_since(anchor);
            let decrease = (elapsed_off.as_secs_f32() / (config.recovery_rate as f32 * 60.0))
                * RECOVERY_STEP;
            let new = (state.level - decrease).max(config.min_level);
            smallvec![
                PolicyAction::SetLevel(new),
                PolicyAction::RebaseRecovery(now)
            ]
        }
        Mode::Automatic => {
            let Some(anchor) = state.accumulation_anchor else {
                return smallvec![];
            };
            let elapsed_on = now.saturating_duration_since(anchor);
            let intervals = (elapsed_on.as_secs_f32() / config.interval_secs as f32).floor();
            let target = BASE_LEVEL + intervals * config.gain_rate;
            // The formula only ever raises the level: a short screen-off/on
            // cycle must not launder dimness that recovery has not paid off.
            let new = target.max(state.level).min(config.max_level);
            smallvec![PolicyAction::SetLevel(new)]
        }
    }
}

/// Recommended animation time for a level change.
pub fn transition_duration(old_level: f32, new_level: f32) -> Duration {
    let change = (new_level - old_level).abs();
    let millis = if change <= 10.0 {
        300.0
    } else if change >= 90.0 {
        1500.0
    } else {
        300.0 + (change / 10.0) * 150.0
    };
    Duration::from_millis(millis as u64)
}
