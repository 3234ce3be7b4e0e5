//! Implements current dimming state

use std::time::Instant;

/// Operating mode of the engine. Exactly one holds at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// On-screen time accumulates into the dimming level.
    Automatic,
    /// An exempt app is in the foreground; the level and the elapsed
    /// on-screen time are frozen.
    PausedExempt,
    /// The user controls the level directly.
    Manual,
    /// The screen is off; the level decays toward the minimum.
    Recovering,
}

#[derive(Debug)]
pub(crate) struct DimmingState {
    /// Current intensity in percent. Clamped to the configured bounds on
    /// every write.
    pub level: f32,
    pub mode: Mode,
    pub screen_on: bool,
    /// Start of the current accumulation run. `None` when not accumulating.
    /// Never non-`None` at the same time as `recovery_anchor`.
    pub accumulation_anchor: Option<Instant>,
    /// Instant the screen most recently turned off. `None` while the screen
    /// is on.
    pub recovery_anchor: Option<Instant>,
    /// Level requested by the user. Set only in manual mode.
    pub manual_level: Option<f32>,
    /// Instant the current exemption pause began. Used to shift
    /// `accumulation_anchor` forward when the pause ends.
    pub paused_at: Option<Instant>,
    /// Automatic sub-mode to restore when manual mode ends.
    pub prior_mode: Mode,
}

impl DimmingState {
    pub(crate) fn new(min_level: f32, screen_on: bool, now: Instant) -> Self {
        Self {
            level: min_level,
            mode: Mode::Automatic,
            screen_on,
            accumulation_anchor: screen_on.then_some(now),
            recovery_anchor: None,
            manual_level: None,
            paused_at: None,
            prior_mode: Mode::Automatic,
        }
    }

    /// Return to the baseline: minimum level, automatic mode, fresh anchors.
    pub(crate) fn reset(&mut self, min_level: f32, now: Instant) {
        self.level = min_level;
        self.mode = Mode::Automatic;
        self.accumulation_anchor = self.screen_on.then_some(now);
        self.recovery_anchor = None;
        self.manual_level = None;
        self.paused_at = None;
        self.prior_mode = Mode::Automatic;
    }
}
