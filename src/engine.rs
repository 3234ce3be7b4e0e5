//! The dimming state engine.
//!
//! One engine instance owns the [`DimmingState`] for the lifetime of the
//! session and is its sole writer. Every public operation is a single bounded
//! read-modify-write under the internal lock, so no caller can observe a
//! half-applied transition. Operations are total: bad input is clamped or
//! ignored, never reported as an error, and nothing here blocks.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info};
use tokio::sync::watch;

use crate::config::DimmingConfig;
use crate::policy::{self, PolicyAction};
use crate::state::{DimmingState, Mode};

pub struct DimmingEngine {
    inner: Mutex<Inner>,
    /// Live stream of the level. A new subscriber immediately observes the
    /// current value.
    level_tx: watch::Sender<f32>,
}

#[derive(Debug)]
struct Inner {
    state: DimmingState,
    /// Last configuration observed by `tick`. Operations that run between
    /// ticks (resets, manual input) take their bounds from here.
    config: DimmingConfig,
}

/// Read-only view of the state for status reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateSnapshot {
    pub level: f32,
    pub mode: Mode,
    pub screen_on: bool,
}

impl DimmingEngine {
    /// Create an engine seeded with the actual device power state.
    pub fn new(config: DimmingConfig, screen_on: bool) -> Self {
        Self::new_at(config, screen_on, Instant::now())
    }

    pub(crate) fn new_at(config: DimmingConfig, screen_on: bool, now: Instant) -> Self {
        let state = DimmingState::new(config.min_level, screen_on, now);
        let (level_tx, _) = watch::channel(state.level);
        Self {
            inner: Mutex::new(Inner { state, config }),
            level_tx,
        }
    }

    /// Every mutation under this lock is panic-free, so a poisoned lock still
    /// guards a consistent state and can be recovered.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, inner: &Inner) {
        self.level_tx.send_if_modified(|level| {
            if *level != inner.state.level {
                *level = inner.state.level;
                true
            } else {
                false
            }
        });
    }

    /// Subscribe to the level stream.
    pub fn subscribe(&self) -> watch::Receiver<f32> {
        self.level_tx.subscribe()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.lock();
        StateSnapshot {
            level: inner.state.level,
            mode: inner.state.mode,
            screen_on: inner.state.screen_on,
        }
    }

    pub fn level(&self) -> f32 {
        self.lock().state.level
    }

    pub fn screen_on(&self) -> bool {
        self.lock().state.screen_on
    }

    /// Recommended animation time for a level change, for the render side.
    pub fn transition_duration(&self, old_level: f32, new_level: f32) -> Duration {
        policy::transition_duration(old_level, new_level)
    }

    pub fn on_screen_on(&self) {
        self.on_screen_on_at(Instant::now());
    }

    pub(crate) fn on_screen_on_at(&self, now: Instant) {
        let mut inner = self.lock();
        if inner.state.screen_on {
            return;
        }
        inner.state.screen_on = true;
        match inner.state.mode {
            Mode::Recovering => {
                inner.state.mode = Mode::Automatic;
                inner.state.recovery_anchor = None;
                inner.state.accumulation_anchor = Some(now);
            }
            Mode::Automatic => {
                inner.state.accumulation_anchor = Some(now);
            }
            Mode::PausedExempt => {
                inner.state.accumulation_anchor = Some(now);
                inner.state.paused_at = Some(now);
            }
            // Anchors stay frozen; manual exit re-anchors from the screen
            // state current at that point.
            Mode::Manual => {}
        }
        debug!("screen on: {:?}", inner.state);
    }

    pub fn on_screen_off(&self) {
        self.on_screen_off_at(Instant::now());
    }

    pub(crate) fn on_screen_off_at(&self, now: Instant) {
        let mut inner = self.lock();
        if !inner.state.screen_on {
            return;
        }
        inner.state.screen_on = false;
        inner.state.accumulation_anchor = None;
        inner.state.paused_at = None;
        if inner.state.mode != Mode::Manual {
            // Exemption pausing is irrelevant once the screen is off.
            inner.state.mode = Mode::Recovering;
            inner.state.recovery_anchor = Some(now);
        }
        debug!("screen off: {:?}", inner.state);
    }

    /// The periodic level recompute. Correct for any delivery cadence as long
    /// as `now` is monotonic, because all math runs against the retained
    /// anchors.
    pub fn tick(&self, now: Instant, config: &DimmingConfig) {
        let mut inner = self.lock();
        inner.config = config.clone();
        let actions = policy::recompute(&inner.state, config, now);
        debug!("tick actions: {actions:?}");
        for action in actions {
            match action {
                PolicyAction::SetLevel(v) => {
                    inner.state.level = v.clamp(config.min_level, config.max_level);
                }
                PolicyAction::RebaseRecovery(at) => {
                    inner.state.recovery_anchor = Some(at);
                }
            }
        }
        self.publish(&inner);
    }

    pub fn set_exempt(&self, exempt: bool) {
        self.set_exempt_at(exempt, Instant::now());
    }

    pub(crate) fn set_exempt_at(&self, exempt: bool, now: Instant) {
        let mut inner = self.lock();
        match (exempt, inner.state.mode) {
            (true, Mode::Automatic) => {
                inner.state.mode = Mode::PausedExempt;
                inner.state.paused_at = Some(now);
                info!("exempt app in foreground, accumulation paused");
            }
            (false, Mode::PausedExempt) => {
                inner.state.mode = Mode::Automatic;
                // Shift the anchor forward by the paused duration so elapsed
                // on-screen time excludes the pause. Toggling an exempt app
                // must not restart the run.
                if let (Some(anchor), Some(paused_at)) =
                    (inner.state.accumulation_anchor, inner.state.paused_at)
                {
                    inner.state.accumulation_anchor =
                        Some(anchor + now.saturating_duration_since(paused_at));
                }
                inner.state.paused_at = None;
                info!("exempt app left foreground, accumulation resumed");
            }
            // Recovery and manual mode are unaffected by exemption status.
            _ => {}
        }
    }

    /// Reset the level to the minimum and resume automatic accumulation.
    pub fn reset_blur(&self) {
        self.reset_blur_at(Instant::now());
    }

    pub(crate) fn reset_blur_at(&self, now: Instant) {
        let mut inner = self.lock();
        let min_level = inner.config.min_level;
        inner.state.reset(min_level, now);
        info!("dimming level reset to {min_level}%");
        self.publish(&inner);
    }

    /// Scheduled reset. Same transition as [`Self::reset_blur`], kept as a
    /// separate entry point for its external trigger.
    pub fn daily_reset(&self) {
        info!("scheduled daily reset");
        self.reset_blur();
    }

    /// Reset after (re)start of the session.
    pub fn boot_reset(&self) {
        info!("boot reset");
        self.reset_blur();
    }

    pub fn toggle_manual(&self) {
        self.toggle_manual_at(Instant::now());
    }

    pub(crate) fn toggle_manual_at(&self, now: Instant) {
        let mut inner = self.lock();
        if inner.state.mode == Mode::Manual {
            // Time spent in manual mode is neither credited nor debited:
            // automatic computation resumes from now.
            inner.state.manual_level = None;
            if inner.state.screen_on {
                inner.state.mode = inner.state.prior_mode;
                inner.state.accumulation_anchor = Some(now);
                inner.state.recovery_anchor = None;
                if inner.state.mode == Mode::PausedExempt {
                    inner.state.paused_at = Some(now);
                }
            } else {
                inner.state.mode = Mode::Recovering;
                inner.state.accumulation_anchor = None;
                inner.state.recovery_anchor = Some(now);
            }
            info!("manual mode off, resuming {:?}", inner.state.mode);
        } else {
            inner.state.prior_mode = match inner.state.mode {
                Mode::Recovering => Mode::Automatic,
                mode => mode,
            };
            inner.state.mode = Mode::Manual;
            inner.state.manual_level = Some(inner.state.level);
            info!("manual mode on at {}%", inner.state.level);
        }
    }

    /// Set the level directly. Only effective in manual mode; the input is
    /// clamped to `[0, 100]` and NaN is ignored.
    pub fn set_manual_level(&self, level: f32) {
        if level.is_nan() {
            debug!("ignoring NaN manual level");
            return;
        }
        let mut inner = self.lock();
        if inner.state.mode != Mode::Manual {
            return;
        }
        let level = level.clamp(0.0, 100.0);
        inner.state.manual_level = Some(level);
        inner.state.level = level.clamp(inner.config.min_level, inner.config.max_level);
        self.publish(&inner);
    }
}
