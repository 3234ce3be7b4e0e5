//! Seams to the platform collaborators feeding the engine.

use std::time::Instant;

/// Screen power edges delivered by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    ScreenOn,
    ScreenOff,
    /// Device unlock. Treated as a screen-on edge.
    UserPresent,
}

/// Reports whether the currently foregrounded application is exempt from
/// accumulation.
///
/// Implementations must return promptly: do slow detection elsewhere and
/// answer from a cached result here. On `Err` the caller keeps the previous
/// exemption state rather than guessing.
pub trait ExemptionOracle: Send + Sync {
    fn is_foreground_exempt(&self, now: Instant) -> anyhow::Result<bool>;
}

/// Oracle for setups without foreground-app detection: nothing is exempt.
#[derive(Debug, Default)]
pub struct NoExemptions;

impl ExemptionOracle for NoExemptions {
    fn is_foreground_exempt(&self, _now: Instant) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Commands accepted on the manual control surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Power(PowerEvent),
    ToggleManual,
    SetManual(f32),
    Reset,
    Status,
    Quit,
}

/// Parse one line of control input. Returns `None` for anything
/// unrecognized, including blank lines.
pub fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let command = match words.next()? {
        "on" => Command::Power(PowerEvent::ScreenOn),
        "off" => Command::Power(PowerEvent::ScreenOff),
        "present" => Command::Power(PowerEvent::UserPresent),
        "manual" => Command::ToggleManual,
        "set" => Command::SetManual(words.next()?.parse().ok()?),
        "reset" => Command::Reset,
        "status" => Command::Status,
        "quit" => Command::Quit,
        _ => return None,
    };
    if words.next().is_some() {
        return None;
    }
    Some(command)
}
