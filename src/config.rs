//! Runtime settings for the daemon.
//!
//! Settings come from built-in defaults, overridden by an optional TOML file,
//! overridden by command line flags. The monitor loops re-read the current
//! snapshot on every tick through a [`SettingsHandle`], so values may change
//! live while the daemon runs. Out-of-range values are clamped on write, never
//! rejected.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::flags::Cli;

/// Configuration snapshot consumed by the engine on every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct DimmingConfig {
    /// Percent of dimming gained per completed on-screen interval.
    pub gain_rate: f32,
    /// Minutes of off-screen time per 10% of dimming recovered.
    pub recovery_rate: u32,
    /// Length of one accumulation interval in seconds.
    pub interval_secs: u64,
    /// Lower bound of the dimming level in percent.
    pub min_level: f32,
    /// Upper bound of the dimming level in percent.
    pub max_level: f32,
}

impl Default for DimmingConfig {
    fn default() -> Self {
        Self {
            gain_rate: 10.0,
            recovery_rate: 10,
            interval_secs: 10,
            min_level: 0.0,
            max_level: 100.0,
        }
    }
}

/// Complete settings of the daemon, including fields the engine itself does
/// not consume.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub dimming: DimmingConfig,
    /// Hour of day (0-23) of the scheduled daily reset.
    pub reset_hour: u32,
    /// Minute (0-59) of the scheduled daily reset.
    pub reset_minute: u32,
    /// Cadence of the monitor loops.
    pub tick: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dimming: DimmingConfig::default(),
            reset_hour: 0,
            reset_minute: 0,
            tick: Duration::from_secs(1),
        }
    }
}

/// On-disk representation. Every field is optional; anything missing falls
/// back to the built-in default.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    gain_rate: Option<f32>,
    recovery_rate: Option<u32>,
    interval_secs: Option<u64>,
    min_level: Option<f32>,
    max_level: Option<f32>,
    reset_at: Option<String>,
    tick_ms: Option<u64>,
}

impl Settings {
    /// Build the effective settings from defaults, the optional settings
    /// file, and command line flags, in that order.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut settings = Self::default();

        if let Some(path) = &cli.config {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings file {}", path.display()))?;
            let file: SettingsFile = toml::from_str(&raw)
                .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
            settings.apply_file(file)?;
        }

        settings.apply_cli(cli)?;
        settings.sanitize();
        Ok(settings)
    }

    fn apply_file(&mut self, file: SettingsFile) -> anyhow::Result<()> {
        let d = &mut self.dimming;
        if let Some(v) = file.gain_rate {
            d.gain_rate = v;
        }
        if let Some(v) = file.recovery_rate {
            d.recovery_rate = v;
        }
        if let Some(v) = file.interval_secs {
            d.interval_secs = v;
        }
        if let Some(v) = file.min_level {
            d.min_level = v;
        }
        if let Some(v) = file.max_level {
            d.max_level = v;
        }
        if let Some(v) = &file.reset_at {
            let (h, m) = parse_reset_at(v)?;
            self.reset_hour = h;
            self.reset_minute = m;
        }
        if let Some(v) = file.tick_ms {
            self.tick = Duration::from_millis(v);
        }
        Ok(())
    }

    fn apply_cli(&mut self, cli: &Cli) -> anyhow::Result<()> {
        let d = &mut self.dimming;
        if let Some(v) = cli.gain_rate {
            d.gain_rate = v;
        }
        if let Some(v) = cli.recovery_rate {
            d.recovery_rate = v;
        }
        if let Some(v) = cli.interval {
            d.interval_secs = v;
        }
        if let Some(v) = cli.min_level {
            d.min_level = v;
        }
        if let Some(v) = cli.max_level {
            d.max_level = v;
        }
        if let Some(v) = &cli.reset_at {
            let (h, m) = parse_reset_at(v)?;
            self.reset_hour = h;
            self.reset_minute = m;
        }
        if let Some(v) = cli.tick {
            self.tick = Duration::from_millis(v);
        }
        Ok(())
    }

    /// Clamp every field into its valid range. The level bounds are also
    /// reconciled so that `min_level <= max_level` always holds.
    pub fn sanitize(&mut self) {
        let d = &mut self.dimming;
        d.gain_rate = sane_percent(d.gain_rate, 10.0);
        d.recovery_rate = d.recovery_rate.max(1);
        d.interval_secs = d.interval_secs.max(1);
        d.min_level = sane_percent(d.min_level, 0.0);
        d.max_level = sane_percent(d.max_level, 100.0);
        if d.max_level < d.min_level {
            d.max_level = d.min_level;
        }
        self.reset_hour = self.reset_hour.min(23);
        self.reset_minute = self.reset_minute.min(59);
        self.tick = self.tick.clamp(Duration::from_millis(10), Duration::from_secs(60));
    }
}

/// Clamp a percentage to `[0, 100]`, substituting `fallback` for NaN.
fn sane_percent(v: f32, fallback: f32) -> f32 {
    if v.is_nan() {
        fallback
    } else {
        v.clamp(0.0, 100.0)
    }
}

/// Parse a `HH:MM` time of day.
fn parse_reset_at(s: &str) -> anyhow::Result<(u32, u32)> {
    let (h, m) = s
        .split_once(':')
        .with_context(|| format!("Invalid reset time {s:?}, expected HH:MM"))?;
    let h: u32 = h
        .parse()
        .with_context(|| format!("Invalid reset hour in {s:?}"))?;
    let m: u32 = m
        .parse()
        .with_context(|| format!("Invalid reset minute in {s:?}"))?;
    anyhow::ensure!(h < 24 && m < 60, "Reset time {s:?} out of range");
    Ok((h, m))
}

/// Shared handle to the live settings. Cheap to clone; every loop holds one
/// and re-reads on each tick so user changes take effect immediately.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    inner: Arc<RwLock<Settings>>,
}

impl SettingsHandle {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Snapshot of the engine-facing configuration.
    pub async fn snapshot(&self) -> DimmingConfig {
        self.inner.read().await.dimming.clone()
    }

    /// Snapshot of the complete settings.
    pub async fn settings(&self) -> Settings {
        self.inner.read().await.clone()
    }

    /// Current monitor-loop cadence.
    pub async fn tick(&self) -> Duration {
        self.inner.read().await.tick
    }

    /// Mutate the settings in place. The result is sanitized before it
    /// becomes visible to any loop.
    pub async fn update(&self, f: impl FnOnce(&mut Settings)) {
        let mut guard = self.inner.write().await;
        f(&mut guard);
        guard.sanitize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let mut settings = Settings::default();
        let before = settings.clone();
        settings.sanitize();
        assert_eq!(settings, before);
    }

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let mut settings = Settings {
            dimming: DimmingConfig {
                gain_rate: 250.0,
                recovery_rate: 0,
                interval_secs: 0,
                min_level: -5.0,
                max_level: 120.0,
            },
            reset_hour: 99,
            reset_minute: 99,
            tick: Duration::ZERO,
        };
        settings.sanitize();
        assert_eq!(settings.dimming.gain_rate, 100.0);
        assert_eq!(settings.dimming.recovery_rate, 1);
        assert_eq!(settings.dimming.interval_secs, 1);
        assert_eq!(settings.dimming.min_level, 0.0);
        assert_eq!(settings.dimming.max_level, 100.0);
        assert_eq!(settings.reset_hour, 23);
        assert_eq!(settings.reset_minute, 59);
        assert_eq!(settings.tick, Duration::from_millis(10));
    }

    #[test]
    fn sanitize_reconciles_inverted_bounds() {
        let mut settings = Settings::default();
        settings.dimming.min_level = 60.0;
        settings.dimming.max_level = 40.0;
        settings.sanitize();
        assert_eq!(settings.dimming.min_level, 60.0);
        assert_eq!(settings.dimming.max_level, 60.0);
    }

    #[test]
    fn sanitize_replaces_nan() {
        let mut settings = Settings::default();
        settings.dimming.gain_rate = f32::NAN;
        settings.dimming.min_level = f32::NAN;
        settings.sanitize();
        assert_eq!(settings.dimming.gain_rate, 10.0);
        assert_eq!(settings.dimming.min_level, 0.0);
    }

    #[test]
    fn settings_file_overrides_defaults() {
        let file: SettingsFile = toml::from_str(
            r#"
            gain_rate = 5.0
            recovery_rate = 20
            reset_at = "04:30"
            "#,
        )
        .unwrap();
        let mut settings = Settings::default();
        settings.apply_file(file).unwrap();
        assert_eq!(settings.dimming.gain_rate, 5.0);
        assert_eq!(settings.dimming.recovery_rate, 20);
        assert_eq!(settings.dimming.interval_secs, 10);
        assert_eq!(settings.reset_hour, 4);
        assert_eq!(settings.reset_minute, 30);
    }

    #[test]
    fn reset_at_rejects_garbage() {
        assert!(parse_reset_at("0430").is_err());
        assert!(parse_reset_at("25:00").is_err());
        assert!(parse_reset_at("12:60").is_err());
        assert!(parse_reset_at("aa:bb").is_err());
        assert_eq!(parse_reset_at("23:59").unwrap(), (23, 59));
    }

    #[tokio::test]
    async fn handle_updates_are_sanitized() {
        let handle = SettingsHandle::new(Settings::default());
        handle
            .update(|s| {
                s.dimming.max_level = 150.0;
                s.dimming.min_level = 30.0;
            })
            .await;
        let config = handle.snapshot().await;
        assert_eq!(config.min_level, 30.0);
        assert_eq!(config.max_level, 100.0);
    }
}
