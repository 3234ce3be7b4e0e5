//! Scheduled daily reset.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeDelta};
use log::info;
use tokio::sync::watch;

use crate::config::SettingsHandle;
use crate::engine::DimmingEngine;

/// Fires `daily_reset` at the configured time of day, then re-arms. The
/// configured time is re-read after every firing.
pub(crate) async fn daily_reset_loop(
    engine: Arc<DimmingEngine>,
    settings: SettingsHandle,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        if *stop_rx.borrow() {
            break;
        }
        let s = settings.settings().await;
        let delay = next_reset_delay(Local::now(), s.reset_hour, s.reset_minute);
        info!(
            "next scheduled reset at {:02}:{:02} (in {}s)",
            s.reset_hour,
            s.reset_minute,
            delay.as_secs()
        );
        tokio::select! {
            _ = stop_rx.changed() => break,
            () = tokio::time::sleep(delay) => engine.daily_reset(),
        }
    }
}

/// Time until the next occurrence of `hour:minute` local time. A time that
/// has already passed today lands on tomorrow.
fn next_reset_delay(now: DateTime<Local>, hour: u32, minute: u32) -> Duration {
    let at = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    let naive_now = now.naive_local();
    let mut next = naive_now.date().and_time(at);
    if next <= naive_now {
        next = next + TimeDelta::days(1);
    }
    (next - naive_now).to_std().unwrap_or(Duration::ZERO)
}
