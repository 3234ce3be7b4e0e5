//! Monitor loops feeding the engine.
//!
//! Three concerns run concurrently once the feature is active: the power
//! listener drains screen edges from a bounded channel, the exemption loop
//! polls the oracle and drives the periodic recompute, and a recovery loop is
//! armed for each screen-off period. All of them funnel into the engine,
//! whose operations serialize on its internal lock.
//!
//! Edges are applied the moment they are received, never deferred to a tick
//! boundary, so a power event always lands before the next recompute that
//! could observe it. Within one exemption iteration the oracle verdict is
//! applied before the recompute.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::SettingsHandle;
use crate::engine::DimmingEngine;
use crate::handlers::{ExemptionOracle, PowerEvent};
use crate::schedule;

/// Capacity of the power-event channel. Edges are rare; a small bound keeps
/// a wedged producer from queueing without limit.
pub const POWER_EVENT_CAPACITY: usize = 16;

/// Create the channel the platform delivers screen edges on.
pub fn power_event_channel() -> (mpsc::Sender<PowerEvent>, mpsc::Receiver<PowerEvent>) {
    mpsc::channel(POWER_EVENT_CAPACITY)
}

/// Handle to the running monitor loops. Dropping it does not stop them; call
/// [`Monitors::stop`].
pub struct Monitors {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Monitors {
    /// Start all monitor loops.
    pub fn start(
        engine: Arc<DimmingEngine>,
        settings: SettingsHandle,
        oracle: Arc<dyn ExemptionOracle>,
        power_rx: mpsc::Receiver<PowerEvent>,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(power_loop(
                engine.clone(),
                settings.clone(),
                stop_rx.clone(),
                power_rx,
            )),
            tokio::spawn(exemption_loop(
                engine.clone(),
                settings.clone(),
                oracle,
                stop_rx.clone(),
            )),
            tokio::spawn(schedule::daily_reset_loop(engine, settings, stop_rx)),
        ];
        Self { stop_tx, tasks }
    }

    /// Stop the loops and wait for them to finish. Engine operations are
    /// synchronous, so none is ever interrupted halfway.
    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(true);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

/// Drains screen edges and forwards them into the engine. Arms a fresh
/// recovery loop for every screen-off period; the armed loop retires itself
/// as soon as the screen is back on or the stop signal fires.
async fn power_loop(
    engine: Arc<DimmingEngine>,
    settings: SettingsHandle,
    mut stop_rx: watch::Receiver<bool>,
    mut power_rx: mpsc::Receiver<PowerEvent>,
) {
    loop {
        let event = tokio::select! {
            _ = stop_rx.changed() => break,
            event = power_rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        debug!("power event: {event:?}");
        match event {
            PowerEvent::ScreenOn | PowerEvent::UserPresent => engine.on_screen_on(),
            PowerEvent::ScreenOff => {
                engine.on_screen_off();
                tokio::spawn(recovery_loop(
                    engine.clone(),
                    settings.clone(),
                    stop_rx.clone(),
                ));
            }
        }
    }
}

/// Ticks the engine at the configured cadence while the screen stays off.
async fn recovery_loop(
    engine: Arc<DimmingEngine>,
    settings: SettingsHandle,
    mut stop_rx: watch::Receiver<bool>,
) {
    debug!("recovery loop armed");
    loop {
        if *stop_rx.borrow() || engine.screen_on() {
            break;
        }
        let config = settings.snapshot().await;
        engine.tick(Instant::now(), &config);
        let tick = settings.tick().await;
        tokio::select! {
            _ = stop_rx.changed() => break,
            () = tokio::time::sleep(tick) => {}
        }
    }
    debug!("recovery loop disarmed");
}

/// Polls the exemption oracle and drives the periodic recompute. A failed
/// query keeps the previous exemption state; accumulation still advances.
async fn exemption_loop(
    engine: Arc<DimmingEngine>,
    settings: SettingsHandle,
    oracle: Arc<dyn ExemptionOracle>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut last_exempt = None;
    loop {
        if *stop_rx.borrow() {
            break;
        }
        let now = Instant::now();
        match oracle.is_foreground_exempt(now) {
            Ok(exempt) => {
                if last_exempt != Some(exempt) {
                    engine.set_exempt_at(exempt, now);
                    last_exempt = Some(exempt);
                }
            }
            Err(err) => warn!("Exemption query failed: {err:#}"),
        }
        let config = settings.snapshot().await;
        engine.tick(now, &config);

        let tick = settings.tick().await;
        tokio::select! {
            _ = stop_rx.changed() => break,
            () = tokio::time::sleep(tick) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::state::Mode;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct FakeOracle {
        exempt: AtomicBool,
        fail: AtomicBool,
    }

    impl ExemptionOracle for FakeOracle {
        fn is_foreground_exempt(&self, _now: Instant) -> anyhow::Result<bool> {
            if self.fail.load(Ordering::Relaxed) {
                anyhow::bail!("usage stats unavailable");
            }
            Ok(self.exempt.load(Ordering::Relaxed))
        }
    }

    fn fast_settings() -> SettingsHandle {
        let mut settings = Settings::default();
        settings.tick = Duration::from_millis(10);
        SettingsHandle::new(settings)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(120)).await;
    }

    #[tokio::test]
    async fn exemption_loop_applies_base_level_and_pauses() {
        let engine = Arc::new(DimmingEngine::new(Default::default(), true));
        let oracle = Arc::new(FakeOracle::default());
        let (_power_tx, power_rx) = power_event_channel();
        let monitors = Monitors::start(
            engine.clone(),
            fast_settings(),
            oracle.clone(),
            power_rx,
        );

        settle().await;
        assert_eq!(engine.level(), 10.0);
        assert_eq!(engine.snapshot().mode, Mode::Automatic);

        oracle.exempt.store(true, Ordering::Relaxed);
        settle().await;
        assert_eq!(engine.snapshot().mode, Mode::PausedExempt);

        oracle.exempt.store(false, Ordering::Relaxed);
        settle().await;
        assert_eq!(engine.snapshot().mode, Mode::Automatic);

        monitors.stop().await;
    }

    #[tokio::test]
    async fn oracle_failure_retains_previous_exemption_state() {
        let engine = Arc::new(DimmingEngine::new(Default::default(), true));
        let oracle = Arc::new(FakeOracle::default());
        oracle.exempt.store(true, Ordering::Relaxed);
        let (_power_tx, power_rx) = power_event_channel();
        let monitors = Monitors::start(
            engine.clone(),
            fast_settings(),
            oracle.clone(),
            power_rx,
        );

        settle().await;
        assert_eq!(engine.snapshot().mode, Mode::PausedExempt);

        // The oracle going dark must not be read as "not exempt".
        oracle.fail.store(true, Ordering::Relaxed);
        oracle.exempt.store(false, Ordering::Relaxed);
        settle().await;
        assert_eq!(engine.snapshot().mode, Mode::PausedExempt);

        monitors.stop().await;
    }

    #[tokio::test]
    async fn power_edges_arm_and_disarm_recovery() {
        let engine = Arc::new(DimmingEngine::new(Default::default(), true));
        let (power_tx, power_rx) = power_event_channel();
        let monitors = Monitors::start(
            engine.clone(),
            fast_settings(),
            Arc::new(FakeOracle::default()),
            power_rx,
        );

        settle().await;
        assert_eq!(engine.level(), 10.0);

        power_tx.send(PowerEvent::ScreenOff).await.unwrap();
        settle().await;
        let snapshot = engine.snapshot();
        assert!(!snapshot.screen_on);
        assert_eq!(snapshot.mode, Mode::Recovering);

        power_tx.send(PowerEvent::UserPresent).await.unwrap();
        settle().await;
        let snapshot = engine.snapshot();
        assert!(snapshot.screen_on);
        assert_eq!(snapshot.mode, Mode::Automatic);

        monitors.stop().await;
    }

    #[tokio::test]
    async fn stop_terminates_all_loops() {
        let engine = Arc::new(DimmingEngine::new(Default::default(), true));
        let (power_tx, power_rx) = power_event_channel();
        let monitors = Monitors::start(
            engine.clone(),
            fast_settings(),
            Arc::new(FakeOracle::default()),
            power_rx,
        );
        power_tx.send(PowerEvent::ScreenOff).await.unwrap();
        settle().await;

        tokio::time::timeout(Duration::from_secs(5), monitors.stop())
            .await
            .expect("monitor loops must stop promptly");

        // Let any in-flight recovery iteration observe the stop signal, then
        // verify no loop is left ticking the engine.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let before = engine.level();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.level(), before);
    }
}
