//! Screen dimming daemon. Dims the view the longer the screen stays in use.
//!
//! There is no public code API for you to use! However, the command line
//! interface and the stdin control commands should be stable.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use screen_dimmerd::config::{Settings, SettingsHandle};
use screen_dimmerd::engine::DimmingEngine;
use screen_dimmerd::flags::Cli;
use screen_dimmerd::handlers::{parse_command, Command, NoExemptions};
use screen_dimmerd::monitor::{self, Monitors};
use screen_dimmerd::transition_duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut logger = env_logger::Builder::from_default_env();
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let settings = Settings::load(&cli)?;
    run_daemon(settings, !cli.screen_off).await
}

async fn run_daemon(settings: Settings, screen_on: bool) -> anyhow::Result<()> {
    let settings = SettingsHandle::new(settings);
    let engine = Arc::new(DimmingEngine::new(settings.snapshot().await, screen_on));
    engine.boot_reset();

    let (power_tx, power_rx) = monitor::power_event_channel();
    let monitors = Monitors::start(
        engine.clone(),
        settings.clone(),
        Arc::new(NoExemptions),
        power_rx,
    );

    // Stand-in for the overlay: follow the level stream and log each change
    // together with the recommended animation time.
    let mut level_rx = engine.subscribe();
    let render = tokio::spawn(async move {
        let mut last = *level_rx.borrow();
        while level_rx.changed().await.is_ok() {
            let level = *level_rx.borrow_and_update();
            info!(
                "dimming {last:.1}% -> {level:.1}% over {:?}",
                transition_duration(last, level)
            );
            last = level;
        }
    });

    info!("screen-dimmerd running, control commands on stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line.context("Failed to read control input")?,
        };
        let Some(line) = line else { break };
        match parse_command(&line) {
            Some(Command::Power(event)) => {
                if power_tx.send(event).await.is_err() {
                    break;
                }
            }
            Some(Command::ToggleManual) => engine.toggle_manual(),
            Some(Command::SetManual(level)) => engine.set_manual_level(level),
            Some(Command::Reset) => engine.reset_blur(),
            Some(Command::Status) => {
                let s = engine.snapshot();
                println!(
                    "level {:.1}% mode {:?} screen_on {}",
                    s.level, s.mode, s.screen_on
                );
            }
            Some(Command::Quit) => break,
            None => {
                if !line.trim().is_empty() {
                    warn!("Unknown command: {line:?}");
                }
            }
        }
    }

    monitors.stop().await;
    render.abort();
    Ok(())
}
