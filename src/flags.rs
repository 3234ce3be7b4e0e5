//! clap argument parsing
use std::path::PathBuf;

#[derive(Debug, clap::Parser)]
#[command(version, about, long_about = None)]
/// Screen dimming daemon. Gradually dims the view the longer the screen
/// stays in active use, and relaxes again while it rests.
pub struct Cli {
    /// Path to a TOML settings file.
    #[clap(short, long)]
    pub config: Option<PathBuf>,
    /// Percent of dimming gained per completed on-screen interval.
    #[clap(short, long)]
    pub gain_rate: Option<f32>,
    /// Minutes of off-screen time per 10% of dimming recovered.
    #[clap(short, long)]
    pub recovery_rate: Option<u32>,
    /// Length of one accumulation interval in seconds.
    #[clap(short, long)]
    pub interval: Option<u64>,
    /// Lower bound of the dimming level in percent.
    #[clap(long)]
    pub min_level: Option<f32>,
    /// Upper bound of the dimming level in percent.
    #[clap(long)]
    pub max_level: Option<f32>,
    /// Time of day for the scheduled daily reset (HH:MM, 24 hour clock).
    #[clap(long)]
    pub reset_at: Option<String>,
    /// Cadence of the monitor loops in milliseconds.
    #[clap(short, long)]
    pub tick: Option<u64>,
    /// Assume the screen is off at startup.
    #[clap(long)]
    pub screen_off: bool,
    /// Enable extra verbosity!
    #[clap(short, long)]
    pub verbose: bool,
}
