//! Electromagnet bench control.
//!
//! Subcommands:
//! - `run`: drive the field from the game controller (or a recorded script)
//! - `hop`: fire one hop and hold it until Enter
//! - `spin`: rotate the field until Enter
//! - `reset`: reset all three supplies

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hardware::gamepad::ScriptedInput;
use magnet_control::{ConfigOverrides, ControlLoop, Direction, Session};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "magnet_control")]
#[command(about = "Steer a three-axis electromagnet from a game controller")]
#[command(version)]
struct Args {
    /// JSON session file; command-line flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigOverrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive the field from the controller until Start is pressed
    Run {
        /// Replay a recorded controller script instead of a live controller
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Sleep between polls in milliseconds
        #[arg(long, default_value = "0")]
        poll_ms: u64,
    },

    /// Fire one hop and hold it until Enter is pressed
    Hop {
        #[arg(value_enum, default_value = "right")]
        direction: Direction,
    },

    /// Rotate the field until Enter is pressed
    Spin,

    /// Reset all three supplies
    Reset,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = args
        .overrides
        .resolve(args.config.as_deref())
        .context("Invalid session configuration")?;

    if config.dry_run {
        info!("Dry run: commands are logged, not sent");
    }

    let session = Session::open(&config)?;

    match args.command {
        Command::Run { replay, poll_ms } => cmd_run(session, replay, poll_ms),
        Command::Hop { direction } => {
            let report = session.hop(direction);
            hold_until_enter(&session, report.is_ok())
        }
        Command::Spin => {
            let report = session.spin();
            hold_until_enter(&session, report.is_ok())
        }
        Command::Reset => {
            session.reset_all().into_result()?;
            info!("All axes reset");
            Ok(())
        }
    }
}

fn cmd_run(session: Session, replay: Option<PathBuf>, poll_ms: u64) -> Result<()> {
    let interval = Duration::from_millis(poll_ms);

    if let Some(path) = replay {
        let input = ScriptedInput::load(&path)
            .with_context(|| format!("Failed to load script {}", path.display()))?
            .then_stop();
        info!("Replaying {} polls from {}", input.remaining(), path.display());
        ControlLoop::new(session, input)
            .with_poll_interval(interval)
            .run();
        return Ok(());
    }

    run_live(session, interval)
}

#[cfg(feature = "gilrs")]
fn run_live(session: Session, interval: Duration) -> Result<()> {
    use hardware::gamepad::GilrsInput;

    let input = GilrsInput::new()?;
    info!("Controller ready, press Start to exit");
    ControlLoop::new(session, input)
        .with_poll_interval(interval)
        .run();
    Ok(())
}

#[cfg(not(feature = "gilrs"))]
fn run_live(_session: Session, _interval: Duration) -> Result<()> {
    bail!("Built without controller support: rebuild with --features gilrs or use --replay");
}

fn hold_until_enter(session: &Session, started: bool) -> Result<()> {
    if !started {
        warn!("Not every axis accepted the gesture");
    }
    info!("Press Enter to stop");

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;

    let report = session.reset_all();
    if !report.is_ok() {
        bail!("Reset failed on {} axes", 3 - report.sent());
    }
    info!("All axes reset");
    Ok(())
}
