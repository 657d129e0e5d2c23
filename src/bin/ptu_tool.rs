//! CLI tool for FLIR pan-tilt unit control.
//!
//! Subcommands:
//! - `query`: Query axis positions, limits and speeds
//! - `move`: Move an axis to a position in degrees or ticks
//! - `speed`: Query or set axis speed settings
//! - `halt`: Halt motion on one or both axes
//! - `scan`: Start, resume or stop an autoscan pattern
//! - `preset`: Store, go to or clear preset positions
//! - `repl`: Interactive raw-protocol REPL

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use ptu46::{
    Axis, AwaitOutcome, EndpointArgs, PresetAction, PresetIndex, PtuSession, Response, SpeedBound,
    Transport,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use strum::IntoEnumIterator;
use tracing::info;

/// Parse an axis name ("pan" or "tilt") into the Axis enum.
fn parse_axis(s: &str) -> Result<Axis, String> {
    s.parse()
        .map_err(|_| format!("axis must be 'pan' or 'tilt', got {s:?}"))
}

/// Parse a preset action name into the PresetAction enum.
fn parse_action(s: &str) -> Result<PresetAction, String> {
    s.parse()
        .map_err(|_| format!("action must be 'set', 'goto' or 'clear', got {s:?}"))
}

/// FLIR Pan-Tilt Unit Control Tool
#[derive(Parser, Debug)]
#[command(name = "ptu_tool")]
#[command(about = "Control tool for FLIR / Directed Perception pan-tilt units")]
#[command(version)]
struct Args {
    #[command(flatten)]
    endpoint: EndpointArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query positions, travel limits and speeds
    Query {
        /// Specific axis to query (queries both if not specified)
        #[arg(short, long, value_parser = parse_axis)]
        axis: Option<Axis>,
    },

    /// Move an axis to a position
    Move {
        /// Axis to move
        #[arg(short, long, value_parser = parse_axis)]
        axis: Axis,

        /// Absolute position in degrees
        #[arg(short, long)]
        degrees: Option<f64>,

        /// Absolute position in raw ticks
        #[arg(short, long)]
        ticks: Option<i32>,

        /// Relative move in raw ticks
        #[arg(short, long)]
        relative: Option<i32>,

        /// Don't wait for motion to complete
        #[arg(long)]
        no_wait: bool,
    },

    /// Query or set speed settings of an axis
    Speed {
        /// Axis to operate on
        #[arg(short, long, value_parser = parse_axis)]
        axis: Axis,

        /// Desired speed in ticks/sec (queries if omitted)
        #[arg(short, long)]
        set: Option<i32>,

        /// Desired acceleration in ticks/sec^2
        #[arg(long)]
        accel: Option<i32>,
    },

    /// Halt motion
    Halt {
        /// Halt the pan axis only
        #[arg(long)]
        pan: bool,

        /// Halt the tilt axis only
        #[arg(long)]
        tilt: bool,
    },

    /// Start, resume or stop an autoscan pattern
    Scan {
        /// Scan bounds in ticks: two values for pan-only, four for pan+tilt
        #[arg(allow_negative_numbers = true)]
        positions: Vec<i32>,

        /// Resume the last defined pattern
        #[arg(long, conflicts_with = "positions")]
        resume: bool,

        /// Stop a running scan
        #[arg(long, conflicts_with_all = ["positions", "resume"])]
        stop: bool,
    },

    /// Store, go to or clear a preset position
    Preset {
        /// Preset slot (0-32)
        #[arg(short, long)]
        index: u8,

        /// Action: set, goto or clear
        #[arg(short, long, value_parser = parse_action)]
        action: PresetAction,
    },

    /// Interactive raw-protocol REPL
    Repl,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    info!("Connecting to pan-tilt unit at {}...", args.endpoint.endpoint);
    let mut ptu = args.endpoint.connect()?;

    match args.command {
        Command::Query { axis } => cmd_query(&mut ptu, axis),
        Command::Move {
            axis,
            degrees,
            ticks,
            relative,
            no_wait,
        } => cmd_move(&mut ptu, axis, degrees, ticks, relative, no_wait),
        Command::Speed { axis, set, accel } => cmd_speed(&mut ptu, axis, set, accel),
        Command::Halt { pan, tilt } => cmd_halt(&mut ptu, pan, tilt),
        Command::Scan {
            positions,
            resume,
            stop,
        } => cmd_scan(&mut ptu, &positions, resume, stop),
        Command::Preset { index, action } => cmd_preset(&mut ptu, index, action),
        Command::Repl => cmd_repl(&mut ptu),
    }
}

type Session = PtuSession<Box<dyn Transport>>;

fn cmd_query(ptu: &mut Session, axis: Option<Axis>) -> Result<()> {
    let axes: Vec<Axis> = match axis {
        Some(axis) => vec![axis],
        None => Axis::iter().collect(),
    };

    for axis in axes {
        let pos_deg = ptu.get_position_deg(axis)?;
        let pos_ticks = ptu.get_position(axis, false)?;
        let (min_rad, max_rad) = ptu.travel_limits_rad(axis);
        let speed = ptu.get_speed(axis)?;
        let accel = ptu.get_accel(axis)?;

        info!(
            "Axis {axis}: position={pos_deg:.3} deg ({pos_ticks} ticks), \
             range=[{:.3}, {:.3}] deg, speed={speed} ticks/s, accel={accel} ticks/s^2",
            min_rad.to_degrees(),
            max_rad.to_degrees()
        );
    }

    Ok(())
}

fn cmd_move(
    ptu: &mut Session,
    axis: Axis,
    degrees: Option<f64>,
    ticks: Option<i32>,
    relative: Option<i32>,
    no_wait: bool,
) -> Result<()> {
    let wait = !no_wait;

    let outcome = if let Some(deg) = degrees {
        info!("Moving {axis} to {deg:.3} deg...");
        ptu.set_position_deg(axis, deg, wait)?
    } else if let Some(ticks) = ticks {
        info!("Moving {axis} to {ticks} ticks...");
        ptu.set_position(axis, false, ticks, wait)?
    } else if let Some(rel) = relative {
        info!("Moving {axis} by {rel} ticks...");
        ptu.set_position(axis, true, rel, wait)?
    } else {
        bail!("Must specify --degrees, --ticks or --relative");
    };

    match outcome {
        AwaitOutcome::Completed => info!("Motion complete"),
        AwaitOutcome::AckFailed => info!("Move accepted; completion not confirmed"),
        AwaitOutcome::NotRequested => info!("Move command sent"),
    }

    let final_deg = ptu.get_position_deg(axis)?;
    info!("{axis} now at {final_deg:.3} deg");
    Ok(())
}

fn cmd_speed(ptu: &mut Session, axis: Axis, set: Option<i32>, accel: Option<i32>) -> Result<()> {
    if let Some(value) = set {
        info!("Setting {axis} desired speed to {value} ticks/s...");
        ptu.set_speed(axis, value)?;
    }
    if let Some(value) = accel {
        info!("Setting {axis} acceleration to {value} ticks/s^2...");
        ptu.set_accel(axis, value)?;
    }

    let desired = ptu.get_speed(axis)?;
    let current = ptu.get_current_speed(axis)?;
    let base = ptu.get_base_speed(axis)?;
    let accel = ptu.get_accel(axis)?;
    let lower = ptu.get_speed_bound(axis, SpeedBound::Lower)?;
    let upper = ptu.get_speed_bound(axis, SpeedBound::Upper)?;

    info!(
        "Axis {axis}: desired={desired}, current={current}, base={base} ticks/s, \
         accel={accel} ticks/s^2, bounds=[{lower}, {upper}]"
    );
    Ok(())
}

fn cmd_halt(ptu: &mut Session, pan: bool, tilt: bool) -> Result<()> {
    // No flag means halt everything.
    let (pan, tilt) = if !pan && !tilt { (true, true) } else { (pan, tilt) };
    info!("Halting (pan={pan}, tilt={tilt})...");
    ptu.halt(pan, tilt)?;
    info!("Halted");
    Ok(())
}

fn cmd_scan(ptu: &mut Session, positions: &[i32], resume: bool, stop: bool) -> Result<()> {
    if stop {
        info!("Stopping autoscan...");
        ptu.stop_auto_scan()?;
        return Ok(());
    }
    if resume {
        info!("Resuming last autoscan pattern...");
        ptu.resume_auto_scan()?;
        return Ok(());
    }

    match positions {
        [p1, p2] => {
            info!("Starting pan autoscan between {p1} and {p2} ticks...");
            ptu.auto_scan_pan((*p1, *p2))?;
        }
        [p1, p2, t1, t2] => {
            info!("Starting pan+tilt autoscan ({p1},{p2}) x ({t1},{t2}) ticks...");
            ptu.auto_scan_both((*p1, *p2), (*t1, *t2))?;
        }
        _ => bail!("Scan takes two (pan) or four (pan+tilt) tick positions"),
    }

    info!("Scan running; any subsequent command stops it");
    Ok(())
}

fn cmd_preset(ptu: &mut Session, index: u8, action: PresetAction) -> Result<()> {
    let index = PresetIndex::new(index)?;
    info!("Preset {index}: {action}...");
    ptu.preset(index, action)?;
    info!("Done");
    Ok(())
}

fn cmd_repl(ptu: &mut Session) -> Result<()> {
    println!("Pan-tilt REPL - enter raw protocol commands, 'quit' to exit");
    println!("Examples: PP, TP, PP1500, PS1000, H");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        match rl.readline("> ") {
            Ok(line) => {
                let cmd = line.trim();
                if cmd.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&line);

                if cmd.eq_ignore_ascii_case("quit") || cmd.eq_ignore_ascii_case("exit") {
                    println!("Bye!");
                    break;
                }

                match ptu.send_raw(cmd) {
                    Ok(Response::Success) => println!("ok"),
                    Ok(Response::Value(v)) => println!("{v}"),
                    Ok(Response::Error(msg)) => println!("device error: {msg}"),
                    Err(e) => println!("error: {e}"),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {err}");
                break;
            }
        }
    }

    Ok(())
}
