//! Reach command-line tool.
//!
//! - `solve`: solve one target and print the goal joint angles
//! - `demo`: animate a move while recording it, then replay and export it
//! - `replay`: import a trajectory document and print playback frames
//! - `info`: print crate versions and the default configuration

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use nalgebra::Vector3;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use reach_core::prelude::*;
use reach_ik::prelude::*;
use reach_record::prelude::*;
use reach_sim::prelude::*;

type CliResult = Result<(), Box<dyn Error>>;

/// Simulated frame period.
const FRAME_MS: u64 = 20;
/// Print every Nth frame during playback.
const PRINT_EVERY: u32 = 5;
/// Hard stop for frame loops.
const MAX_FRAMES: u32 = 100_000;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Real-time inverse kinematics and trajectory record/playback.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve for a target position and print the joint angles.
    Solve {
        #[arg(long, allow_hyphen_values = true)]
        x: f32,
        #[arg(long, allow_hyphen_values = true)]
        y: f32,
        #[arg(long, allow_hyphen_values = true, default_value_t = 0.0)]
        z: f32,

        /// Arm to solve on.
        #[arg(short, long, value_enum, default_value_t = Preset::Planar)]
        preset: Preset,

        /// TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Animate a move while recording it, replay the recording and export it.
    Demo {
        #[arg(short, long, value_enum, default_value_t = Preset::Planar)]
        preset: Preset,

        /// Write the trajectory document here instead of printing it.
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Play a trajectory document and print the frames.
    Replay {
        /// Trajectory JSON document.
        file: PathBuf,

        /// Playback speed multiplier.
        #[arg(short, long, default_value_t = 1.0)]
        speed: f32,

        /// Arm whose joints the document drives.
        #[arg(short, long, value_enum, default_value_t = Preset::Planar)]
        preset: Preset,
    },

    /// Print crate information and the default configuration.
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Preset {
    /// Planar two-link arm (1.0 + 0.5).
    Planar,
    /// Six-joint arm.
    SixDof,
}

impl Preset {
    fn build(self) -> Result<ArmModel, ChainError> {
        match self {
            Self::Planar => planar_two_link(1.0, 0.5),
            Self::SixDof => six_dof_arm(),
        }
    }

    fn demo_target(self) -> Vector3<f32> {
        match self {
            Self::Planar => Vector3::new(1.2, 0.3, 0.0),
            Self::SixDof => Vector3::new(0.3, 0.2, 0.5),
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ReachConfig, ConfigError> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            ReachConfig::from_file(path)
        }
        None => Ok(ReachConfig::default()),
    }
}

fn print_pose(label: &str, values: &JointValues) {
    println!("{label}:");
    for (name, value) in values {
        println!("  {name:<20} {value:+.4}");
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn run_solve(target: Vector3<f32>, preset: Preset, config: Option<&Path>) -> CliResult {
    let config = load_config(config)?;
    let mut arm = preset.build()?;
    let mut solver = CcdSolver::from_config(&config.solver);
    let solution = solver.solve(&mut arm, &target, &SolveOptions::default())?;

    println!(
        "target ({:.3}, {:.3}, {:.3}) on {} dof arm",
        target.x,
        target.y,
        target.z,
        dof(&arm)
    );
    println!(
        "{:?} after {} iterations, error {:.4} (tolerance {})",
        solution.status(),
        solution.iterations,
        solution.error,
        solution.settings.tolerance
    );
    if !solution.reachable {
        println!(
            "note: target looks out of reach (estimated reach {:.3})",
            estimate_max_reach(&arm)
        );
    }
    print_pose("goal", &solution.goal);
    Ok(())
}

fn run_demo(preset: Preset, out: Option<&Path>, config: Option<&Path>) -> CliResult {
    let config = load_config(config)?;
    let clock = ManualClock::new();
    let mut session = ReachSession::new(config, Arc::new(clock.clone()));
    let mut arm = preset.build()?;
    let home = arm.joint_values();

    let recording = session.recording_options().sampled_every(FRAME_MS * 5);
    session.start_recording("demo", recording)?;
    let options = session.execute_options();
    let kind = session.execute_ik(&mut arm, &preset.demo_target(), &options)?;
    info!(?kind, "move planned");

    let mut frames = 0;
    while session.activity().animating && frames < MAX_FRAMES {
        session.tick(&mut arm);
        clock.advance(FRAME_MS);
        frames += 1;
    }
    session.record_keyframe(
        arm.joint_values(),
        None,
        arm.end_effector_world_position().map(Position::from),
    )?;
    let Some(recorded) = session.stop_recording() else {
        return Err("recording was not active".into());
    };
    println!(
        "recorded {} keyframes over {} ms",
        recorded.len(),
        recorded.duration_ms()
    );

    arm.set_joint_values(&home);
    let playback = session.playback_options();
    session.play_trajectory("demo", &mut arm, playback)?;
    replay_frames(&mut session, &mut arm, &clock);

    let json = session.export_trajectory("demo")?;
    match out {
        Some(path) => {
            std::fs::write(path, json)?;
            println!("trajectory written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_replay(file: &Path, speed: f32, preset: Preset) -> CliResult {
    let clock = ManualClock::new();
    let mut session = ReachSession::new(ReachConfig::default(), Arc::new(clock.clone()));
    let mut arm = preset.build()?;

    let json = std::fs::read_to_string(file)?;
    let trajectory = session.import_trajectory(&json)?;
    let known = arm.joints().iter().any(|j| {
        trajectory
            .keyframes()
            .iter()
            .any(|k| k.joint_values.contains_key(&j.name))
    });
    if !known {
        warn!(
            name = trajectory.name(),
            "document drives none of the preset's joints"
        );
    }

    println!(
        "replaying '{}' ({} keyframes, {} ms) at {speed}x",
        trajectory.name(),
        trajectory.len(),
        trajectory.duration_ms()
    );
    let options = session.playback_options().with_speed(speed);
    session.play_trajectory(trajectory.name(), &mut arm, options)?;
    replay_frames(&mut session, &mut arm, &clock);
    Ok(())
}

/// Tick until the playback ends, printing a frame every few ticks.
fn replay_frames(session: &mut ReachSession, arm: &mut ArmModel, clock: &ManualClock) {
    let mut frames = 0;
    loop {
        clock.advance(FRAME_MS);
        frames += 1;
        let tick = session.tick(arm);
        match tick.playback {
            PlaybackTick::Playing { time_ms } | PlaybackTick::Looped { time_ms } => {
                if frames % PRINT_EVERY == 0 {
                    match session.playback_position() {
                        Some(p) => println!(
                            "t={time_ms:>8.1} ms  ee=({:+.3}, {:+.3}, {:+.3})",
                            p.x, p.y, p.z
                        ),
                        None => println!("t={time_ms:>8.1} ms"),
                    }
                }
            }
            PlaybackTick::Completed | PlaybackTick::Idle => break,
        }
        if frames >= MAX_FRAMES {
            warn!(frames, "playback still running, giving up");
            session.stop_playback();
            break;
        }
    }
    print_pose("final pose", &arm.joint_values());
}

fn run_info() -> CliResult {
    println!("reach v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("crates:");
    println!("  reach-core   {}", env!("CARGO_PKG_VERSION"));
    println!("  reach-ik     {}", env!("CARGO_PKG_VERSION"));
    println!("  reach-record {}", env!("CARGO_PKG_VERSION"));
    println!("  reach-sim    {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("default configuration:");
    println!("{}", toml::to_string_pretty(&ReachConfig::default())?);
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Solve {
            x,
            y,
            z,
            preset,
            config,
        }) => run_solve(Vector3::new(x, y, z), preset, config.as_deref()),
        Some(Commands::Demo {
            preset,
            out,
            config,
        }) => run_demo(preset, out.as_deref(), config.as_deref()),
        Some(Commands::Replay {
            file,
            speed,
            preset,
        }) => run_replay(&file, speed, preset),
        Some(Commands::Info) => run_info(),
        None => run_demo(Preset::Planar, None, None),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
