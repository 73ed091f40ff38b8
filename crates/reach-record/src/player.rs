//! Timed trajectory playback.
//!
//! The player is polled like a [`MotionTask`](reach_ik::motion::MotionTask):
//! every [`TrajectoryPlayer::tick`] maps the clock reading to trajectory time,
//! interpolates between the bracketing keyframes and writes the result to the
//! scene.

use std::fmt;

use tracing::info;

use reach_core::config::PlaybackConfig;
use reach_core::error::{ConflictError, ReachError, TrajectoryError};
use reach_ik::chain::KinematicScene;
use reach_ik::motion::CompletionCallback;

use crate::types::{Position, Trajectory};

// ---------------------------------------------------------------------------
// PlaybackOptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOptions {
    /// Time scale; must be finite and positive.
    pub speed: f32,
    /// Wrap around at the end instead of completing.
    pub looping: bool,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self::from(&PlaybackConfig::default())
    }
}

impl From<&PlaybackConfig> for PlaybackOptions {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            speed: config.speed,
            looping: config.looping,
        }
    }
}

impl PlaybackOptions {
    #[must_use]
    pub const fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    #[must_use]
    pub const fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}

// ---------------------------------------------------------------------------
// PlaybackTick
// ---------------------------------------------------------------------------

/// What a [`TrajectoryPlayer::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackTick {
    /// Interpolated pose written at trajectory time `time_ms`.
    Playing { time_ms: f64 },
    /// Like `Playing`, on the frame a looping playback wrapped around.
    Looped { time_ms: f64 },
    /// Final keyframe written; the player is idle again.
    Completed,
    /// Nothing is playing.
    Idle,
}

// ---------------------------------------------------------------------------
// TrajectoryPlayer
// ---------------------------------------------------------------------------

struct ActivePlayback {
    trajectory: Trajectory,
    started_at: u64,
    speed: f32,
    looping: bool,
    cycle: u64,
    current_position: Option<Position>,
    on_complete: Option<CompletionCallback>,
}

/// Plays at most one trajectory at a time.
#[derive(Default)]
pub struct TrajectoryPlayer {
    active: Option<ActivePlayback>,
}

impl fmt::Debug for TrajectoryPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrajectoryPlayer")
            .field("playing", &self.trajectory_name())
            .field("current_position", &self.current_position())
            .finish_non_exhaustive()
    }
}

impl TrajectoryPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn is_playing(&self) -> bool {
        self.active.is_some()
    }

    pub fn trajectory_name(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.trajectory.name())
    }

    /// Interpolated end-effector position of the last tick.
    pub fn current_position(&self) -> Option<Position> {
        self.active.as_ref().and_then(|a| a.current_position)
    }

    /// Start playing `trajectory` at `now_ms`.
    ///
    /// # Errors
    ///
    /// [`ConflictError::PlaybackActive`] while another playback runs,
    /// [`TrajectoryError::Empty`] for a trajectory without keyframes and
    /// [`TrajectoryError::InvalidSpeed`] for a non-positive or non-finite speed.
    pub fn play(
        &mut self,
        trajectory: Trajectory,
        options: PlaybackOptions,
        now_ms: u64,
    ) -> Result<(), ReachError> {
        if self.active.is_some() {
            return Err(ConflictError::PlaybackActive.into());
        }
        if trajectory.is_empty() {
            return Err(TrajectoryError::Empty(trajectory.name().to_string()).into());
        }
        if !(options.speed.is_finite() && options.speed > 0.0) {
            return Err(TrajectoryError::InvalidSpeed(options.speed).into());
        }

        info!(
            name = trajectory.name(),
            keyframes = trajectory.len(),
            duration_ms = trajectory.duration_ms(),
            speed = options.speed,
            looping = options.looping,
            "playback started"
        );
        self.active = Some(ActivePlayback {
            trajectory,
            started_at: now_ms,
            speed: options.speed,
            looping: options.looping,
            cycle: 0,
            current_position: None,
            on_complete: None,
        });
        Ok(())
    }

    /// Run `callback` when the active playback completes on its own.
    ///
    /// Returns `false` (dropping the callback) when nothing is playing.
    pub fn on_complete(&mut self, callback: impl FnOnce() + Send + Sync + 'static) -> bool {
        match self.active.as_mut() {
            Some(active) => {
                active.on_complete = Some(Box::new(callback));
                true
            }
            None => false,
        }
    }

    /// Cancel playback. Idempotent; returns whether anything was playing.
    ///
    /// The completion callback does not run.
    pub fn stop(&mut self) -> bool {
        match self.active.take() {
            Some(active) => {
                info!(name = active.trajectory.name(), "playback stopped");
                true
            }
            None => false,
        }
    }

    /// Advance to `now_ms` and write the interpolated pose into `scene`.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn tick<S: KinematicScene + ?Sized>(&mut self, scene: &mut S, now_ms: u64) -> PlaybackTick {
        let Some(active) = self.active.as_mut() else {
            return PlaybackTick::Idle;
        };

        let elapsed = now_ms.saturating_sub(active.started_at) as f64 * f64::from(active.speed);
        let duration = active.trajectory.duration_ms() as f64;

        if !active.looping && elapsed >= duration {
            if let Some(last) = active.trajectory.keyframes().last() {
                scene.set_joint_values(&last.joint_values);
            }
            let Some(finished) = self.active.take() else {
                return PlaybackTick::Idle;
            };
            info!(name = finished.trajectory.name(), "playback completed");
            if let Some(callback) = finished.on_complete {
                callback();
            }
            return PlaybackTick::Completed;
        }

        let (time_ms, wrapped) = if !active.looping {
            (elapsed.min(duration), false)
        } else if duration <= 0.0 {
            (0.0, false)
        } else {
            let cycle = (elapsed / duration).floor() as u64;
            let wrapped = cycle > active.cycle;
            active.cycle = cycle;
            (elapsed % duration, wrapped)
        };

        if let Some(sample) = active.trajectory.sample(time_ms) {
            scene.set_joint_values(&sample.joint_values);
            active.current_position = sample.end_effector;
        }

        if wrapped {
            PlaybackTick::Looped { time_ms }
        } else {
            PlaybackTick::Playing { time_ms }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
