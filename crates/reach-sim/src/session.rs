//! The session object hosts use to drive an arm.
//!
//! [`ReachSession`] bundles the solver, the trajectory store, the recorder
//! and the player around an injected [`Clock`]. It owns no scene: every call
//! that reads or moves joints borrows one, and [`ReachSession::tick`] is
//! expected once per frame.
//!
//! At most one driver moves the scene at a time:
//!
//! - recording and playback are mutually exclusive;
//! - starting a playback stops a running animation;
//! - `execute_ik` is refused while a playback runs and replaces any running
//!   animation.
//!
//! A refused call returns an error, logs a warning and changes nothing.

use std::fmt;
use std::sync::Arc;

use nalgebra::Vector3;
use tracing::{debug, info, warn};

use reach_core::clock::{Clock, SystemClock};
use reach_core::config::ReachConfig;
use reach_core::error::{ConflictError, ReachError};
use reach_ik::chain::{JointValues, KinematicScene};
use reach_ik::motion::{self, ExecuteOptions, MotionPlan, MotionTask, MotionTick};
use reach_ik::settings::SolveOptions;
use reach_ik::solver::{CcdSolver, IkSolution};
use reach_record::document;
use reach_record::player::{PlaybackOptions, PlaybackTick, TrajectoryPlayer};
use reach_record::recorder::{RecordingOptions, TrajectoryRecorder};
use reach_record::store::TrajectoryStore;
use reach_record::types::{Position, Trajectory};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What [`ReachSession::execute_ik`] did with the solved goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionPlanKind {
    /// An animation toward the goal is now running.
    Animating,
    /// The goal was written to the scene at once.
    Applied,
    /// No joint needed to move.
    Unchanged,
}

/// Which operations are currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Activity {
    pub animating: bool,
    pub recording: bool,
    pub playing: bool,
}

impl Activity {
    pub const fn is_idle(&self) -> bool {
        !(self.animating || self.recording || self.playing)
    }
}

/// Outcome of one [`ReachSession::tick`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionTick {
    /// Clock reading used for this tick.
    pub now_ms: u64,
    /// `None` when no animation was running.
    pub motion: Option<MotionTick>,
    pub playback: PlaybackTick,
    /// A recording sample was captured.
    pub sampled: bool,
}

// ---------------------------------------------------------------------------
// ReachSession
// ---------------------------------------------------------------------------

/// Solver, recorder, player and trajectory store behind one frame tick.
pub struct ReachSession {
    config: ReachConfig,
    clock: Arc<dyn Clock>,
    solver: CcdSolver,
    store: TrajectoryStore,
    recorder: TrajectoryRecorder,
    player: TrajectoryPlayer,
    motion: Option<MotionTask>,
    last_solution: Option<IkSolution>,
}

impl fmt::Debug for ReachSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReachSession")
            .field("activity", &self.activity())
            .field("trajectories", &self.store.names())
            .field("recorder", &self.recorder)
            .field("player", &self.player)
            .finish_non_exhaustive()
    }
}

impl ReachSession {
    /// Build a session reading time from `clock`.
    ///
    /// The config is taken as given; validate it first if it came from a file.
    pub fn new(config: ReachConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            solver: CcdSolver::from_config(&config.solver),
            config,
            clock,
            store: TrajectoryStore::new(),
            recorder: TrajectoryRecorder::new(),
            player: TrajectoryPlayer::new(),
            motion: None,
            last_solution: None,
        }
    }

    /// Session on a [`SystemClock`].
    pub fn with_system_clock(config: ReachConfig) -> Self {
        Self::new(config, Arc::new(SystemClock::new()))
    }

    pub const fn config(&self) -> &ReachConfig {
        &self.config
    }

    pub const fn solver(&self) -> &CcdSolver {
        &self.solver
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// The most recent solve done through this session.
    pub const fn last_solution(&self) -> Option<&IkSolution> {
        self.last_solution.as_ref()
    }

    pub fn activity(&self) -> Activity {
        Activity {
            animating: self.motion.is_some(),
            recording: self.recorder.is_recording(),
            playing: self.player.is_playing(),
        }
    }

    // -- defaults from config --

    pub fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions::from(&self.config.motion)
    }

    pub fn recording_options(&self) -> RecordingOptions {
        RecordingOptions::from(&self.config.recording)
    }

    pub fn playback_options(&self) -> PlaybackOptions {
        PlaybackOptions::from(&self.config.playback)
    }

    // -----------------------------------------------------------------------
    // Solving and motion
    // -----------------------------------------------------------------------

    /// Solve for `target` without moving the scene.
    ///
    /// Returns the goal joint values whether or not the solve converged;
    /// [`ReachSession::last_solution`] carries the details.
    ///
    /// # Errors
    ///
    /// [`ReachError::Chain`] when the scene has no usable chain.
    pub fn solve<S: KinematicScene + ?Sized>(
        &mut self,
        scene: &mut S,
        target: &Vector3<f32>,
    ) -> Result<JointValues, ReachError> {
        let solution = self
            .solver
            .solve(scene, target, &SolveOptions::default())
            .inspect_err(|e| warn!(error = %e, "solve rejected"))?;
        let goal = solution.goal.clone();
        self.last_solution = Some(solution);
        Ok(goal)
    }

    /// Solve for `target` and move the scene there.
    ///
    /// With `options.animate` the move runs over the next ticks and replaces
    /// any animation already running.
    ///
    /// # Errors
    ///
    /// [`ConflictError::PlaybackActive`] while a trajectory is playing, and
    /// chain errors from the solver.
    pub fn execute_ik<S: KinematicScene + ?Sized>(
        &mut self,
        scene: &mut S,
        target: &Vector3<f32>,
        options: &ExecuteOptions,
    ) -> Result<MotionPlanKind, ReachError> {
        if self.player.is_playing() {
            return Err(reject("execute_ik", ConflictError::PlaybackActive));
        }

        let execution = motion::execute_ik(&mut self.solver, scene, target, options)
            .map_err(|e| reject("execute_ik", e))?;

        if let Some(mut replaced) = self.motion.take() {
            replaced.stop();
            debug!("running animation replaced");
        }
        let kind = match execution.plan {
            MotionPlan::Animate(task) => {
                self.motion = Some(task);
                MotionPlanKind::Animating
            }
            MotionPlan::Applied => MotionPlanKind::Applied,
            MotionPlan::Unchanged => MotionPlanKind::Unchanged,
        };
        info!(
            converged = execution.solution.converged,
            error = execution.solution.error,
            plan = ?kind,
            "execute_ik"
        );
        self.last_solution = Some(execution.solution);
        Ok(kind)
    }

    /// Cancel the running animation. Returns whether one was running.
    pub fn stop_animation(&mut self) -> bool {
        match self.motion.take() {
            Some(mut task) => {
                task.stop();
                debug!("animation stopped");
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// [`ConflictError::PlaybackActive`] while playing,
    /// [`ConflictError::RecordingActive`] while already recording, and an
    /// empty name.
    pub fn start_recording(
        &mut self,
        name: &str,
        options: RecordingOptions,
    ) -> Result<(), ReachError> {
        if self.player.is_playing() {
            return Err(reject("start_recording", ConflictError::PlaybackActive));
        }
        let now = self.clock.now_ms();
        self.recorder
            .start(name, options, now)
            .map_err(|e| reject("start_recording", e))
    }

    /// Add a keyframe to the active recording.
    ///
    /// # Errors
    ///
    /// [`ConflictError::NotRecording`] when nothing is being recorded and a
    /// non-finite joint value or position.
    pub fn record_keyframe(
        &mut self,
        joint_values: JointValues,
        timestamp_ms: Option<u64>,
        end_effector: Option<Position>,
    ) -> Result<(), ReachError> {
        let now = self.clock.now_ms();
        self.recorder
            .record_keyframe(joint_values, timestamp_ms, end_effector, now)
            .map_err(|e| reject("record_keyframe", e))
    }

    /// Finish the active recording and store it under its name, replacing
    /// any trajectory of the same name. `None` if nothing was being recorded.
    pub fn stop_recording(&mut self) -> Option<Trajectory> {
        let trajectory = self.recorder.stop()?;
        if trajectory.is_empty() {
            warn!(name = trajectory.name(), "recording has no keyframes");
        }
        if self.store.insert(trajectory.clone()).is_some() {
            info!(name = trajectory.name(), "stored trajectory replaced");
        }
        Some(trajectory)
    }

    // -----------------------------------------------------------------------
    // Playback
    // -----------------------------------------------------------------------

    /// Start playing the stored trajectory `name` and pose `scene` at its
    /// first keyframe.
    ///
    /// Completion is only ever reported by [`ReachSession::tick`], so a
    /// callback registered right after this call runs even for a
    /// single-keyframe trajectory.
    ///
    /// # Errors
    ///
    /// Conflicts while recording or playing, [`TrajectoryError::NotFound`],
    /// and the player's own checks (empty trajectory, bad speed).
    ///
    /// [`TrajectoryError::NotFound`]: reach_core::error::TrajectoryError::NotFound
    pub fn play_trajectory<S: KinematicScene + ?Sized>(
        &mut self,
        name: &str,
        scene: &mut S,
        options: PlaybackOptions,
    ) -> Result<(), ReachError> {
        if self.recorder.is_recording() {
            return Err(reject("play_trajectory", ConflictError::RecordingActive));
        }
        if self.player.is_playing() {
            return Err(reject("play_trajectory", ConflictError::PlaybackActive));
        }
        let trajectory = self
            .store
            .require(name)
            .map_err(|e| reject("play_trajectory", e))?
            .clone();
        let first_pose = trajectory.keyframes().first().map(|k| k.joint_values.clone());

        let now = self.clock.now_ms();
        self.player
            .play(trajectory, options, now)
            .map_err(|e| reject("play_trajectory", e))?;
        self.stop_animation();
        if let Some(pose) = first_pose {
            scene.set_joint_values(&pose);
        }
        Ok(())
    }

    /// Run `callback` when the current playback finishes on its own.
    ///
    /// Returns `false` when nothing is playing.
    pub fn on_playback_complete(
        &mut self,
        callback: impl FnOnce() + Send + Sync + 'static,
    ) -> bool {
        self.player.on_complete(callback)
    }

    /// Idempotent. Returns whether a playback was cancelled.
    pub fn stop_playback(&mut self) -> bool {
        self.player.stop()
    }

    /// Interpolated end-effector position of the running playback.
    pub fn playback_position(&self) -> Option<Position> {
        self.player.current_position()
    }

    // -----------------------------------------------------------------------
    // Store
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Unknown name or serialization failure.
    pub fn export_trajectory(&self, name: &str) -> Result<String, ReachError> {
        let trajectory = self
            .store
            .require(name)
            .map_err(|e| reject("export_trajectory", e))?;
        document::export_trajectory(trajectory).map_err(|e| reject("export_trajectory", e))
    }

    /// Parse a document and store the trajectory, replacing one of the same
    /// name.
    ///
    /// # Errors
    ///
    /// Malformed or invalid documents.
    pub fn import_trajectory(&mut self, json: &str) -> Result<Trajectory, ReachError> {
        let trajectory =
            document::import_trajectory(json).map_err(|e| reject("import_trajectory", e))?;
        info!(name = trajectory.name(), keyframes = trajectory.len(), "trajectory imported");
        self.store.insert(trajectory.clone());
        Ok(trajectory)
    }

    /// Store a trajectory built elsewhere. Returns the one it replaced.
    pub fn insert_trajectory(&mut self, trajectory: Trajectory) -> Option<Trajectory> {
        self.store.insert(trajectory)
    }

    /// Remove a stored trajectory. A playback already running keeps its copy.
    ///
    /// # Errors
    ///
    /// Unknown name.
    pub fn delete_trajectory(&mut self, name: &str) -> Result<Trajectory, ReachError> {
        self.store
            .remove(name)
            .map_err(|e| reject("delete_trajectory", e))
    }

    pub fn trajectory_names(&self) -> Vec<&str> {
        self.store.names()
    }

    pub fn trajectory(&self, name: &str) -> Option<&Trajectory> {
        self.store.get(name)
    }

    // -----------------------------------------------------------------------
    // Frame tick
    // -----------------------------------------------------------------------

    /// Advance animation or playback to the clock's current time, then let
    /// the recorder sample the resulting pose.
    pub fn tick<S: KinematicScene + ?Sized>(&mut self, scene: &mut S) -> SessionTick {
        let now_ms = self.clock.now_ms();

        let motion = self.motion.as_mut().map(|task| task.tick(scene, now_ms));
        if matches!(motion, Some(MotionTick::Completed | MotionTick::Inactive)) {
            self.motion = None;
        }

        let playback = self.player.tick(scene, now_ms);
        let sampled = self.recorder.sample(scene, now_ms);

        SessionTick {
            now_ms,
            motion,
            playback,
            sampled,
        }
    }
}

/// Log a refused session call and lift its error.
fn reject(operation: &str, error: impl Into<ReachError>) -> ReachError {
    let error = error.into();
    warn!(operation, error = %error, "rejected");
    error
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
