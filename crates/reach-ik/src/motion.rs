//! Eased joint-space motion and the solve-then-move pipeline.
//!
//! A [`MotionTask`] is polled once per frame by its owner. It never sleeps or
//! spawns: each [`MotionTask::tick`] computes the pose for the given clock
//! reading and writes it to the scene.

use std::fmt;

use nalgebra::Vector3;
use tracing::debug;

use reach_core::config::MotionConfig;
use reach_core::error::ChainError;

use crate::chain::{JointValues, KinematicScene};
use crate::settings::SolveOptions;
use crate::solver::{CcdSolver, IkSolution};

/// Called once when a motion completes.
pub type CompletionCallback = Box<dyn FnOnce() + Send + Sync>;

// ---------------------------------------------------------------------------
// Interpolation
// ---------------------------------------------------------------------------

/// Cubic ease-in-out on `[0, 1]`.
pub fn ease_in_out_cubic(t: f32) -> f32 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// Blend two joint maps. Exactly `start` at `t <= 0`, exactly `goal` at `t >= 1`.
///
/// Joints missing from `goal` keep their start value.
pub fn interpolate_values(start: &JointValues, goal: &JointValues, t: f32) -> JointValues {
    start
        .iter()
        .map(|(name, &from)| {
            let to = goal.get(name).copied().unwrap_or(from);
            let value = if t <= 0.0 {
                from
            } else if t >= 1.0 {
                to
            } else {
                from + (to - from) * t
            };
            (name.clone(), value)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// MotionTask
// ---------------------------------------------------------------------------

/// What a [`MotionTask::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionTick {
    /// Pose written; linear progress in `[0, 1)`.
    Running(f32),
    /// Goal pose written. Reported once.
    Completed,
    /// Finished or stopped earlier; nothing written.
    Inactive,
}

/// An eased move from `start` to `goal` over `duration_ms`.
pub struct MotionTask {
    start: JointValues,
    goal: JointValues,
    duration_ms: u64,
    started_at: Option<u64>,
    stopped: bool,
    finished: bool,
    on_complete: Option<CompletionCallback>,
}

impl fmt::Debug for MotionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotionTask")
            .field("start", &self.start)
            .field("goal", &self.goal)
            .field("duration_ms", &self.duration_ms)
            .field("started_at", &self.started_at)
            .field("stopped", &self.stopped)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// Start an eased move. The first [`MotionTask::tick`] latches the start time.
pub fn animate(start: JointValues, goal: JointValues, duration_ms: u64) -> MotionTask {
    MotionTask::new(start, goal, duration_ms)
}

impl MotionTask {
    pub fn new(start: JointValues, goal: JointValues, duration_ms: u64) -> Self {
        Self {
            start,
            goal,
            duration_ms,
            started_at: None,
            stopped: false,
            finished: false,
            on_complete: None,
        }
    }

    #[must_use]
    pub fn with_on_complete(mut self, callback: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub const fn start(&self) -> &JointValues {
        &self.start
    }

    pub const fn goal(&self) -> &JointValues {
        &self.goal
    }

    pub const fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub const fn is_active(&self) -> bool {
        !self.stopped && !self.finished
    }

    /// Cancel. Idempotent; the next tick reports [`MotionTick::Inactive`].
    pub fn stop(&mut self) {
        if self.is_active() {
            debug!("motion stopped");
        }
        self.stopped = true;
        self.on_complete = None;
    }

    /// Linear progress at `now_ms`. `0` before the first tick.
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(&self, now_ms: u64) -> f32 {
        let Some(started_at) = self.started_at else {
            return 0.0;
        };
        if self.duration_ms == 0 {
            return 1.0;
        }
        let elapsed = now_ms.saturating_sub(started_at);
        (elapsed as f32 / self.duration_ms as f32).clamp(0.0, 1.0)
    }

    /// Eased joint values at a linear progress in `[0, 1]`.
    pub fn sample(&self, progress: f32) -> JointValues {
        interpolate_values(&self.start, &self.goal, ease_in_out_cubic(progress.clamp(0.0, 1.0)))
    }

    /// Advance to `now_ms` and write the pose into `scene`.
    pub fn tick<S: KinematicScene + ?Sized>(&mut self, scene: &mut S, now_ms: u64) -> MotionTick {
        if !self.is_active() {
            return MotionTick::Inactive;
        }
        self.started_at.get_or_insert(now_ms);

        let progress = self.progress(now_ms);
        if progress >= 1.0 {
            scene.set_joint_values(&self.goal);
            self.finished = true;
            if let Some(callback) = self.on_complete.take() {
                callback();
            }
            return MotionTick::Completed;
        }

        scene.set_joint_values(&self.sample(progress));
        MotionTick::Running(progress)
    }
}

// ---------------------------------------------------------------------------
// execute_ik
// ---------------------------------------------------------------------------

/// Options for [`execute_ik`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecuteOptions {
    /// Animate the move; otherwise the goal is written at once.
    pub animate: bool,
    pub duration_ms: u64,
    /// Per-call solver overrides.
    pub solve: SolveOptions,
    /// Joint changes at or below this count as no motion.
    pub change_epsilon: f32,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self::from(&MotionConfig::default())
    }
}

impl From<&MotionConfig> for ExecuteOptions {
    fn from(config: &MotionConfig) -> Self {
        Self {
            animate: config.animate,
            duration_ms: config.duration_ms,
            solve: SolveOptions::default(),
            change_epsilon: config.change_epsilon,
        }
    }
}

impl ExecuteOptions {
    #[must_use]
    pub const fn with_animate(mut self, animate: bool) -> Self {
        self.animate = animate;
        self
    }

    #[must_use]
    pub const fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    #[must_use]
    pub const fn with_solve(mut self, solve: SolveOptions) -> Self {
        self.solve = solve;
        self
    }
}

/// How the solved goal reaches the scene.
#[derive(Debug)]
pub enum MotionPlan {
    /// Poll this task each frame.
    Animate(MotionTask),
    /// Goal already written to the scene.
    Applied,
    /// No joint moved more than the change epsilon.
    Unchanged,
}

/// Result of [`execute_ik`].
#[derive(Debug)]
pub struct Execution {
    pub solution: IkSolution,
    pub plan: MotionPlan,
}

/// Solve for `target` and prepare (or apply) the move.
///
/// `Ok` means the pipeline ran, converged or not; check
/// [`IkSolution::converged`] for the outcome.
///
/// # Errors
///
/// Propagates chain failures from [`CcdSolver::solve`].
pub fn execute_ik<S: KinematicScene + ?Sized>(
    solver: &mut CcdSolver,
    scene: &mut S,
    target: &Vector3<f32>,
    options: &ExecuteOptions,
) -> Result<Execution, ChainError> {
    let solution = solver.solve(scene, target, &options.solve)?;

    let plan = if solution.max_joint_change() <= options.change_epsilon {
        MotionPlan::Unchanged
    } else if options.animate {
        MotionPlan::Animate(animate(
            solution.start.clone(),
            solution.goal.clone(),
            options.duration_ms,
        ))
    } else {
        scene.set_joint_values(&solution.goal);
        MotionPlan::Applied
    };

    Ok(Execution { solution, plan })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets::planar_two_link;
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn values(pairs: &[(&str, f32)]) -> JointValues {
        pairs.iter().map(|(n, v)| ((*n).to_string(), *v)).collect()
    }

    // -- Easing --

    #[test]
    fn ease_endpoints_and_midpoint() {
        assert_relative_eq!(ease_in_out_cubic(0.0), 0.0);
        assert_relative_eq!(ease_in_out_cubic(1.0), 1.0);
        assert_relative_eq!(ease_in_out_cubic(0.5), 0.5);
        assert_relative_eq!(ease_in_out_cubic(0.25), 0.0625);
        assert_relative_eq!(ease_in_out_cubic(0.75), 0.9375);
    }

    #[test]
    fn ease_is_monotonic() {
        let samples: Vec<f32> = (0..=100).map(|i| ease_in_out_cubic(i as f32 / 100.0)).collect();
        assert!(samples.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn interpolation_exact_at_endpoints() {
        let start = values(&[("a", 0.1), ("b", -0.3)]);
        let goal = values(&[("a", 0.7), ("b", 1.9)]);
        assert_eq!(interpolate_values(&start, &goal, 0.0), start);
        assert_eq!(interpolate_values(&start, &goal, 1.0), goal);
        let mid = interpolate_values(&start, &goal, 0.5);
        assert_relative_eq!(mid["a"], 0.4, epsilon = 1e-6);
        assert_relative_eq!(mid["b"], 0.8, epsilon = 1e-6);
    }

    #[test]
    fn interpolation_keeps_joints_missing_from_goal() {
        let start = values(&[("a", 0.1), ("b", 0.2)]);
        let goal = values(&[("a", 1.0)]);
        let mid = interpolate_values(&start, &goal, 0.5);
        assert_relative_eq!(mid["b"], 0.2);
    }

    // -- MotionTask --

    #[test]
    fn task_runs_from_start_to_goal() {
        let mut arm = planar_two_link(1.0, 0.5).unwrap();
        let start = arm.joint_values();
        let goal = values(&[("shoulder", 1.0), ("elbow", -0.5)]);
        let mut task = animate(start.clone(), goal.clone(), 1000);

        assert_eq!(task.tick(&mut arm, 5000), MotionTick::Running(0.0));
        assert_eq!(arm.joint_values(), start);

        assert_eq!(task.tick(&mut arm, 5500), MotionTick::Running(0.5));
        assert_relative_eq!(arm.joint_value("shoulder").unwrap(), 0.5, epsilon = 1e-6);

        assert_eq!(task.tick(&mut arm, 6000), MotionTick::Completed);
        assert_eq!(arm.joint_values(), goal);
        assert!(!task.is_active());

        assert_eq!(task.tick(&mut arm, 6100), MotionTick::Inactive);
    }

    #[test]
    fn completion_callback_fires_once() {
        let mut arm = planar_two_link(1.0, 0.5).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut task = animate(arm.joint_values(), values(&[("shoulder", 0.4)]), 100)
            .with_on_complete(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        task.tick(&mut arm, 0);
        task.tick(&mut arm, 150);
        task.tick(&mut arm, 300);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_duration_completes_on_first_tick() {
        let mut arm = planar_two_link(1.0, 0.5).unwrap();
        let goal = values(&[("shoulder", 0.4), ("elbow", 0.0)]);
        let mut task = animate(arm.joint_values(), goal.clone(), 0);
        assert_eq!(task.tick(&mut arm, 10), MotionTick::Completed);
        assert_eq!(arm.joint_values(), goal);
    }

    #[test]
    fn stop_is_idempotent_and_freezes_scene() {
        let mut arm = planar_two_link(1.0, 0.5).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut task = animate(arm.joint_values(), values(&[("shoulder", 1.0)]), 1000)
            .with_on_complete(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        task.tick(&mut arm, 0);
        task.tick(&mut arm, 250);
        let frozen = arm.joint_values();

        task.stop();
        task.stop();
        assert!(!task.is_active());
        assert_eq!(task.tick(&mut arm, 2000), MotionTick::Inactive);
        assert_eq!(arm.joint_values(), frozen);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn progress_before_first_tick_is_zero() {
        let task = animate(JointValues::new(), JointValues::new(), 500);
        assert_relative_eq!(task.progress(10_000), 0.0);
    }

    // -- execute_ik --

    #[test]
    fn execute_animated_leaves_scene_until_ticked() {
        let mut arm = planar_two_link(1.0, 0.5).unwrap();
        let before = arm.joint_values();
        let mut solver = CcdSolver::with_defaults();
        let execution = execute_ik(
            &mut solver,
            &mut arm,
            &Vector3::new(1.2, 0.3, 0.0),
            &ExecuteOptions::default(),
        )
        .unwrap();

        assert_eq!(arm.joint_values(), before);
        let MotionPlan::Animate(mut task) = execution.plan else {
            panic!("expected an animated plan");
        };
        assert_eq!(task.goal(), &execution.solution.goal);
        task.tick(&mut arm, 0);
        assert_eq!(task.tick(&mut arm, 1000), MotionTick::Completed);
        assert_eq!(arm.joint_values(), execution.solution.goal);
    }

    #[test]
    fn execute_instant_applies_goal() {
        let mut arm = planar_two_link(1.0, 0.5).unwrap();
        let mut solver = CcdSolver::with_defaults();
        let execution = execute_ik(
            &mut solver,
            &mut arm,
            &Vector3::new(0.5, 1.0, 0.0),
            &ExecuteOptions::default().with_animate(false),
        )
        .unwrap();
        assert!(matches!(execution.plan, MotionPlan::Applied));
        assert_eq!(arm.joint_values(), execution.solution.goal);
    }

    #[test]
    fn execute_at_current_pose_is_unchanged() {
        let mut arm = planar_two_link(1.0, 0.5).unwrap();
        let mut solver = CcdSolver::with_defaults();
        let execution = execute_ik(
            &mut solver,
            &mut arm,
            &Vector3::new(1.5, 0.0, 0.0),
            &ExecuteOptions::default(),
        )
        .unwrap();
        assert!(matches!(execution.plan, MotionPlan::Unchanged));
    }

    #[test]
    fn execute_options_follow_config() {
        let config = MotionConfig {
            duration_ms: 250,
            animate: false,
            change_epsilon: 0.01,
        };
        let options = ExecuteOptions::from(&config);
        assert_eq!(options.duration_ms, 250);
        assert!(!options.animate);
        assert_relative_eq!(options.change_epsilon, 0.01);
    }
}
