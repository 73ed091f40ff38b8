//! Cyclic Coordinate Descent (CCD) position solver.
//!
//! Each iteration sweeps the movable joints from the base outwards and turns
//! (or slides) every joint so the end effector swings toward the target. The
//! scene is mutated while solving, then restored: callers get the goal angles
//! back and decide themselves how to apply them.

use std::f32::consts::PI;

use nalgebra::Vector3;
use tracing::{debug, warn};

use reach_core::config::SolverConfig;
use reach_core::error::ChainError;

use crate::chain::{
    adjustable_joints, dof, find_end_effector, is_target_reachable, JointSpec, JointValues,
    KinematicScene,
};
use crate::settings::{SolveOptions, SolverSettings};

/// Vectors shorter than this give no usable direction.
const DIRECTION_EPSILON: f32 = 1e-6;
/// Dot products beyond this band switch to the cross-product angle.
const MAX_COS: f32 = 0.999;
/// Damping grows after this many iterations if still far away.
const STALL_ITERATION: u32 = 10;
/// Distance that separates "far" from "near" for damping adjustments.
const NEAR_DISTANCE: f32 = 0.1;
const STALL_DAMPING_GROWTH: f32 = 1.1;
const FAR_DAMPING_BOOST: f32 = 1.5;

/// Outcome label of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Converged,
    IterationLimitReached,
}

/// Result of an IK solve.
#[derive(Debug, Clone, PartialEq)]
pub struct IkSolution {
    /// Joint values before solving. The scene is left at these values.
    pub start: JointValues,
    /// Joint values found by the solver.
    pub goal: JointValues,
    /// Whether the final distance is within tolerance.
    pub converged: bool,
    /// Number of joint sweeps performed.
    pub iterations: u32,
    /// Final end-effector distance to the target.
    pub error: f32,
    /// Advisory reach check; `false` means the target looked out of reach.
    pub reachable: bool,
    /// Effective settings of this solve.
    pub settings: SolverSettings,
    /// Distance measured at the top of each iteration, plus the final one.
    pub error_trace: Vec<f32>,
    /// Link treated as the end effector.
    pub end_effector: String,
}

impl IkSolution {
    pub const fn status(&self) -> SolveStatus {
        if self.converged {
            SolveStatus::Converged
        } else {
            SolveStatus::IterationLimitReached
        }
    }

    /// Largest absolute change between start and goal over all joints.
    pub fn max_joint_change(&self) -> f32 {
        self.goal
            .iter()
            .map(|(name, goal)| {
                let start = self.start.get(name).copied().unwrap_or(*goal);
                (goal - start).abs()
            })
            .fold(0.0, f32::max)
    }
}

/// CCD solver holding caller-visible defaults and the last start/goal pair.
#[derive(Debug, Clone)]
pub struct CcdSolver {
    defaults: SolverSettings,
    auto_tune: bool,
    max_step: f32,
    last_motion: Option<(JointValues, JointValues)>,
}

impl Default for CcdSolver {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CcdSolver {
    pub const fn new(defaults: SolverSettings) -> Self {
        Self {
            defaults,
            auto_tune: true,
            max_step: 0.2,
            last_motion: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SolverSettings::default())
    }

    pub fn from_config(config: &SolverConfig) -> Self {
        Self::new(SolverSettings::from(config))
            .with_auto_tune(config.auto_tune)
            .with_max_step(config.max_step)
    }

    /// Derive settings from the chain on every solve.
    #[must_use]
    pub const fn with_auto_tune(mut self, enabled: bool) -> Self {
        self.auto_tune = enabled;
        self
    }

    /// Largest change a single joint may make per iteration.
    #[must_use]
    pub const fn with_max_step(mut self, max_step: f32) -> Self {
        self.max_step = max_step;
        self
    }

    /// Caller-visible defaults. Never modified by [`CcdSolver::solve`].
    pub const fn settings(&self) -> &SolverSettings {
        &self.defaults
    }

    /// Start and goal of the most recent solve.
    pub fn last_motion(&self) -> Option<(&JointValues, &JointValues)> {
        self.last_motion.as_ref().map(|(s, g)| (s, g))
    }

    /// Settings a solve on `scene` with `options` would use.
    pub fn effective_settings<S: KinematicScene + ?Sized>(
        &self,
        scene: &S,
        options: &SolveOptions,
    ) -> SolverSettings {
        let base = match dof(scene) {
            n if self.auto_tune && n > 0 => SolverSettings::analyze_robot_structure(n),
            _ => self.defaults,
        };
        base.with_overrides(options)
    }

    /// Solve for joint values that bring the end effector to `target`.
    ///
    /// Non-convergence is reported through [`IkSolution::converged`], never
    /// as an error. The scene's joint values are the same before and after.
    ///
    /// # Errors
    ///
    /// [`ChainError::EmptyChain`] when the scene has no links and
    /// [`ChainError::NoEndEffector`] when no end-effector position is available.
    pub fn solve<S: KinematicScene + ?Sized>(
        &mut self,
        scene: &mut S,
        target: &Vector3<f32>,
        options: &SolveOptions,
    ) -> Result<IkSolution, ChainError> {
        if scene.links().is_empty() {
            return Err(ChainError::EmptyChain);
        }
        let end_effector = find_end_effector(scene)
            .map(|l| l.name.clone())
            .ok_or(ChainError::NoEndEffector)?;
        let mut position = scene
            .link_world_position(&end_effector)
            .ok_or(ChainError::NoEndEffector)?;

        let settings = self.effective_settings(scene, options);
        let reachable = is_target_reachable(target, scene);
        if !reachable {
            warn!(
                x = target.x,
                y = target.y,
                z = target.z,
                "target may be out of reach, solving anyway"
            );
        }

        let joints: Vec<JointSpec> = adjustable_joints(scene).cloned().collect();
        let start = scene.joint_values();

        let mut damping = settings.damping_factor;
        let mut error_trace = Vec::with_capacity(settings.max_iterations as usize + 1);
        let mut iterations = 0;
        let mut converged = false;

        for iteration in 0..settings.max_iterations {
            let distance = (target - position).norm();
            error_trace.push(distance);
            if distance < settings.tolerance {
                converged = true;
                break;
            }
            if iteration > STALL_ITERATION && distance > NEAR_DISTANCE {
                damping = (damping * STALL_DAMPING_GROWTH).min(1.0);
            }

            for joint in &joints {
                self.step_joint(scene, joint, &end_effector, target, damping);
            }
            iterations = iteration + 1;

            match scene.link_world_position(&end_effector) {
                Some(p) => position = p,
                None => break,
            }
        }

        let error = (target - position).norm();
        if !converged {
            error_trace.push(error);
            converged = error < settings.tolerance;
        }

        let goal = scene.joint_values();
        scene.set_joint_values(&start);

        debug!(
            end_effector = %end_effector,
            iterations,
            error,
            converged,
            "ccd solve finished"
        );
        self.last_motion = Some((start.clone(), goal.clone()));

        Ok(IkSolution {
            start,
            goal,
            converged,
            iterations,
            error,
            reachable,
            settings,
            error_trace,
            end_effector,
        })
    }

    /// Move a single joint toward the target and write it to the scene.
    fn step_joint<S: KinematicScene + ?Sized>(
        &self,
        scene: &mut S,
        joint: &JointSpec,
        end_effector: &str,
        target: &Vector3<f32>,
        damping: f32,
    ) {
        let (Some(origin), Some(axis), Some(current), Some(tip)) = (
            scene.joint_world_position(&joint.name),
            scene.joint_world_axis(&joint.name),
            scene.joint_value(&joint.name),
            scene.link_world_position(end_effector),
        ) else {
            return;
        };

        let damping = if (target - tip).norm() > NEAR_DISTANCE {
            (damping * FAR_DAMPING_BOOST).min(1.0)
        } else {
            damping
        };

        let delta = if joint.kind.is_prismatic() {
            (target - tip).dot(&axis.into_inner()) * damping
        } else {
            let Some(angle) = swing_angle(&(tip - origin), &(target - origin), &axis.into_inner())
            else {
                return;
            };
            angle * damping
        };

        let value = joint.clamp_value(current + delta.clamp(-self.max_step, self.max_step));
        scene.set_joint_value(&joint.name, value);
    }
}

/// Signed angle about `axis` that turns `to_end` toward `to_target`.
fn swing_angle(
    to_end: &Vector3<f32>,
    to_target: &Vector3<f32>,
    axis: &Vector3<f32>,
) -> Option<f32> {
    let (end_len, target_len) = (to_end.norm(), to_target.norm());
    if end_len < DIRECTION_EPSILON || target_len < DIRECTION_EPSILON {
        return None;
    }
    let to_end = to_end / end_len;
    let to_target = to_target / target_len;

    let dot = to_end.dot(&to_target);
    let cross = to_end.cross(&to_target);
    let sin = cross.norm().min(1.0);

    // acos flattens near +-1; there the cross product is the better measure.
    let angle = if dot > MAX_COS {
        sin.asin()
    } else if dot < -MAX_COS {
        PI - sin.asin()
    } else {
        dot.acos()
    };

    if cross.dot(axis) < 0.0 {
        Some(-angle)
    } else {
        Some(angle)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
