//! Position inverse kinematics for articulated arms.
//!
//! Provides the scene interface a host implements, an in-memory arm model,
//! a Cyclic Coordinate Descent solver and eased joint-space motion.
//!
//! # Architecture
//!
//! ```text
//! KinematicScene ──► CcdSolver ──► IkSolution (start, goal)
//!                                       │
//!                        execute_ik ────┴──► MotionTask ──tick──► scene
//! ```
//!
//! The solver mutates the scene while it iterates and restores it before
//! returning. Nothing moves until a [`MotionTask`] is ticked or the goal is
//! applied directly.

pub mod chain;
pub mod model;
pub mod motion;
pub mod presets;
pub mod settings;
pub mod solver;

pub use chain::{JointKind, JointLimits, JointSpec, JointValues, KinematicScene, LinkSpec};
pub use model::{ArmBuilder, ArmModel};
pub use motion::{execute_ik, ExecuteOptions, Execution, MotionPlan, MotionTask, MotionTick};
pub use settings::{SolveOptions, SolverSettings};
pub use solver::{CcdSolver, IkSolution, SolveStatus};

pub mod prelude {
    pub use crate::{
        chain::{
            dof, estimate_max_reach, find_base_link, find_end_effector, is_target_reachable,
            JointKind, JointLimits, JointSpec, JointValues, KinematicScene, LinkSpec,
        },
        model::{pose_from_xyz_rpy, ArmBuilder, ArmModel},
        motion::{
            animate, ease_in_out_cubic, execute_ik, ExecuteOptions, Execution, MotionPlan,
            MotionTask, MotionTick,
        },
        presets::{planar_two_link, six_dof_arm},
        settings::{SolveOptions, SolverSettings},
        solver::{CcdSolver, IkSolution, SolveStatus},
    };
}
