//! Ready-made arms for demos and tests.

use std::f32::consts::{FRAC_PI_2, PI};

use nalgebra::{Isometry3, Translation3, Vector3};

use reach_core::error::ChainError;

use crate::chain::{JointSpec, LinkSpec};
use crate::model::{ArmBuilder, ArmModel};

fn offset(x: f32, y: f32, z: f32) -> Isometry3<f32> {
    Translation3::new(x, y, z).into()
}

/// Planar arm in the XY plane: two unlimited revolute joints about `+Z`.
///
/// `shoulder` sits at the origin, `elbow` at `(l1, 0, 0)` and the
/// `end_effector` link at `(l1 + l2, 0, 0)` in the zero pose.
pub fn planar_two_link(l1: f32, l2: f32) -> Result<ArmModel, ChainError> {
    ArmBuilder::new()
        .link(LinkSpec::new("base"))
        .link(LinkSpec::new("upper_arm"))
        .link(LinkSpec::new("forearm"))
        .link(LinkSpec::new("end_effector"))
        .joint(
            JointSpec::revolute("shoulder", "base", "upper_arm", Vector3::z()),
            Isometry3::identity(),
        )
        .joint(
            JointSpec::revolute("elbow", "upper_arm", "forearm", Vector3::z()),
            offset(l1, 0.0, 0.0),
        )
        .joint(
            JointSpec::fixed("ee_fixed", "forearm", "end_effector"),
            offset(l2, 0.0, 0.0),
        )
        .build()
}

/// Six-joint arm pointing up `+Z` in the zero pose:
/// yaw, pitch, pitch, roll, pitch, roll. Reach is about 0.86 m.
pub fn six_dof_arm() -> Result<ArmModel, ChainError> {
    ArmBuilder::new()
        .link(LinkSpec::new("base_link"))
        .link(LinkSpec::new("shoulder_link"))
        .link(LinkSpec::new("upper_arm"))
        .link(LinkSpec::new("elbow_link"))
        .link(LinkSpec::new("forearm"))
        .link(LinkSpec::new("wrist_link"))
        .link(LinkSpec::new("end_effector"))
        .joint(
            JointSpec::revolute("j1_base_yaw", "base_link", "shoulder_link", Vector3::z())
                .with_limits(-PI, PI)
                .with_max_velocity(2.0),
            offset(0.0, 0.0, 0.05),
        )
        .joint(
            JointSpec::revolute("j2_shoulder_pitch", "shoulder_link", "upper_arm", Vector3::y())
                .with_limits(-FRAC_PI_2, 2.356)
                .with_max_velocity(2.0),
            offset(0.0, 0.0, 0.2),
        )
        .joint(
            JointSpec::revolute("j3_elbow_pitch", "upper_arm", "elbow_link", Vector3::y())
                .with_limits(-2.356, 2.356)
                .with_max_velocity(3.0),
            offset(0.0, 0.0, 0.3),
        )
        .joint(
            JointSpec::revolute("j4_forearm_roll", "elbow_link", "forearm", Vector3::z())
                .with_limits(-PI, PI)
                .with_max_velocity(5.0),
            offset(0.0, 0.0, 0.1),
        )
        .joint(
            JointSpec::revolute("j5_wrist_pitch", "forearm", "wrist_link", Vector3::y())
                .with_limits(-2.094, 2.094)
                .with_max_velocity(5.0),
            offset(0.0, 0.0, 0.2),
        )
        .joint(
            JointSpec::revolute("j6_wrist_roll", "wrist_link", "end_effector", Vector3::z())
                .with_limits(-PI, PI)
                .with_max_velocity(8.0),
            offset(0.0, 0.0, 0.06),
        )
        .build()
}
