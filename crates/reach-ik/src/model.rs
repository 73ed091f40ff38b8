//! In-memory [`KinematicScene`] backed by cached world transforms.
//!
//! [`ArmModel`] is the reference scene used by the CLI, the Bevy plugin and
//! the tests. Joints are kept in breadth-first order from the base link, so a
//! joint's parent link is always posed before the joint itself and a value
//! change only needs to re-pose the joints that come after it.

use std::collections::{HashMap, HashSet, VecDeque};

use nalgebra::{Isometry3, Translation3, UnitQuaternion, UnitVector3, Vector3};

use reach_core::error::ChainError;

use crate::chain::{JointKind, JointSpec, KinematicScene, LinkSpec};

/// Axes shorter than this are rejected at build time.
const MIN_AXIS_NORM: f32 = 1e-6;

// ---------------------------------------------------------------------------
// Pose helpers
// ---------------------------------------------------------------------------

/// Build a pose from a translation and roll-pitch-yaw angles (extrinsic XYZ).
pub fn pose_from_xyz_rpy(xyz: [f32; 3], rpy: [f32; 3]) -> Isometry3<f32> {
    Isometry3::from_parts(
        Translation3::new(xyz[0], xyz[1], xyz[2]),
        UnitQuaternion::from_euler_angles(rpy[0], rpy[1], rpy[2]),
    )
}

/// Motion of a single joint at `value`, expressed in the joint frame.
fn joint_motion(kind: JointKind, axis: &UnitVector3<f32>, value: f32) -> Isometry3<f32> {
    match kind {
        JointKind::Fixed => Isometry3::identity(),
        JointKind::Prismatic => Isometry3::from_parts(
            Translation3::from(axis.into_inner() * value),
            UnitQuaternion::identity(),
        ),
        JointKind::Revolute | JointKind::Continuous => Isometry3::from_parts(
            Translation3::identity(),
            UnitQuaternion::from_axis_angle(axis, value),
        ),
    }
}

// ---------------------------------------------------------------------------
// ArmBuilder
// ---------------------------------------------------------------------------

/// Collects links and joints, then validates them into an [`ArmModel`].
#[derive(Debug, Clone, Default)]
pub struct ArmBuilder {
    links: Vec<LinkSpec>,
    joints: Vec<(JointSpec, Isometry3<f32>)>,
    base_pose: Option<Isometry3<f32>>,
}

impl ArmBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn link(mut self, link: LinkSpec) -> Self {
        self.links.push(link);
        self
    }

    /// Add a joint. `origin` places the joint frame in the parent link frame.
    #[must_use]
    pub fn joint(mut self, joint: JointSpec, origin: Isometry3<f32>) -> Self {
        self.joints.push((joint, origin));
        self
    }

    /// World pose of the root link. Identity when unset.
    #[must_use]
    pub fn base_pose(mut self, pose: Isometry3<f32>) -> Self {
        self.base_pose = Some(pose);
        self
    }

    /// Validate the tree and compute the initial pose with every joint at
    /// zero (clamped into its limits).
    ///
    /// # Errors
    ///
    /// Fails on an empty chain, duplicate or unknown names, links with two
    /// parents, anything but exactly one root, links unreachable from the
    /// root, zero-length axes and inverted limits.
    pub fn build(self) -> Result<ArmModel, ChainError> {
        if self.links.is_empty() {
            return Err(ChainError::EmptyChain);
        }

        let mut link_names = HashSet::new();
        for link in &self.links {
            if !link_names.insert(link.name.as_str()) {
                return Err(ChainError::DuplicateLink(link.name.clone()));
            }
        }

        let mut joint_names = HashSet::new();
        let mut children = HashSet::new();
        for (joint, _) in &self.joints {
            if !joint_names.insert(joint.name.as_str()) {
                return Err(ChainError::DuplicateJoint(joint.name.clone()));
            }
            for end in [&joint.parent, &joint.child] {
                if !link_names.contains(end.as_str()) {
                    return Err(ChainError::UnknownLink(end.clone()));
                }
            }
            if !children.insert(joint.child.as_str()) {
                return Err(ChainError::MultipleParents(joint.child.clone()));
            }
            validate_joint(joint)?;
        }

        let roots: Vec<&LinkSpec> = self
            .links
            .iter()
            .filter(|l| !children.contains(l.name.as_str()))
            .collect();
        let [root] = roots.as_slice() else {
            return Err(ChainError::MultipleRoots(roots.len()));
        };

        // Breadth-first from the root, joints of one parent in insertion order.
        let mut outgoing: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, (joint, _)) in self.joints.iter().enumerate() {
            outgoing.entry(joint.parent.as_str()).or_default().push(i);
        }

        let mut link_order = vec![root.name.as_str()];
        let mut joint_order = Vec::with_capacity(self.joints.len());
        let mut queue = VecDeque::from([root.name.as_str()]);
        while let Some(link) = queue.pop_front() {
            for &j in outgoing.get(link).into_iter().flatten() {
                let child = self.joints[j].0.child.as_str();
                joint_order.push(j);
                link_order.push(child);
                queue.push_back(child);
            }
        }

        if let Some(orphan) = self
            .links
            .iter()
            .find(|l| !link_order.contains(&l.name.as_str()))
        {
            return Err(ChainError::Disconnected(orphan.name.clone()));
        }

        let by_name: HashMap<&str, &LinkSpec> =
            self.links.iter().map(|l| (l.name.as_str(), l)).collect();
        let links: Vec<LinkSpec> = link_order
            .iter()
            .filter_map(|name| by_name.get(name).map(|l| (*l).clone()))
            .collect();
        let link_index: HashMap<String, usize> = links
            .iter()
            .enumerate()
            .map(|(i, l)| (l.name.clone(), i))
            .collect();

        let mut joints = Vec::with_capacity(joint_order.len());
        let mut origins = Vec::with_capacity(joint_order.len());
        let mut parents = Vec::with_capacity(joint_order.len());
        let mut childs = Vec::with_capacity(joint_order.len());
        for &j in &joint_order {
            let (spec, origin) = &self.joints[j];
            let mut spec = spec.clone();
            if spec.kind.is_adjustable() {
                spec.axis = spec.axis.normalize();
            }
            parents.push(link_index[&spec.parent]);
            childs.push(link_index[&spec.child]);
            origins.push(*origin);
            joints.push(spec);
        }
        let joint_index = joints
            .iter()
            .enumerate()
            .map(|(i, j)| (j.name.clone(), i))
            .collect();
        let values = joints.iter().map(|j| j.clamp_value(0.0)).collect();

        let mut model = ArmModel {
            links,
            joints,
            origins,
            parents,
            children: childs,
            values,
            link_index,
            joint_index,
            base_pose: self.base_pose.unwrap_or_else(Isometry3::identity),
            link_world: Vec::new(),
            joint_world: Vec::new(),
        };
        model.link_world = vec![model.base_pose; model.links.len()];
        model.joint_world = vec![Isometry3::identity(); model.joints.len()];
        model.refresh_from(0);
        Ok(model)
    }
}

fn validate_joint(joint: &JointSpec) -> Result<(), ChainError> {
    let invalid = |message: &str| ChainError::InvalidJoint {
        joint: joint.name.clone(),
        message: message.into(),
    };
    if joint.kind.is_adjustable() && !(joint.axis.norm() > MIN_AXIS_NORM) {
        return Err(invalid("zero-length axis"));
    }
    if let Some(limits) = joint.limits {
        if !(limits.lower.is_finite() && limits.upper.is_finite()) {
            return Err(invalid("non-finite limits"));
        }
        if limits.lower > limits.upper {
            return Err(invalid("lower limit exceeds upper limit"));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ArmModel
// ---------------------------------------------------------------------------

/// A validated link/joint tree with cached world transforms.
#[derive(Debug, Clone)]
pub struct ArmModel {
    /// Links in breadth-first order, root first.
    links: Vec<LinkSpec>,
    /// Joints in breadth-first order.
    joints: Vec<JointSpec>,
    /// Parent link frame to joint frame, per joint.
    origins: Vec<Isometry3<f32>>,
    /// Parent link index, per joint.
    parents: Vec<usize>,
    /// Child link index, per joint.
    children: Vec<usize>,
    values: Vec<f32>,
    link_index: HashMap<String, usize>,
    joint_index: HashMap<String, usize>,
    base_pose: Isometry3<f32>,
    link_world: Vec<Isometry3<f32>>,
    /// Joint frame in world, before the joint's own motion.
    joint_world: Vec<Isometry3<f32>>,
}

impl ArmModel {
    /// World pose of the root link.
    pub fn base_pose(&self) -> &Isometry3<f32> {
        &self.base_pose
    }

    /// Move the whole arm.
    pub fn set_base_pose(&mut self, pose: Isometry3<f32>) {
        self.base_pose = pose;
        self.refresh_from(0);
    }

    /// World pose of a link.
    pub fn link_world_transform(&self, link: &str) -> Option<&Isometry3<f32>> {
        self.link_index.get(link).map(|&i| &self.link_world[i])
    }

    /// Re-pose every joint from index `first` on.
    fn refresh_from(&mut self, first: usize) {
        if first == 0 {
            self.link_world[0] = self.base_pose;
        }
        for k in first..self.joints.len() {
            let joint = &self.joints[k];
            let frame = self.link_world[self.parents[k]] * self.origins[k];
            let axis = UnitVector3::new_unchecked(joint.axis);
            self.joint_world[k] = frame;
            self.link_world[self.children[k]] =
                frame * joint_motion(joint.kind, &axis, self.values[k]);
        }
    }
}

impl KinematicScene for ArmModel {
    fn links(&self) -> &[LinkSpec] {
        &self.links
    }

    fn joints(&self) -> &[JointSpec] {
        &self.joints
    }

    fn link_world_position(&self, link: &str) -> Option<Vector3<f32>> {
        self.link_world_transform(link).map(|t| t.translation.vector)
    }

    fn joint_world_position(&self, joint: &str) -> Option<Vector3<f32>> {
        self.joint_index
            .get(joint)
            .map(|&i| self.joint_world[i].translation.vector)
    }

    fn joint_world_axis(&self, joint: &str) -> Option<UnitVector3<f32>> {
        let &i = self.joint_index.get(joint)?;
        UnitVector3::try_new(self.joint_world[i].rotation * self.joints[i].axis, MIN_AXIS_NORM)
    }

    fn joint_value(&self, joint: &str) -> Option<f32> {
        self.joint_index.get(joint).map(|&i| self.values[i])
    }

    fn set_joint_value(&mut self, joint: &str, value: f32) -> bool {
        let Some(&i) = self.joint_index.get(joint) else {
            return false;
        };
        if !self.joints[i].kind.is_adjustable() || !value.is_finite() {
            return false;
        }
        self.values[i] = self.joints[i].clamp_value(value);
        self.refresh_from(i);
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
