//! Kinematic chain model: the scene interface and chain analysis.
//!
//! The link/joint tree is owned by an external scene (a renderer, a physics
//! world, or the in-memory [`ArmModel`](crate::model::ArmModel)). The solver
//! and the animation code only see it through [`KinematicScene`], which
//! exposes world-space joint queries and joint value setters. The free
//! functions here answer structural questions about whatever chain a scene
//! holds: which link is the base, which is the end effector, how far the
//! chain can reach.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use nalgebra::{UnitVector3, Vector3};

/// Joint values keyed by joint name.
pub type JointValues = BTreeMap<String, f32>;

/// Link names recognized as an end effector (case-insensitive, exact or `_`-suffix).
const END_EFFECTOR_NAMES: &[&str] = &["end_effector", "endeffector", "ee_link", "tool0", "flange"];

/// Link names recognized as the chain base (case-insensitive, exact).
const BASE_LINK_NAMES: &[&str] = &["base_link", "base"];

// ---------------------------------------------------------------------------
// JointKind
// ---------------------------------------------------------------------------

/// Joint type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointKind {
    /// No relative motion between parent and child.
    Fixed,
    /// Rotation about the axis, usually within limits.
    Revolute,
    /// Unlimited rotation about the axis.
    Continuous,
    /// Translation along the axis.
    Prismatic,
}

impl JointKind {
    /// Whether the solver may change this joint's value.
    pub const fn is_adjustable(self) -> bool {
        !matches!(self, Self::Fixed)
    }

    pub const fn is_prismatic(self) -> bool {
        matches!(self, Self::Prismatic)
    }
}

// ---------------------------------------------------------------------------
// JointLimits
// ---------------------------------------------------------------------------

/// Closed position range `[lower, upper]` (rad or m).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimits {
    pub lower: f32,
    pub upper: f32,
}

impl JointLimits {
    pub const fn new(lower: f32, upper: f32) -> Self {
        Self { lower, upper }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.lower, self.upper)
    }

    pub fn contains(&self, value: f32) -> bool {
        (self.lower..=self.upper).contains(&value)
    }
}

// ---------------------------------------------------------------------------
// LinkSpec
// ---------------------------------------------------------------------------

/// A link as seen by the chain model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    pub name: String,
    /// Explicitly tagged as the tool-center-point link.
    pub tool_center_point: bool,
}

impl LinkSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tool_center_point: false,
        }
    }

    /// A link tagged as the tool center point.
    pub fn tcp(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tool_center_point: true,
        }
    }

    fn is_tool_center_point(&self) -> bool {
        let lower = self.name.to_ascii_lowercase();
        self.tool_center_point || lower == "tcp" || lower.ends_with("_tcp")
    }
}

// ---------------------------------------------------------------------------
// JointSpec
// ---------------------------------------------------------------------------

/// A joint connecting a parent link to a child link.
#[derive(Debug, Clone, PartialEq)]
pub struct JointSpec {
    pub name: String,
    pub kind: JointKind,
    pub parent: String,
    pub child: String,
    /// Rotation/translation axis in the joint frame.
    pub axis: Vector3<f32>,
    /// Position limits. `None` means unbounded.
    pub limits: Option<JointLimits>,
    /// Maximum speed (rad/s or m/s), informational.
    pub max_velocity: Option<f32>,
}

impl JointSpec {
    /// A joint of the given kind with a `+Z` axis and no limits.
    pub fn new(
        name: impl Into<String>,
        kind: JointKind,
        parent: impl Into<String>,
        child: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            parent: parent.into(),
            child: child.into(),
            axis: Vector3::z(),
            limits: None,
            max_velocity: None,
        }
    }

    pub fn fixed(
        name: impl Into<String>,
        parent: impl Into<String>,
        child: impl Into<String>,
    ) -> Self {
        Self::new(name, JointKind::Fixed, parent, child)
    }

    pub fn revolute(
        name: impl Into<String>,
        parent: impl Into<String>,
        child: impl Into<String>,
        axis: Vector3<f32>,
    ) -> Self {
        Self::new(name, JointKind::Revolute, parent, child).with_axis(axis)
    }

    pub fn prismatic(
        name: impl Into<String>,
        parent: impl Into<String>,
        child: impl Into<String>,
        axis: Vector3<f32>,
    ) -> Self {
        Self::new(name, JointKind::Prismatic, parent, child).with_axis(axis)
    }

    #[must_use]
    pub fn with_axis(mut self, axis: Vector3<f32>) -> Self {
        self.axis = axis;
        self
    }

    #[must_use]
    pub const fn with_limits(mut self, lower: f32, upper: f32) -> Self {
        self.limits = Some(JointLimits::new(lower, upper));
        self
    }

    #[must_use]
    pub const fn with_max_velocity(mut self, velocity: f32) -> Self {
        self.max_velocity = Some(velocity);
        self
    }

    /// Clamp `value` into this joint's limits, if any.
    pub fn clamp_value(&self, value: f32) -> f32 {
        match self.limits {
            Some(limits) if self.kind != JointKind::Continuous => limits.clamp(value),
            _ => value,
        }
    }
}

// ---------------------------------------------------------------------------
// KinematicScene
// ---------------------------------------------------------------------------

/// Read/write view over an externally owned link/joint tree.
///
/// Setting a joint value must refresh the world transforms downstream of that
/// joint before the next query returns, the solver relies on seeing its own
/// updates immediately.
pub trait KinematicScene {
    /// All links, in discovery order.
    fn links(&self) -> &[LinkSpec];

    /// All joints, in a fixed traversal order from the base outwards.
    fn joints(&self) -> &[JointSpec];

    /// World position of a link's origin.
    fn link_world_position(&self, link: &str) -> Option<Vector3<f32>>;

    /// World position of a joint's origin.
    fn joint_world_position(&self, joint: &str) -> Option<Vector3<f32>>;

    /// World-space unit axis of a joint.
    fn joint_world_axis(&self, joint: &str) -> Option<UnitVector3<f32>>;

    /// Current value of a joint.
    fn joint_value(&self, joint: &str) -> Option<f32>;

    /// Set a joint value, clamped into the joint's limits when it has them.
    /// Returns `false` if the joint is unknown or fixed.
    fn set_joint_value(&mut self, joint: &str, value: f32) -> bool;

    /// Set several joint values at once. Unknown names are ignored.
    fn set_joint_values(&mut self, values: &JointValues) {
        for (name, &value) in values {
            self.set_joint_value(name, value);
        }
    }

    /// Current values of every adjustable joint.
    fn joint_values(&self) -> JointValues {
        adjustable_joints(self)
            .filter_map(|j| self.joint_value(&j.name).map(|v| (j.name.clone(), v)))
            .collect()
    }

    /// World position of the end-effector link.
    fn end_effector_world_position(&self) -> Option<Vector3<f32>> {
        let ee = find_end_effector(self)?;
        self.link_world_position(&ee.name)
    }
}

// ---------------------------------------------------------------------------
// Chain analysis
// ---------------------------------------------------------------------------

/// Non-fixed joints in traversal order.
pub fn adjustable_joints<S: KinematicScene + ?Sized>(
    scene: &S,
) -> impl Iterator<Item = &JointSpec> {
    scene.joints().iter().filter(|j| j.kind.is_adjustable())
}

/// Degrees of freedom: the number of non-fixed joints.
pub fn dof<S: KinematicScene + ?Sized>(scene: &S) -> usize {
    adjustable_joints(scene).count()
}

/// Pick the end-effector link.
///
/// Order of preference: a conventionally named link (`end_effector`,
/// `tool0`, ...), a leaf tagged as tool center point, the deepest leaf, the
/// last link. Only `None` for a chain without links.
pub fn find_end_effector<S: KinematicScene + ?Sized>(scene: &S) -> Option<&LinkSpec> {
    let links = scene.links();
    if links.is_empty() {
        return None;
    }

    if let Some(named) = links
        .iter()
        .find(|l| matches_convention(&l.name, END_EFFECTOR_NAMES))
    {
        return Some(named);
    }

    let parents: HashSet<&str> = scene.joints().iter().map(|j| j.parent.as_str()).collect();
    let leaves: Vec<&LinkSpec> = links
        .iter()
        .filter(|l| !parents.contains(l.name.as_str()))
        .collect();

    if let Some(tcp) = leaves.iter().find(|l| l.is_tool_center_point()) {
        return Some(tcp);
    }

    let depths = link_depths(scene);
    leaves
        .iter()
        .filter_map(|l| depths.get(l.name.as_str()).map(|&d| (d, *l)))
        // max_by_key keeps the last of equal maxima: later discovery wins ties
        .max_by_key(|(depth, _)| *depth)
        .map(|(_, link)| link)
        .or_else(|| links.last())
}

/// Pick the base link: conventional name, else the unique root, else the first link.
pub fn find_base_link<S: KinematicScene + ?Sized>(scene: &S) -> Option<&LinkSpec> {
    let links = scene.links();
    if let Some(named) = links
        .iter()
        .find(|l| BASE_LINK_NAMES.contains(&l.name.to_ascii_lowercase().as_str()))
    {
        return Some(named);
    }

    let children: HashSet<&str> = scene.joints().iter().map(|j| j.child.as_str()).collect();
    let mut roots = links.iter().filter(|l| !children.contains(l.name.as_str()));
    match (roots.next(), roots.next()) {
        (Some(root), None) => Some(root),
        _ => links.first(),
    }
}

/// Advisory reach estimate.
///
/// Sums the distances between consecutive non-fixed joints and adds the
/// distance from the last of them to the end effector, all measured in the
/// current pose.
pub fn estimate_max_reach<S: KinematicScene + ?Sized>(scene: &S) -> f32 {
    let positions: Vec<Vector3<f32>> = adjustable_joints(scene)
        .filter_map(|j| scene.joint_world_position(&j.name))
        .collect();

    let mut reach: f32 = positions.windows(2).map(|w| (w[1] - w[0]).norm()).sum();
    if let (Some(last), Some(ee)) = (positions.last(), scene.end_effector_world_position()) {
        reach += (ee - last).norm();
    }
    reach
}

/// Whether `target` lies within [`estimate_max_reach`] of the base link.
///
/// A `false` here is a warning, never a reason to refuse a solve.
pub fn is_target_reachable<S: KinematicScene + ?Sized>(target: &Vector3<f32>, scene: &S) -> bool {
    let base = find_base_link(scene)
        .and_then(|l| scene.link_world_position(&l.name))
        .unwrap_or_else(Vector3::zeros);
    (target - base).norm() <= estimate_max_reach(scene)
}

/// Breadth-first depth of every link reachable from the base.
fn link_depths<S: KinematicScene + ?Sized>(scene: &S) -> HashMap<&str, usize> {
    let mut depths = HashMap::new();
    let Some(base) = find_base_link(scene) else {
        return depths;
    };

    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for joint in scene.joints() {
        children
            .entry(joint.parent.as_str())
            .or_default()
            .push(joint.child.as_str());
    }

    let mut queue = VecDeque::from([(base.name.as_str(), 0usize)]);
    while let Some((link, depth)) = queue.pop_front() {
        if depths.contains_key(link) {
            continue;
        }
        depths.insert(link, depth);
        for &child in children.get(link).into_iter().flatten() {
            queue.push_back((child, depth + 1));
        }
    }
    depths
}

fn matches_convention(name: &str, conventions: &[&str]) -> bool {
    let lower = name.to_ascii_lowercase();
    conventions.iter().any(|c| {
        lower == *c
            || lower
                .strip_suffix(c)
                .is_some_and(|prefix| prefix.ends_with('_'))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArmBuilder, ArmModel};
    use crate::presets::{planar_two_link, six_dof_arm};
    use approx::assert_relative_eq;
    use nalgebra::{Isometry3, Translation3};

    fn offset(x: f32, y: f32, z: f32) -> Isometry3<f32> {
        Translation3::new(x, y, z).into()
    }

    /// base -> a -> b -> {c, d}, no conventional names.
    fn branching_arm(tag_d: bool) -> ArmModel {
        let d = if tag_d { LinkSpec::tcp("d") } else { LinkSpec::new("d") };
        ArmBuilder::new()
            .link(LinkSpec::new("root"))
            .link(LinkSpec::new("a"))
            .link(LinkSpec::new("b"))
            .link(LinkSpec::new("c"))
            .link(d)
            .joint(JointSpec::revolute("j1", "root", "a", Vector3::z()), offset(0.0, 0.0, 0.0))
            .joint(JointSpec::revolute("j2", "a", "b", Vector3::z()), offset(1.0, 0.0, 0.0))
            .joint(JointSpec::fixed("j3", "a", "c"), offset(0.0, 1.0, 0.0))
            .joint(JointSpec::revolute("j4", "b", "d", Vector3::y()), offset(1.0, 0.0, 0.0))
            .build()
            .unwrap()
    }

    // -- JointKind / JointLimits --

    #[test]
    fn joint_kind_adjustable() {
        assert!(!JointKind::Fixed.is_adjustable());
        assert!(JointKind::Revolute.is_adjustable());
        assert!(JointKind::Continuous.is_adjustable());
        assert!(JointKind::Prismatic.is_adjustable());
        assert!(JointKind::Prismatic.is_prismatic());
    }

    #[test]
    fn joint_limits_clamp() {
        let limits = JointLimits::new(-1.0, 2.0);
        assert_relative_eq!(limits.clamp(5.0), 2.0);
        assert_relative_eq!(limits.clamp(-5.0), -1.0);
        assert_relative_eq!(limits.clamp(0.5), 0.5);
        assert!(limits.contains(2.0));
        assert!(!limits.contains(2.01));
    }

    #[test]
    fn continuous_joint_ignores_limits() {
        let joint = JointSpec::new("spin", JointKind::Continuous, "a", "b").with_limits(-1.0, 1.0);
        assert_relative_eq!(joint.clamp_value(4.0), 4.0);
    }

    // -- Naming conventions --

    #[test]
    fn convention_matching() {
        assert!(matches_convention("end_effector", END_EFFECTOR_NAMES));
        assert!(matches_convention("UR5_tool0", END_EFFECTOR_NAMES));
        assert!(matches_convention("arm_ee_link", END_EFFECTOR_NAMES));
        assert!(!matches_convention("knee_link", END_EFFECTOR_NAMES));
        assert!(!matches_convention("forearm", END_EFFECTOR_NAMES));
    }

    // -- find_end_effector --

    #[test]
    fn end_effector_by_name() {
        let arm = planar_two_link(1.0, 0.5).unwrap();
        assert_eq!(find_end_effector(&arm).unwrap().name, "end_effector");
    }

    #[test]
    fn end_effector_prefers_tagged_leaf() {
        let arm = branching_arm(true);
        assert_eq!(find_end_effector(&arm).unwrap().name, "d");
    }

    #[test]
    fn end_effector_falls_back_to_deepest_leaf() {
        // c is a leaf at depth 2, d at depth 3
        let arm = branching_arm(false);
        assert_eq!(find_end_effector(&arm).unwrap().name, "d");
    }

    #[test]
    fn single_link_chain_is_its_own_end_effector() {
        let arm = ArmBuilder::new().link(LinkSpec::new("only")).build().unwrap();
        assert_eq!(find_end_effector(&arm).unwrap().name, "only");
    }

    // -- find_base_link --

    #[test]
    fn base_by_name() {
        let arm = six_dof_arm().unwrap();
        assert_eq!(find_base_link(&arm).unwrap().name, "base_link");
    }

    #[test]
    fn base_by_root() {
        let arm = branching_arm(false);
        assert_eq!(find_base_link(&arm).unwrap().name, "root");
    }

    // -- Reach --

    #[test]
    fn planar_reach_is_sum_of_links() {
        let arm = planar_two_link(1.0, 0.5).unwrap();
        assert_relative_eq!(estimate_max_reach(&arm), 1.5, epsilon = 1e-5);
    }

    #[test]
    fn reachability_is_distance_from_base() {
        let arm = planar_two_link(1.0, 0.5).unwrap();
        assert!(is_target_reachable(&Vector3::new(1.2, 0.3, 0.0), &arm));
        assert!(is_target_reachable(&Vector3::new(0.0, -1.5, 0.0), &arm));
        assert!(!is_target_reachable(&Vector3::new(5.0, 5.0, 0.0), &arm));
    }

    #[test]
    fn dof_counts_non_fixed_joints() {
        assert_eq!(dof(&planar_two_link(1.0, 0.5).unwrap()), 2);
        assert_eq!(dof(&six_dof_arm().unwrap()), 6);
        assert_eq!(dof(&branching_arm(false)), 3);
    }

    #[test]
    fn default_joint_values_skip_fixed_joints() {
        let arm = branching_arm(false);
        let values = arm.joint_values();
        assert_eq!(values.len(), 3);
        assert!(!values.contains_key("j3"));
    }
}
