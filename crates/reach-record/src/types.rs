//! Keyframes and trajectories.
//!
//! A [`Trajectory`] is built incrementally by the recorder and frozen once it
//! leaves it: fields are private and there is no public mutator.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use reach_ik::chain::JointValues;

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A point in world space, serialized as `{x, y, z}`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[allow(clippy::derive_partial_eq_without_eq)] // f32 fields prevent Eq
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Linear blend; `t = 0` gives `self`, `t = 1` gives `other`.
    #[must_use]
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }
}

impl From<Vector3<f32>> for Position {
    fn from(v: Vector3<f32>) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<Position> for Vector3<f32> {
    fn from(p: Position) -> Self {
        Self::new(p.x, p.y, p.z)
    }
}

// ---------------------------------------------------------------------------
// Keyframe
// ---------------------------------------------------------------------------

/// Joint values at one instant of a recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe {
    /// Milliseconds since the recording started.
    pub timestamp_ms: u64,
    pub joint_values: JointValues,
    pub end_effector: Option<Position>,
}

impl Keyframe {
    pub const fn new(timestamp_ms: u64, joint_values: JointValues) -> Self {
        Self {
            timestamp_ms,
            joint_values,
            end_effector: None,
        }
    }

    #[must_use]
    pub const fn with_end_effector(mut self, position: Position) -> Self {
        self.end_effector = Some(position);
        self
    }
}

/// End-effector position at a keyframe time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathPoint {
    pub time_ms: u64,
    pub position: Position,
}

/// Interpolated state between two keyframes.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectorySample {
    pub joint_values: JointValues,
    pub end_effector: Option<Position>,
}

// ---------------------------------------------------------------------------
// Trajectory
// ---------------------------------------------------------------------------

/// A named, time-ordered list of keyframes.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    name: String,
    keyframes: Vec<Keyframe>,
    duration_ms: u64,
    end_effector_path: Vec<PathPoint>,
}

impl Trajectory {
    /// An empty trajectory.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keyframes: Vec::new(),
            duration_ms: 0,
            end_effector_path: Vec::new(),
        }
    }

    /// Build from keyframes; the end-effector path is derived from them.
    pub fn from_keyframes(name: impl Into<String>, keyframes: Vec<Keyframe>) -> Self {
        let mut trajectory = Self::new(name);
        for keyframe in keyframes {
            trajectory.push(keyframe);
        }
        trajectory
    }

    /// Build from keyframes with an explicit end-effector path.
    pub(crate) fn with_path(
        name: impl Into<String>,
        keyframes: Vec<Keyframe>,
        mut path: Vec<PathPoint>,
    ) -> Self {
        let mut trajectory = Self::from_keyframes(name, keyframes);
        path.sort_by_key(|p| p.time_ms);
        trajectory.end_effector_path = path;
        trajectory
    }

    /// Insert keeping timestamp order; equal timestamps keep arrival order.
    pub(crate) fn push(&mut self, keyframe: Keyframe) {
        let ts = keyframe.timestamp_ms;
        self.duration_ms = self.duration_ms.max(ts);
        if let Some(position) = keyframe.end_effector {
            let at = self.end_effector_path.partition_point(|p| p.time_ms <= ts);
            self.end_effector_path.insert(at, PathPoint { time_ms: ts, position });
        }
        let at = self.keyframes.partition_point(|k| k.timestamp_ms <= ts);
        self.keyframes.insert(at, keyframe);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    /// Largest keyframe timestamp.
    pub const fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn end_effector_path(&self) -> &[PathPoint] {
        &self.end_effector_path
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// The keyframes around `time_ms`: the last at or before it and the
    /// first at or after it. Clamps to the ends outside the recorded range.
    #[allow(clippy::cast_precision_loss)]
    pub fn bracket(&self, time_ms: f64) -> Option<(&Keyframe, &Keyframe)> {
        let first = self.keyframes.first()?;
        let last = self.keyframes.last()?;
        let prev = self
            .keyframes
            .iter()
            .rev()
            .find(|k| k.timestamp_ms as f64 <= time_ms)
            .unwrap_or(first);
        let next = self
            .keyframes
            .iter()
            .find(|k| k.timestamp_ms as f64 >= time_ms)
            .unwrap_or(last);
        Some((prev, next))
    }

    /// Interpolated joint values and end-effector position at `time_ms`.
    ///
    /// `None` for an empty trajectory.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn sample(&self, time_ms: f64) -> Option<TrajectorySample> {
        let (prev, next) = self.bracket(time_ms)?;
        if prev.timestamp_ms >= next.timestamp_ms {
            return Some(TrajectorySample {
                joint_values: prev.joint_values.clone(),
                end_effector: prev.end_effector,
            });
        }

        let span = (next.timestamp_ms - prev.timestamp_ms) as f64;
        let t = ((time_ms - prev.timestamp_ms as f64) / span).clamp(0.0, 1.0) as f32;

        let joint_values = prev
            .joint_values
            .iter()
            .map(|(name, &from)| {
                let to = next.joint_values.get(name).copied().unwrap_or(from);
                (name.clone(), from + (to - from) * t)
            })
            .collect();
        let end_effector = match (prev.end_effector, next.end_effector) {
            (Some(a), Some(b)) => Some(a.lerp(&b, t)),
            (a, b) => a.or(b),
        };

        Some(TrajectorySample {
            joint_values,
            end_effector,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn kf(ts: u64, j1: f32) -> Keyframe {
        Keyframe::new(ts, JointValues::from([("j1".to_string(), j1)]))
    }

    fn three_keyframes() -> Trajectory {
        Trajectory::from_keyframes("wave", vec![kf(0, 0.0), kf(100, 0.5), kf(200, 1.0)])
    }

    #[test]
    fn duration_is_max_timestamp() {
        let t = three_keyframes();
        assert_eq!(t.duration_ms(), 200);
        assert_eq!(t.len(), 3);
        assert_eq!(t.name(), "wave");
    }

    #[test]
    fn sample_between_keyframes() {
        let sample = three_keyframes().sample(50.0).unwrap();
        assert_relative_eq!(sample.joint_values["j1"], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn sample_exactly_on_keyframe() {
        let sample = three_keyframes().sample(100.0).unwrap();
        assert_relative_eq!(sample.joint_values["j1"], 0.5);
    }

    #[test]
    fn sample_clamps_outside_range() {
        let t = three_keyframes();
        assert_relative_eq!(t.sample(-10.0).unwrap().joint_values["j1"], 0.0);
        assert_relative_eq!(t.sample(900.0).unwrap().joint_values["j1"], 1.0);
    }

    #[test]
    fn duplicate_timestamps_use_earlier_keyframe() {
        let t = Trajectory::from_keyframes("dup", vec![kf(0, 0.0), kf(100, 0.3), kf(100, 0.9)]);
        // The bracket collapses to a zero-length interval.
        let (prev, next) = t.bracket(100.0).unwrap();
        assert_relative_eq!(prev.joint_values["j1"], 0.9);
        assert_relative_eq!(next.joint_values["j1"], 0.3);
        let sample = t.sample(100.0).unwrap();
        assert_relative_eq!(sample.joint_values["j1"], 0.9);
    }

    #[test]
    fn single_keyframe_trajectory_samples_itself() {
        let t = Trajectory::from_keyframes("one", vec![kf(0, 0.7)]);
        assert_eq!(t.duration_ms(), 0);
        assert_relative_eq!(t.sample(0.0).unwrap().joint_values["j1"], 0.7);
    }

    #[test]
    fn empty_trajectory_has_no_sample() {
        assert!(Trajectory::new("empty").sample(0.0).is_none());
    }

    #[test]
    fn out_of_order_keyframes_are_sorted() {
        let t =
            Trajectory::from_keyframes("shuffled", vec![kf(200, 1.0), kf(0, 0.0), kf(100, 0.5)]);
        let stamps: Vec<u64> = t.keyframes().iter().map(|k| k.timestamp_ms).collect();
        assert_eq!(stamps, [0, 100, 200]);
    }

    #[test]
    fn path_follows_keyframes_with_positions() {
        let t = Trajectory::from_keyframes(
            "path",
            vec![
                kf(0, 0.0).with_end_effector(Position::new(1.0, 0.0, 0.0)),
                kf(50, 0.1),
                kf(100, 0.2).with_end_effector(Position::new(0.0, 1.0, 0.0)),
            ],
        );
        assert_eq!(t.end_effector_path().len(), 2);
        assert_eq!(t.end_effector_path()[1].time_ms, 100);

        let mid = t.sample(25.0).unwrap();
        // Keyframe at 50 has no position; the other side of the bracket is used.
        assert_eq!(mid.end_effector, Some(Position::new(1.0, 0.0, 0.0)));
        let between = t.sample(75.0).unwrap();
        assert_eq!(between.end_effector, Some(Position::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn position_lerp_and_conversion() {
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(2.0, -2.0, 4.0);
        let m = a.lerp(&b, 0.5);
        assert_eq!(m, Position::new(1.0, -1.0, 2.0));
        let v: Vector3<f32> = m.into();
        assert_eq!(Position::from(v), m);
    }

    #[test]
    fn position_serializes_as_xyz() {
        let json = serde_json::to_string(&Position::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(json, r#"{"x":1.0,"y":2.0,"z":3.0}"#);
    }
}
