//! Keyframe recorder.
//!
//! Keyframes arrive either from the caller ([`TrajectoryRecorder::record_keyframe`])
//! or from periodic scene sampling ([`TrajectoryRecorder::sample`]) when a
//! sampling interval is configured. Timestamps are relative to the moment
//! recording started.

use tracing::{debug, info};

use reach_core::config::RecordingConfig;
use reach_core::error::{ConflictError, ReachError, TrajectoryError};
use reach_ik::chain::{JointValues, KinematicScene};

use crate::types::{Keyframe, Position, Trajectory};

// ---------------------------------------------------------------------------
// RecordingOptions
// ---------------------------------------------------------------------------

/// Per-recording options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingOptions {
    /// Sample the scene every N ms. `None` records manual keyframes only.
    pub sampling_interval_ms: Option<u64>,
    /// Store the end-effector position with sampled keyframes.
    pub capture_end_effector: bool,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self::from(&RecordingConfig::default())
    }
}

impl From<&RecordingConfig> for RecordingOptions {
    fn from(config: &RecordingConfig) -> Self {
        Self {
            sampling_interval_ms: config.sampling_interval_ms,
            capture_end_effector: config.capture_end_effector,
        }
    }
}

impl RecordingOptions {
    #[must_use]
    pub const fn sampled_every(mut self, interval_ms: u64) -> Self {
        self.sampling_interval_ms = Some(interval_ms);
        self
    }
}

// ---------------------------------------------------------------------------
// TrajectoryRecorder
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ActiveRecording {
    trajectory: Trajectory,
    started_at: u64,
    options: RecordingOptions,
    last_sample_at: Option<u64>,
}

/// Records at most one trajectory at a time.
#[derive(Debug, Default)]
pub struct TrajectoryRecorder {
    active: Option<ActiveRecording>,
}

impl TrajectoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Name of the active recording.
    pub fn name(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.trajectory.name())
    }

    /// Keyframes captured so far.
    pub fn keyframe_count(&self) -> usize {
        self.active.as_ref().map_or(0, |a| a.trajectory.len())
    }

    /// Begin recording `name` at `now_ms`.
    ///
    /// # Errors
    ///
    /// [`TrajectoryError::EmptyName`] for a blank name and
    /// [`ConflictError::RecordingActive`] while another recording runs. Either
    /// way the recorder is left as it was.
    pub fn start(
        &mut self,
        name: &str,
        options: RecordingOptions,
        now_ms: u64,
    ) -> Result<(), ReachError> {
        if self.active.is_some() {
            return Err(ConflictError::RecordingActive.into());
        }
        if name.trim().is_empty() {
            return Err(TrajectoryError::EmptyName.into());
        }

        self.active = Some(ActiveRecording {
            trajectory: Trajectory::new(name),
            started_at: now_ms,
            options,
            last_sample_at: None,
        });
        info!(name, sampling_interval_ms = ?options.sampling_interval_ms, "recording started");
        Ok(())
    }

    /// Append a keyframe. A missing timestamp means "now", relative to the start.
    ///
    /// # Errors
    ///
    /// [`ConflictError::NotRecording`] when no recording is active and
    /// [`TrajectoryError::NonFinite`] for NaN or infinite values, which a
    /// document could not carry. The recording is unchanged on error.
    pub fn record_keyframe(
        &mut self,
        joint_values: JointValues,
        timestamp_ms: Option<u64>,
        end_effector: Option<Position>,
        now_ms: u64,
    ) -> Result<(), ReachError> {
        let active = self.active.as_mut().ok_or(ConflictError::NotRecording)?;
        if let Some((joint, _)) = joint_values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(TrajectoryError::NonFinite(format!("joint {joint}")).into());
        }
        if end_effector.is_some_and(|p| !p.is_finite()) {
            return Err(TrajectoryError::NonFinite("end effector position".into()).into());
        }
        let timestamp_ms = timestamp_ms.unwrap_or_else(|| now_ms.saturating_sub(active.started_at));
        active.trajectory.push(Keyframe {
            timestamp_ms,
            joint_values,
            end_effector,
        });
        Ok(())
    }

    /// Capture the scene if a sampling interval is configured and due.
    ///
    /// The first call after [`TrajectoryRecorder::start`] always captures.
    /// Returns whether a keyframe was added.
    pub fn sample<S: KinematicScene + ?Sized>(&mut self, scene: &S, now_ms: u64) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        let Some(interval) = active.options.sampling_interval_ms else {
            return false;
        };
        if active
            .last_sample_at
            .is_some_and(|last| now_ms.saturating_sub(last) < interval)
        {
            return false;
        }

        let end_effector = if active.options.capture_end_effector {
            scene.end_effector_world_position().map(Position::from)
        } else {
            None
        };
        active.trajectory.push(Keyframe {
            timestamp_ms: now_ms.saturating_sub(active.started_at),
            joint_values: scene.joint_values(),
            end_effector,
        });
        active.last_sample_at = Some(now_ms);
        debug!(keyframes = active.trajectory.len(), "scene sampled");
        true
    }

    /// Finish recording. `None` if nothing was being recorded.
    pub fn stop(&mut self) -> Option<Trajectory> {
        let active = self.active.take()?;
        info!(
            name = active.trajectory.name(),
            keyframes = active.trajectory.len(),
            duration_ms = active.trajectory.duration_ms(),
            "recording stopped"
        );
        Some(active.trajectory)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use reach_ik::presets::planar_two_link;

    fn j1(value: f32) -> JointValues {
        JointValues::from([("j1".to_string(), value)])
    }

    #[test]
    fn manual_keyframes_use_relative_time() {
        let mut recorder = TrajectoryRecorder::new();
        recorder.start("wave", RecordingOptions::default(), 1_000).unwrap();
        recorder.record_keyframe(j1(0.0), None, None, 1_000).unwrap();
        recorder.record_keyframe(j1(0.5), None, None, 1_100).unwrap();
        recorder.record_keyframe(j1(1.0), Some(200), None, 5_000).unwrap();

        let t = recorder.stop().unwrap();
        let stamps: Vec<u64> = t.keyframes().iter().map(|k| k.timestamp_ms).collect();
        assert_eq!(stamps, [0, 100, 200]);
        assert_eq!(t.duration_ms(), 200);
        assert!(!recorder.is_recording());
    }

    #[test]
    fn second_start_is_rejected_without_side_effects() {
        let mut recorder = TrajectoryRecorder::new();
        recorder.start("first", RecordingOptions::default(), 0).unwrap();
        recorder.record_keyframe(j1(0.1), None, None, 10).unwrap();

        let err = recorder.start("second", RecordingOptions::default(), 20).unwrap_err();
        assert!(matches!(err, ReachError::Conflict(ConflictError::RecordingActive)));
        assert_eq!(recorder.name(), Some("first"));
        assert_eq!(recorder.keyframe_count(), 1);
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut recorder = TrajectoryRecorder::new();
        let err = recorder.start("", RecordingOptions::default(), 0).unwrap_err();
        assert!(matches!(err, ReachError::Trajectory(TrajectoryError::EmptyName)));
        assert!(!recorder.is_recording());
    }

    #[test]
    fn keyframe_without_recording_is_rejected() {
        let mut recorder = TrajectoryRecorder::new();
        assert!(matches!(
            recorder.record_keyframe(j1(0.0), None, None, 0),
            Err(ReachError::Conflict(ConflictError::NotRecording))
        ));
    }

    #[test]
    fn non_finite_keyframes_are_rejected() {
        let mut recorder = TrajectoryRecorder::new();
        recorder.start("glitch", RecordingOptions::default(), 0).unwrap();
        recorder.record_keyframe(j1(0.2), Some(0), None, 0).unwrap();

        let err = recorder
            .record_keyframe(j1(f32::NAN), Some(10), None, 10)
            .unwrap_err();
        assert!(matches!(err, ReachError::Trajectory(TrajectoryError::NonFinite(_))));
        assert!(err.to_string().contains("j1"));
        let err = recorder
            .record_keyframe(j1(0.3), Some(20), Some(Position::new(f32::INFINITY, 0.0, 0.0)), 20)
            .unwrap_err();
        assert!(matches!(err, ReachError::Trajectory(TrajectoryError::NonFinite(_))));
        assert_eq!(recorder.keyframe_count(), 1);

        let t = recorder.stop().unwrap();
        let json = crate::document::export_trajectory(&t).unwrap();
        assert_eq!(crate::document::import_trajectory(&json).unwrap(), t);
    }

    #[test]
    fn stop_without_recording_is_none() {
        let mut recorder = TrajectoryRecorder::new();
        assert!(recorder.stop().is_none());
        assert!(recorder.stop().is_none());
    }

    #[test]
    fn sampling_respects_interval() {
        let arm = planar_two_link(1.0, 0.5).unwrap();
        let mut recorder = TrajectoryRecorder::new();
        recorder
            .start("sampled", RecordingOptions::default().sampled_every(50), 100)
            .unwrap();

        assert!(recorder.sample(&arm, 100));
        assert!(!recorder.sample(&arm, 120));
        assert!(recorder.sample(&arm, 150));
        assert!(!recorder.sample(&arm, 199));
        assert!(recorder.sample(&arm, 210));

        let t = recorder.stop().unwrap();
        let stamps: Vec<u64> = t.keyframes().iter().map(|k| k.timestamp_ms).collect();
        assert_eq!(stamps, [0, 50, 110]);
        assert_eq!(t.end_effector_path().len(), 3);
        assert_relative_eq!(t.end_effector_path()[0].position.x, 1.5, epsilon = 1e-6);
        assert_eq!(t.keyframes()[0].joint_values.len(), 2);
    }

    #[test]
    fn manual_mode_never_samples() {
        let arm = planar_two_link(1.0, 0.5).unwrap();
        let mut recorder = TrajectoryRecorder::new();
        recorder.start("manual", RecordingOptions::default(), 0).unwrap();
        assert!(!recorder.sample(&arm, 0));
        assert!(!recorder.sample(&arm, 10_000));
        assert_eq!(recorder.keyframe_count(), 0);
    }

    #[test]
    fn sampling_without_end_effector_capture() {
        let arm = planar_two_link(1.0, 0.5).unwrap();
        let mut recorder = TrajectoryRecorder::new();
        let options = RecordingOptions {
            sampling_interval_ms: Some(10),
            capture_end_effector: false,
        };
        recorder.start("joints-only", options, 0).unwrap();
        recorder.sample(&arm, 0);
        let t = recorder.stop().unwrap();
        assert!(t.keyframes()[0].end_effector.is_none());
        assert!(t.end_effector_path().is_empty());
    }

    #[test]
    fn restart_after_stop_begins_fresh() {
        let mut recorder = TrajectoryRecorder::new();
        recorder.start("a", RecordingOptions::default(), 0).unwrap();
        recorder.record_keyframe(j1(0.0), None, None, 0).unwrap();
        recorder.stop();
        recorder.start("b", RecordingOptions::default(), 500).unwrap();
        assert_eq!(recorder.keyframe_count(), 0);
        assert_eq!(recorder.name(), Some("b"));
    }
}
