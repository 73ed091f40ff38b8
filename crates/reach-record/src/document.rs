//! JSON export/import of trajectories.
//!
//! The document is the only way a trajectory leaves the engine:
//!
//! ```json
//! {
//!   "name": "wave",
//!   "keyframes": [
//!     { "timestamp": 0, "jointValues": { "shoulder": 0.0 },
//!       "endEffectorPosition": { "x": 1.5, "y": 0.0, "z": 0.0 } }
//!   ],
//!   "duration": 0,
//!   "endEffectorPath": [ { "time": 0, "position": { "x": 1.5, "y": 0.0, "z": 0.0 } } ]
//! }
//! ```
//!
//! Import accepts documents without `endEffectorPath` or `duration` and
//! recomputes both from the keyframes.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use reach_core::error::TrajectoryError;
use reach_ik::chain::JointValues;

use crate::types::{Keyframe, PathPoint, Position, Trajectory};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Serialized form of a [`Trajectory`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrajectoryDocument {
    pub name: String,
    pub keyframes: Vec<KeyframeDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_effector_path: Option<Vec<PathPointDocument>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyframeDocument {
    pub timestamp: u64,
    pub joint_values: JointValues,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_effector_position: Option<Position>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPointDocument {
    pub time: u64,
    pub position: Position,
}

impl From<&Trajectory> for TrajectoryDocument {
    fn from(trajectory: &Trajectory) -> Self {
        Self {
            name: trajectory.name().to_string(),
            keyframes: trajectory
                .keyframes()
                .iter()
                .map(|k| KeyframeDocument {
                    timestamp: k.timestamp_ms,
                    joint_values: k.joint_values.clone(),
                    end_effector_position: k.end_effector,
                })
                .collect(),
            duration: Some(trajectory.duration_ms()),
            end_effector_path: Some(
                trajectory
                    .end_effector_path()
                    .iter()
                    .map(|p| PathPointDocument {
                        time: p.time_ms,
                        position: p.position,
                    })
                    .collect(),
            ),
        }
    }
}

impl TryFrom<TrajectoryDocument> for Trajectory {
    type Error = TrajectoryError;

    fn try_from(doc: TrajectoryDocument) -> Result<Self, Self::Error> {
        if doc.name.trim().is_empty() {
            return Err(TrajectoryError::EmptyName);
        }

        let mut keyframes = Vec::with_capacity(doc.keyframes.len());
        for (i, k) in doc.keyframes.into_iter().enumerate() {
            if let Some((joint, _)) = k.joint_values.iter().find(|(_, v)| !v.is_finite()) {
                return Err(TrajectoryError::InvalidDocument(format!(
                    "keyframe {i}: non-finite value for joint {joint}"
                )));
            }
            if k.end_effector_position.is_some_and(|p| !p.is_finite()) {
                return Err(TrajectoryError::InvalidDocument(format!(
                    "keyframe {i}: non-finite end effector position"
                )));
            }
            keyframes.push(Keyframe {
                timestamp_ms: k.timestamp,
                joint_values: k.joint_values,
                end_effector: k.end_effector_position,
            });
        }

        let trajectory = match doc.end_effector_path {
            Some(path) => {
                if path.iter().any(|p| !p.position.is_finite()) {
                    return Err(TrajectoryError::InvalidDocument(
                        "non-finite end effector path point".into(),
                    ));
                }
                let path = path
                    .into_iter()
                    .map(|p| PathPoint {
                        time_ms: p.time,
                        position: p.position,
                    })
                    .collect();
                Self::with_path(doc.name, keyframes, path)
            }
            None => Self::from_keyframes(doc.name, keyframes),
        };

        if let Some(declared) = doc.duration {
            if declared != trajectory.duration_ms() {
                warn!(
                    name = trajectory.name(),
                    declared,
                    recomputed = trajectory.duration_ms(),
                    "trajectory duration does not match keyframes, using recomputed value"
                );
            }
        }

        Ok(trajectory)
    }
}

// ---------------------------------------------------------------------------
// Export / import
// ---------------------------------------------------------------------------

/// Serialize a trajectory to a pretty-printed JSON document.
///
/// # Errors
///
/// Returns [`TrajectoryError::Json`] if serialization fails.
pub fn export_trajectory(trajectory: &Trajectory) -> Result<String, TrajectoryError> {
    Ok(serde_json::to_string_pretty(&TrajectoryDocument::from(trajectory))?)
}

/// Parse and validate a JSON document.
///
/// # Errors
///
/// [`TrajectoryError::InvalidDocument`] for malformed JSON, missing fields
/// or non-finite values; [`TrajectoryError::EmptyName`] for a blank name.
pub fn import_trajectory(json: &str) -> Result<Trajectory, TrajectoryError> {
    let doc: TrajectoryDocument = serde_json::from_str(json)
        .map_err(|e| TrajectoryError::InvalidDocument(e.to_string()))?;
    Trajectory::try_from(doc)
}

/// Export to a file.
///
/// # Errors
///
/// Serialization errors and I/O failures (with the path attached).
pub fn write_trajectory_file(
    trajectory: &Trajectory,
    path: impl AsRef<Path>,
) -> Result<(), TrajectoryError> {
    let path = path.as_ref();
    let json = export_trajectory(trajectory)?;
    std::fs::write(path, json).map_err(|source| TrajectoryError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Import from a file.
///
/// # Errors
///
/// I/O failures (with the path attached) and everything [`import_trajectory`] rejects.
pub fn read_trajectory_file(path: impl AsRef<Path>) -> Result<Trajectory, TrajectoryError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|source| TrajectoryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    import_trajectory(&json)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_trajectory() -> Trajectory {
        let values = |s: f32, e: f32| {
            JointValues::from([("shoulder".to_string(), s), ("elbow".to_string(), e)])
        };
        Trajectory::from_keyframes(
            "wave",
            vec![
                Keyframe::new(0, values(0.0, 0.0))
                    .with_end_effector(Position::new(1.5, 0.0, 0.0)),
                Keyframe::new(120, values(0.4, -0.2)),
                Keyframe::new(250, values(0.8, -0.4))
                    .with_end_effector(Position::new(0.9, 1.1, 0.0)),
            ],
        )
    }

    #[test]
    fn export_import_preserves_trajectory() {
        let original = sample_trajectory();
        let json = export_trajectory(&original).unwrap();
        let back = import_trajectory(&json).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn export_uses_camel_case_fields() {
        let json = export_trajectory(&sample_trajectory()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["name"], "wave");
        assert_eq!(value["duration"], 250);
        assert!(value["keyframes"][0]["jointValues"].is_object());
        assert!(value["keyframes"][0]["endEffectorPosition"].is_object());
        assert!(value["keyframes"][1].get("endEffectorPosition").is_none());
        assert_eq!(value["endEffectorPath"].as_array().unwrap().len(), 2);
        assert_eq!(value["endEffectorPath"][1]["time"], 250);
    }

    #[test]
    fn missing_path_is_rebuilt() {
        let json = r#"{
            "name": "bare",
            "keyframes": [
                {"timestamp": 0, "jointValues": {"j1": 0.0}, "endEffectorPosition": {"x": 1, "y": 0, "z": 0}},
                {"timestamp": 100, "jointValues": {"j1": 1.0}}
            ]
        }"#;
        let t = import_trajectory(json).unwrap();
        assert_eq!(t.duration_ms(), 100);
        assert_eq!(t.end_effector_path().len(), 1);
        assert_relative_eq!(t.end_effector_path()[0].position.x, 1.0);
    }

    #[test]
    fn inconsistent_duration_is_recomputed() {
        let json = r#"{
            "name": "drift",
            "keyframes": [{"timestamp": 40, "jointValues": {"j1": 0.5}}],
            "duration": 9999
        }"#;
        assert_eq!(import_trajectory(json).unwrap().duration_ms(), 40);
    }

    #[test]
    fn empty_name_rejected() {
        let json = r#"{"name": "  ", "keyframes": []}"#;
        assert!(matches!(import_trajectory(json), Err(TrajectoryError::EmptyName)));
    }

    #[test]
    fn missing_keyframes_rejected() {
        let err = import_trajectory(r#"{"name": "x"}"#).unwrap_err();
        assert!(matches!(err, TrajectoryError::InvalidDocument(_)));
        assert!(err.to_string().contains("keyframes"));
    }

    #[test]
    fn malformed_json_rejected() {
        assert!(matches!(
            import_trajectory("{not json"),
            Err(TrajectoryError::InvalidDocument(_))
        ));
    }

    #[test]
    fn overflowing_value_rejected() {
        // 1e40 does not fit in f32 and becomes infinite.
        let json = r#"{"name": "big", "keyframes": [{"timestamp": 0, "jointValues": {"j1": 1e40}}]}"#;
        let err = import_trajectory(json).unwrap_err();
        assert!(err.to_string().contains("j1"));
    }

    #[test]
    fn file_roundtrip() {
        let path = std::env::temp_dir().join("reach_document_file_roundtrip.json");
        let original = sample_trajectory();
        write_trajectory_file(&original, &path).unwrap();
        let back = read_trajectory_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(back, original);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = read_trajectory_file("/nonexistent/reach/wave.json").unwrap_err();
        assert!(matches!(err, TrajectoryError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/reach/wave.json"));
    }
}
