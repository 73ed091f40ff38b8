use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the Reach crates.
#[derive(Debug, Error)]
pub enum ReachError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Trajectory error: {0}")]
    Trajectory(#[from] TrajectoryError),

    #[error("Operation conflict: {0}")]
    Conflict(#[from] ConflictError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while building or querying a kinematic chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("chain has no links")]
    EmptyChain,

    #[error("no end effector found")]
    NoEndEffector,

    #[error("no base link found")]
    NoBaseLink,

    #[error("unknown link: {0}")]
    UnknownLink(String),

    #[error("unknown joint: {0}")]
    UnknownJoint(String),

    #[error("duplicate link: {0}")]
    DuplicateLink(String),

    #[error("duplicate joint: {0}")]
    DuplicateJoint(String),

    #[error("link {0} has more than one parent joint")]
    MultipleParents(String),

    #[error("chain has {0} root links (expected exactly one)")]
    MultipleRoots(usize),

    #[error("link {0} is not reachable from the base link")]
    Disconnected(String),

    #[error("invalid joint {joint}: {message}")]
    InvalidJoint { joint: String, message: String },
}

/// Errors raised by trajectory storage, recording, playback and import.
#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("trajectory not found: {0}")]
    NotFound(String),

    #[error("trajectory {0} has no keyframes")]
    Empty(String),

    #[error("trajectory name must not be empty")]
    EmptyName,

    #[error("invalid trajectory document: {0}")]
    InvalidDocument(String),

    #[error("invalid playback speed: {0} (must be finite and > 0)")]
    InvalidSpeed(f32),

    #[error("non-finite keyframe value: {0}")]
    NonFinite(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Rejections caused by the one-active-operation rule.
///
/// Copy + static messages, the session logs them and hands them back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConflictError {
    #[error("a recording is already active")]
    RecordingActive,

    #[error("a playback is already active")]
    PlaybackActive,

    #[error("no recording is active")]
    NotRecording,
}
