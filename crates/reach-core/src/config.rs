use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_max_iterations() -> u32 {
    25
}
const fn default_tolerance() -> f32 {
    0.01
}
const fn default_damping_factor() -> f32 {
    0.8
}
const fn default_max_step() -> f32 {
    0.2
}
const fn default_true() -> bool {
    true
}
const fn default_duration_ms() -> u64 {
    1000
}
const fn default_change_epsilon() -> f32 {
    1e-4
}
const fn default_speed() -> f32 {
    1.0
}

// ---------------------------------------------------------------------------
// ReachConfig
// ---------------------------------------------------------------------------

/// Top-level configuration for a Reach session.
///
/// Every table and field is optional in TOML; missing values fall back to
/// the defaults below.
///
/// ```toml
/// [solver]
/// max_iterations = 30
/// auto_tune = false
///
/// [recording]
/// sampling_interval_ms = 50
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReachConfig {
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
}

impl ReachConfig {
    /// Validate every section. Returns the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.solver.validate()?;
        self.motion.validate()?;
        self.playback.validate()?;
        self.recording.validate()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

// ---------------------------------------------------------------------------
// SolverConfig
// ---------------------------------------------------------------------------

/// Default IK solver parameters.
///
/// With `auto_tune` enabled the solver derives its settings from the chain's
/// degrees of freedom on every call and these values only serve as the
/// fallback for chains without movable joints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Convergence distance in world units.
    #[serde(default = "default_tolerance")]
    pub tolerance: f32,

    /// Scale applied to each joint correction, in `(0, 1]`.
    #[serde(default = "default_damping_factor")]
    pub damping_factor: f32,

    /// Derive settings from chain structure on each solve.
    #[serde(default = "default_true")]
    pub auto_tune: bool,

    /// Largest per-iteration change of a single joint (rad or m).
    #[serde(default = "default_max_step")]
    pub max_step: f32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            damping_factor: default_damping_factor(),
            auto_tune: true,
            max_step: default_max_step(),
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::invalid("solver.max_iterations", "must be > 0"));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ConfigError::invalid("solver.tolerance", "must be > 0"));
        }
        if !(self.damping_factor > 0.0 && self.damping_factor <= 1.0) {
            return Err(ConfigError::invalid(
                "solver.damping_factor",
                "must be in (0, 1]",
            ));
        }
        if !(self.max_step.is_finite() && self.max_step > 0.0) {
            return Err(ConfigError::invalid("solver.max_step", "must be > 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MotionConfig
// ---------------------------------------------------------------------------

/// Defaults for animated IK moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Length of an animated move in milliseconds.
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,

    /// Animate moves; when false the goal pose is applied at once.
    #[serde(default = "default_true")]
    pub animate: bool,

    /// Joint changes below this are treated as "no motion".
    #[serde(default = "default_change_epsilon")]
    pub change_epsilon: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_duration_ms(),
            animate: true,
            change_epsilon: default_change_epsilon(),
        }
    }
}

impl MotionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.change_epsilon.is_finite() && self.change_epsilon >= 0.0) {
            return Err(ConfigError::invalid("motion.change_epsilon", "must be >= 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

/// Defaults for trajectory playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Time scale; 2.0 plays twice as fast.
    #[serde(default = "default_speed")]
    pub speed: f32,

    #[serde(default)]
    pub looping: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            looping: false,
        }
    }
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(ConfigError::invalid("playback.speed", "must be > 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingConfig
// ---------------------------------------------------------------------------

/// Defaults for trajectory recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Sample the scene every N ms while recording. `None` = manual keyframes.
    #[serde(default)]
    pub sampling_interval_ms: Option<u64>,

    /// Store the end-effector position with each sampled keyframe.
    #[serde(default = "default_true")]
    pub capture_end_effector: bool,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            sampling_interval_ms: None,
            capture_end_effector: true,
        }
    }
}

impl RecordingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling_interval_ms == Some(0) {
            return Err(ConfigError::invalid(
                "recording.sampling_interval_ms",
                "must be > 0",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
