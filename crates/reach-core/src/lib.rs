//! `reach-core`: errors, configuration and clocks shared by the Reach crates.

pub mod clock;
pub mod config;
pub mod error;

pub mod prelude {
    pub use crate::{
        clock::{Clock, ManualClock, SystemClock},
        config::{MotionConfig, PlaybackConfig, ReachConfig, RecordingConfig, SolverConfig},
        error::{ChainError, ConfigError, ConflictError, ReachError, TrajectoryError},
    };
}
