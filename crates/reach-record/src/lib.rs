//! `reach-record`: record, store, export and replay joint trajectories.
//!
//! A [`TrajectoryRecorder`](recorder::TrajectoryRecorder) collects keyframes
//! (manually or by sampling a scene), a
//! [`TrajectoryStore`](store::TrajectoryStore) keeps the finished
//! trajectories by name, and a [`TrajectoryPlayer`](player::TrajectoryPlayer)
//! drives a scene through one of them in real time. Trajectories leave the
//! engine as camelCase JSON documents, see [`document`].

pub mod document;
pub mod player;
pub mod recorder;
pub mod store;
pub mod types;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        document::{
            export_trajectory, import_trajectory, read_trajectory_file, write_trajectory_file,
            TrajectoryDocument,
        },
        player::{PlaybackOptions, PlaybackTick, TrajectoryPlayer},
        recorder::{RecordingOptions, TrajectoryRecorder},
        store::TrajectoryStore,
        types::{Keyframe, PathPoint, Position, Trajectory, TrajectorySample},
    };
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
