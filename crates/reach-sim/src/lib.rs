//! `reach-sim`: one object a host calls into, ticked once per frame.
//!
//! [`ReachSession`](session::ReachSession) owns the solver, the trajectory
//! store, the recorder and the player, and enforces that a single driver
//! moves the scene at a time. With the `bevy` feature,
//! [`ReachPlugin`](plugin::ReachPlugin) hosts a session and an arm inside a
//! Bevy app and ticks it every `Update`.
//!
//! ```text
//!   host ──execute_ik/record/play──▶ ReachSession ──tick(scene)──▶ KinematicScene
//!                                      │    │    │
//!                           CcdSolver ─┘    │    └─ TrajectoryPlayer
//!                                 TrajectoryRecorder + TrajectoryStore
//! ```

#[cfg(feature = "bevy")]
pub mod plugin;
pub mod session;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    #[cfg(feature = "bevy")]
    pub use crate::plugin::{ReachPlugin, ReachWorld};
    pub use crate::session::{Activity, MotionPlanKind, ReachSession, SessionTick};
}
