//! [`ReachPlugin`]: drives a [`ReachSession`] from the Bevy frame loop.

use std::sync::Arc;

use bevy::prelude::*;

use reach_core::clock::ManualClock;
use reach_core::config::ReachConfig;
use reach_ik::model::ArmModel;

use crate::session::{ReachSession, SessionTick};

// ---------------------------------------------------------------------------
// ReachWorld
// ---------------------------------------------------------------------------

/// The session and the arm it drives, as one resource.
///
/// The session reads time from a [`ManualClock`] that the plugin's system
/// sets from [`Time::elapsed`] before every tick.
#[derive(Resource, Debug)]
pub struct ReachWorld {
    pub session: ReachSession,
    pub scene: ArmModel,
    /// Result of the most recent frame tick.
    pub last_tick: Option<SessionTick>,
    clock: ManualClock,
}

impl ReachWorld {
    pub fn new(config: ReachConfig, scene: ArmModel) -> Self {
        let clock = ManualClock::new();
        Self {
            session: ReachSession::new(config, Arc::new(clock.clone())),
            scene,
            last_tick: None,
            clock,
        }
    }

    pub const fn clock(&self) -> &ManualClock {
        &self.clock
    }
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// Copy the frame time into the session clock and tick the session.
pub fn reach_tick_system(time: Res<Time>, mut world: ResMut<ReachWorld>) {
    let millis = u64::try_from(time.elapsed().as_millis()).unwrap_or(u64::MAX);
    let world = &mut *world;
    world.clock.set(millis);
    world.last_tick = Some(world.session.tick(&mut world.scene));
}

// ---------------------------------------------------------------------------
// ReachPlugin
// ---------------------------------------------------------------------------

/// Bevy plugin that owns an arm and ticks its session every `Update`.
///
/// # Usage
///
/// ```no_run
/// use bevy::prelude::*;
/// use reach_core::config::ReachConfig;
/// use reach_ik::presets::six_dof_arm;
/// use reach_sim::plugin::ReachPlugin;
///
/// let arm = six_dof_arm().unwrap();
/// App::new()
///     .add_plugins(MinimalPlugins)
///     .add_plugins(ReachPlugin::new(ReachConfig::default(), arm))
///     .run();
/// ```
///
/// Other systems reach the session through `ResMut<ReachWorld>`.
pub struct ReachPlugin {
    pub config: ReachConfig,
    pub arm: ArmModel,
}

impl ReachPlugin {
    pub const fn new(config: ReachConfig, arm: ArmModel) -> Self {
        Self { config, arm }
    }
}

impl Plugin for ReachPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(ReachWorld::new(self.config.clone(), self.arm.clone()))
            .add_systems(Update, reach_tick_system);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
