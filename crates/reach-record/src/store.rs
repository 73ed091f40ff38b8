use std::collections::BTreeMap;

use reach_core::error::TrajectoryError;

use crate::types::Trajectory;

/// Named trajectories held in memory, ordered by name.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryStore {
    trajectories: BTreeMap<String, Trajectory>,
}

impl TrajectoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store under the trajectory's own name. Returns the one it replaced.
    pub fn insert(&mut self, trajectory: Trajectory) -> Option<Trajectory> {
        self.trajectories
            .insert(trajectory.name().to_string(), trajectory)
    }

    pub fn get(&self, name: &str) -> Option<&Trajectory> {
        self.trajectories.get(name)
    }

    /// Like [`TrajectoryStore::get`] but with a typed error.
    ///
    /// # Errors
    ///
    /// [`TrajectoryError::NotFound`] if no trajectory has that name.
    pub fn require(&self, name: &str) -> Result<&Trajectory, TrajectoryError> {
        self.get(name)
            .ok_or_else(|| TrajectoryError::NotFound(name.to_string()))
    }

    /// # Errors
    ///
    /// [`TrajectoryError::NotFound`] if no trajectory has that name.
    pub fn remove(&mut self, name: &str) -> Result<Trajectory, TrajectoryError> {
        self.trajectories
            .remove(name)
            .ok_or_else(|| TrajectoryError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.trajectories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.trajectories.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trajectory> {
        self.trajectories.values()
    }

    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }
}
