//! Solver settings and chain-driven auto-tuning.

use reach_core::config::SolverConfig;
use tracing::warn;

/// Iteration bounds for auto-tuned settings.
const MIN_TUNED_ITERATIONS: usize = 10;
const MAX_TUNED_ITERATIONS: usize = 30;

/// Degrees of freedom at which a chain counts as fully complex.
const FULL_COMPLEXITY_DOF: f32 = 7.0;

/// Effective parameters of one solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    pub max_iterations: u32,
    /// Convergence distance in world units.
    pub tolerance: f32,
    /// Scale applied to each joint correction, in `(0, 1]`.
    pub damping_factor: f32,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            tolerance: 0.01,
            damping_factor: 0.8,
        }
    }
}

impl From<&SolverConfig> for SolverSettings {
    fn from(config: &SolverConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
            damping_factor: config.damping_factor,
        }
    }
}

impl SolverSettings {
    /// Settings tuned to the number of movable joints.
    ///
    /// More joints get more iterations, a finer tolerance and softer damping.
    /// A chain without movable joints gets [`SolverSettings::default`].
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn analyze_robot_structure(dof: usize) -> Self {
        if dof == 0 {
            return Self::default();
        }
        let complexity = (dof as f32 / FULL_COMPLEXITY_DOF).min(1.0);
        let max_iterations = dof
            .saturating_mul(2)
            .saturating_add(10)
            .clamp(MIN_TUNED_ITERATIONS, MAX_TUNED_ITERATIONS) as u32;
        Self {
            max_iterations,
            tolerance: (0.01 / complexity).clamp(0.001, 0.02),
            damping_factor: (0.7 - 0.4 * complexity).clamp(0.2, 0.8),
        }
    }

    /// Apply per-call overrides. Invalid overrides are ignored with a warning.
    #[must_use]
    pub fn with_overrides(mut self, options: &SolveOptions) -> Self {
        match options.max_iterations {
            Some(0) => warn!("ignoring max_iterations override of 0"),
            Some(n) => self.max_iterations = n,
            None => {}
        }
        match options.tolerance {
            Some(t) if t.is_finite() && t > 0.0 => self.tolerance = t,
            Some(t) => warn!(tolerance = t, "ignoring non-positive tolerance override"),
            None => {}
        }
        match options.damping_factor {
            Some(d) if d > 0.0 && d <= 1.0 => self.damping_factor = d,
            Some(d) => warn!(damping_factor = d, "ignoring damping override outside (0, 1]"),
            None => {}
        }
        self
    }
}

/// Per-call overrides for a single solve.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolveOptions {
    pub max_iterations: Option<u32>,
    pub tolerance: Option<f32>,
    pub damping_factor: Option<f32>,
}

impl SolveOptions {
    #[must_use]
    pub const fn with_max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = Some(n);
        self
    }

    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    #[must_use]
    pub const fn with_damping_factor(mut self, damping: f32) -> Self {
        self.damping_factor = Some(damping);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn zero_dof_uses_defaults() {
        assert_eq!(SolverSettings::analyze_robot_structure(0), SolverSettings::default());
    }

    #[test]
    fn two_dof_tuning() {
        let s = SolverSettings::analyze_robot_structure(2);
        assert_eq!(s.max_iterations, 14);
        // 0.01 / (2/7) = 0.035, clamped
        assert_relative_eq!(s.tolerance, 0.02);
        assert_relative_eq!(s.damping_factor, 0.7 - 0.4 * 2.0 / 7.0, epsilon = 1e-6);
    }

    #[test]
    fn six_dof_tuning() {
        let s = SolverSettings::analyze_robot_structure(6);
        assert_eq!(s.max_iterations, 22);
        assert_relative_eq!(s.tolerance, 0.01 * 7.0 / 6.0, epsilon = 1e-6);
        assert_relative_eq!(s.damping_factor, 0.7 - 0.4 * 6.0 / 7.0, epsilon = 1e-6);
    }

    #[test]
    fn large_chains_saturate() {
        let s = SolverSettings::analyze_robot_structure(40);
        assert_eq!(s.max_iterations, 30);
        assert_relative_eq!(s.tolerance, 0.01);
        assert_relative_eq!(s.damping_factor, 0.3, epsilon = 1e-6);
    }

    #[test]
    fn overrides_replace_fields() {
        let options = SolveOptions::default()
            .with_max_iterations(30)
            .with_tolerance(0.01)
            .with_damping_factor(0.7);
        let s = SolverSettings::analyze_robot_structure(2).with_overrides(&options);
        assert_eq!(s.max_iterations, 30);
        assert_relative_eq!(s.tolerance, 0.01);
        assert_relative_eq!(s.damping_factor, 0.7);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let options = SolveOptions::default()
            .with_max_iterations(0)
            .with_tolerance(-1.0)
            .with_damping_factor(1.5);
        let s = SolverSettings::default().with_overrides(&options);
        assert_eq!(s, SolverSettings::default());
    }

    #[test]
    fn settings_from_config() {
        let config = SolverConfig {
            max_iterations: 7,
            ..SolverConfig::default()
        };
        let s = SolverSettings::from(&config);
        assert_eq!(s.max_iterations, 7);
        assert_relative_eq!(s.damping_factor, 0.8);
    }
}
