use uom::si::{f64::Time, time::second};

/// How the driver chooses the physics step size each iteration.
///
/// The duality between a configured fixed step and a solver-determined
/// adaptive step is modeled as an explicit policy rather than branches
/// scattered through the loop, so the termination clamp stays centrally
/// testable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepPolicy {
    /// Use the same step every iteration, except a possibly clamped final
    /// step.
    Fixed(Time),
    /// Query the dynamical core for its maximum stable step every
    /// iteration; stability constraints vary as the flow evolves.
    Adaptive,
}

impl StepPolicy {
    /// Builds the policy from the configured `dt_phys` value, in seconds.
    ///
    /// A positive value selects a fixed step; zero or negative means
    /// "ask the dynamical core each iteration".
    #[must_use]
    pub fn from_dt_phys(dt_phys: f64) -> Self {
        if dt_phys > 0.0 {
            Self::Fixed(Time::new::<second>(dt_phys))
        } else {
            Self::Adaptive
        }
    }
}

/// Clamps `dt` so the update never carries `elapsed` past `target`.
///
/// If `elapsed + dt` would overshoot, the returned step is exactly
/// `target - elapsed`, so the final iteration lands on the target time to
/// within floating-point representability and never beyond it.
#[must_use]
pub fn clamp_to_target(dt: Time, elapsed: Time, target: Time) -> Time {
    if elapsed + dt > target {
        target - elapsed
    } else {
        dt
    }
}
