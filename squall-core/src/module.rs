use uom::si::f64::Time;

use crate::{coupler::Coupler, error::ModelError};

/// A module that prepares itself against the coupler before stepping begins.
///
/// Initialization may mutate the coupler, e.g. to register tracer fields or
/// to fill in an initial condition.
pub trait Initialize {
    /// Prepares the module for stepping.
    ///
    /// # Errors
    ///
    /// Any failure is fatal to the run.
    fn init(&mut self, coupler: &mut Coupler) -> Result<(), ModelError>;
}

/// A physics process applied to the live state over one split interval.
pub trait Stepper {
    /// Advances the coupler state by `dt`.
    ///
    /// # Errors
    ///
    /// Any failure is fatal to the run; there is no partial-failure
    /// recovery for an operator-split integration.
    fn time_step(&mut self, coupler: &mut Coupler, dt: Time) -> Result<(), ModelError>;
}

/// The dynamical core: transports mass, momentum, temperature, and tracers.
///
/// Beyond stepping, a dynamical core knows its own numerical stability
/// limit, which the driver queries each iteration when no fixed step size
/// was configured.
pub trait Dynamics: Initialize + Stepper {
    /// Returns the maximum stable step size for the current state.
    ///
    /// # Errors
    ///
    /// Any failure is fatal to the run.
    fn compute_time_step(&self, coupler: &Coupler) -> Result<Time, ModelError>;
}

/// The microphysics parameterization.
///
/// Its `init` registers the tracer fields it needs as a side effect, which
/// is why the driver initializes microphysics before dynamics.
pub trait Microphysics: Initialize + Stepper {}

/// Damping of spurious waves near a domain boundary.
///
/// Must be safe to apply unconditionally every iteration: with a zero
/// damping coefficient the state must come back bit-identical.
pub trait Sponge {
    /// Relaxes fields toward the horizontal mean near the boundary.
    ///
    /// # Errors
    ///
    /// Any failure is fatal to the run.
    fn apply(&self, coupler: &mut Coupler, dt: Time) -> Result<(), ModelError>;
}

/// Relaxation of the domain-mean column toward a stored reference profile.
pub trait Nudger {
    /// Captures the reference column from the current state.
    ///
    /// Must be called before the first temperature perturbation is applied,
    /// so the reference reflects the unperturbed initial state.
    ///
    /// # Errors
    ///
    /// Any failure is fatal to the run.
    fn set_column(&mut self, coupler: &Coupler) -> Result<(), ModelError>;

    /// Relaxes the domain-mean column toward the stored reference.
    ///
    /// Must be safe to apply unconditionally every iteration: with a zero
    /// relaxation coefficient the state must come back bit-identical.
    ///
    /// # Errors
    ///
    /// Any failure is fatal to the run.
    fn nudge(&mut self, coupler: &mut Coupler, dt: Time) -> Result<(), ModelError>;
}

/// Consumer of paired before/after states for surrogate training data.
pub trait SampleSink {
    /// Prepares the output corpus using the state's grid and field schema.
    ///
    /// # Errors
    ///
    /// Fails if the output destination cannot be created.
    fn init(&mut self, coupler: &Coupler) -> Result<(), ModelError>;

    /// Records one training example.
    ///
    /// `input` is the frozen pre-microphysics snapshot and `output` the
    /// live post-microphysics state; neither is mutated. The driver makes
    /// exactly one call per completed loop iteration.
    ///
    /// # Errors
    ///
    /// Fails if the corpus cannot be appended to.
    fn generate_samples(
        &mut self,
        input: &Coupler,
        output: &Coupler,
        dt: Time,
        elapsed: Time,
    ) -> Result<(), ModelError>;
}
