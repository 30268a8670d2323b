//! Core state container and time-integration driver for Squall.
//!
//! Squall advances a coupled atmospheric simulation through operator-split
//! physics steps while harvesting paired before/after snapshots as training
//! data for a machine-learned microphysics surrogate.
//!
//! This crate provides:
//!
//! - [`Coupler`]: the exclusively owned simulation state (grid metadata,
//!   physical constants, options, and named 3D fields) with deep-copy
//!   snapshotting.
//! - [`Driver`]: the control loop binding the physics modules, with an
//!   explicit [`Phase`] lifecycle and a centrally tested final-step clamp.
//! - [`StepPolicy`]: fixed vs. solver-determined adaptive step sizing.
//! - The capability traits physics modules implement: [`Initialize`],
//!   [`Stepper`], [`Dynamics`], [`Microphysics`], [`Sponge`], [`Nudger`],
//!   and [`SampleSink`].
//!
//! Concrete physics modules live in `squall-physics`; the configuration
//! surface, sample corpus writer, and binary live in `squall-driver`.

pub mod coupler;
pub mod driver;
pub mod error;
pub mod module;
pub mod stepping;

pub use coupler::{fields, Coupler, DomainExtent, GridShape, OptionValue, PhysConstants};
pub use driver::{Driver, Phase};
pub use error::{ConfigError, ModelError};
pub use module::{Dynamics, Initialize, Microphysics, Nudger, SampleSink, Sponge, Stepper};
pub use stepping::{clamp_to_target, StepPolicy};
