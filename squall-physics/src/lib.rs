//! Concrete physics modules for the Squall surrogate-data generator.
//!
//! Each module implements the capability traits from `squall-core` and is
//! deliberately compact: the numerical schemes are first-order and the
//! process set minimal, because the point of a Squall run is exercising the
//! driver's snapshot and sample-generation contract, not atmospheric
//! fidelity.
//!
//! Initialization order matters: [`KesslerMicro`] registers the water
//! tracers that [`StratifiedDycore`] seeds during its own init, and
//! [`ColumnNudger::set_column`] must see the state before
//! [`perturb_temperature`] runs. The driver in `squall-core` fixes this
//! sequence.

pub mod dycore;
pub mod kessler;
pub mod nudging;
pub mod perturb;
pub mod sponge;

pub use dycore::StratifiedDycore;
pub use kessler::{KesslerMicro, CLOUD_LIQUID, PRECIP_LIQUID, WATER_VAPOR};
pub use nudging::ColumnNudger;
pub use perturb::perturb_temperature;
pub use sponge::SpongeLayer;
