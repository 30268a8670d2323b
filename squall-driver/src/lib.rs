//! Configuration surface and sample corpus writer for the Squall binary.
//!
//! The `squall` binary wires these together with the modules from
//! `squall-physics` and the driver loop from `squall-core`; see
//! `src/main.rs`.

pub mod config;
pub mod samples;

pub use config::Config;
pub use samples::NdjsonGenerator;
