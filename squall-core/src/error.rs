use thiserror::Error;

/// Errors raised while configuring the simulation or the state container.
///
/// All configuration faults are detected eagerly, before any physics module
/// runs, and none of them are recoverable.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The physical constants were set more than once.
    #[error("physical constants may only be set once")]
    ConstantsAlreadySet,

    /// A physical constant that must be positive was not.
    #[error("physical constant `{name}` must be positive, got {value}")]
    NonPositiveConstant { name: &'static str, value: f64 },

    /// A module asked for the physical constants before they were set.
    #[error("physical constants have not been set")]
    ConstantsNotSet,

    /// The requested grid shape has a zero dimension.
    #[error("grid shape ({nz}, {ny}, {nx}) has a non-positive dimension")]
    InvalidGridShape { nz: usize, ny: usize, nx: usize },

    /// The coupler state was allocated more than once.
    #[error("coupler state may only be allocated once")]
    StateAlreadyAllocated,

    /// An operation that needs allocated fields ran before `allocate_state`.
    #[error("coupler state has not been allocated")]
    StateNotAllocated,

    /// The domain extent was queried before `set_grid`.
    #[error("domain extent has not been set")]
    GridNotSet,

    /// A field name was looked up that no module ever registered.
    #[error("unknown field `{0}`")]
    UnknownField(String),

    /// A required configuration key is missing or has the wrong type.
    #[error("invalid configuration file: {0}")]
    Parse(String),

    /// A configuration value failed validation.
    #[error("configuration key `{key}` must be positive, got {value}")]
    NonPositiveValue { key: &'static str, value: f64 },

    /// The configuration file could not be read at all.
    #[error("cannot read configuration file `{path}`: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run-level error taxonomy for a surrogate-data generation run.
///
/// Every variant is fatal: an interrupted physics integration has no
/// well-defined resumable state, so errors propagate straight out of the
/// driver and terminate the process.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Invalid configuration, detected before or during module init.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The sample corpus could not be created or appended to.
    #[error("sample corpus i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A physics module failed internally. Unrecoverable.
    #[error("physics module `{module}` failed: {context}")]
    Physics {
        module: &'static str,
        context: String,
    },

    /// The driver was asked to step before initialization completed.
    #[error("driver was not initialized before stepping")]
    NotInitialized,

    /// The driver was initialized more than once.
    #[error("driver was already initialized")]
    AlreadyInitialized,
}

impl ModelError {
    /// Wraps an internal physics failure, tagging the module that raised it.
    pub fn physics(module: &'static str, context: impl Into<String>) -> Self {
        Self::Physics {
            module,
            context: context.into(),
        }
    }
}
