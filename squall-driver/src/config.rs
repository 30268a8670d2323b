use serde::Deserialize;

use squall_core::ConfigError;

/// Default corpus path when the configuration does not name one.
pub const DEFAULT_OUT_FILE: &str = "micro_surrogate_data.ndjson";

/// Run configuration, deserialized from a YAML file.
///
/// Every required key is validated eagerly, before any module initializes:
/// a missing key, a wrong type, or a non-positive value that must be
/// positive is a [`ConfigError`] and the run never starts.
///
/// Keys beyond these are permitted and ignored here; the configuration path
/// is forwarded to the physics modules via the `standalone_input_file`
/// coupler option, so module-specific keys may live in the same file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Total simulation time to integrate, seconds.
    pub sim_time: f64,
    /// Grid cells in x.
    pub nx: usize,
    /// Grid cells in y.
    pub ny: usize,
    /// Grid cells (levels) in z.
    pub nz: usize,
    /// Domain extent in x, meters.
    pub xlen: f64,
    /// Domain extent in y, meters.
    pub ylen: f64,
    /// Domain extent in z, meters.
    pub zlen: f64,
    /// Physics step size, seconds. Zero or negative means "query the
    /// dynamical core for its stable step each iteration".
    pub dt_phys: f64,
    /// Path of the sample corpus to create.
    #[serde(default = "default_out_file")]
    pub out_file: String,
}

fn default_out_file() -> String {
    DEFAULT_OUT_FILE.to_string()
}

impl Config {
    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Unreadable`] if the file cannot be read,
    /// [`ConfigError::Parse`] if it is not valid YAML with the required
    /// keys, or a validation error for out-of-range values.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_string(),
            source,
        })?;
        Self::from_str(&text)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// As [`Config::from_file`], minus the read step.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sim_time <= 0.0 {
            return Err(ConfigError::NonPositiveValue {
                key: "sim_time",
                value: self.sim_time,
            });
        }
        if self.nx == 0 || self.ny == 0 || self.nz == 0 {
            return Err(ConfigError::InvalidGridShape {
                nz: self.nz,
                ny: self.ny,
                nx: self.nx,
            });
        }
        let extents = [
            ("xlen", self.xlen),
            ("ylen", self.ylen),
            ("zlen", self.zlen),
        ];
        for (key, value) in extents {
            if value <= 0.0 {
                return Err(ConfigError::NonPositiveValue { key, value });
            }
        }
        Ok(())
    }
}
