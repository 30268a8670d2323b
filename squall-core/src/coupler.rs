use std::collections::BTreeMap;

use ndarray::Array3;

use crate::error::ConfigError;

/// Names of the mandatory coupler fields.
///
/// Every run carries these five fields; physics modules register additional
/// tracer fields on top of them during initialization.
pub mod fields {
    /// Dry air density, kg m^-3.
    pub const DENSITY_DRY: &str = "density_dry";
    /// Zonal (x) velocity, m s^-1.
    pub const UVEL: &str = "uvel";
    /// Meridional (y) velocity, m s^-1.
    pub const VVEL: &str = "vvel";
    /// Vertical (z) velocity, m s^-1.
    pub const WVEL: &str = "wvel";
    /// Temperature, K.
    pub const TEMP: &str = "temp";

    /// The mandatory fields in allocation order.
    pub const MANDATORY: [&str; 5] = [DENSITY_DRY, UVEL, VVEL, WVEL, TEMP];
}

/// Grid dimensions, fixed for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    pub nz: usize,
    pub ny: usize,
    pub nx: usize,
}

impl GridShape {
    /// The shape as an `ndarray` dimension tuple, `(nz, ny, nx)`.
    #[must_use]
    pub fn dim(&self) -> (usize, usize, usize) {
        (self.nz, self.ny, self.nx)
    }

    /// Total number of grid cells.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.nz * self.ny * self.nx
    }
}

/// Physical size of the domain in each direction, in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainExtent {
    pub xlen: f64,
    pub ylen: f64,
    pub zlen: f64,
}

/// The fixed set of physical constants shared by every module.
///
/// Set exactly once, before any module initializes, and immutable afterward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysConstants {
    /// Specific gas constant of dry air, J kg^-1 K^-1.
    pub r_d: f64,
    /// Specific gas constant of water vapor, J kg^-1 K^-1.
    pub r_v: f64,
    /// Specific heat of dry air at constant pressure, J kg^-1 K^-1.
    pub cp_d: f64,
    /// Specific heat of water vapor at constant pressure, J kg^-1 K^-1.
    pub cp_v: f64,
    /// Gravitational acceleration, m s^-2.
    pub grav: f64,
    /// Reference surface pressure, Pa.
    pub p0: f64,
}

impl PhysConstants {
    /// Specific heat of dry air at constant volume, J kg^-1 K^-1.
    #[must_use]
    pub fn cv_d(&self) -> f64 {
        self.cp_d - self.r_d
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("r_d", self.r_d),
            ("r_v", self.r_v),
            ("cp_d", self.cp_d),
            ("cp_v", self.cp_v),
            ("grav", self.grav),
            ("p0", self.p0),
        ];
        for (name, value) in checks {
            if value <= 0.0 {
                return Err(ConfigError::NonPositiveConstant { name, value });
            }
        }
        Ok(())
    }
}

/// A typed out-of-band configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Str(String),
    Int(i64),
    Real(f64),
}

impl OptionValue {
    /// Returns the string value, or `None` for other variants.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value, or `None` for other variants.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the real value, or `None` for other variants.
    #[must_use]
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(r) => Some(*r),
            _ => None,
        }
    }
}

/// The shared simulation state threaded through every physics module.
///
/// A `Coupler` owns the grid metadata, the one-shot physical constants, a
/// typed option map, and the full set of named 3D fields. There is exactly
/// one live instance per run; the only other instances are snapshots taken
/// with [`snapshot`](Coupler::snapshot) or
/// [`clone_into`](Coupler::clone_into).
///
/// # Snapshot independence
///
/// `Coupler` derives [`Clone`], and every owned collection (including
/// `ndarray` arrays) deep-copies on clone. After a snapshot is taken,
/// mutating the live state has no observable effect on the snapshot and
/// vice versa. The sample generator depends on this for correctness:
/// without full independence, training pairs would silently corrupt as the
/// live state keeps evolving.
#[derive(Debug, Clone, Default)]
pub struct Coupler {
    constants: Option<PhysConstants>,
    shape: Option<GridShape>,
    extent: Option<DomainExtent>,
    options: BTreeMap<String, OptionValue>,
    fields: BTreeMap<String, Array3<f64>>,
    tracers: Vec<String>,
}

impl Coupler {
    /// Creates an empty coupler with nothing set or allocated.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the physical constants for the run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConstantsAlreadySet`] on a second call, or
    /// [`ConfigError::NonPositiveConstant`] if any constant is not positive.
    pub fn set_phys_constants(&mut self, constants: PhysConstants) -> Result<(), ConfigError> {
        if self.constants.is_some() {
            return Err(ConfigError::ConstantsAlreadySet);
        }
        constants.validate()?;
        self.constants = Some(constants);
        Ok(())
    }

    /// Returns the physical constants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConstantsNotSet`] if they were never set.
    pub fn constants(&self) -> Result<PhysConstants, ConfigError> {
        self.constants.ok_or(ConfigError::ConstantsNotSet)
    }

    /// Allocates the mandatory fields at the given grid shape, zero-filled.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidGridShape`] if any dimension is zero,
    /// or [`ConfigError::StateAlreadyAllocated`] on a second call.
    pub fn allocate_state(&mut self, nz: usize, ny: usize, nx: usize) -> Result<(), ConfigError> {
        if self.shape.is_some() {
            return Err(ConfigError::StateAlreadyAllocated);
        }
        if nz == 0 || ny == 0 || nx == 0 {
            return Err(ConfigError::InvalidGridShape { nz, ny, nx });
        }
        let shape = GridShape { nz, ny, nx };
        for name in fields::MANDATORY {
            self.fields.insert(name.to_string(), Array3::zeros(shape.dim()));
        }
        self.shape = Some(shape);
        Ok(())
    }

    /// Returns the allocated grid shape.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::StateNotAllocated`] before `allocate_state`.
    pub fn shape(&self) -> Result<GridShape, ConfigError> {
        self.shape.ok_or(ConfigError::StateNotAllocated)
    }

    /// Records the physical extent of the domain. Pure metadata.
    pub fn set_grid(&mut self, xlen: f64, ylen: f64, zlen: f64) {
        self.extent = Some(DomainExtent { xlen, ylen, zlen });
    }

    /// Returns the domain extent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::GridNotSet`] before `set_grid`.
    pub fn extent(&self) -> Result<DomainExtent, ConfigError> {
        self.extent.ok_or(ConfigError::GridNotSet)
    }

    /// Stores a typed out-of-band option, replacing any previous value.
    pub fn set_option(&mut self, key: impl Into<String>, value: OptionValue) {
        self.options.insert(key.into(), value);
    }

    /// Looks up an option by key.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&OptionValue> {
        self.options.get(key)
    }

    /// Registers a tracer field of the allocated shape, zero-initialized.
    ///
    /// Registration is idempotent: re-registering an existing name leaves
    /// the field untouched. Tracers persist for the lifetime of the run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::StateNotAllocated`] if called before
    /// `allocate_state`.
    pub fn register_tracer(&mut self, name: &str) -> Result<(), ConfigError> {
        let shape = self.shape()?;
        if !self.fields.contains_key(name) {
            self.fields.insert(name.to_string(), Array3::zeros(shape.dim()));
            self.tracers.push(name.to_string());
        }
        Ok(())
    }

    /// Names of the registered tracers, in registration order.
    #[must_use]
    pub fn tracer_names(&self) -> &[String] {
        &self.tracers
    }

    /// Immutable access to a named field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownField`] if no such field exists.
    pub fn field(&self, name: &str) -> Result<&Array3<f64>, ConfigError> {
        self.fields
            .get(name)
            .ok_or_else(|| ConfigError::UnknownField(name.to_string()))
    }

    /// Mutable access to a named field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownField`] if no such field exists.
    pub fn field_mut(&mut self, name: &str) -> Result<&mut Array3<f64>, ConfigError> {
        self.fields
            .get_mut(name)
            .ok_or_else(|| ConfigError::UnknownField(name.to_string()))
    }

    /// Iterates over all field names in deterministic (sorted) order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.keys().map(String::as_str)
    }

    /// Iterates over all `(name, field)` pairs in deterministic order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Array3<f64>)> + '_ {
        self.fields.iter().map(|(name, arr)| (name.as_str(), arr))
    }

    /// Produces in `target` a fully independent deep copy of this coupler.
    ///
    /// Post-call, mutating `self` has zero observable effect on `target`
    /// and vice versa. This is the snapshot primitive the sample generator
    /// depends on.
    pub fn clone_into(&self, target: &mut Coupler) {
        target.clone_from(self);
    }

    /// Returns a fully independent deep copy of this coupler.
    #[must_use]
    pub fn snapshot(&self) -> Coupler {
        self.clone()
    }
}
